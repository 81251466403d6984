//! Error types for the stepper-core library.
//!
//! The execution core itself has no recoverable errors; everything that can
//! fail is validated up front when settings are loaded.

use core::fmt;

/// Result type alias using the library's Error type.
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for all stepper-core operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Settings parsing or validation error
    Config(ConfigError),
}

/// Settings-related errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Failed to parse TOML settings
    ParseError(heapless::String<128>),
    /// Step invert mask has bits set beyond the configured axis count
    InvalidStepInvertMask(u8),
    /// Direction invert mask has bits set beyond the configured axis count
    InvalidDirInvertMask(u8),
    /// File I/O error (std only)
    #[cfg(feature = "std")]
    IoError(heapless::String<128>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "Configuration error: {}", e),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            ConfigError::InvalidStepInvertMask(mask) => {
                write!(f, "Step invert mask {:#04x} exceeds axis count", mask)
            }
            ConfigError::InvalidDirInvertMask(mask) => {
                write!(f, "Direction invert mask {:#04x} exceeds axis count", mask)
            }
            #[cfg(feature = "std")]
            ConfigError::IoError(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}
