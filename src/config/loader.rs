//! Settings loading from files (std only).

use std::fs;
use std::path::Path;

use crate::error::{ConfigError, Error, Result};

use super::settings::Settings;

/// Load settings from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if the parsed
/// settings fail validation.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let content = fs::read_to_string(path.as_ref()).map_err(|e| {
        let msg = heapless::String::try_from(e.to_string().as_str()).unwrap_or_default();
        Error::Config(ConfigError::IoError(msg))
    })?;

    parse_settings(&content)
}

/// Parse settings from a TOML string.
///
/// # Errors
///
/// Returns an error if the TOML is invalid or fails validation.
pub fn parse_settings(content: &str) -> Result<Settings> {
    let settings: Settings = toml::from_str(content).map_err(|e| {
        let msg = heapless::String::try_from(e.message()).unwrap_or_default();
        Error::Config(ConfigError::ParseError(msg))
    })?;

    super::validation::validate_settings(&settings)?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_uses_defaults() {
        let settings = parse_settings("").expect("empty settings should parse");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_parse_full_settings() {
        let settings = parse_settings(
            r#"
step_invert_mask = 1
dir_invert_mask = 4
invert_st_enable = true
laser_mode = true
stepper_idle_lock_time = 255
"#,
        )
        .expect("settings should parse");

        assert_eq!(settings.step_invert_mask, 1);
        assert_eq!(settings.dir_invert_mask, 4);
        assert!(settings.invert_st_enable);
        assert!(settings.laser_mode);
        assert_eq!(
            settings.stepper_idle_lock_time,
            super::super::settings::IDLE_LOCK_KEEP_ENABLED
        );
    }

    #[test]
    fn test_parse_rejects_invalid_mask() {
        assert!(parse_settings("step_invert_mask = 128").is_err());
    }

    #[test]
    fn test_parse_rejects_bad_toml() {
        assert!(parse_settings("step_invert_mask = ").is_err());
    }
}
