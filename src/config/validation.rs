//! Settings validation.

use crate::error::{ConfigError, Result};

use super::consts::N_AXIS;
use super::settings::Settings;

/// Validate a settings struct.
///
/// Rejects invert masks with bits set beyond the configured axis count;
/// everything else in [`Settings`] is valid by construction.
pub fn validate_settings(settings: &Settings) -> Result<()> {
    let axis_bits: u8 = (1 << N_AXIS) - 1;

    if settings.step_invert_mask & !axis_bits != 0 {
        return Err(ConfigError::InvalidStepInvertMask(settings.step_invert_mask).into());
    }

    if settings.dir_invert_mask & !axis_bits != 0 {
        return Err(ConfigError::InvalidDirInvertMask(settings.dir_invert_mask).into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_default_settings_validate() {
        assert!(validate_settings(&Settings::default()).is_ok());
    }

    #[test]
    fn test_full_axis_masks_validate() {
        let settings = Settings {
            step_invert_mask: (1 << N_AXIS) - 1,
            dir_invert_mask: (1 << N_AXIS) - 1,
            ..Settings::default()
        };
        assert!(validate_settings(&settings).is_ok());
    }

    #[test]
    fn test_out_of_range_step_mask_rejected() {
        let settings = Settings {
            step_invert_mask: 1 << N_AXIS,
            ..Settings::default()
        };
        assert_eq!(
            validate_settings(&settings),
            Err(Error::Config(ConfigError::InvalidStepInvertMask(
                1 << N_AXIS
            )))
        );
    }

    #[test]
    fn test_out_of_range_dir_mask_rejected() {
        let settings = Settings {
            dir_invert_mask: 0xF0,
            ..Settings::default()
        };
        assert!(validate_settings(&settings).is_err());
    }
}
