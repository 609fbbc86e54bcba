//! Configuration loading.
//!
//! Settings can come from a JSON file given with `--config`; every field is optional and falls
//! back to the defaults below. Command-line flags override whatever the file sets.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pattern::Encoding;
use crate::report::Format;
use crate::sweep::Range;

/// Width of the sliding window that cuts patterns out of an epoch.
pub const DEFAULT_PATTERN_WIDTH: usize = 6;
pub const DEFAULT_EPOCH_SIZE: usize = 1000;
pub const DEFAULT_TRAIN_THRESHOLD: f64 = 0.9;
pub const DEFAULT_TEST_THRESHOLD: f64 = 0.9;
pub const DEFAULT_SYSCALL_INDEX: &str = "syscalls";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Syscall index file, one name per line.
    pub syscalls: PathBuf,
    pub pattern_width: usize,
    pub encoding: Encoding,
    /// Upper bound on training epochs; has to come from the file or the command line.
    pub train_epochs: Option<usize>,
    pub epoch_size: Range<usize>,
    pub train_threshold: Range<f64>,
    pub test_threshold: Range<f64>,
    pub jobs: usize,
    pub format: Format,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            syscalls: PathBuf::from(DEFAULT_SYSCALL_INDEX),
            pattern_width: DEFAULT_PATTERN_WIDTH,
            encoding: Encoding::default(),
            train_epochs: None,
            epoch_size: Range::single(DEFAULT_EPOCH_SIZE, 1),
            train_threshold: Range::single(DEFAULT_TRAIN_THRESHOLD, 0.1),
            test_threshold: Range::single(DEFAULT_TEST_THRESHOLD, 0.1),
            jobs: 1,
            format: Format::default(),
        }
    }
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let settings: Settings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    /// Rejects values the sweep cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pattern_width == 0 {
            return Err(Error::InvalidConfig("pattern width must be at least 1".into()));
        }
        if self.jobs == 0 {
            return Err(Error::InvalidConfig("jobs must be at least 1".into()));
        }
        if self.train_epochs.is_none() {
            return Err(Error::InvalidConfig(
                "number of training epochs not set (--train-epochs or \"train_epochs\")".into(),
            ));
        }
        self.epoch_size.values()?;
        self.train_threshold.values()?;
        self.test_threshold.values()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bosc.json");
        fs::write(&path, r#"{ "pattern_width": 3, "train_epochs": 40 }"#).unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.pattern_width, 3);
        assert_eq!(settings.train_epochs, Some(40));
        assert_eq!(settings.syscalls, PathBuf::from("syscalls"));
        assert_eq!(settings.encoding, Encoding::Sequence);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn ranges_and_enums_deserialize() {
        let settings: Settings = serde_json::from_str(
            r#"{
                "encoding": "bag",
                "format": "json",
                "epoch_size": { "min": 100, "max": 500, "step": 100 },
                "test_threshold": { "min": 0.5, "max": 0.9, "step": 0.1 }
            }"#,
        )
        .unwrap();
        assert_eq!(settings.encoding, Encoding::Bag);
        assert_eq!(settings.format, Format::Json);
        assert_eq!(settings.epoch_size.values().unwrap().len(), 5);
        assert_eq!(settings.test_threshold.values().unwrap().len(), 5);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = serde_json::from_str::<Settings>(r#"{ "epochs": 3 }"#).unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn validate_requires_training_bound() {
        let settings = Settings::default();
        assert!(matches!(settings.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn validate_rejects_zero_width_and_bad_ranges() {
        let mut settings = Settings {
            train_epochs: Some(10),
            ..Settings::default()
        };
        assert!(settings.validate().is_ok());

        settings.pattern_width = 0;
        assert!(settings.validate().is_err());

        settings.pattern_width = 2;
        settings.epoch_size = Range { min: 10, max: 5, step: 1 };
        assert!(matches!(settings.validate(), Err(Error::InvalidRange(_))));
    }
}
