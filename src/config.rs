use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::shaper::PadOptions;

/// Options of the `prep` pipeline: load → filter → truncate → pad.
///
/// Every field has a default, so a config file only needs the values it
/// changes:
///
/// ```json
/// { "min_tokens_per_type": 3, "n_padded": 101, "return_mask": true }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrepConfig {
    /// Skip items with this many frames or fewer.
    pub min_length: Option<usize>,
    /// Drop items whose label occurs fewer times than this.
    pub min_tokens_per_type: Option<usize>,
    pub max_length: usize,
    pub d_frame: usize,
    pub n_padded: usize,
    pub center: bool,
    pub return_mask: bool,
}

impl Default for PrepConfig {
    fn default() -> Self {
        Self {
            min_length: None,
            min_tokens_per_type: None,
            max_length: 100,
            d_frame: 13,
            n_padded: 100,
            center: true,
            return_mask: false,
        }
    }
}

impl PrepConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: PrepConfig = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.max_length > 0, "max_length must be positive");
        ensure!(self.d_frame > 0, "d_frame must be positive");
        ensure!(self.n_padded > 0, "n_padded must be positive");
        Ok(())
    }

    pub fn pad_options(&self) -> PadOptions {
        PadOptions {
            center: self.center,
            return_mask: self.return_mask,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn partial_json_keeps_defaults() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), r#"{"n_padded": 50, "return_mask": true}"#).unwrap();

        let config = PrepConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.n_padded, 50);
        assert!(config.return_mask);
        assert_eq!(config.max_length, PrepConfig::default().max_length);
        assert!(config.center);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), r#"{"n_pad": 50}"#).unwrap();
        assert!(PrepConfig::from_json_file(file.path()).is_err());
    }

    #[test]
    fn zero_sizes_fail_validation() {
        let config = PrepConfig {
            n_padded: 0,
            ..PrepConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(PrepConfig::default().validate().is_ok());
    }
}
