use std::{fs, num::NonZeroUsize, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    coordinate::{HemispherePair, Precision},
    error::{GeotagError, Result},
};

/// Run settings. Every field has a default, so a config file only needs the
/// values it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeotagConfig {
    pub precision: Precision,
    pub hemisphere: HemispherePair,
    /// Extension of images to process, without the dot.
    pub image_extension: String,
    /// File name prefixes that mark slates rather than location photos.
    pub skip_prefixes: Vec<String>,
    /// Worker threads used for a batch.
    pub jobs: usize,
}

impl Default for GeotagConfig {
    fn default() -> Self {
        Self {
            precision: Precision::default(),
            hemisphere: HemispherePair::default(),
            image_extension: "jpg".to_string(),
            skip_prefixes: vec!["EndSlate".to_string(), "OpenSlate".to_string()],
            jobs: std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
        }
    }
}

impl GeotagConfig {
    /// # Errors
    ///
    /// [`GeotagError::Config`] if the TOML is invalid or fails [`Self::validate`].
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| GeotagError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// I/O failures plus everything [`Self::from_toml_str`] reports.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(GeotagError::io(path))?;
        Self::from_toml_str(&text)
    }

    /// # Errors
    ///
    /// [`GeotagError::Config`] describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        self.hemisphere.validate()?;
        if self.image_extension.is_empty() || self.image_extension.starts_with('.') {
            return Err(GeotagError::Config(format!(
                "image_extension must be a bare extension like \"jpg\", got {:?}",
                self.image_extension
            )));
        }
        if self.jobs == 0 {
            return Err(GeotagError::Config("jobs must be at least 1".to_string()));
        }
        Ok(())
    }

    /// True for files that should be geotagged: matching extension and no slate prefix.
    #[must_use]
    pub fn is_eligible(&self, file_name: &str) -> bool {
        let has_extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.image_extension));

        has_extension
            && !self
                .skip_prefixes
                .iter()
                .any(|prefix| file_name.starts_with(prefix.as_str()))
    }
}
