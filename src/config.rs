use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::dialog::ConsoleContext;
use crate::feedback::NoticeCenter;
use crate::form::FormOptions;
use crate::i18n::{I18nManager, Locale};
use crate::listing::ListingOptions;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Console settings. Every key is optional.
///
/// ```toml
/// locale = "de"
///
/// [form]
/// debounce_ms = 300
/// unavailable_policy = "fail-closed"
///
/// [listing]
/// page_size = 25
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub form: FormOptions,
    pub listing: ListingOptions,
    /// A locale tag, or `"system"` to follow the OS.
    pub locale: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            form: FormOptions::default(),
            listing: ListingOptions::default(),
            locale: "system".to_string(),
        }
    }
}

impl ConsoleConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "console config loaded");
        Ok(config)
    }

    pub fn context(&self) -> ConsoleContext {
        ConsoleContext {
            options: self.form,
            i18n: I18nManager::with_locale(Locale::from(self.locale.as_str())),
            notices: NoticeCenter::new(),
        }
    }
}
