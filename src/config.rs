//! Process settings for the converter and its download service.
//!
//! Settings come from `thesis_docx.toml` (or an explicit path) and are then
//! overridden by environment variables of the same name in upper case.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const DEFAULT_CONFIG_FILE: &str = "thesis_docx.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// HMAC key for download tokens.
    pub secret_key: String,
    /// Directory holding converted documents.
    pub storage_path: PathBuf,
    /// Prefix of published download links.
    pub base_url: String,
    /// Link lifetime in seconds when none is requested.
    pub link_expires_default: i64,
    /// Upper bound on a requested link lifetime, in seconds.
    pub link_expires_max: i64,
    /// How long a stored document is kept, in seconds.
    pub file_retention: u64,
    /// Seconds between expiry sweeps.
    pub sweep_interval: u64,
    /// Base directory for relative `<img src>` paths.
    pub image_base_dir: Option<PathBuf>,
    /// Label used in `[label: alt]` image placeholders.
    pub image_placeholder_label: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            secret_key: "dev_secret_key".to_string(),
            storage_path: PathBuf::from("tmp/storage"),
            base_url: "http://localhost:5000".to_string(),
            link_expires_default: 300,
            link_expires_max: 3600,
            file_retention: 600,
            sweep_interval: 60,
            image_base_dir: None,
            image_placeholder_label: "image".to_string(),
        }
    }
}

/// Integer from an environment value, ignoring a trailing `# comment`.
fn parse_int<T: std::str::FromStr>(value: &str) -> Option<T> {
    let value = value.split('#').next().unwrap_or_default().trim();
    value.parse().ok()
}

fn int_override<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T) {
    if let Some(v) = lookup(key) {
        match parse_int(&v) {
            Some(n) => *target = n,
            None => warn!(key, value = %v, "invalid integer, keeping current value"),
        }
    }
}

impl Settings {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// `thesis_docx.toml` in the working directory, or defaults when it is
    /// missing or invalid.
    pub fn load_or_default() -> Self {
        if !Path::new(DEFAULT_CONFIG_FILE).exists() {
            return Self::default();
        }
        Self::load_from_file(DEFAULT_CONFIG_FILE).unwrap_or_else(|e| {
            warn!(error = %e, "ignoring config file");
            Self::default()
        })
    }

    /// Environment variables take precedence over file values.
    pub fn merge_with_env(&mut self) {
        self.merge_with(|key| std::env::var(key).ok());
    }

    fn merge_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("SECRET_KEY") {
            self.secret_key = v;
        }
        if let Some(v) = lookup("STORAGE_PATH") {
            self.storage_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = lookup("IMAGE_BASE_DIR") {
            self.image_base_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("IMAGE_PLACEHOLDER_LABEL") {
            self.image_placeholder_label = v;
        }

        int_override(&lookup, "LINK_EXPIRES_DEFAULT", &mut self.link_expires_default);
        int_override(&lookup, "LINK_EXPIRES_MAX", &mut self.link_expires_max);
        int_override(&lookup, "FILE_RETENTION", &mut self.file_retention);
        int_override(&lookup, "SWEEP_INTERVAL", &mut self.sweep_interval);
    }

    /// File (explicit path, else the default location) then environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(p) => Self::load_from_file(p)?,
            None => Self::load_or_default(),
        };
        settings.merge_with_env();
        debug!(storage_path = ?settings.storage_path, base_url = %settings.base_url, "settings loaded");
        Ok(settings)
    }
}
