pub mod catalog;
pub mod data_uri;
pub mod shape;

pub use catalog::{Category, Item, ItemStatus, Message, User};
pub use data_uri::{DataUri, DataUriError, SUPPORTED_IMAGE_TYPES};
pub use shape::{FieldKind, FieldSpec, Payload, Shape, ShapeError, Value, Violation};

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// --- Storage ---

/// Resolve the global data directory (~/.lostfound/).
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".lostfound")
}

// --- AI Settings ---

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AiSettings {
    pub provider: String,
    pub api_key: String,
    pub model: String,
    /// Upper bound on one model round trip
    pub timeout_secs: u64,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            provider: "google".to_string(),
            api_key: String::new(),
            model: "gemini-2.0-flash".to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl AiSettings {
    /// Apply `LOSTFOUND_*` environment overrides on top of the file settings.
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok());
        self
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(provider) = lookup("LOSTFOUND_PROVIDER") {
            self.provider = provider;
        }
        if let Some(model) = lookup("LOSTFOUND_MODEL") {
            self.model = model;
        }
        if let Some(key) = lookup("LOSTFOUND_API_KEY") {
            self.api_key = key;
        }
        if let Some(secs) = lookup("LOSTFOUND_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            self.timeout_secs = secs;
        }
    }
}

fn settings_path() -> PathBuf {
    data_dir().join("settings.json")
}

/// Read settings from ~/.lostfound/settings.json with environment overrides.
pub fn read_settings() -> AiSettings {
    read_settings_from(&settings_path()).with_env_overrides()
}

/// Read settings from a file. A missing or unreadable file yields defaults.
pub fn read_settings_from(path: &Path) -> AiSettings {
    if !path.exists() {
        return AiSettings::default();
    }
    fs::read_to_string(path)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

pub fn ai_configured(settings: &AiSettings) -> bool {
    !settings.provider.is_empty()
        && !settings.model.is_empty()
        && (settings.provider == "ollama" || !settings.api_key.is_empty())
}
