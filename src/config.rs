//! Import configuration.
//!
//! Form defaults and repository layout come from `configs/import.json` (keys
//! in camelCase, any key optional). A missing or broken file falls back to the
//! built-in defaults. Connection settings come from the environment.

use crate::nodes::RepositoryLayout;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Settings for an import run and the defaults offered to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImportConfig {
    /// Spreadsheet used when a request names no source.
    pub default_spreadsheet_url: String,
    /// Staging folder used when a request names none.
    pub default_image_folder_path: String,
    /// Parent of the category pages.
    pub content_root: String,
    /// Parent of the category asset folders.
    pub dam_root: String,
    /// Category for rows without one.
    pub default_category: String,
    /// Pause between rows, to spare the repository's write path.
    pub row_delay_ms: u64,
    pub csrf_token_path: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            default_spreadsheet_url: String::new(),
            default_image_folder_path: "/content/dam/fma/csv/".to_string(),
            content_root: "/content/fma/goods".to_string(),
            dam_root: "/content/dam/fma/goods".to_string(),
            default_category: "omusubi".to_string(),
            row_delay_ms: 100,
            csrf_token_path: "/libs/granite/csrf/token.json".to_string(),
        }
    }
}

impl ImportConfig {
    /// Load from `path`, falling back to defaults with a warning.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            info!("No config at {:?}, using defaults", path);
            return Self::default();
        }
        match Self::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load config, using fallback defaults: {:#}", e);
                Self::default()
            }
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {:?}", path))?;
        info!("Loaded import config from {:?}", path);
        Ok(config)
    }

    pub fn layout(&self) -> RepositoryLayout {
        RepositoryLayout {
            content_root: self.content_root.trim_end_matches('/').to_string(),
            dam_root: self.dam_root.trim_end_matches('/').to_string(),
        }
    }

    pub fn row_delay(&self) -> Duration {
        Duration::from_millis(self.row_delay_ms)
    }
}

/// Process settings read from the environment.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Repository origin, e.g. `http://localhost:4502`.
    pub base_url: String,
    /// Opaque `Authorization` header value for repository requests.
    pub authorization: Option<String>,
    pub bind_addr: String,
}

impl ServiceSettings {
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("AEM_BASE_URL").map_err(|_| anyhow!("AEM_BASE_URL not set"))?;
        let authorization = std::env::var("AEM_AUTHORIZATION")
            .ok()
            .filter(|v| !v.is_empty());
        let bind_addr =
            std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            authorization,
            bind_addr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: ImportConfig = serde_json::from_str(
            r#"{"defaultSpreadsheetUrl": "https://docs.google.com/spreadsheets/d/X/edit", "rowDelayMs": 0}"#,
        )
        .unwrap();
        assert_eq!(
            config.default_spreadsheet_url,
            "https://docs.google.com/spreadsheets/d/X/edit"
        );
        assert_eq!(config.row_delay(), Duration::ZERO);
        assert_eq!(config.default_category, "omusubi");
        assert_eq!(config.default_image_folder_path, "/content/dam/fma/csv/");
    }

    #[test]
    fn test_layout_strips_trailing_slash() {
        let config = ImportConfig {
            content_root: "/content/site/".into(),
            ..ImportConfig::default()
        };
        let layout = config.layout();
        assert_eq!(layout.content_root, "/content/site");
        assert_eq!(layout.product_page("a", "b"), "/content/site/a/b");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = ImportConfig::load_or_default(Path::new("/nonexistent/import.json"));
        assert_eq!(config, ImportConfig::default());
    }
}
