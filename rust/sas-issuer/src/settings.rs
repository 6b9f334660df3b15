//! Settings file loading.
//!
//! Settings live in `appsettings.json` in the configuration directory, with
//! an optional per-environment overlay `appsettings.{environment}.json`
//! whose values take precedence:
//!
//! ```json
//! { "storageConnectionString": "DefaultEndpointsProtocol=https;AccountName=…" }
//! ```

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::debug;

/// Base settings file name.
pub const SETTINGS_FILE: &str = "appsettings.json";

/// Values read from the settings files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// The storage account connection string.
    pub storage_connection_string: Option<String>,
}

impl Settings {
    /// Read `appsettings.json` and, when `environment` is given, its overlay
    /// from `directory`. Missing files are skipped.
    pub fn load(directory: &Path, environment: Option<&str>) -> Result<Self> {
        let mut settings = Self::read(&directory.join(SETTINGS_FILE))?.unwrap_or_default();

        if let Some(environment) = environment {
            let overlay = directory.join(format!("appsettings.{environment}.json"));
            if let Some(overlay) = Self::read(&overlay)? {
                settings.merge(overlay);
            }
        }

        Ok(settings)
    }

    fn read(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            debug!(path = %path.display(), "No settings file");
            return Ok(None);
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let settings = serde_json::from_str(&contents)
            .with_context(|| format!("cannot parse {}", path.display()))?;
        debug!(path = %path.display(), "Loaded settings file");
        Ok(Some(settings))
    }

    fn merge(&mut self, overlay: Self) {
        if overlay.storage_connection_string.is_some() {
            self.storage_connection_string = overlay.storage_connection_string;
        }
    }

    /// The connection string to use: `explicit` when given (flag or
    /// environment variable), otherwise the one from the settings files.
    pub fn connection_string(&self, explicit: Option<&str>) -> Result<String> {
        match explicit.or(self.storage_connection_string.as_deref()) {
            Some(connection_string) if !connection_string.trim().is_empty() => {
                Ok(connection_string.to_string())
            }
            _ => bail!(
                "no connection string: pass --connection-string, set STORAGE_CONNECTION_STRING or add storageConnectionString to {SETTINGS_FILE}"
            ),
        }
    }
}
