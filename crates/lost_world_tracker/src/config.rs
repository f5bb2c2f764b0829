use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use dirs_next::config_dir;
use lostworld_core::csv_utils::resolve_encoding;
use lostworld_core::{
    ClientOptions, ExportOptions, OutputFormat, ProgressCallback, UnmatchedPolicy,
    DEFAULT_BASE_URL, DEFAULT_REQUEST_DELAY_MS,
};
use serde::{Deserialize, Serialize};

const APP_DIR: &str = "lost_world_tracker";
pub const CONFIG_NAME: &str = "application.json";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

fn default_delay() -> u64 {
    DEFAULT_REQUEST_DELAY_MS
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_delay")]
    pub api_inter_request_delay: u64,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default)]
    pub private_world_only: bool,
    #[serde(default)]
    pub unmatched_policy: UnmatchedPolicy,
    #[serde(default = "default_encoding")]
    pub csv_encoding: String,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_base_url")]
    pub api_base_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_inter_request_delay: default_delay(),
            output_format: OutputFormat::default(),
            private_world_only: false,
            unmatched_policy: UnmatchedPolicy::default(),
            csv_encoding: default_encoding(),
            output_dir: None,
            request_timeout_secs: default_timeout(),
            api_base_url: default_base_url(),
        }
    }
}

impl AppConfig {
    /// Missing file means defaults. Unknown enum values such as an
    /// unsupported `output_format` fail here, before any network call.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("invalid configuration in {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        resolve_encoding(&self.csv_encoding)
            .with_context(|| format!("invalid csv_encoding `{}`", self.csv_encoding))?;
        Ok(())
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.api_inter_request_delay)
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            base_url: self.api_base_url.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
            request_delay: self.request_delay(),
            ..ClientOptions::default()
        }
    }

    pub fn export_options(&self, progress_callback: Option<ProgressCallback>) -> ExportOptions {
        ExportOptions {
            private_world_only: self.private_world_only,
            unmatched_policy: self.unmatched_policy,
            output_format: self.output_format,
            csv_encoding: self.csv_encoding.clone(),
            output_dir: self
                .output_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(".")),
            progress_callback,
            ..ExportOptions::default()
        }
    }
}

/// Directory holding `application.json` and the encrypted cookie file.
pub fn default_data_dir() -> PathBuf {
    let mut base = config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.push(APP_DIR);
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join(CONFIG_NAME)).unwrap();
        assert_eq!(config.api_inter_request_delay, 10_000);
        assert_eq!(config.output_format, OutputFormat::Json);
        assert!(!config.private_world_only);
        assert_eq!(config.unmatched_policy, UnmatchedPolicy::Drop);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_NAME);
        fs::write(
            &path,
            r#"{"api_inter_request_delay": 2500, "output_format": "csv", "private_world_only": true}"#,
        )
        .unwrap();
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.request_delay(), Duration::from_millis(2500));
        assert_eq!(config.output_format, OutputFormat::Csv);
        assert!(config.private_world_only);
        assert_eq!(config.csv_encoding, "utf-8");

        let export = config.export_options(None);
        assert!(export.private_world_only);
        assert_eq!(export.output_format, OutputFormat::Csv);
        assert_eq!(config.client_options().request_delay, Duration::from_millis(2500));
    }

    #[test]
    fn unknown_output_format_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_NAME);
        fs::write(&path, r#"{"output_format": "xml"}"#).unwrap();
        let err = AppConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("xml"));
    }

    #[test]
    fn unknown_encoding_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_NAME);
        fs::write(&path, r#"{"csv_encoding": "not-a-charset"}"#).unwrap();
        assert!(AppConfig::load(&path).is_err());
    }
}
