//! CLI configuration.
//!
//! Stored as TOML at `$XDG_CONFIG_HOME/dropcast/config.toml`
//! (falling back to `~/.config/dropcast/config.toml`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use dropcast_transfer::{CurlRunner, TransferConfig, UploadOrchestrator};
use serde::{Deserialize, Serialize};

/// Environment variable that overrides the configured password.
pub const PASSWORD_ENV: &str = "DROPCAST_PASSWORD";

/// Full CLI configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub transfer: TransferConfig,

    #[serde(default)]
    pub upload: UploadSettings,
}

/// Orchestrator tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSettings {
    /// Interval between progress polls in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Overall upload timeout in seconds (0 = none).
    #[serde(default)]
    pub timeout_secs: u64,

    /// Directory for per-upload diagnostics files (system temp dir if unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics_dir: Option<PathBuf>,
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            timeout_secs: 0,
            diagnostics_dir: None,
        }
    }
}

impl UploadSettings {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl Config {
    /// Loads the config from `path` (or the default location) and applies
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = resolve_path(path)?;
        if !path.exists() {
            anyhow::bail!(
                "no config file at {}; run `dropcast init-config` to create one",
                path.display()
            );
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.apply_env_overrides(|key| std::env::var(key).ok());

        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Writes a starter config to `path` (or the default location).
    ///
    /// Refuses to overwrite an existing file unless `force` is set.
    pub fn write_template(path: Option<&Path>, force: bool) -> anyhow::Result<PathBuf> {
        let path = resolve_path(path)?;
        if path.exists() && !force {
            anyhow::bail!(
                "{} already exists; pass --force to overwrite",
                path.display()
            );
        }
        Config::template().save_to(&path)?;
        Ok(path)
    }

    fn template() -> Self {
        Self {
            transfer: TransferConfig {
                host: "sftp.example.com".into(),
                username: "uploader".into(),
                remote_path: "/var/www/files".into(),
                public_base_url: "https://files.example.com/".into(),
                ..TransferConfig::default()
            },
            upload: UploadSettings::default(),
        }
    }

    /// Saves the config, restricting permissions since it holds a password.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Replaces settings with values found through `lookup` (normally the environment).
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(password) = lookup(PASSWORD_ENV).filter(|p| !p.is_empty()) {
            self.transfer.password = password;
        }
    }

    /// Builds an orchestrator using these settings.
    pub fn orchestrator(&self) -> UploadOrchestrator {
        let runner = match &self.upload.diagnostics_dir {
            Some(dir) => CurlRunner::with_diagnostics_dir(dir),
            None => CurlRunner::new(),
        };
        UploadOrchestrator::new(std::sync::Arc::new(runner))
            .with_poll_interval(Duration::from_millis(self.upload.poll_interval_ms))
            .with_timeout(self.upload.timeout())
    }
}

fn resolve_path(path: Option<&Path>) -> anyhow::Result<PathBuf> {
    match path {
        Some(p) => Ok(p.to_path_buf()),
        None => default_config_path(),
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
    let base = match std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None => {
            let home = std::env::var_os("HOME").context("HOME is not set")?;
            PathBuf::from(home).join(".config")
        }
    };
    Ok(base.join("dropcast").join("config.toml"))
}
