//! Layered configuration loading
//!
//! Precedence (low to high):
//! 1. Built-in defaults
//! 2. `<home>/config.yaml`
//! 3. Environment variables (PORTER_* prefix)
//! 4. CLI flags (handled by caller)

use super::{parse_duration, PorterConfig};
use crate::error::{Error, Result};
use crate::utils::get_home_dir;
use camino::{Utf8Path, Utf8PathBuf};
use std::env;
use std::fs;
use tracing::debug;

/// Name of the config file inside porter home
pub const CONFIG_FILE: &str = "config.yaml";

/// Loads [`PorterConfig`] from porter home and the environment
pub struct ConfigLoader {
    home_dir: Utf8PathBuf,
}

impl ConfigLoader {
    /// Loader for `PORTER_HOME`, or `~/.porter`
    pub fn new() -> Result<Self> {
        Ok(Self {
            home_dir: Self::default_home_dir()?,
        })
    }

    /// Loader for a specific porter home
    pub fn with_dir(home_dir: Utf8PathBuf) -> Self {
        Self { home_dir }
    }

    fn default_home_dir() -> Result<Utf8PathBuf> {
        if let Ok(home) = env::var("PORTER_HOME") {
            if !home.is_empty() {
                return expand(&home);
            }
        }
        let home = get_home_dir()
            .ok_or_else(|| Error::invalid_config("Could not determine home directory"))?;
        let home = Utf8PathBuf::from_path_buf(home)
            .map_err(|p| Error::invalid_config(format!("home directory is not UTF-8: {:?}", p)))?;
        Ok(home.join(".porter"))
    }

    pub fn home_dir(&self) -> &Utf8Path {
        &self.home_dir
    }

    /// Load the configuration with every layer applied
    pub fn load(&self) -> Result<PorterConfig> {
        let mut config = PorterConfig {
            home_dir: self.home_dir.clone(),
            ..Default::default()
        };

        let path = self.home_dir.join(CONFIG_FILE);
        if path.exists() {
            debug!("Loading porter config from {}", path);
            let content = fs::read_to_string(&path)?;
            let file_config: PorterConfig = serde_yaml_ng::from_str(&content)
                .map_err(|e| Error::invalid_config(format!("Failed to parse {}: {}", path, e)))?;
            config = Self::merge(config, file_config, &content)?;
        }

        Self::apply_env_overrides(&mut config)?;
        Ok(config)
    }

    /// Overlay values from the config file; home stays where it was found
    /// unless the file names another one
    fn merge(base: PorterConfig, overlay: PorterConfig, raw: &str) -> Result<PorterConfig> {
        let sets_home = serde_yaml_ng::from_str::<serde_yaml_ng::Value>(raw)
            .ok()
            .and_then(|v| v.get("homeDir").cloned())
            .is_some();

        Ok(PorterConfig {
            home_dir: if sets_home {
                expand(overlay.home_dir.as_str())?
            } else {
                base.home_dir
            },
            mixins_dir: overlay
                .mixins_dir
                .map(|d| expand(d.as_str()))
                .transpose()?,
            plugins_dir: overlay
                .plugins_dir
                .map(|d| expand(d.as_str()))
                .transpose()?,
            ..overlay
        })
    }

    fn apply_env_overrides(config: &mut PorterConfig) -> Result<()> {
        if let Ok(val) = env::var("PORTER_HOME") {
            if !val.is_empty() {
                config.home_dir = expand(&val)?;
            }
        }

        if let Ok(val) = env::var("PORTER_MIXINS_DIR") {
            if !val.is_empty() {
                config.mixins_dir = Some(expand(&val)?);
            }
        }

        if let Ok(val) = env::var("PORTER_DEBUG") {
            config.debug = val.parse().unwrap_or(false);
        }

        if let Ok(val) = env::var("PORTER_DEFAULT_SIGNING") {
            config.default_signing = val;
        }

        if let Ok(val) = env::var("PORTER_DEFAULT_SBOM_GENERATOR") {
            config.default_sbom_generator = val;
        }

        if let Ok(val) = env::var("PORTER_PLUGIN_START_TIMEOUT") {
            config.plugin_start_timeout = parse_duration(&val).map_err(|_| {
                Error::invalid_config("PORTER_PLUGIN_START_TIMEOUT must be a valid duration")
            })?;
        }

        if let Ok(val) = env::var("PORTER_PLUGIN_STOP_TIMEOUT") {
            config.plugin_stop_timeout = parse_duration(&val).map_err(|_| {
                Error::invalid_config("PORTER_PLUGIN_STOP_TIMEOUT must be a valid duration")
            })?;
        }

        Ok(())
    }
}

fn expand(path: &str) -> Result<Utf8PathBuf> {
    let expanded = shellexpand::full(path)
        .map_err(|e| Error::invalid_config(format!("Failed to expand path {}: {}", path, e)))?;
    Ok(Utf8PathBuf::from(expanded.as_ref()))
}
