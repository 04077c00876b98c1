//! Selecting, launching and connecting to plugins

use crate::connection::PluginConnection;
use crate::error::PluginError;
use crate::key::PluginKey;
use anyhow::{Context, Result};
use porter_core::config::PluginConfig;
use porter_core::PorterConfig;
use std::path::PathBuf;
use tracing::debug;

/// How to find the plugin for one interface in the porter configuration
#[derive(Clone, Copy)]
pub struct PluginTypeConfig {
    pub interface: &'static str,
    pub protocol_version: u32,
    /// Name of the configured entry to use, e.g. `defaultSigning`
    pub default_pluggable: fn(&PorterConfig) -> &str,
    /// Look up a named entry, e.g. under `signing:`
    pub pluggable: for<'a, 'b> fn(&'a PorterConfig, &'b str) -> Option<&'a PluginConfig>,
    /// Plugin key used when no entry is selected, e.g. `defaultSigningPlugin`
    pub default_plugin: fn(&PorterConfig) -> &str,
}

/// The plugin picked for an interface and its configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedPlugin {
    pub key: PluginKey,
    pub config: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct PluginLoader {
    config: PorterConfig,
    porter_path: Option<PathBuf>,
}

impl PluginLoader {
    pub fn new(config: PorterConfig) -> Self {
        Self {
            config,
            porter_path: None,
        }
    }

    /// Binary that serves internal plugins, defaults to the running executable
    pub fn with_porter_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.porter_path = Some(path.into());
        self
    }

    pub fn config(&self) -> &PorterConfig {
        &self.config
    }

    /// Pick the plugin for `plugin_type`: the named default entry when one
    /// is set, otherwise the default plugin key.
    pub fn select(&self, plugin_type: &PluginTypeConfig) -> Result<SelectedPlugin, PluginError> {
        let mut key = String::new();
        let mut config = None;

        let default = (plugin_type.default_pluggable)(&self.config);
        if !default.is_empty() {
            let entry = (plugin_type.pluggable)(&self.config, default).ok_or_else(|| {
                PluginError::UndefinedPlugin {
                    interface: plugin_type.interface.to_string(),
                    name: default.to_string(),
                }
            })?;
            key = entry.plugin.clone();
            config = entry.config.clone();
            if config.is_none() {
                debug!(plugin = %default, "No plugin config defined");
            }
        }

        if key.is_empty() {
            key = (plugin_type.default_plugin)(&self.config).to_string();
            debug!(plugin = %key, "Selected default plugin");
        } else {
            debug!(plugin = %key, "Selected configured plugin");
        }
        if key.is_empty() {
            return Err(PluginError::NotConfigured {
                interface: plugin_type.interface.to_string(),
            });
        }

        Ok(SelectedPlugin {
            key: PluginKey::parse(&key)?.with_interface(plugin_type.interface),
            config,
        })
    }

    /// The program and arguments that serve `key`
    pub fn command(&self, key: &PluginKey) -> Result<(PathBuf, Vec<String>)> {
        if key.is_internal {
            let porter = match &self.porter_path {
                Some(path) => path.clone(),
                None => std::env::current_exe()
                    .context("could not determine the path to the porter client")?,
            };
            return Ok((
                porter,
                vec!["plugin".to_string(), "run".to_string(), key.to_string()],
            ));
        }

        let path = self.plugin_path(&key.binary);
        if !path.exists() {
            return Err(PluginError::NotInstalled {
                key: key.to_string(),
                path,
            }
            .into());
        }
        Ok((path, vec!["run".to_string(), key.to_string()]))
    }

    fn plugin_path(&self, binary: &str) -> PathBuf {
        let dir = self.config.plugins_dir().into_std_path_buf().join(binary);
        if cfg!(windows) {
            dir.join(format!("{}.exe", binary))
        } else {
            dir.join(binary)
        }
    }

    /// Launch the selected plugin and complete the handshake. The caller
    /// owns the connection and must close it.
    pub async fn load(&self, plugin_type: &PluginTypeConfig) -> Result<PluginConnection> {
        let selected = self.select(plugin_type)?;
        let (program, args) = self.command(&selected.key)?;

        let conn = PluginConnection::start(
            selected.key.clone(),
            &program,
            &args,
            selected.config.as_ref(),
            plugin_type.protocol_version,
            self.config.plugin_start_timeout,
        )
        .await
        .with_context(|| format!("could not connect to the {} plugin", selected.key))?
        .with_stop_timeout(self.config.plugin_stop_timeout);
        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::signing_plugin_type;
    use camino::Utf8PathBuf;
    use porter_core::config::PluginConfig;
    use serde_json::json;

    fn config() -> PorterConfig {
        PorterConfig {
            signing: vec![PluginConfig {
                name: "mysigner".to_string(),
                plugin: "signing.cosign.sigstore".to_string(),
                config: Some(json!({"keyless": true})),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_named_default_wins() {
        let mut cfg = config();
        cfg.default_signing = "mysigner".to_string();
        cfg.default_signing_plugin = "notation".to_string();

        let selected = PluginLoader::new(cfg).select(&signing_plugin_type()).unwrap();
        assert_eq!(selected.key.to_string(), "signing.cosign.sigstore");
        assert_eq!(selected.config, Some(json!({"keyless": true})));
    }

    #[test]
    fn test_falls_back_to_default_plugin() {
        let mut cfg = config();
        cfg.default_signing_plugin = "notation".to_string();

        let selected = PluginLoader::new(cfg).select(&signing_plugin_type()).unwrap();
        assert!(selected.key.is_internal);
        assert_eq!(selected.key.to_string(), "signing.porter.notation");
        assert_eq!(selected.config, None);
    }

    #[test]
    fn test_nothing_configured() {
        let err = PluginLoader::new(config())
            .select(&signing_plugin_type())
            .unwrap_err();
        assert!(matches!(err, PluginError::NotConfigured { .. }));
    }

    #[test]
    fn test_undefined_named_default() {
        let mut cfg = config();
        cfg.default_signing = "missing".to_string();
        let err = PluginLoader::new(cfg).select(&signing_plugin_type()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "signing plugin missing is not defined in the porter configuration file"
        );
    }

    #[test]
    fn test_internal_plugin_runs_through_porter() {
        let loader = PluginLoader::new(config()).with_porter_path("/usr/local/bin/porter");
        let key = PluginKey::parse("notation").unwrap().with_interface("signing");
        let (program, args) = loader.command(&key).unwrap();
        assert_eq!(program, PathBuf::from("/usr/local/bin/porter"));
        assert_eq!(args, vec!["plugin", "run", "signing.porter.notation"]);
    }

    #[test]
    fn test_missing_plugin_binary() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = PorterConfig {
            plugins_dir: Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).ok(),
            ..Default::default()
        };
        let key = PluginKey::parse("signing.cosign.sigstore").unwrap();
        let err = PluginLoader::new(cfg).command(&key).unwrap_err();
        assert!(err.to_string().contains("plugin signing.cosign.sigstore is not installed"));
    }
}
