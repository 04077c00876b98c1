use super::{parse_config, run_tool};
use crate::error::{PluginError, Result};
use crate::server::PluginHandler;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CosignConfig {
    pub public_key: String,
    pub private_key: String,
    /// Passed as `--registry-referrers-mode`, e.g. `oci-1-1`
    pub registry_mode: String,
    pub experimental: bool,
    pub insecure_registry: bool,
}

/// Signs with the `cosign` CLI using a key pair from the plugin config
#[derive(Debug, Clone)]
pub struct Cosign {
    program: PathBuf,
    config: CosignConfig,
}

impl Default for Cosign {
    fn default() -> Self {
        Self {
            program: PathBuf::from("cosign"),
            config: CosignConfig::default(),
        }
    }
}

impl Cosign {
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn sign_args(&self, reference: &str) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "sign".into(),
            reference.into(),
            "--tlog-upload=false".into(),
            "--key".into(),
            self.config.private_key.clone(),
            "--yes".into(),
        ];
        if !self.config.registry_mode.is_empty() {
            args.push("--registry-referrers-mode".into());
            args.push(self.config.registry_mode.clone());
        }
        if self.config.insecure_registry {
            args.push("--allow-insecure-registry".into());
        }
        args
    }

    pub fn verify_args(&self, reference: &str) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "verify".into(),
            "--key".into(),
            self.config.public_key.clone(),
            reference.into(),
            "--insecure-ignore-tlog".into(),
        ];
        if self.config.registry_mode == "oci-1-1" {
            args.push("--experimental-oci11".into());
        }
        if self.config.insecure_registry {
            args.push("--allow-insecure-registry".into());
        }
        args
    }

    fn env(&self) -> Vec<(&'static str, &'static str)> {
        if self.config.experimental {
            vec![("COSIGN_EXPERIMENTAL", "1")]
        } else {
            Vec::new()
        }
    }
}

#[async_trait]
impl PluginHandler for Cosign {
    async fn configure(&mut self, config: Option<serde_json::Value>) -> Result<()> {
        self.config = parse_config(config)?;
        Ok(())
    }

    async fn sign(&mut self, reference: &str) -> Result<()> {
        if self.config.private_key.is_empty() {
            return Err(PluginError::Config {
                message: "cosign signing requires privateKey".to_string(),
            });
        }
        info!("Cosign is signing {}", reference);
        let out = run_tool(&self.program, &self.sign_args(reference), &self.env()).await?;
        info!("{}", out.trim());
        Ok(())
    }

    async fn verify(&mut self, reference: &str) -> Result<()> {
        if self.config.public_key.is_empty() {
            return Err(PluginError::Config {
                message: "cosign verification requires publicKey".to_string(),
            });
        }
        info!("Cosign is verifying {}", reference);
        let out = run_tool(&self.program, &self.verify_args(reference), &self.env()).await?;
        info!("{}", out.trim());
        Ok(())
    }
}
