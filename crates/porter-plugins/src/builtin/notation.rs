use super::{parse_config, run_tool};
use crate::error::Result;
use crate::server::PluginHandler;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotationConfig {
    /// Name of a key registered with `notation key add`. Notation's default
    /// key is used when empty.
    pub signing_key: String,
    pub insecure_registry: bool,
}

/// Signs and verifies with the `notation` CLI
#[derive(Debug, Clone)]
pub struct Notation {
    program: PathBuf,
    config: NotationConfig,
}

impl Default for Notation {
    fn default() -> Self {
        Self {
            program: PathBuf::from("notation"),
            config: NotationConfig::default(),
        }
    }
}

impl Notation {
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn sign_args(&self, reference: &str) -> Vec<String> {
        let mut args = vec!["sign".to_string(), reference.to_string()];
        if !self.config.signing_key.is_empty() {
            args.push("--key".to_string());
            args.push(self.config.signing_key.clone());
        }
        if self.config.insecure_registry {
            args.push("--insecure-registry".to_string());
        }
        args
    }

    pub fn verify_args(&self, reference: &str) -> Vec<String> {
        let mut args = vec!["verify".to_string(), reference.to_string()];
        if self.config.insecure_registry {
            args.push("--insecure-registry".to_string());
        }
        args
    }
}

#[async_trait]
impl PluginHandler for Notation {
    async fn configure(&mut self, config: Option<serde_json::Value>) -> Result<()> {
        self.config = parse_config(config)?;
        Ok(())
    }

    async fn sign(&mut self, reference: &str) -> Result<()> {
        info!("Notation is signing {}", reference);
        let out = run_tool(&self.program, &self.sign_args(reference), &[]).await?;
        info!("{}", out.trim());
        Ok(())
    }

    async fn verify(&mut self, reference: &str) -> Result<()> {
        info!("Notation is verifying {}", reference);
        let out = run_tool(&self.program, &self.verify_args(reference), &[]).await?;
        info!("{}", out.trim());
        Ok(())
    }
}
