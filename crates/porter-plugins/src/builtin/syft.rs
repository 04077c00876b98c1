use super::{parse_config, run_tool};
use crate::error::Result;
use crate::server::PluginHandler;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;

const DEFAULT_FORMAT: &str = "spdx-json";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyftConfig {
    /// syft output format, `spdx-json` when empty
    pub format: String,
}

/// Generates SBOMs with the `syft` CLI, reading images straight from the
/// registry
#[derive(Debug, Clone)]
pub struct Syft {
    program: PathBuf,
    config: SyftConfig,
}

impl Default for Syft {
    fn default() -> Self {
        Self {
            program: PathBuf::from("syft"),
            config: SyftConfig::default(),
        }
    }
}

impl Syft {
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn generate_args(&self, reference: &str, sbom_path: &str) -> Vec<String> {
        let format = if self.config.format.is_empty() {
            DEFAULT_FORMAT
        } else {
            self.config.format.as_str()
        };
        vec![
            "scan".to_string(),
            format!("registry:{}", reference),
            "-o".to_string(),
            format!("{}={}", format, sbom_path),
        ]
    }
}

#[async_trait]
impl PluginHandler for Syft {
    async fn configure(&mut self, config: Option<serde_json::Value>) -> Result<()> {
        self.config = parse_config(config)?;
        Ok(())
    }

    async fn generate(
        &mut self,
        reference: &str,
        sbom_path: &str,
        insecure_registry: bool,
    ) -> Result<()> {
        info!("Syft is generating an SBOM for {}", reference);
        let env: &[(&str, &str)] = if insecure_registry {
            &[
                ("SYFT_REGISTRY_INSECURE_USE_HTTP", "true"),
                ("SYFT_REGISTRY_INSECURE_SKIP_TLS_VERIFY", "true"),
            ]
        } else {
            &[]
        };
        run_tool(&self.program, &self.generate_args(reference, sbom_path), env).await?;
        Ok(())
    }
}
