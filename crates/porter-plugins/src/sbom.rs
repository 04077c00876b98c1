//! Generating software bills of materials through a plugin

use crate::connection::PluginConnection;
use crate::error::Result;
use crate::loader::{PluginLoader, PluginTypeConfig};
use crate::protocol::{GenerateRequest, PROTOCOL_VERSION};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use porter_core::PorterConfig;
use std::sync::Arc;
use tracing::{debug, info};

pub const INTERFACE: &str = "sbom-generator";

#[async_trait]
pub trait SbomGeneratorProtocol: Send {
    async fn generate(
        &mut self,
        reference: &str,
        sbom_path: &str,
        insecure_registry: bool,
    ) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
pub trait SbomConnector: Send + Sync {
    async fn connect_sbom_generator(&self) -> anyhow::Result<Box<dyn SbomGeneratorProtocol>>;
}

pub fn sbom_generator_plugin_type() -> PluginTypeConfig {
    PluginTypeConfig {
        interface: INTERFACE,
        protocol_version: PROTOCOL_VERSION,
        default_pluggable: default_sbom_generator,
        pluggable: PorterConfig::sbom_generator_config,
        default_plugin: default_sbom_generator_plugin,
    }
}

fn default_sbom_generator(config: &PorterConfig) -> &str {
    &config.default_sbom_generator
}

fn default_sbom_generator_plugin(config: &PorterConfig) -> &str {
    &config.default_sbom_generator_plugin
}

#[async_trait]
impl SbomGeneratorProtocol for PluginConnection {
    async fn generate(
        &mut self,
        reference: &str,
        sbom_path: &str,
        insecure_registry: bool,
    ) -> Result<()> {
        let mut client = self.clients()?.sbom.clone();
        let request = GenerateRequest {
            reference: reference.to_string(),
            sbom_path: sbom_path.to_string(),
            insecure_registry,
        };
        match client.generate(request).await {
            Ok(_) => Ok(()),
            Err(status) => Err(self.call_failed("generate", status)),
        }
    }

    async fn close(&mut self) -> Result<()> {
        PluginConnection::close(self).await
    }
}

#[async_trait]
impl SbomConnector for PluginLoader {
    async fn connect_sbom_generator(&self) -> anyhow::Result<Box<dyn SbomGeneratorProtocol>> {
        let conn = self.load(&sbom_generator_plugin_type()).await?;
        Ok(Box::new(conn))
    }
}

/// Generates SBOMs with the configured generator plugin, starting it on
/// first use
pub struct SbomGenerator {
    connector: Arc<dyn SbomConnector>,
    plugin: Option<Box<dyn SbomGeneratorProtocol>>,
}

impl SbomGenerator {
    pub fn new(connector: Arc<dyn SbomConnector>) -> Self {
        Self {
            connector,
            plugin: None,
        }
    }

    pub async fn connect(&mut self) -> anyhow::Result<()> {
        if self.plugin.is_none() {
            debug!("Connecting to the SBOM generator plugin");
            self.plugin = Some(self.connector.connect_sbom_generator().await?);
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.plugin.is_some()
    }

    /// Write the SBOM for `reference` to `sbom_path`
    pub async fn generate(
        &mut self,
        reference: &str,
        sbom_path: &str,
        insecure_registry: bool,
    ) -> anyhow::Result<()> {
        info!(reference = %reference, path = %sbom_path, "Generating SBOM");
        self.connect().await?;
        let plugin = self
            .plugin
            .as_mut()
            .ok_or_else(|| anyhow!("the SBOM generator plugin is not connected"))?;
        plugin
            .generate(reference, sbom_path, insecure_registry)
            .await
            .with_context(|| format!("could not generate an SBOM for {}", reference))
    }

    pub async fn close(&mut self) -> anyhow::Result<()> {
        if let Some(mut plugin) = self.plugin.take() {
            plugin
                .close()
                .await
                .context("could not stop the SBOM generator plugin")?;
        }
        Ok(())
    }
}
