//! Signing bundles and images through a plugin

use crate::connection::PluginConnection;
use crate::error::{PluginError, Result};
use crate::loader::{PluginLoader, PluginTypeConfig};
use crate::protocol::{SignRequest, VerifyRequest, PROTOCOL_VERSION};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use porter_core::PorterConfig;
use std::sync::Arc;
use tracing::{debug, info};

pub const INTERFACE: &str = "signing";

/// Operations a signing plugin provides
#[async_trait]
pub trait SigningProtocol: Send {
    async fn sign(&mut self, reference: &str) -> Result<()>;
    async fn verify(&mut self, reference: &str) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
}

/// Produces a connected signing plugin
#[async_trait]
pub trait SigningConnector: Send + Sync {
    async fn connect_signer(&self) -> anyhow::Result<Box<dyn SigningProtocol>>;
}

pub fn signing_plugin_type() -> PluginTypeConfig {
    PluginTypeConfig {
        interface: INTERFACE,
        protocol_version: PROTOCOL_VERSION,
        default_pluggable: default_signing,
        pluggable: PorterConfig::signing_config,
        default_plugin: default_signing_plugin,
    }
}

fn default_signing(config: &PorterConfig) -> &str {
    &config.default_signing
}

fn default_signing_plugin(config: &PorterConfig) -> &str {
    &config.default_signing_plugin
}

#[async_trait]
impl SigningProtocol for PluginConnection {
    async fn sign(&mut self, reference: &str) -> Result<()> {
        let mut client = self.clients()?.signing.clone();
        let request = SignRequest {
            reference: reference.to_string(),
        };
        match client.sign(request).await {
            Ok(_) => Ok(()),
            Err(status) => Err(self.call_failed("sign", status)),
        }
    }

    async fn verify(&mut self, reference: &str) -> Result<()> {
        let mut client = self.clients()?.signing.clone();
        let request = VerifyRequest {
            reference: reference.to_string(),
        };
        match client.verify(request).await {
            Ok(_) => Ok(()),
            Err(status) => Err(self.call_failed("verify", status)),
        }
    }

    async fn close(&mut self) -> Result<()> {
        PluginConnection::close(self).await
    }
}

#[async_trait]
impl SigningConnector for PluginLoader {
    async fn connect_signer(&self) -> anyhow::Result<Box<dyn SigningProtocol>> {
        let conn = self.load(&signing_plugin_type()).await?;
        Ok(Box::new(conn))
    }
}

/// Signs and verifies references with the configured signing plugin,
/// starting it on first use
pub struct Signer {
    connector: Arc<dyn SigningConnector>,
    plugin: Option<Box<dyn SigningProtocol>>,
}

impl Signer {
    pub fn new(connector: Arc<dyn SigningConnector>) -> Self {
        Self {
            connector,
            plugin: None,
        }
    }

    /// Start the plugin unless it is already running
    pub async fn connect(&mut self) -> anyhow::Result<()> {
        if self.plugin.is_none() {
            debug!("Connecting to the signing plugin");
            self.plugin = Some(self.connector.connect_signer().await?);
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.plugin.is_some()
    }

    async fn plugin(&mut self) -> anyhow::Result<&mut Box<dyn SigningProtocol>> {
        self.connect().await?;
        self.plugin
            .as_mut()
            .ok_or_else(|| anyhow!("the signing plugin is not connected"))
    }

    pub async fn sign(&mut self, reference: &str) -> anyhow::Result<()> {
        info!(reference = %reference, "Signing");
        self.plugin()
            .await?
            .sign(reference)
            .await
            .with_context(|| format!("could not sign {}", reference))
    }

    pub async fn verify(&mut self, reference: &str) -> anyhow::Result<()> {
        info!(reference = %reference, "Verifying signature");
        match self.plugin().await?.verify(reference).await {
            Ok(()) => Ok(()),
            Err(e @ PluginError::NotImplemented { .. }) => Err(anyhow::Error::new(e).context(
                "the current plugin does not support verification, configure a different signing plugin in the porter configuration file",
            )),
            Err(e) => Err(anyhow::Error::new(e).context(format!("could not verify {}", reference))),
        }
    }

    /// Stop the plugin. Safe to call when it never started or was already
    /// closed.
    pub async fn close(&mut self) -> anyhow::Result<()> {
        if let Some(mut plugin) = self.plugin.take() {
            plugin.close().await.context("could not stop the signing plugin")?;
        }
        Ok(())
    }
}
