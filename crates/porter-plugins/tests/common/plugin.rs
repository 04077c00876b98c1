//! A plugin served from a task in the test process

use async_trait::async_trait;
use porter_plugins::connection::handshake;
use porter_plugins::protocol::PROTOCOL_VERSION;
use porter_plugins::{run, LaunchEnv, PluginConnection, PluginError, PluginHandler, PluginKey};
use std::sync::{Arc, Mutex};
use tokio::io::duplex;
use tokio::task::JoinHandle;

/// Records every call it receives. Signing fails for references
/// containing `bad`; verification is not implemented.
#[derive(Clone, Default)]
pub struct RecordingPlugin {
    pub calls: Arc<Mutex<Vec<String>>>,
    pub config: Arc<Mutex<Option<serde_json::Value>>>,
}

impl RecordingPlugin {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl PluginHandler for RecordingPlugin {
    async fn configure(&mut self, config: Option<serde_json::Value>) -> porter_plugins::Result<()> {
        *self.config.lock().unwrap() = config;
        Ok(())
    }

    async fn sign(&mut self, reference: &str) -> porter_plugins::Result<()> {
        self.record(format!("sign {}", reference));
        if reference.contains("bad") {
            return Err(PluginError::Io(std::io::Error::other("registry unreachable")));
        }
        Ok(())
    }

    async fn generate(
        &mut self,
        reference: &str,
        sbom_path: &str,
        insecure_registry: bool,
    ) -> porter_plugins::Result<()> {
        self.record(format!(
            "generate {} {} {}",
            reference, sbom_path, insecure_registry
        ));
        Ok(())
    }
}

pub fn test_key() -> PluginKey {
    PluginKey::parse("signing.test.recorder").unwrap()
}

/// Launch `handler` the way porter launches a plugin binary, with its
/// stdio replaced by in-memory pipes, and connect to it. The returned task
/// finishes when the connection is closed.
pub async fn connect_in_process<H>(
    handler: H,
    config: Option<serde_json::Value>,
) -> porter_plugins::Result<(PluginConnection, JoinHandle<porter_plugins::Result<()>>)>
where
    H: PluginHandler + 'static,
{
    let (host_stdin, plugin_stdin) = duplex(64 * 1024);
    let (plugin_stdout, host_stdout) = duplex(64 * 1024);

    let task = tokio::spawn(run(
        Box::new(handler),
        LaunchEnv::porter(PROTOCOL_VERSION),
        plugin_stdin,
        plugin_stdout,
    ));
    let addr = handshake(
        &test_key(),
        host_stdin,
        host_stdout,
        config.as_ref(),
        PROTOCOL_VERSION,
    )
    .await?;
    let conn = PluginConnection::connect(test_key(), addr).await?;
    Ok((conn, task))
}
