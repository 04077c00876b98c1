//! A connection to a running plugin
//!
//! The connection owns the plugin process and the gRPC channel to it.
//! Calls take `&mut self`, so at most one call is outstanding at a time.
//! The process is killed when the connection is dropped without being
//! closed.

use crate::error::{PluginError, Result};
use crate::key::PluginKey;
use crate::protocol::rpc::controller::controller_client::ControllerClient;
use crate::protocol::rpc::sbom::sbom_generator_client::SbomGeneratorClient;
use crate::protocol::rpc::signing::signing_client::SigningClient;
use crate::protocol::{
    HandshakeLine, ShutdownRequest, MAGIC_COOKIE, MAGIC_COOKIE_KEY, MAX_MESSAGE_SIZE,
    PROTOCOL_VERSIONS_ENV,
};
use porter_core::config::DEFAULT_PLUGIN_STOP_TIMEOUT;
use std::net::SocketAddr;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Status};
use tracing::{debug, warn};

/// Lines of plugin stderr kept for error messages
const STDERR_TAIL: usize = 20;

#[derive(Clone)]
pub(crate) struct Clients {
    pub signing: SigningClient<Channel>,
    pub sbom: SbomGeneratorClient<Channel>,
    controller: ControllerClient<Channel>,
}

impl Clients {
    fn new(channel: Channel) -> Self {
        Self {
            signing: SigningClient::new(channel.clone())
                .max_decoding_message_size(MAX_MESSAGE_SIZE)
                .max_encoding_message_size(MAX_MESSAGE_SIZE),
            sbom: SbomGeneratorClient::new(channel.clone())
                .max_decoding_message_size(MAX_MESSAGE_SIZE)
                .max_encoding_message_size(MAX_MESSAGE_SIZE),
            controller: ControllerClient::new(channel),
        }
    }
}

pub struct PluginConnection {
    key: PluginKey,
    clients: Option<Clients>,
    child: Option<Child>,
    stop_timeout: Duration,
}

impl std::fmt::Debug for PluginConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginConnection")
            .field("key", &self.key.to_string())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl PluginConnection {
    /// Connect to a plugin already serving on `addr`
    pub async fn connect(key: PluginKey, addr: SocketAddr) -> Result<Self> {
        debug!(plugin = %key, address = %addr, "Connecting to plugin");
        let channel = Endpoint::from_shared(format!("http://{}", addr))?
            .connect()
            .await?;
        Ok(Self {
            key,
            clients: Some(Clients::new(channel)),
            child: None,
            stop_timeout: DEFAULT_PLUGIN_STOP_TIMEOUT,
        })
    }

    /// Launch `program`, hand it `config` and connect to the address it
    /// announces. The whole exchange must finish within `start_timeout`.
    pub async fn start(
        key: PluginKey,
        program: &Path,
        args: &[String],
        config: Option<&serde_json::Value>,
        protocol_version: u32,
        start_timeout: Duration,
    ) -> Result<Self> {
        debug!(plugin = %key, command = %format!("{} {}", program.display(), args.join(" ")), "Starting plugin");

        let mut child = Command::new(program)
            .args(args)
            .env(MAGIC_COOKIE_KEY, MAGIC_COOKIE)
            .env(PROTOCOL_VERSIONS_ENV, protocol_version.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PluginError::Start {
                key: key.to_string(),
                source,
            })?;

        let stderr = Arc::new(Mutex::new(Vec::new()));
        let stderr_task = child.stderr.take().map(|pipe| {
            let name = key.to_string();
            let tail = stderr.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(pipe).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(plugin = %name, "{}", line);
                    if let Ok(mut tail) = tail.lock() {
                        if tail.len() == STDERR_TAIL {
                            tail.remove(0);
                        }
                        tail.push(line);
                    }
                }
            })
        });

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(PluginError::Closed {
                key: key.to_string(),
            });
        };

        let started = tokio::time::timeout(start_timeout, async {
            let addr = handshake(&key, stdin, stdout, config, protocol_version).await?;
            Self::connect(key.clone(), addr).await
        })
        .await
        .unwrap_or_else(|_| {
            Err(PluginError::StartTimeout {
                key: key.to_string(),
                timeout: start_timeout,
            })
        });

        match started {
            Ok(mut conn) => {
                conn.child = Some(child);
                Ok(conn)
            }
            Err(e) => {
                if let Err(kill) = child.kill().await {
                    debug!(plugin = %key, "Could not kill the plugin process: {}", kill);
                }
                if let Some(task) = stderr_task {
                    let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
                }
                let tail = stderr.lock().map(|t| t.join("\n")).unwrap_or_default();
                Err(with_stderr(e, &tail))
            }
        }
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn key(&self) -> &PluginKey {
        &self.key
    }

    pub fn is_closed(&self) -> bool {
        self.clients.is_none()
    }

    pub(crate) fn clients(&self) -> Result<&Clients> {
        self.clients.as_ref().ok_or_else(|| PluginError::Closed {
            key: self.key.to_string(),
        })
    }

    /// Translate a failed call. Operations the plugin does not serve come
    /// back as not implemented.
    pub(crate) fn call_failed(&self, operation: &str, status: Status) -> PluginError {
        match status.code() {
            Code::Unimplemented => PluginError::not_implemented(operation),
            _ => PluginError::Remote {
                key: self.key.to_string(),
                message: status.message().to_string(),
            },
        }
    }

    /// Ask the plugin to shut down and wait for it to exit, killing it once
    /// the stop timeout passes. Closing twice is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut clients) = self.clients.take() {
            if let Err(status) = clients.controller.shutdown(ShutdownRequest {}).await {
                debug!(plugin = %self.key, "Plugin did not accept the shutdown request: {}", status.message());
            }
        }

        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        match tokio::time::timeout(self.stop_timeout, child.wait()).await {
            Ok(status) => {
                let status = status?;
                if !status.success() {
                    warn!(plugin = %self.key, "Plugin exited with {}", status);
                }
            }
            Err(_) => {
                debug!(plugin = %self.key, "Plugin stop timeout was exceeded, killing the plugin process");
                child.kill().await?;
            }
        }
        Ok(())
    }
}

/// Send `config` to a starting plugin and read back the address it serves
/// on. Output the plugin writes after the handshake line is logged.
pub async fn handshake<W, R>(
    key: &PluginKey,
    mut stdin: W,
    stdout: R,
    config: Option<&serde_json::Value>,
    protocol_version: u32,
) -> Result<SocketAddr>
where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Send + Unpin + 'static,
{
    let failed = |message: String| PluginError::Handshake {
        key: key.to_string(),
        message,
    };

    if let Some(config) = config {
        let payload = serde_json::to_vec(config)
            .map_err(|e| failed(format!("could not marshal plugin config: {}", e)))?;
        // A plugin that rejects its launch may exit before reading stdin
        if let Err(e) = stdin.write_all(&payload).await {
            debug!(plugin = %key, "Could not send the plugin config: {}", e);
        }
    }
    if let Err(e) = stdin.shutdown().await {
        debug!(plugin = %key, "Could not close the plugin's stdin: {}", e);
    }
    drop(stdin);

    let mut lines = BufReader::new(stdout).lines();
    let line = lines
        .next_line()
        .await?
        .ok_or_else(|| failed("the plugin exited before completing the handshake".to_string()))?;
    let announced = HandshakeLine::parse(&line).map_err(failed)?;
    if announced.app_version != protocol_version {
        return Err(failed(format!(
            "plugin speaks protocol version {}, porter requires {}",
            announced.app_version, protocol_version
        )));
    }
    debug!(plugin = %key, address = %announced.addr, version = announced.app_version, "Negotiated plugin protocol");

    let name = key.to_string();
    tokio::spawn(async move {
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(plugin = %name, "{}", line);
        }
    });
    Ok(announced.addr)
}

/// Add what the plugin printed to stderr to a handshake failure
fn with_stderr(err: PluginError, stderr: &str) -> PluginError {
    match err {
        PluginError::Handshake { key, message } if !stderr.is_empty() => PluginError::Handshake {
            key,
            message: format!("{}: {}", message, stderr.trim()),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_is_appended_to_handshake_failures() {
        let err = PluginError::Handshake {
            key: "signing.porter.cosign".to_string(),
            message: "the plugin exited before completing the handshake".to_string(),
        };
        assert_eq!(
            with_stderr(err, "this plugin must be launched by porter\n").to_string(),
            "handshake with plugin signing.porter.cosign failed: the plugin exited before completing the handshake: this plugin must be launched by porter"
        );
    }

    #[test]
    fn test_other_failures_are_unchanged() {
        let err = PluginError::StartTimeout {
            key: "signing.porter.cosign".to_string(),
            timeout: Duration::from_millis(10),
        };
        assert!(matches!(
            with_stderr(err, "noise"),
            PluginError::StartTimeout { .. }
        ));
    }

    #[test]
    fn test_unimplemented_status_maps_to_not_implemented() {
        let conn = PluginConnection {
            key: PluginKey::parse("signing.porter.cosign").unwrap(),
            clients: None,
            child: None,
            stop_timeout: DEFAULT_PLUGIN_STOP_TIMEOUT,
        };
        assert!(conn
            .call_failed("verify", Status::unimplemented("verify"))
            .is_not_implemented());
        assert_eq!(
            conn.call_failed("sign", Status::internal("cosign failed"))
                .to_string(),
            "plugin signing.porter.cosign failed: cosign failed"
        );
    }
}
