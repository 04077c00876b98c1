//! The plugin side of the protocol
//!
//! A plugin binary implements [`PluginHandler`] and hands it to
//! [`serve_stdio`]. Operations a handler does not override answer
//! "not implemented".

use crate::error::{PluginError, Result};
use crate::protocol::rpc::controller::controller_server::{Controller, ControllerServer};
use crate::protocol::rpc::sbom::sbom_generator_server::{SbomGenerator, SbomGeneratorServer};
use crate::protocol::rpc::signing::signing_server::{Signing, SigningServer};
use crate::protocol::{
    GenerateRequest, GenerateResponse, HandshakeLine, ShutdownRequest, ShutdownResponse,
    SignRequest, SignResponse, VerifyRequest, VerifyResponse, MAGIC_COOKIE, MAGIC_COOKIE_KEY,
    MAX_MESSAGE_SIZE, PROTOCOL_VERSION, PROTOCOL_VERSIONS_ENV,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, Notify};
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::debug;

#[async_trait]
pub trait PluginHandler: Send {
    /// Receives the plugin's section of the porter configuration
    async fn configure(&mut self, _config: Option<serde_json::Value>) -> Result<()> {
        Ok(())
    }

    async fn sign(&mut self, _reference: &str) -> Result<()> {
        Err(PluginError::not_implemented("sign"))
    }

    async fn verify(&mut self, _reference: &str) -> Result<()> {
        Err(PluginError::not_implemented("verify"))
    }

    async fn generate(
        &mut self,
        _reference: &str,
        _sbom_path: &str,
        _insecure_registry: bool,
    ) -> Result<()> {
        Err(PluginError::not_implemented("generate"))
    }
}

/// What porter put in the plugin's environment when launching it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchEnv {
    pub magic_cookie: Option<String>,
    pub protocol_versions: Option<String>,
}

impl LaunchEnv {
    pub fn from_env() -> Self {
        Self {
            magic_cookie: std::env::var(MAGIC_COOKIE_KEY).ok(),
            protocol_versions: std::env::var(PROTOCOL_VERSIONS_ENV).ok(),
        }
    }

    /// The environment porter sets for `protocol_version`
    pub fn porter(protocol_version: u32) -> Self {
        Self {
            magic_cookie: Some(MAGIC_COOKIE.to_string()),
            protocol_versions: Some(protocol_version.to_string()),
        }
    }

    /// Check the cookie and pick the service version both sides speak
    pub fn negotiate(&self) -> Result<u32> {
        if self.magic_cookie.as_deref() != Some(MAGIC_COOKIE) {
            return Err(PluginError::NotLaunchedByPorter);
        }
        let Some(requested) = self.protocol_versions.as_deref().filter(|v| !v.is_empty()) else {
            return Ok(PROTOCOL_VERSION);
        };
        let supported = requested
            .split(',')
            .any(|v| v.trim().parse::<u32>().is_ok_and(|v| v == PROTOCOL_VERSION));
        if !supported {
            return Err(PluginError::UnsupportedProtocol {
                requested: requested.to_string(),
                supported: PROTOCOL_VERSION,
            });
        }
        Ok(PROTOCOL_VERSION)
    }
}

/// Run as a plugin process launched by porter
pub async fn serve_stdio(handler: Box<dyn PluginHandler>) -> Result<()> {
    run(handler, LaunchEnv::from_env(), tokio::io::stdin(), tokio::io::stdout()).await
}

/// Configure `handler` from `stdin`, announce the listening address on
/// `stdout` and serve until the host asks for a shutdown
pub async fn run<R, W>(
    mut handler: Box<dyn PluginHandler>,
    env: LaunchEnv,
    mut stdin: R,
    mut stdout: W,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let version = env.negotiate()?;

    let mut raw = String::new();
    stdin.read_to_string(&mut raw).await?;
    let config = if raw.trim().is_empty() {
        None
    } else {
        Some(
            serde_json::from_str(&raw).map_err(|e| PluginError::Config {
                message: e.to_string(),
            })?,
        )
    };
    handler.configure(config).await?;

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let line = HandshakeLine::new(version, listener.local_addr()?);
    debug!(handshake = %line, "Plugin is ready");
    stdout.write_all(format!("{}\n", line).as_bytes()).await?;
    stdout.flush().await?;

    serve(listener, handler).await
}

/// Serve `handler` on `listener` until the host asks for a shutdown
pub async fn serve(listener: TcpListener, handler: Box<dyn PluginHandler>) -> Result<()> {
    let handler: SharedHandler = Arc::new(Mutex::new(handler));
    let shutdown = Arc::new(Notify::new());
    let signal = shutdown.clone();

    Server::builder()
        .add_service(
            SigningServer::new(SigningService {
                handler: handler.clone(),
            })
            .max_decoding_message_size(MAX_MESSAGE_SIZE)
            .max_encoding_message_size(MAX_MESSAGE_SIZE),
        )
        .add_service(
            SbomGeneratorServer::new(SbomService { handler })
                .max_decoding_message_size(MAX_MESSAGE_SIZE)
                .max_encoding_message_size(MAX_MESSAGE_SIZE),
        )
        .add_service(ControllerServer::new(ControllerService { shutdown }))
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
            signal.notified().await
        })
        .await?;

    debug!("Plugin stopped");
    Ok(())
}

type SharedHandler = Arc<Mutex<Box<dyn PluginHandler>>>;

fn respond<T>(result: Result<()>, reply: T) -> std::result::Result<Response<T>, Status> {
    match result {
        Ok(()) => Ok(Response::new(reply)),
        Err(e) if e.is_not_implemented() => Err(Status::unimplemented(e.to_string())),
        Err(e) => Err(Status::internal(e.to_string())),
    }
}

struct SigningService {
    handler: SharedHandler,
}

#[async_trait]
impl Signing for SigningService {
    async fn sign(
        &self,
        request: Request<SignRequest>,
    ) -> std::result::Result<Response<SignResponse>, Status> {
        let req = request.into_inner();
        debug!(operation = "sign", reference = %req.reference, "Handling plugin request");
        let mut handler = self.handler.lock().await;
        respond(handler.sign(&req.reference).await, SignResponse {})
    }

    async fn verify(
        &self,
        request: Request<VerifyRequest>,
    ) -> std::result::Result<Response<VerifyResponse>, Status> {
        let req = request.into_inner();
        debug!(operation = "verify", reference = %req.reference, "Handling plugin request");
        let mut handler = self.handler.lock().await;
        respond(handler.verify(&req.reference).await, VerifyResponse {})
    }
}

struct SbomService {
    handler: SharedHandler,
}

#[async_trait]
impl SbomGenerator for SbomService {
    async fn generate(
        &self,
        request: Request<GenerateRequest>,
    ) -> std::result::Result<Response<GenerateResponse>, Status> {
        let req = request.into_inner();
        debug!(operation = "generate", reference = %req.reference, "Handling plugin request");
        let mut handler = self.handler.lock().await;
        respond(
            handler
                .generate(&req.reference, &req.sbom_path, req.insecure_registry)
                .await,
            GenerateResponse {},
        )
    }
}

struct ControllerService {
    shutdown: Arc<Notify>,
}

#[async_trait]
impl Controller for ControllerService {
    async fn shutdown(
        &self,
        _request: Request<ShutdownRequest>,
    ) -> std::result::Result<Response<ShutdownResponse>, Status> {
        self.shutdown.notify_one();
        Ok(Response::new(ShutdownResponse {}))
    }
}
