//! # porter-plugins
//!
//! Out-of-process plugins for signing bundles and generating SBOMs:
//! - Plugin keys and selection from the porter configuration
//! - gRPC signing and SBOM services, reached after a handshake over the
//!   plugin's stdio
//! - A connection handle that owns the plugin process
//! - [`Signer`] and [`SbomGenerator`], which connect on first use
//! - The built-in cosign, notation and syft plugins served by porter

pub mod builtin;
pub mod connection;
pub mod error;
pub mod key;
pub mod loader;
pub mod protocol;
pub mod sbom;
pub mod server;
pub mod signing;

pub use connection::PluginConnection;
pub use error::{PluginError, Result};
pub use key::PluginKey;
pub use loader::{PluginLoader, PluginTypeConfig, SelectedPlugin};
pub use sbom::{SbomConnector, SbomGenerator, SbomGeneratorProtocol};
pub use server::{run, serve, serve_stdio, LaunchEnv, PluginHandler};
pub use signing::{Signer, SigningConnector, SigningProtocol};
