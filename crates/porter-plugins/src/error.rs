//! Errors raised while loading and talking to plugins

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PluginError>;

#[derive(Error, Debug)]
pub enum PluginError {
    /// The plugin does not implement the requested operation
    #[error("{operation} is not implemented by the plugin")]
    NotImplemented { operation: String },

    #[error("invalid plugin key {key:?}, allowed format is [INTERFACE].BINARY.IMPLEMENTATION")]
    InvalidKey { key: String },

    /// Neither a named default nor a default plugin key is configured
    #[error(
        "no {interface} plugin is configured, set a default {interface} plugin in the porter configuration file"
    )]
    NotConfigured { interface: String },

    /// The configured default names an entry that does not exist
    #[error("{interface} plugin {name} is not defined in the porter configuration file")]
    UndefinedPlugin { interface: String, name: String },

    #[error("plugin {key} is not installed ({path})")]
    NotInstalled { key: String, path: PathBuf },

    #[error("could not start plugin {key}: {source}")]
    Start {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("plugin {key} did not start within {timeout:?}")]
    StartTimeout { key: String, timeout: Duration },

    #[error("handshake with plugin {key} failed: {message}")]
    Handshake { key: String, message: String },

    /// The plugin reported a failure for the operation
    #[error("plugin {key} failed: {message}")]
    Remote { key: String, message: String },

    /// The connection was closed, by us or by the plugin exiting
    #[error("the connection to plugin {key} is closed")]
    Closed { key: String },

    /// The plugin's section of the porter configuration is unusable
    #[error("invalid plugin config: {message}")]
    Config { message: String },

    /// A built-in plugin's external tool failed
    #[error("{program} failed: {message}")]
    Tool { program: String, message: String },

    #[error("porter does not provide a built-in {key} plugin")]
    UnknownBuiltin { key: String },

    /// A plugin was started by something other than porter
    #[error("this plugin must be launched by porter")]
    NotLaunchedByPorter,

    #[error("unsupported protocol version {requested}, this plugin speaks {supported}")]
    UnsupportedProtocol { requested: String, supported: u32 },

    #[error("could not reach the plugin: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PluginError {
    pub fn not_implemented(operation: impl Into<String>) -> Self {
        Self::NotImplemented {
            operation: operation.into(),
        }
    }

    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Self::NotImplemented { .. })
    }
}
