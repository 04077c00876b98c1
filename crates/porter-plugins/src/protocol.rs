//! Messages and services shared by porter and its plugins
//!
//! A plugin is a gRPC server. Porter starts it with [`MAGIC_COOKIE_KEY`]
//! and [`PROTOCOL_VERSIONS_ENV`] in its environment, writes the plugin's
//! configuration to its stdin as JSON and closes it. Once configured, the
//! plugin prints a single [`HandshakeLine`] on stdout announcing where it
//! listens, then serves [`rpc`] until the controller asks it to shut down.

use std::fmt;
use std::net::SocketAddr;

/// Largest message either side accepts (16 MiB)
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Version of the handshake itself
pub const CORE_PROTOCOL_VERSION: u32 = 1;

/// Version of the signing and SBOM services
pub const PROTOCOL_VERSION: u32 = 1;

/// Environment variable carrying [`MAGIC_COOKIE`], so a plugin can tell it
/// was launched by porter
pub const MAGIC_COOKIE_KEY: &str = "PORTER";
pub const MAGIC_COOKIE: &str = "bbc2dd71-def4-4311-906e-e98dc27208ce";

/// Comma-separated service versions the host can speak
pub const PROTOCOL_VERSIONS_ENV: &str = "PLUGIN_PROTOCOL_VERSIONS";

#[derive(Clone, PartialEq, prost::Message)]
pub struct SignRequest {
    #[prost(string, tag = "1")]
    pub reference: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SignResponse {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct VerifyRequest {
    #[prost(string, tag = "1")]
    pub reference: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct VerifyResponse {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GenerateRequest {
    #[prost(string, tag = "1")]
    pub reference: String,
    #[prost(string, tag = "2")]
    pub sbom_path: String,
    #[prost(bool, tag = "3")]
    pub insecure_registry: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GenerateResponse {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ShutdownRequest {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ShutdownResponse {}

/// Generated gRPC clients and servers
pub mod rpc {
    pub mod signing {
        include!(concat!(env!("OUT_DIR"), "/porter.plugins.v1.Signing.rs"));
    }

    pub mod sbom {
        include!(concat!(env!("OUT_DIR"), "/porter.plugins.v1.SbomGenerator.rs"));
    }

    pub mod controller {
        include!(concat!(env!("OUT_DIR"), "/porter.plugins.v1.Controller.rs"));
    }
}

/// The line a plugin prints once it is ready:
/// `CORE-VERSION|APP-VERSION|tcp|ADDRESS|grpc`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeLine {
    pub app_version: u32,
    pub addr: SocketAddr,
}

impl HandshakeLine {
    pub fn new(app_version: u32, addr: SocketAddr) -> Self {
        Self { app_version, addr }
    }

    pub fn parse(line: &str) -> Result<Self, String> {
        let parts: Vec<&str> = line.trim().split('|').collect();
        let [core, app, network, addr, protocol] = parts.as_slice() else {
            return Err(format!("unrecognized handshake {:?}", line.trim()));
        };

        let core: u32 = core
            .parse()
            .map_err(|_| format!("invalid core protocol version {:?}", core))?;
        if core != CORE_PROTOCOL_VERSION {
            return Err(format!(
                "plugin speaks core protocol version {}, porter requires {}",
                core, CORE_PROTOCOL_VERSION
            ));
        }
        let app_version = app
            .parse()
            .map_err(|_| format!("invalid protocol version {:?}", app))?;
        if *network != "tcp" {
            return Err(format!("unsupported network {:?}", network));
        }
        if *protocol != "grpc" {
            return Err(format!("unsupported protocol {:?}, porter requires grpc", protocol));
        }
        let addr = addr
            .parse()
            .map_err(|_| format!("invalid plugin address {:?}", addr))?;

        Ok(Self { app_version, addr })
    }
}

impl fmt::Display for HandshakeLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|tcp|{}|grpc",
            CORE_PROTOCOL_VERSION, self.app_version, self.addr
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_handshake_line_format() {
        let line = HandshakeLine::new(1, "127.0.0.1:50051".parse().unwrap());
        assert_eq!(line.to_string(), "1|1|tcp|127.0.0.1:50051|grpc");
        assert_eq!(HandshakeLine::parse(&format!("{}\n", line)).unwrap(), line);
    }

    #[test_case("1|1|tcp|127.0.0.1:50051" ; "missing protocol")]
    #[test_case("2|1|tcp|127.0.0.1:50051|grpc" ; "core version")]
    #[test_case("1|1|unix|/tmp/plugin.sock|grpc" ; "unix network")]
    #[test_case("1|1|tcp|127.0.0.1:50051|netrpc" ; "net rpc")]
    #[test_case("1|one|tcp|127.0.0.1:50051|grpc" ; "app version")]
    #[test_case("1|1|tcp|localhost|grpc" ; "address")]
    fn test_rejected_handshakes(line: &str) {
        assert!(HandshakeLine::parse(line).is_err(), "{}", line);
    }

    #[test]
    fn test_plugin_logging_is_not_a_handshake() {
        let err = HandshakeLine::parse("starting cosign plugin").unwrap_err();
        assert_eq!(err, "unrecognized handshake \"starting cosign plugin\"");
    }
}
