use serde::{Deserialize, Serialize};

/// Extension granting the installer access to the host Docker daemon
pub const DOCKER_KEY: &str = "io.cnab.docker";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Docker {
    /// Run the installer container as --privileged
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub privileged: bool,
}
