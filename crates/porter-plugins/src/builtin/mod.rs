//! Plugins served by the porter binary itself
//!
//! Each built-in wraps an external tool that must be on the `PATH` of the
//! machine running porter: `cosign` or `notation` for signing, `syft` for
//! SBOM generation.

mod cosign;
mod notation;
mod syft;

pub use cosign::{Cosign, CosignConfig};
pub use notation::{Notation, NotationConfig};
pub use syft::{Syft, SyftConfig};

use crate::error::{PluginError, Result};
use crate::key::PluginKey;
use crate::server::PluginHandler;
use crate::{sbom, signing};
use serde::de::DeserializeOwned;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

/// The built-in handler for `key`
pub fn handler_for(key: &PluginKey) -> Result<Box<dyn PluginHandler>> {
    match (key.interface.as_str(), key.implementation.as_str()) {
        (signing::INTERFACE, "cosign") => Ok(Box::new(Cosign::default())),
        (signing::INTERFACE, "notation") => Ok(Box::new(Notation::default())),
        (sbom::INTERFACE, "syft") => Ok(Box::new(Syft::default())),
        _ => Err(PluginError::UnknownBuiltin {
            key: key.to_string(),
        }),
    }
}

/// Read a plugin's configuration section, using defaults when it has none
fn parse_config<T: DeserializeOwned + Default>(config: Option<serde_json::Value>) -> Result<T> {
    match config {
        Some(value) => serde_json::from_value(value).map_err(|e| PluginError::Config {
            message: e.to_string(),
        }),
        None => Ok(T::default()),
    }
}

/// Run an external tool to completion, returning its combined output
async fn run_tool(program: &Path, args: &[String], env: &[(&str, &str)]) -> Result<String> {
    let name = program.display().to_string();
    debug!(command = %format!("{} {}", name, args.join(" ")), "Running plugin tool");

    let output = Command::new(program)
        .args(args)
        .envs(env.iter().copied())
        .output()
        .await
        .map_err(|e| PluginError::Tool {
            program: name.clone(),
            message: e.to_string(),
        })?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    if !output.status.success() {
        return Err(PluginError::Tool {
            program: name,
            message: format!("{}: {}", combined.trim(), output.status),
        });
    }
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_by_interface() {
        for key in ["signing.porter.cosign", "signing.porter.notation", "sbom-generator.porter.syft"] {
            assert!(handler_for(&PluginKey::parse(key).unwrap()).is_ok(), "{}", key);
        }
    }

    #[test]
    fn test_builtin_must_match_its_interface() {
        let key = PluginKey::parse("sbom-generator.porter.cosign").unwrap();
        let err = handler_for(&key).err().unwrap();
        assert_eq!(
            err.to_string(),
            "porter does not provide a built-in sbom-generator.porter.cosign plugin"
        );
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let config: CosignConfig = parse_config(None).unwrap();
        assert!(config.private_key.is_empty());
    }

    #[test]
    fn test_malformed_config_is_rejected() {
        let err = parse_config::<CosignConfig>(Some(serde_json::json!({"experimental": "yes"})))
            .unwrap_err();
        assert!(matches!(err, PluginError::Config { .. }));
    }
}
