//! File parameters arrive base64 encoded at their destination path and are
//! decoded in place before any step runs

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use porter_cnab::Bundle;
use porter_core::CnabPaths;
use std::fs;
use tracing::debug;

/// Decode every file parameter that applies to `action`.
///
/// A missing file means the parameter was not supplied. The literal `null`
/// means it was explicitly unset and the file is removed.
pub fn decode_file_parameters(paths: &CnabPaths, bundle: &Bundle, action: &str) -> Result<()> {
    for (name, param) in &bundle.parameters {
        if !param.applies_to(action) {
            continue;
        }
        let Some(def) = bundle.definitions.get(&param.definition) else {
            continue;
        };
        if !Bundle::is_file_type(def) {
            continue;
        }

        let dest = param
            .destination
            .as_ref()
            .map(|d| d.path.as_str())
            .unwrap_or_default();
        if dest.is_empty() {
            // Wiring parameters carry their base64 value in the environment
            if bundle.is_internal_parameter(name) {
                continue;
            }
            return Err(anyhow!("destination path is not supplied for parameter {}", name));
        }

        let path = paths.resolve(dest);
        let contents = match fs::read(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(parameter = %name, "File parameter was not supplied");
                continue;
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("unable to read file parameter {} at {}", name, path.display())
                })
            }
        };

        if contents.trim_ascii() == b"null" {
            debug!(parameter = %name, "File parameter is null, removing {}", path.display());
            fs::remove_file(&path)
                .with_context(|| format!("unable to remove file parameter {}", name))?;
            continue;
        }

        let decoded = STANDARD
            .decode(contents.trim_ascii())
            .with_context(|| format!("unable to decode parameter {}", name))?;
        fs::write(&path, decoded)
            .with_context(|| format!("unable to write decoded parameter {}", name))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use porter_cnab::bundle::Parameter;
    use porter_core::manifest::Location;
    use porter_core::Schema;
    use tempfile::TempDir;

    fn file_bundle(path: &str) -> Bundle {
        let mut bundle = Bundle::default();
        bundle.definitions.insert(
            "kubeconfig-parameter".to_string(),
            Schema {
                content_encoding: Some("base64".to_string()),
                ..Schema::of_type("string")
            },
        );
        bundle.parameters.insert(
            "kubeconfig".to_string(),
            Parameter {
                definition: "kubeconfig-parameter".to_string(),
                destination: Some(Location {
                    path: path.to_string(),
                    env: String::new(),
                }),
                ..Default::default()
            },
        );
        bundle
    }

    #[test]
    fn test_decodes_in_place() {
        let tmp = TempDir::new().unwrap();
        let paths = CnabPaths::with_root(tmp.path());
        let dest = paths.resolve("/home/nonroot/.kube/config");
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(&dest, STANDARD.encode("apiVersion: v1\n") + "\n").unwrap();

        decode_file_parameters(&paths, &file_bundle("/home/nonroot/.kube/config"), "install")
            .unwrap();
        assert_eq!(fs::read_to_string(&dest).unwrap(), "apiVersion: v1\n");
    }

    #[test]
    fn test_null_removes_the_file() {
        let tmp = TempDir::new().unwrap();
        let paths = CnabPaths::with_root(tmp.path());
        let dest = paths.resolve("/root/config");
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(&dest, "null").unwrap();

        decode_file_parameters(&paths, &file_bundle("/root/config"), "install").unwrap();
        assert!(!dest.exists());
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let paths = CnabPaths::with_root(tmp.path());
        decode_file_parameters(&paths, &file_bundle("/root/config"), "install").unwrap();
    }

    #[test]
    fn test_missing_destination_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let paths = CnabPaths::with_root(tmp.path());
        let err = decode_file_parameters(&paths, &file_bundle(""), "install").unwrap_err();
        assert_eq!(
            err.to_string(),
            "destination path is not supplied for parameter kubeconfig"
        );
    }
}
