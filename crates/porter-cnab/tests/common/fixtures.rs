//! Manifests and bundles shared by the integration tests

use porter_cnab::Bundle;
use porter_core::Manifest;
use serde_json::json;

/// One exec step greeting with a defaulted parameter
pub const HELLO_MANIFEST: &str = r#"schemaVersion: 1.0.0
name: hello
version: 0.1.0
registry: localhost:5000
mixins:
  - exec
parameters:
  - name: greeting
    type: string
    default: hello
install:
  - exec:
      description: Say hello
      command: echo ${bundle.parameters.greeting}
uninstall:
  - exec:
      description: Say goodbye
      command: echo goodbye
"#;

/// Installs mysql first and reads its password output
pub const WORDPRESS_MANIFEST: &str = r#"schemaVersion: 1.0.0
name: wordpress
version: 0.1.0
registry: localhost:5000
mixins:
  - exec
dependencies:
  requires:
    - name: mysql
      bundle:
        reference: getporter/mysql:v0.1.0
outputs:
  - name: kubeconfig
    type: file
    path: /root/.kube/config
install:
  - exec:
      description: Install wordpress
      command: echo ${bundle.dependencies.mysql.outputs.password}
upgrade:
  - exec:
      description: Upgrade wordpress
      command: cat ${bundle.outputs.kubeconfig}
uninstall:
  - exec:
      description: Uninstall wordpress
      command: echo goodbye
"#;

/// Parse and validate a manifest
pub fn manifest(yaml: &str) -> Manifest {
    let mut m = Manifest::from_bytes(yaml.as_bytes()).expect("manifest parses");
    m.validate().expect("manifest is valid");
    m
}

/// Bundle declaring the dependencies extension with the given requires map,
/// in the order given
pub fn bundle_with_dependencies(deps: &[(&str, serde_json::Value)]) -> Bundle {
    let sequence: Vec<&str> = deps.iter().map(|(name, _)| *name).collect();
    let requires: serde_json::Map<String, serde_json::Value> = deps
        .iter()
        .map(|(name, dep)| (name.to_string(), dep.clone()))
        .collect();
    Bundle::from_slice(
        json!({
            "schemaVersion": "1.2.0",
            "name": "app",
            "version": "0.1.0",
            "invocationImages": [{"image": "localhost:5000/app:v0.1.0", "imageType": "docker"}],
            "requiredExtensions": ["io.cnab.dependencies"],
            "custom": {
                "io.cnab.dependencies": {
                    "sequence": sequence,
                    "requires": requires,
                }
            }
        })
        .to_string()
        .as_bytes(),
    )
    .expect("bundle parses")
}
