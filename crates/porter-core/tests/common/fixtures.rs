//! Ready-made manifests and filesystem helpers

#![allow(dead_code)]

use std::path::PathBuf;
use tempfile::TempDir;

/// A bundle that wires a bundle output and a dependency output into steps
pub const WIRED_MANIFEST: &str = r#"schemaVersion: 1.0.0
name: wordpress
version: 0.1.0
registry: localhost:5000
mixins:
  - exec
  - helm3:
      clientVersion: v3.8.0
dependencies:
  requires:
    - name: mysql
      bundle:
        reference: getporter/mysql:v0.1.0
parameters:
  - name: greeting
    type: string
    default: hello
  - name: tfstate
    type: file
    path: /cnab/app/tfstate
    source:
      output: tfstate
outputs:
  - name: kubeconfig
    type: file
    path: /root/.kube/config
  - name: tfstate
    type: file
    path: /cnab/app/tfstate
install:
  - exec:
      description: Install
      command: echo ${ bundle.parameters.greeting } ${ bundle.dependencies.mysql.outputs.password }
upgrade:
  - exec:
      description: Upgrade
      command: cat ${ bundle.outputs.kubeconfig }
uninstall:
  - exec:
      description: Uninstall
      command: echo goodbye
status:
  - exec:
      description: Status
      command: echo ok
customActions:
  status:
    description: Print status
    stateless: true
"#;

/// Write `content` as porter.yaml in a fresh temp dir
pub fn write_manifest(content: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("porter.yaml");
    std::fs::write(&path, content).unwrap();
    (dir, path)
}
