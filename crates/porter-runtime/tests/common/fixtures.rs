//! Manifests and a sandboxed installer filesystem

use porter_cnab::{Bundle, ManifestConverter};
use porter_core::{CnabPaths, Manifest};
use porter_runtime::RuntimeManifest;
use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;

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
  - name: cleanup
    type: string
    default: all
    applyTo:
      - uninstall
install:
  - exec:
      description: Say hello
      command: echo ${bundle.parameters.greeting}
uninstall:
  - exec:
      description: Say goodbye
      command: echo goodbye ${bundle.parameters.cleanup}
dry-run:
  - exec:
      description: Try to clean up
      command: echo ${bundle.parameters.cleanup}
"#;

/// Installs after mysql and echoes its password output
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
install:
  - exec:
      description: Install wordpress
      command: echo connecting with ${bundle.dependencies.mysql.outputs.password}
uninstall:
  - exec:
      description: Uninstall wordpress
      command: echo goodbye
"#;

/// Keeps a cache file between runs
pub const STATE_MANIFEST: &str = r#"schemaVersion: 1.0.0
name: cache
version: 0.1.0
registry: localhost:5000
mixins:
  - exec
state:
  - name: cache
    path: cache.db
install:
  - exec:
      description: Warm the cache
      command: printf cached-bytes > cache.db
upgrade:
  - exec:
      description: Read the cache
      command: cat cache.db
uninstall:
  - exec:
      description: Fail to uninstall
      command: exit 3
"#;

/// Captures a sensitive token from stdout
pub const OUTPUTS_MANIFEST: &str = r#"schemaVersion: 1.0.0
name: token
version: 0.1.0
registry: localhost:5000
mixins:
  - exec
outputs:
  - name: token
    type: string
    sensitive: true
    applyTo:
      - install
install:
  - exec:
      description: Issue a token
      command: echo Token=abc123
      outputs:
        - name: token
          regex: "Token=(\\w+)"
  - exec:
      description: Use the token
      command: echo using ${bundle.outputs.token}
uninstall:
  - exec:
      description: Tolerate a failure
      command: exit 3
      ignoreError:
        exitCodes: [3]
"#;

/// Reads the state saved by install back during uninstall
pub const TFSTATE_MANIFEST: &str = r#"schemaVersion: 1.0.0
name: terraform
version: 0.1.0
registry: localhost:5000
mixins:
  - exec
outputs:
  - name: tfstate
    type: string
    sensitive: true
install:
  - exec:
      description: Apply
      command: echo applied
      outputs:
        - name: tfstate
          regex: "state=(\\w+)"
uninstall:
  - exec:
      description: Destroy
      command: echo ${bundle.outputs.tfstate}
"#;

/// Parse and validate a manifest
pub fn manifest(yaml: &str) -> Manifest {
    let mut m = Manifest::from_bytes(yaml.as_bytes()).expect("manifest parses");
    m.validate().expect("manifest is valid");
    m
}

/// Descriptor of a mysql dependency whose password is write-only
pub fn mysql_bundle() -> Value {
    json!({
        "schemaVersion": "1.2.0",
        "name": "mysql",
        "version": "0.1.0",
        "description": "MySQL database",
        "outputs": {
            "password": { "definition": "password", "path": "/cnab/app/outputs/password" }
        },
        "definitions": {
            "password": { "type": "string", "writeOnly": true }
        }
    })
}

/// A temporary root laid out like an installer image
pub struct Sandbox {
    pub dir: TempDir,
    pub paths: CnabPaths,
}

impl Sandbox {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let paths = CnabPaths::with_root(dir.path());
        fs::create_dir_all(paths.app_dir()).unwrap();
        Self { dir, paths }
    }

    /// Compile `yaml` and place the manifest and bundle where the runtime
    /// reads them
    pub fn install(&self, yaml: &str) -> Manifest {
        let m = manifest(yaml);
        let bundle = ManifestConverter::new(&m).to_bundle().expect("bundle compiles");
        bundle.write(self.paths.bundle_json()).unwrap();
        fs::write(self.paths.manifest(), yaml).unwrap();
        m
    }

    pub fn add_dependency(&self, alias: &str, descriptor: Value) {
        let bundle = Bundle::from_slice(descriptor.to_string().as_bytes()).unwrap();
        bundle.write(self.paths.dependency_bundle(alias)).unwrap();
    }

    pub fn load(&self, m: Manifest, action: &str) -> RuntimeManifest {
        RuntimeManifest::load(m, action, self.paths.clone()).expect("runtime manifest loads")
    }
}
