//! Well-known locations inside an installer image
//!
//! The constants are the paths recorded in bundle descriptors. [`CnabPaths`]
//! maps them onto the local filesystem, rooted at `/` inside the image and at
//! a scratch directory everywhere else.

use std::path::{Path, PathBuf};

/// Directory holding the bundle descriptor
pub const CNAB_DIR: &str = "/cnab";

/// Working directory of the bundle
pub const APP_DIR: &str = "/cnab/app";

/// Where the bundle descriptor is mounted
pub const BUNDLE_JSON: &str = "/cnab/bundle.json";

/// Where the manifest is copied during build
pub const MANIFEST: &str = "/cnab/app/porter.yaml";

/// Where bundle-level outputs are collected by the driver
pub const BUNDLE_OUTPUTS_DIR: &str = "/cnab/app/outputs";

/// Where mixins write their named outputs
pub const MIXIN_OUTPUTS_DIR: &str = "/cnab/app/porter/outputs";

/// Where dependency bundle descriptors are mounted
pub const DEPENDENCIES_DIR: &str = "/cnab/app/dependencies";

/// Where installed mixins are copied during build
pub const MIXINS_DIR: &str = "/cnab/app/mixins";

/// Incoming state archive
pub const STATE_ARCHIVE_IN: &str = "/porter/state.tgz";

/// Outgoing state archive, delivered as the porter-state output
pub const STATE_ARCHIVE_OUT: &str = "/cnab/app/outputs/porter-state";

/// Optional image relocation mapping
pub const RELOCATION_MAPPING: &str = "/cnab/app/relocation-mapping.json";

/// Resolve a path declared in the manifest into the absolute path it refers
/// to inside the image. Relative paths are relative to the app directory.
pub fn resolve_path(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    if value.starts_with('/') {
        return value.to_string();
    }
    format!("{}/{}", APP_DIR, value.trim_start_matches("./"))
}

/// Filesystem view of the well-known locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CnabPaths {
    root: PathBuf,
}

impl Default for CnabPaths {
    fn default() -> Self {
        Self::new()
    }
}

impl CnabPaths {
    /// Paths rooted at `/`, as seen inside an installer image
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/"),
        }
    }

    /// Paths rooted somewhere else, typically a temporary directory
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn rooted(&self, absolute: &str) -> PathBuf {
        self.root.join(absolute.trim_start_matches('/'))
    }

    pub fn app_dir(&self) -> PathBuf {
        self.rooted(APP_DIR)
    }

    pub fn bundle_json(&self) -> PathBuf {
        self.rooted(BUNDLE_JSON)
    }

    pub fn manifest(&self) -> PathBuf {
        self.rooted(MANIFEST)
    }

    pub fn bundle_outputs_dir(&self) -> PathBuf {
        self.rooted(BUNDLE_OUTPUTS_DIR)
    }

    pub fn bundle_output(&self, name: &str) -> PathBuf {
        self.bundle_outputs_dir().join(name)
    }

    pub fn mixin_outputs_dir(&self) -> PathBuf {
        self.rooted(MIXIN_OUTPUTS_DIR)
    }

    pub fn mixins_dir(&self) -> PathBuf {
        self.rooted(MIXINS_DIR)
    }

    pub fn dependencies_dir(&self) -> PathBuf {
        self.rooted(DEPENDENCIES_DIR)
    }

    /// Descriptor of the dependency installed under `alias`
    pub fn dependency_bundle(&self, alias: &str) -> PathBuf {
        self.dependencies_dir().join(alias).join("bundle.json")
    }

    pub fn state_archive_in(&self) -> PathBuf {
        self.rooted(STATE_ARCHIVE_IN)
    }

    pub fn state_archive_out(&self) -> PathBuf {
        self.rooted(STATE_ARCHIVE_OUT)
    }

    pub fn relocation_mapping(&self) -> PathBuf {
        self.rooted(RELOCATION_MAPPING)
    }

    /// Map a manifest-declared path onto this root
    pub fn resolve(&self, declared: &str) -> PathBuf {
        self.rooted(&resolve_path(declared))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_path() {
        assert_eq!(resolve_path(""), "");
        assert_eq!(resolve_path("/tmp/kubeconfig"), "/tmp/kubeconfig");
        assert_eq!(resolve_path("config.txt"), "/cnab/app/config.txt");
        assert_eq!(resolve_path("./charts/app"), "/cnab/app/charts/app");
    }

    #[test]
    fn test_default_root_is_filesystem_root() {
        let paths = CnabPaths::new();
        assert_eq!(paths.bundle_json(), PathBuf::from("/cnab/bundle.json"));
        assert_eq!(
            paths.mixin_outputs_dir(),
            PathBuf::from("/cnab/app/porter/outputs")
        );
        assert_eq!(
            paths.state_archive_out(),
            PathBuf::from("/cnab/app/outputs/porter-state")
        );
    }

    #[test]
    fn test_custom_root() {
        let paths = CnabPaths::with_root("/tmp/sandbox");
        assert_eq!(
            paths.dependency_bundle("mysql"),
            PathBuf::from("/tmp/sandbox/cnab/app/dependencies/mysql/bundle.json")
        );
        assert_eq!(
            paths.resolve("state.db"),
            PathBuf::from("/tmp/sandbox/cnab/app/state.db")
        );
        assert_eq!(
            paths.resolve("/tmp/cache.db"),
            PathBuf::from("/tmp/sandbox/tmp/cache.db")
        );
    }
}
