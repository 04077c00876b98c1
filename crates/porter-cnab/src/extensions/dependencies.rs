use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Extension listing the bundles a bundle depends on
pub const DEPENDENCIES_KEY: &str = "io.cnab.dependencies";

/// Payload of the dependencies extension
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependencies {
    /// Aliases in the order they should be installed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sequence: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requires: BTreeMap<String, Dependency>,
}

/// A bundle required by another bundle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Alias of the dependency
    #[serde(default)]
    pub name: String,

    /// REGISTRY/NAME, optionally with :TAG
    pub bundle: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<DependencyVersion>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyVersion {
    /// Semantic version ranges, with or without a leading v
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ranges: Vec<String>,

    #[serde(default, rename = "prereleases")]
    pub allow_prereleases: bool,
}

impl Dependencies {
    /// Dependencies in install order: the declared sequence first, then any
    /// alias the sequence does not mention, by name. Every entry carries its
    /// alias in `name`.
    pub fn list_by_sequence(&self) -> Vec<Dependency> {
        let mut ordered: Vec<Dependency> = self
            .sequence
            .iter()
            .filter_map(|alias| self.requires.get(alias).map(|d| with_name(alias, d)))
            .collect();
        ordered.extend(
            self.requires
                .iter()
                .filter(|(alias, _)| !self.sequence.contains(alias))
                .map(|(alias, d)| with_name(alias, d)),
        );
        ordered
    }
}

fn with_name(alias: &str, dep: &Dependency) -> Dependency {
    Dependency {
        name: alias.to_string(),
        ..dep.clone()
    }
}

impl Dependency {
    pub fn allow_prereleases(&self) -> bool {
        self.version.as_ref().is_some_and(|v| v.allow_prereleases)
    }

    /// Version ranges the dependency was constrained to
    pub fn ranges(&self) -> &[String] {
        self.version.as_ref().map(|v| v.ranges.as_slice()).unwrap_or_default()
    }
}
