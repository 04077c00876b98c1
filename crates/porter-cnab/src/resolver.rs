//! Pinning bundle dependencies to concrete references

use crate::bundle::Bundle;
use crate::extensions::Dependency;
use crate::registry::TagLister;
use anyhow::{anyhow, bail, Context, Result};
use porter_core::OciReference;
use semver::Version;
use tracing::{debug, trace};

/// A dependency resolved to the reference that will be installed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyLock {
    pub alias: String,
    pub reference: String,
}

/// Resolves each dependency of a bundle to a tagged reference
pub struct DependencyResolver<'a> {
    registry: &'a dyn TagLister,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(registry: &'a dyn TagLister) -> Self {
        Self { registry }
    }

    /// Resolve every dependency, in install order. A bundle that does not
    /// require the dependencies extension has nothing to resolve.
    pub async fn resolve_dependencies(&self, bundle: &Bundle) -> Result<Vec<DependencyLock>> {
        if !bundle.supports_dependencies() || !bundle.has_dependencies() {
            return Ok(Vec::new());
        }
        let deps = bundle
            .read_dependencies()
            .with_context(|| format!("error executing dependencies for {}", bundle.name))?;

        let mut locks = Vec::new();
        for dep in deps.list_by_sequence() {
            let reference = self.resolve_version(&dep.name, &dep).await?;
            locks.push(DependencyLock {
                alias: dep.name.clone(),
                reference: reference.to_string(),
            });
        }
        Ok(locks)
    }

    /// Resolve one dependency. A tagged reference is used as is; otherwise
    /// the registry's tags decide.
    pub async fn resolve_version(&self, name: &str, dep: &Dependency) -> Result<OciReference> {
        let reference = OciReference::parse(&dep.bundle).with_context(|| {
            format!(
                "error parsing dependency ({}) bundle {:?} as OCI reference",
                name, dep.bundle
            )
        })?;

        if !dep.ranges().is_empty() {
            bail!(
                "not implemented: dependency version range specified for {}",
                name
            );
        }

        if reference.has_tag() {
            return Ok(reference);
        }

        let tags = self
            .registry
            .list_tags(&reference)
            .await
            .with_context(|| format!("error listing tags for {}", dep.bundle))?;
        let tag = select_tag(&tags, dep.allow_prereleases(), &dep.bundle)?;
        debug!("Resolved dependency {} to tag {}", name, tag);
        Ok(reference.with_tag(&tag)?)
    }
}

/// Highest semver tag, prereleases only when allowed; `latest` when no tag
/// is semver
pub fn select_tag(tags: &[String], allow_prereleases: bool, bundle: &str) -> Result<String> {
    let mut has_latest = false;
    let mut versions: Vec<(Version, &String)> = Vec::new();
    for tag in tags {
        if tag == "latest" {
            has_latest = true;
            continue;
        }
        match Version::parse(tag.strip_prefix('v').unwrap_or(tag)) {
            Ok(version) if !allow_prereleases && !version.pre.is_empty() => {
                trace!("Skipping prerelease: {}", tag);
            }
            Ok(version) => versions.push((version, tag)),
            Err(_) => trace!("Skipping non-semver tag: {}", tag),
        }
    }

    versions.sort_by(|a, b| b.0.cmp(&a.0));
    match versions.first() {
        Some((_, tag)) => Ok((*tag).clone()),
        None if has_latest => Ok("latest".to_string()),
        None => Err(anyhow!(
            "no tag was specified for {} and none of the tags defined in the registry meet the criteria: semver formatted or 'latest'",
            bundle
        )),
    }
}
