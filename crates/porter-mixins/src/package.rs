//! Installed mixin packages and their metadata

use crate::runner::{CommandOptions, MixinExecutor, MixinRunner};
use anyhow::{Context, Result};
use porter_core::{ProcessContext, SharedBuffer, Sink};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use tracing::debug;

/// Version details a mixin reports about itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub commit: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub author: String,
}

/// Output of `<mixin> version --output json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    #[serde(flatten)]
    pub version_info: VersionInfo,
}

/// Names of the mixins installed in the runner's mixins directory, sorted.
/// A directory counts only when it holds the mixin's client executable.
pub fn list_installed(runner: &MixinRunner) -> Result<Vec<String>> {
    let dir = runner.mixins_dir();
    if !dir.exists() {
        debug!("Mixins directory {} does not exist", dir.display());
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    let entries = fs::read_dir(dir).with_context(|| {
        format!(
            "could not list the contents of the mixins directory {}",
            dir.display()
        )
    })?;
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if runner.executable_path(&name, false).exists() {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Ask a mixin for its version metadata
pub async fn get_metadata(
    executor: &dyn MixinExecutor,
    ctx: &ProcessContext,
    mixin: &str,
) -> Result<PackageMetadata> {
    let stdout = run_captured(executor, ctx, mixin, "version --output json").await?;
    let mut metadata: PackageMetadata = serde_json::from_str(&stdout)
        .with_context(|| format!("could not parse the version output of mixin {}", mixin))?;
    if metadata.name.is_empty() {
        metadata.name = mixin.to_string();
    }
    Ok(metadata)
}

/// Ask a mixin for the JSON schema of its step bodies
pub async fn get_schema(
    executor: &dyn MixinExecutor,
    ctx: &ProcessContext,
    mixin: &str,
) -> Result<String> {
    run_captured(executor, ctx, mixin, "schema").await
}

/// Version of each named mixin, as recorded in the bundle stamp
pub async fn installed_versions(
    executor: &dyn MixinExecutor,
    ctx: &ProcessContext,
    mixins: &[String],
) -> Result<BTreeMap<String, String>> {
    let mut versions = BTreeMap::new();
    for mixin in mixins {
        let metadata = get_metadata(executor, ctx, mixin)
            .await
            .with_context(|| format!("could not get the version of mixin {}", mixin))?;
        versions.insert(mixin.clone(), metadata.version_info.version);
    }
    Ok(versions)
}

async fn run_captured(
    executor: &dyn MixinExecutor,
    ctx: &ProcessContext,
    mixin: &str,
    command: &str,
) -> Result<String> {
    let stdout = SharedBuffer::new();
    let child = ctx.with_sinks(Sink::Buffer(stdout.clone()), ctx.err.clone());
    executor
        .run(&child, mixin, &CommandOptions::new(command))
        .await
        .with_context(|| format!("could not run {} on mixin {}", command, mixin))?;
    Ok(stdout.contents())
}
