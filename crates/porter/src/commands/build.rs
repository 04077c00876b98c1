//! Build command

use super::{client_context, load_config, mixin_runner};
use crate::cli::BuildArgs;
use crate::output;
use crate::version::VersionInfo;
use anyhow::{Context, Result};
use camino::Utf8Path;
use porter_cnab::{Bundle, DockerfileGenerator, ManifestConverter, Stamp};
use porter_core::Manifest;
use porter_mixins::package;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info};

pub async fn run(args: BuildArgs) -> Result<()> {
    let config = load_config()?;
    let manifest_path = args.manifest.manifest_path();
    let mut manifest = Manifest::load_validated(&manifest_path)
        .with_context(|| format!("could not load the manifest {}", manifest_path))?;
    if args.reference.is_some() {
        manifest.set_installer_image_and_reference(args.reference.as_deref())?;
    }

    let ctx = client_context(&config);
    let runner = mixin_runner(&config);
    let porter = VersionInfo::current();

    let spinner = output::spinner("Checking mixin versions");
    let mixin_versions = package::installed_versions(&runner, &ctx, &manifest.mixin_names()).await;
    spinner.finish_and_clear();
    let mixin_versions = mixin_versions?;

    let bundle_path = args.manifest.dir.join(porter_cnab::dockerfile::BUILD_DIR).join("bundle.json");
    if !args.no_cache && is_up_to_date(&bundle_path, &manifest, &mixin_versions, &porter.version) {
        output::info("Bundle is up to date, skipping build");
        return Ok(());
    }

    output::info(&format!("Building bundle {}", manifest.reference));
    let generator = DockerfileGenerator::new(&manifest, &runner, args.manifest.dir.as_std_path());
    let dockerfile = generator.write(&ctx).await?;
    generator.prepare_filesystem(runner.mixins_dir(), porter_runtime(&config.home_dir).as_deref())?;

    let bundle = ManifestConverter::new(&manifest)
        .with_mixin_versions(mixin_versions)
        .with_porter_version(porter.version.as_str(), porter.commit_or_empty())
        .to_bundle()?;
    bundle
        .write(&bundle_path)
        .with_context(|| format!("could not write {}", bundle_path))?;

    output::kv("Dockerfile", &dockerfile.display().to_string());
    output::kv("Bundle", bundle_path.as_str());
    output::kv("Installer image", &manifest.image);
    output::success(&format!("Built {}", manifest.reference));
    Ok(())
}

/// The bundle at `path` was stamped from this manifest, these mixins and
/// this porter
fn is_up_to_date(
    path: &Utf8Path,
    manifest: &Manifest,
    mixins: &BTreeMap<String, String>,
    porter_version: &str,
) -> bool {
    if !path.exists() {
        return false;
    }
    let stamp = match Bundle::load(path).and_then(|bundle| Stamp::load(&bundle)) {
        Ok(stamp) => stamp,
        Err(e) => {
            debug!("Rebuilding, the existing bundle could not be read: {:#}", e);
            return false;
        }
    };
    !stamp.is_stale(&manifest.raw, mixins, porter_version)
}

/// The linux porter binary copied into the installer image
fn porter_runtime(home: &Utf8Path) -> Option<PathBuf> {
    let path = home.join("runtimes").join("porter-runtime");
    if path.exists() {
        info!("Using porter runtime {}", path);
        Some(path.into_std_path_buf())
    } else {
        output::warning(&format!(
            "No porter runtime found at {}, the installer image must provide porter itself",
            path
        ));
        None
    }
}
