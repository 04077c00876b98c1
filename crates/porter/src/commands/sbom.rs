//! SBOM command

use super::load_config;
use crate::cli::SbomArgs;
use crate::output;
use anyhow::{Context, Result};
use porter_plugins::{PluginLoader, SbomGenerator};
use std::sync::Arc;
use tracing::warn;

pub async fn run(args: SbomArgs) -> Result<()> {
    // The plugin runs in its own process, so hand it an absolute path
    let sbom_path = std::path::absolute(&args.output)
        .with_context(|| format!("could not resolve {}", args.output))?;
    if let Some(parent) = sbom_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("could not create {}", parent.display()))?;
    }
    let sbom_path = sbom_path.display().to_string();

    let config = load_config()?;
    let mut generator = SbomGenerator::new(Arc::new(PluginLoader::new(config)));
    let result = generator
        .generate(&args.reference, &sbom_path, args.insecure_registry)
        .await;
    if let Err(e) = generator.close().await {
        warn!("{:#}", e);
    }
    result?;

    output::success(&format!("Wrote the SBOM for {} to {}", args.reference, sbom_path));
    Ok(())
}
