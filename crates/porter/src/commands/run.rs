//! Run command, executed by the installer image's run script

use crate::cli::RunArgs;
use anyhow::{Context, Result};
use porter_core::{CnabPaths, Manifest, ProcessContext};
use porter_mixins::MixinRunner;
use porter_runtime::{RuntimeEngine, RuntimeManifest};
use tracing::{info_span, Instrument};
use uuid::Uuid;

/// Correlates the logs of one porter operation across its processes
const CORRELATION_ID_ENV: &str = "PORTER_CORRELATION_ID";

pub async fn run(args: RunArgs) -> Result<()> {
    let correlation_id = correlation_id(std::env::var(CORRELATION_ID_ENV).ok());
    let span = info_span!("run", action = %args.action, correlation_id = %correlation_id);
    execute(args, CnabPaths::new(), ProcessContext::from_env())
        .instrument(span)
        .await
}

async fn execute(args: RunArgs, paths: CnabPaths, ctx: ProcessContext) -> Result<()> {
    let manifest_path = args
        .file
        .map(|f| f.into_std_path_buf())
        .unwrap_or_else(|| paths.manifest());
    let manifest = Manifest::load_validated(&manifest_path)
        .with_context(|| format!("could not load the manifest {}", manifest_path.display()))?;

    let runner = MixinRunner::new(paths.mixins_dir());
    let mut rm = RuntimeManifest::load(manifest, &args.action, paths)?;
    RuntimeEngine::new(&runner).execute(&ctx, &mut rm).await
}

fn correlation_id(inherited: Option<String>) -> String {
    inherited
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}
