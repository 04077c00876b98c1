//! Lint command

use super::{client_context, load_config, mixin_runner};
use crate::cli::LintArgs;
use crate::output;
use anyhow::{bail, Context, Result};
use porter_core::Manifest;
use porter_mixins::lint::Linter;

pub async fn run(args: LintArgs) -> Result<()> {
    let config = load_config()?;
    let manifest_path = args.manifest.manifest_path();
    let manifest = Manifest::load_validated(&manifest_path)
        .with_context(|| format!("could not load the manifest {}", manifest_path))?;

    let ctx = client_context(&config);
    let runner = mixin_runner(&config);
    let results = Linter::new(&runner).lint(&ctx, &manifest).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results.0)?);
    } else if results.is_empty() {
        output::success("No problems found");
    } else {
        print!("{}", results);
    }

    if results.has_error() {
        bail!("lint errors were detected in {}", manifest_path);
    }
    Ok(())
}
