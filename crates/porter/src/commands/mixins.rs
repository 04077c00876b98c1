//! Mixin commands

use super::{client_context, load_config, mixin_runner};
use crate::cli::MixinsListArgs;
use crate::output;
use anyhow::Result;
use porter_mixins::package::{self, PackageMetadata};
use tracing::warn;

pub async fn list(args: MixinsListArgs) -> Result<()> {
    let config = load_config()?;
    let ctx = client_context(&config);
    let runner = mixin_runner(&config);

    let mut mixins = Vec::new();
    for name in package::list_installed(&runner)? {
        match package::get_metadata(&runner, &ctx, &name).await {
            Ok(metadata) => mixins.push(metadata),
            Err(e) => {
                warn!("Could not get the version of mixin {}: {:#}", name, e);
                mixins.push(PackageMetadata {
                    name,
                    ..Default::default()
                });
            }
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&mixins)?);
        return Ok(());
    }

    if mixins.is_empty() {
        output::info(&format!(
            "No mixins are installed in {}",
            runner.mixins_dir().display()
        ));
        return Ok(());
    }

    output::header("Installed mixins");
    for mixin in &mixins {
        output::kv(&mixin.name, &describe(mixin));
    }
    Ok(())
}

fn describe(mixin: &PackageMetadata) -> String {
    let info = &mixin.version_info;
    let mut parts = vec![if info.version.is_empty() {
        "unknown version".to_string()
    } else {
        info.version.clone()
    }];
    if !info.commit.is_empty() {
        parts.push(format!("({})", info.commit));
    }
    if !info.author.is_empty() {
        parts.push(format!("by {}", info.author));
    }
    parts.join(" ")
}
