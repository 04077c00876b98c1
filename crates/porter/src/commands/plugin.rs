//! Serving built-in plugins to a porter host

use crate::cli::PluginRunArgs;
use anyhow::{Context, Result};
use porter_plugins::{builtin, serve_stdio, PluginKey};
use tracing::debug;

pub async fn run(args: PluginRunArgs) -> Result<()> {
    let key = PluginKey::parse(&args.key)?;
    let handler = builtin::handler_for(&key)?;
    debug!(plugin = %key, "Serving built-in plugin");
    serve_stdio(handler)
        .await
        .with_context(|| format!("plugin {} stopped unexpectedly", key))
}
