//! CLI command implementations

pub mod build;
pub mod dependencies;
pub mod lint;
pub mod mixins;
pub mod plugin;
pub mod run;
pub mod sbom;
pub mod sign;
pub mod version;

use anyhow::{Context, Result};
use porter_core::{ConfigLoader, PorterConfig, ProcessContext};
use porter_mixins::MixinRunner;

/// Load the porter configuration from the porter home directory
pub(crate) fn load_config() -> Result<PorterConfig> {
    ConfigLoader::new()
        .and_then(|loader| loader.load())
        .context("could not load the porter configuration")
}

/// Process context for invoking mixins on the client
pub(crate) fn client_context(config: &PorterConfig) -> ProcessContext {
    let mut ctx = ProcessContext::from_env();
    ctx.debug |= config.debug;
    ctx
}

pub(crate) fn mixin_runner(config: &PorterConfig) -> MixinRunner {
    MixinRunner::new(config.mixins_dir())
}
