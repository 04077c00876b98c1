//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Porter - build and run CNAB bundles
#[derive(Parser, Debug)]
#[command(name = "porter")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show version information
    Version(VersionArgs),

    /// Build the bundle descriptor and installer Dockerfile
    Build(BuildArgs),

    /// Execute an action of the bundle (runs inside the installer image)
    Run(RunArgs),

    /// Check the manifest with each of its mixins
    Lint(LintArgs),

    /// Mixin management
    #[command(subcommand)]
    Mixins(MixinsCommands),

    /// Bundle dependency management
    #[command(subcommand)]
    Dependencies(DependenciesCommands),

    /// Sign a bundle or image with the configured signing plugin
    Sign(SignArgs),

    /// Verify the signature of a bundle or image
    Verify(SignArgs),

    /// Generate a software bill of materials for an image
    Sbom(SbomArgs),

    /// Serve porter's built-in plugins
    #[command(subcommand, hide = true)]
    Plugin(PluginCommands),
}

// Version command
#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ManifestArgs {
    /// Path to the porter manifest
    #[arg(short, long, default_value = "porter.yaml")]
    pub file: Utf8PathBuf,

    /// Build context directory
    #[arg(short, long, default_value = ".")]
    pub dir: Utf8PathBuf,
}

impl ManifestArgs {
    /// The manifest path, relative paths resolved against the build context
    pub fn manifest_path(&self) -> Utf8PathBuf {
        if self.file.is_absolute() {
            self.file.clone()
        } else {
            self.dir.join(&self.file)
        }
    }
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,

    /// Override the bundle reference, REGISTRY/NAME:TAG
    #[arg(long)]
    pub reference: Option<String>,

    /// Rebuild even when the existing bundle is up to date
    #[arg(long)]
    pub no_cache: bool,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// The action to execute
    #[arg(long, env = "CNAB_ACTION")]
    pub action: String,

    /// Path to the manifest inside the installer image
    #[arg(short, long)]
    pub file: Option<Utf8PathBuf>,
}

#[derive(Args, Debug)]
pub struct LintArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// Mixins commands
#[derive(Subcommand, Debug)]
pub enum MixinsCommands {
    /// List installed mixins
    List(MixinsListArgs),
}

#[derive(Args, Debug)]
pub struct MixinsListArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// Dependencies commands
#[derive(Subcommand, Debug)]
pub enum DependenciesCommands {
    /// Resolve each dependency to a concrete bundle reference
    Resolve(ResolveArgs),
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Path to the bundle descriptor
    #[arg(long, default_value = ".cnab/bundle.json")]
    pub bundle: Utf8PathBuf,

    /// Talk to registries over plain HTTP
    #[arg(long)]
    pub insecure_registry: bool,

    /// Bearer token for registry requests
    #[arg(long, env = "PORTER_REGISTRY_TOKEN", hide_env_values = true)]
    pub registry_token: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct SignArgs {
    /// Reference of the bundle or image
    pub reference: String,
}

#[derive(Args, Debug)]
pub struct SbomArgs {
    /// Reference of the image
    pub reference: String,

    /// Where to write the SBOM
    #[arg(short, long)]
    pub output: Utf8PathBuf,

    /// Talk to the registry over plain HTTP
    #[arg(long)]
    pub insecure_registry: bool,
}

#[derive(Subcommand, Debug)]
pub enum PluginCommands {
    /// Serve a built-in plugin over stdio
    Run(PluginRunArgs),
}

#[derive(Args, Debug)]
pub struct PluginRunArgs {
    /// Plugin key, e.g. signing.porter.cosign
    pub key: String,
}
