//! Porter CLI - build and run CNAB bundles
//!
//! This is the main entry point for the porter command-line interface.

mod cli;
mod commands;
mod output;
mod version;

use anyhow::Result;
use clap::Parser;
use porter_mixins::MixinError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands, DependenciesCommands, MixinsCommands, PluginCommands};

#[tokio::main]
async fn main() {
    // Initialize rustls crypto provider (required for rustls 0.23+)
    // This must be done before any TLS operations
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cli = Cli::parse();

    let debug = std::env::var("PORTER_DEBUG").is_ok_and(|v| v == "true");
    init_tracing(cli.verbose, cli.quiet, debug);

    if let Err(err) = run(cli).await {
        output::error(&format!("{:#}", err));
        std::process::exit(exit_code(&err));
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Version(args) => commands::version::run(args),
        Commands::Build(args) => commands::build::run(args).await,
        Commands::Run(args) => commands::run::run(args).await,
        Commands::Lint(args) => commands::lint::run(args).await,
        Commands::Mixins(MixinsCommands::List(args)) => commands::mixins::list(args).await,
        Commands::Dependencies(DependenciesCommands::Resolve(args)) => {
            commands::dependencies::resolve(args).await
        }
        Commands::Sign(args) => commands::sign::sign(args).await,
        Commands::Verify(args) => commands::sign::verify(args).await,
        Commands::Sbom(args) => commands::sbom::run(args).await,
        Commands::Plugin(PluginCommands::Run(args)) => commands::plugin::run(args).await,
    }
}

/// A failed mixin's exit code becomes porter's own, so the CNAB driver sees
/// what the mixin reported
fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|e| e.downcast_ref::<MixinError>().and_then(MixinError::exit_code))
        .filter(|code| *code != 0)
        .unwrap_or(1)
}

/// Initialize tracing with appropriate verbosity. Logs go to stderr so that
/// stdout stays free for command output and the plugin protocol.
fn init_tracing(verbose: u8, quiet: bool, debug: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 if debug => EnvFilter::new("debug"),
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
