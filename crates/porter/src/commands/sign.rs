//! Sign and verify commands

use super::load_config;
use crate::cli::SignArgs;
use crate::output;
use anyhow::Result;
use porter_plugins::{PluginLoader, Signer};
use std::sync::Arc;
use tracing::warn;

pub async fn sign(args: SignArgs) -> Result<()> {
    let mut signer = signer()?;
    let result = signer.sign(&args.reference).await;
    close(&mut signer).await;
    result?;
    output::success(&format!("Signed {}", args.reference));
    Ok(())
}

pub async fn verify(args: SignArgs) -> Result<()> {
    let mut signer = signer()?;
    let result = signer.verify(&args.reference).await;
    close(&mut signer).await;
    result?;
    output::success(&format!("Verified the signature of {}", args.reference));
    Ok(())
}

fn signer() -> Result<Signer> {
    let config = load_config()?;
    Ok(Signer::new(Arc::new(PluginLoader::new(config))))
}

async fn close(signer: &mut Signer) {
    if let Err(e) = signer.close().await {
        warn!("{:#}", e);
    }
}
