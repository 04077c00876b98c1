//! Dependency commands

use crate::cli::ResolveArgs;
use crate::output;
use anyhow::{Context, Result};
use porter_cnab::{Bundle, DependencyLock, DependencyResolver, RegistryClient};
use serde_json::json;

pub async fn resolve(args: ResolveArgs) -> Result<()> {
    let bundle = Bundle::load(&args.bundle)
        .with_context(|| format!("could not load the bundle {}", args.bundle))?;

    let mut registry = RegistryClient::new()?.insecure(args.insecure_registry);
    if let Some(token) = args.registry_token.filter(|t| !t.is_empty()) {
        registry = registry.with_token(token);
    }
    let locks = DependencyResolver::new(&registry)
        .resolve_dependencies(&bundle)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&to_json(&locks))?);
    } else if locks.is_empty() {
        output::info(&format!("{} has no dependencies", bundle.name));
    } else {
        output::header("Dependencies, in install order");
        for lock in &locks {
            output::kv(&lock.alias, &lock.reference);
        }
    }
    Ok(())
}

fn to_json(locks: &[DependencyLock]) -> serde_json::Value {
    locks
        .iter()
        .map(|lock| json!({"alias": lock.alias, "reference": lock.reference}))
        .collect()
}
