//! Reconcile the manifest's image references with what was actually
//! published, including any relocation to another registry

use anyhow::{anyhow, Context, Result};
use porter_cnab::Bundle;
use porter_core::manifest::MappedImage;
use porter_core::{CnabPaths, Manifest, OciReference};
use std::collections::BTreeMap;
use std::fs;
use tracing::debug;

/// Original image reference to the reference it was relocated to
pub type RelocationMap = BTreeMap<String, String>;

/// Read the relocation mapping, empty when the bundle was not relocated
pub fn load_relocation_mapping(paths: &CnabPaths) -> Result<RelocationMap> {
    let path = paths.relocation_mapping();
    let data = match fs::read(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(RelocationMap::new()),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("could not read the relocation mapping {}", path.display()))
        }
    };
    serde_json::from_slice(&data)
        .with_context(|| format!("could not parse the relocation mapping {}", path.display()))
}

/// Point `manifest.image` at the digest of the installer image the bundle
/// was published with, then apply any relocation
pub fn resolve_invocation_image(
    manifest: &mut Manifest,
    bundle: &Bundle,
    relocation: &RelocationMap,
) -> Result<()> {
    let published = bundle
        .invocation_images
        .iter()
        .find(|i| !i.content_digest.is_empty() && i.image_type == "docker");
    if let Some(image) = published {
        let reference = OciReference::parse(&image.image)
            .with_context(|| format!("unable to parse the installer image {}", image.image))?;
        manifest.image = reference
            .with_digest(&image.content_digest)
            .with_context(|| format!("invalid digest for the installer image {}", image.image))?
            .to_string();
    }

    if let Some(relocated) = relocation.get(&manifest.image) {
        debug!("Installer image {} was relocated to {}", manifest.image, relocated);
        manifest.image = relocated.clone();
    }
    Ok(())
}

/// Update every manifest image from the bundle's image map. An image in the
/// bundle that the manifest does not declare is an error.
pub fn resolve_images(
    manifest: &mut Manifest,
    bundle: &Bundle,
    relocation: &RelocationMap,
) -> Result<()> {
    for (alias, image) in &bundle.images {
        let mapped = manifest
            .images
            .get_mut(alias)
            .ok_or_else(|| anyhow!("unable to find image in porter manifest: {}", alias))?;

        mapped.digest = image.base.content_digest.clone();
        let reference = relocation
            .get(&image.base.image)
            .unwrap_or(&image.base.image);
        resolve_image(mapped, reference)
            .with_context(|| format!("unable to resolve image {}", alias))?;
    }
    Ok(())
}

fn resolve_image(image: &mut MappedImage, reference: &str) -> Result<()> {
    let parsed = OciReference::parse(reference)?;
    image.repository = parsed.repository();
    if let Some(digest) = parsed.digest() {
        image.digest = digest.to_string();
    }
    if let Some(tag) = parsed.tag() {
        image.tag = tag.to_string();
    } else if parsed.is_repository_only() {
        image.tag = "latest".to_string();
    }
    Ok(())
}
