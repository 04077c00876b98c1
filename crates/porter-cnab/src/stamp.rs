//! Porter metadata embedded in bundle.json under `sh.porter`

use crate::bundle::{Bundle, PORTER_STAMP_KEY};
use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Version of a mixin used to build the bundle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixinRecord {
    pub version: String,
}

/// Records what went into a build so a later build can tell whether the
/// bundle is stale
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stamp {
    /// Digest over the manifest, the porter version and the mixin versions
    pub manifest_digest: String,

    #[serde(default)]
    pub mixins: BTreeMap<String, MixinRecord>,

    /// The porter.yaml as written, base64 encoded
    #[serde(rename = "manifest", default)]
    pub encoded_manifest: String,

    /// Porter that built the bundle
    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub commit: String,
}

impl Stamp {
    /// Stamp for a manifest built with the given mixin versions
    pub fn new(
        manifest: &[u8],
        mixins: &BTreeMap<String, String>,
        porter_version: &str,
        porter_commit: &str,
    ) -> Self {
        Self {
            manifest_digest: digest_manifest(manifest, porter_version, mixins),
            mixins: mixins
                .iter()
                .map(|(name, version)| {
                    (
                        name.clone(),
                        MixinRecord {
                            version: version.clone(),
                        },
                    )
                })
                .collect(),
            encoded_manifest: BASE64.encode(manifest),
            version: porter_version.to_string(),
            commit: porter_commit.to_string(),
        }
    }

    /// Read the stamp back out of a bundle
    pub fn load(bundle: &Bundle) -> Result<Self> {
        let data = bundle
            .custom
            .get(PORTER_STAMP_KEY)
            .ok_or_else(|| anyhow!("the bundle does not have a porter stamp under {}", PORTER_STAMP_KEY))?;
        serde_json::from_value(data.clone())
            .with_context(|| format!("could not unmarshal the porter stamp {}", data))
    }

    /// Store the stamp in the bundle's custom section
    pub fn write_to(&self, bundle: &mut Bundle) -> Result<()> {
        let value = serde_json::to_value(self).context("could not marshal the porter stamp")?;
        bundle.custom.insert(PORTER_STAMP_KEY.to_string(), value);
        Ok(())
    }

    /// The original porter.yaml bytes
    pub fn decode_manifest(&self) -> Result<Vec<u8>> {
        if self.encoded_manifest.is_empty() {
            bail!("no Porter manifest was embedded in the bundle");
        }
        BASE64
            .decode(&self.encoded_manifest)
            .with_context(|| format!("could not base64 decode the manifest in the stamp\n{}", self.encoded_manifest))
    }

    /// Rebuilding `manifest` with these mixins and this porter would produce
    /// a different digest
    pub fn is_stale(
        &self,
        manifest: &[u8],
        mixins: &BTreeMap<String, String>,
        porter_version: &str,
    ) -> bool {
        self.manifest_digest != digest_manifest(manifest, porter_version, mixins)
    }
}

/// `sha256(manifest || porter-version || name || version ...)`, hex encoded,
/// with mixins taken in name order
pub fn digest_manifest(
    manifest: &[u8],
    porter_version: &str,
    mixins: &BTreeMap<String, String>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(manifest);
    hasher.update(porter_version.as_bytes());
    for (name, version) in mixins {
        hasher.update(name.as_bytes());
        hasher.update(version.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
