//! Reading porter.yaml from disk

use super::{
    CredentialDefinition, CustomActionDefinition, Dependencies, Maintainer, Manifest, MappedImage,
    MixinDeclaration, OutputDefinition, ParameterDefinition, RequiredExtension, StateVariable,
    Steps,
};
use crate::error::{Error, Result};
use crate::template;
use serde::Deserialize;
use serde_yaml_ng::Value as YamlValue;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Manifest schema versions this build understands
pub const SUPPORTED_SCHEMA_VERSIONS: &[&str] = &["1.0.0-alpha.1", "1.0.0"];

/// Top-level keys that used to be user-specified and are now ignored
pub const DEPRECATED_KEYS: &[&str] = &["invocationImage", "tag"];

/// Typed view of the keys with dedicated meaning; everything else lands in `rest`
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestDocument {
    #[serde(default)]
    schema_version: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    maintainers: Vec<Maintainer>,
    #[serde(default)]
    registry: String,
    #[serde(default)]
    reference: String,
    #[serde(default)]
    dockerfile: String,
    #[serde(default)]
    mixins: Vec<MixinDeclaration>,
    #[serde(default)]
    install: Option<Steps>,
    #[serde(default)]
    upgrade: Option<Steps>,
    #[serde(default)]
    uninstall: Option<Steps>,
    #[serde(default)]
    custom_actions: BTreeMap<String, CustomActionDefinition>,
    #[serde(default)]
    parameters: Vec<ParameterDefinition>,
    #[serde(default)]
    credentials: Vec<CredentialDefinition>,
    #[serde(default)]
    outputs: Vec<OutputDefinition>,
    #[serde(default)]
    dependencies: Option<Dependencies>,
    #[serde(default)]
    images: BTreeMap<String, MappedImage>,
    #[serde(default)]
    custom: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    required: Vec<RequiredExtension>,
    #[serde(default)]
    state: Vec<StateVariable>,

    #[serde(flatten)]
    rest: BTreeMap<String, YamlValue>,
}

impl Manifest {
    /// Read a manifest from disk without validating it
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::manifest_not_found(path.display().to_string()));
        }
        debug!("Loading manifest from {}", path.display());

        let data = std::fs::read(path)?;
        let mut manifest = Self::from_bytes(&data)?;
        manifest.manifest_path = path.display().to_string();
        Ok(manifest)
    }

    /// Read and validate a manifest, filling in derived defaults
    pub fn load_validated(path: impl AsRef<Path>) -> Result<Self> {
        let mut manifest = Self::load(path)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Parse a manifest from its raw bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let doc: ManifestDocument = serde_yaml_ng::from_slice(data).map_err(|e| {
            Error::invalid_manifest(format!(
                "unsupported property set or a custom action is defined incorrectly: {}",
                e
            ))
        })?;
        let tree: YamlValue = serde_yaml_ng::from_slice(data)?;

        let mut custom_actions = BTreeMap::new();
        for (key, chunk) in doc.rest {
            if DEPRECATED_KEYS.contains(&key.as_str()) {
                warn!(
                    "The {:?} field has been deprecated and can no longer be user-specified; ignoring.",
                    key
                );
                continue;
            }
            let steps: Steps = serde_yaml_ng::from_value(chunk).map_err(|e| {
                Error::invalid_manifest(format!(
                    "unsupported property set or a custom action is defined incorrectly: \
                     error unmarshaling custom action {}: {}",
                    key, e
                ))
            })?;
            custom_actions.insert(key, steps);
        }

        let mut manifest = Manifest {
            schema_version: doc.schema_version,
            name: doc.name,
            description: doc.description,
            version: doc.version,
            maintainers: doc.maintainers,
            registry: doc.registry,
            reference: doc.reference,
            dockerfile: doc.dockerfile,
            mixins: doc.mixins,
            install: doc.install,
            upgrade: doc.upgrade,
            uninstall: doc.uninstall,
            custom_actions,
            custom_action_definitions: doc.custom_actions,
            parameters: doc.parameters,
            credentials: doc.credentials,
            outputs: doc.outputs,
            dependencies: doc.dependencies.map(|d| d.0).unwrap_or_default(),
            images: doc.images,
            custom: doc.custom,
            required: doc.required,
            state: doc.state,
            raw: data.to_vec(),
            tree,
            ..Default::default()
        };

        let text = String::from_utf8_lossy(data);
        let refs = template::scan_references(manifest.template_prefix(), &text).map_err(|e| {
            Error::invalid_manifest(format!(
                "error parsing the templating used in the manifest: {}",
                e
            ))
        })?;
        manifest.template_variables = refs.variables;

        Ok(manifest)
    }
}
