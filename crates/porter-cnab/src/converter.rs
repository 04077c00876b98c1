//! Compiling a porter.yaml into a CNAB bundle descriptor

use crate::bundle::{
    Action, BaseImage, Bundle, Credential, Image, Output, Parameter, CNAB_SCHEMA_VERSION,
    PORTER_INTERNAL,
};
use crate::extensions::{
    get_supported_extension, Dependencies, Dependency, DependencyVersion, ParameterSources,
    DEPENDENCIES_KEY, FILE_PARAMETERS_KEY, PARAMETER_SOURCES_KEY,
};
use crate::stamp::Stamp;
use anyhow::{Context, Result};
use porter_core::manifest::{Location, Manifest, OutputDefinition, ParameterDefinition};
use porter_core::paths::{resolve_path, BUNDLE_OUTPUTS_DIR, STATE_ARCHIVE_IN};
use porter_core::utils::{dependency_output_wiring_name, env_var_name, output_wiring_name};
use porter_core::Schema;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

/// Name of the built-in parameter and output carrying the state bag
pub const PORTER_STATE: &str = "porter-state";

/// Name of the built-in debug parameter
pub const PORTER_DEBUG: &str = "porter-debug";

const GENERATED_BUNDLE_ID: &str = "https://getporter.org/generated-bundle/";
const STATE_DESCRIPTION: &str =
    "Supports persisting state for bundles. Porter internal parameter that should not be set manually.";

/// Builds a [`Bundle`] from a validated [`Manifest`]
pub struct ManifestConverter<'a> {
    manifest: &'a Manifest,
    image_digests: BTreeMap<String, String>,
    mixin_versions: BTreeMap<String, String>,
    porter_version: String,
    porter_commit: String,
}

impl<'a> ManifestConverter<'a> {
    pub fn new(manifest: &'a Manifest) -> Self {
        Self {
            manifest,
            image_digests: BTreeMap::new(),
            mixin_versions: BTreeMap::new(),
            porter_version: String::new(),
            porter_commit: String::new(),
        }
    }

    /// Content digests of built images, keyed by image reference
    pub fn with_image_digests(mut self, digests: BTreeMap<String, String>) -> Self {
        self.image_digests = digests;
        self
    }

    /// Installed version of each mixin the manifest uses
    pub fn with_mixin_versions(mut self, versions: BTreeMap<String, String>) -> Self {
        self.mixin_versions = versions;
        self
    }

    /// Porter doing the build, recorded in the stamp
    pub fn with_porter_version(mut self, version: impl Into<String>, commit: impl Into<String>) -> Self {
        self.porter_version = version.into();
        self.porter_commit = commit.into();
        self
    }

    /// Compile the manifest
    pub fn to_bundle(&self) -> Result<Bundle> {
        let m = self.manifest;
        let mut bundle = Bundle {
            schema_version: CNAB_SCHEMA_VERSION.to_string(),
            name: m.name.clone(),
            version: m.version.clone(),
            description: m.description.clone(),
            maintainers: m.maintainers.clone(),
            invocation_images: vec![BaseImage {
                image: m.image.clone(),
                image_type: "docker".to_string(),
                content_digest: self.image_digests.get(&m.image).cloned().unwrap_or_default(),
                ..Default::default()
            }],
            actions: self.generate_custom_action_definitions(),
            ..Default::default()
        };

        self.generate_parameters(&mut bundle);
        self.generate_outputs(&mut bundle);
        bundle.credentials = self.generate_credentials();
        bundle.images = self.generate_images();

        let sources = self.generate_parameter_sources(&mut bundle);
        bundle.custom = self.generate_custom_extensions(&sources)?;
        bundle.required_extensions = self.generate_required_extensions(&bundle);

        self.generate_stamp()
            .write_to(&mut bundle)
            .context("could not stamp the bundle")?;
        Ok(bundle)
    }

    /// Stamp recording the manifest and the mixins it was built with
    pub fn generate_stamp(&self) -> Stamp {
        let used: BTreeMap<String, String> = self
            .manifest
            .mixin_names()
            .into_iter()
            .map(|name| {
                let version = self.mixin_versions.get(&name).cloned().unwrap_or_default();
                (name, version)
            })
            .collect();
        Stamp::new(&self.manifest.raw, &used, &self.porter_version, &self.porter_commit)
    }

    fn generate_custom_action_definitions(&self) -> BTreeMap<String, Action> {
        let m = self.manifest;
        if m.custom_actions.is_empty() {
            return BTreeMap::new();
        }

        let mut actions: BTreeMap<String, Action> = m
            .custom_action_definitions
            .iter()
            .map(|(name, def)| {
                (
                    name.clone(),
                    Action {
                        description: def.description.clone(),
                        modifies: def.modifies_resources,
                        stateless: def.stateless,
                    },
                )
            })
            .collect();

        for name in m.custom_actions.keys() {
            if !actions.contains_key(name) {
                actions.insert(name.clone(), default_action(name));
            }
        }
        actions
    }

    fn generate_parameters(&self, bundle: &mut Bundle) {
        let defaults = default_parameters();
        for param in self.manifest.parameters.iter().chain(defaults.iter()) {
            let mut param = param.clone();
            if param.exempt_from_install() {
                param.apply_to = self.manifest.inferred_apply_to();
            }

            let destination = if param.destination.is_empty() {
                Location {
                    env: env_var_name(&param.name),
                    path: String::new(),
                }
            } else {
                Location {
                    env: param.destination.env.clone(),
                    path: resolve_path(&param.destination.path),
                }
            };

            let mut schema = param.schema.clone();
            if param.sensitive {
                schema.write_only = Some(true);
            }
            if schema.schema_type.is_none() {
                let default_type = if param.destination.path.is_empty() {
                    "string"
                } else {
                    porter_core::schema::FILE_TYPE
                };
                debug!("Defaulting the type of parameter {} to {}", param.name, default_type);
                schema.schema_type = Some(default_type.to_string());
            }

            let kind = if param.is_state { "state" } else { "parameter" };
            let definition = add_definition(&mut bundle.definitions, &param.name, kind, &schema);

            bundle.parameters.insert(
                param.name.clone(),
                Parameter {
                    definition,
                    description: param.schema.description.clone().unwrap_or_default(),
                    apply_to: param.apply_to.clone(),
                    // state parameters are optional and never have a default
                    required: param.schema.default.is_none() && !param.is_state,
                    destination: Some(destination),
                },
            );
        }
    }

    fn generate_outputs(&self, bundle: &mut Bundle) {
        let defaults = default_outputs();
        for output in self.manifest.outputs.iter().chain(defaults.iter()) {
            let mut schema = output.schema.clone();
            if output.sensitive {
                schema.write_only = Some(true);
            }
            if schema.schema_type.is_none() {
                let default_type = if output.path.is_empty() {
                    "string"
                } else {
                    porter_core::schema::FILE_TYPE
                };
                debug!("Defaulting the type of output {} to {}", output.name, default_type);
                schema.schema_type = Some(default_type.to_string());
            }

            let kind = if output.is_state { "state" } else { "output" };
            let definition = add_definition(&mut bundle.definitions, &output.name, kind, &schema);

            bundle.outputs.insert(
                output.name.clone(),
                Output {
                    definition,
                    description: output.schema.description.clone().unwrap_or_default(),
                    apply_to: output.apply_to.clone(),
                    path: format!("{}/{}", BUNDLE_OUTPUTS_DIR, output.name),
                },
            );
        }
    }

    fn generate_credentials(&self) -> BTreeMap<String, Credential> {
        self.manifest
            .credentials
            .iter()
            .map(|cred| {
                (
                    cred.name.clone(),
                    Credential {
                        description: cred.description.clone(),
                        required: cred.required,
                        location: Location {
                            path: resolve_path(&cred.location.path),
                            env: cred.location.env.clone(),
                        },
                        apply_to: cred.apply_to.clone(),
                    },
                )
            })
            .collect()
    }

    fn generate_images(&self) -> BTreeMap<String, Image> {
        self.manifest
            .images
            .iter()
            .map(|(alias, img)| {
                let reference = if !img.digest.is_empty() {
                    format!("{}@{}", img.repository, img.digest)
                } else if !img.tag.is_empty() {
                    format!("{}:{}", img.repository, img.tag)
                } else {
                    format!("{}:latest", img.repository)
                };
                let image_type = if img.image_type.is_empty() {
                    "docker".to_string()
                } else {
                    img.image_type.clone()
                };
                (
                    alias.clone(),
                    Image {
                        base: BaseImage {
                            image: reference,
                            image_type,
                            content_digest: img.digest.clone(),
                            size: (img.size > 0).then_some(img.size),
                            media_type: img.media_type.clone(),
                            labels: img.labels.clone(),
                        },
                        description: img.description.clone(),
                    },
                )
            })
            .collect()
    }

    /// Dependencies extension payload, in declaration order
    fn generate_dependencies(&self) -> Option<Dependencies> {
        if self.manifest.dependencies.is_empty() {
            return None;
        }
        let mut deps = Dependencies::default();
        for dep in &self.manifest.dependencies {
            let version = (!dep.versions.is_empty() || dep.allow_prereleases).then(|| {
                DependencyVersion {
                    ranges: dep.versions.clone(),
                    allow_prereleases: dep.allow_prereleases,
                }
            });
            deps.sequence.push(dep.name.clone());
            deps.requires.insert(
                dep.name.clone(),
                Dependency {
                    name: dep.name.clone(),
                    bundle: dep.reference.clone(),
                    version,
                },
            );
        }
        Some(deps)
    }

    /// Parameter sources from `source` on parameters, the state bag and
    /// templated output references. Templated references also add their
    /// wiring parameters to the bundle.
    fn generate_parameter_sources(&self, bundle: &mut Bundle) -> ParameterSources {
        let mut sources = ParameterSources::default();

        for param in &self.manifest.parameters {
            if param.source.output.is_empty() {
                continue;
            }
            if param.source.dependency.is_empty() {
                sources.set_parameter_from_output(&param.name, &param.source.output);
            } else {
                sources.set_parameter_from_dependency_output(
                    &param.name,
                    &param.source.dependency,
                    &param.source.output,
                );
            }
        }

        sources.set_parameter_from_output(PORTER_STATE, PORTER_STATE);

        for output in self.manifest.templated_outputs() {
            let wiring = output_wiring_name(&output.name);
            let description = format!(
                "Wires up the {} output for use as a parameter. Porter internal parameter that should not be set manually.",
                output.name
            );
            let mut definition = bundle
                .output_definition(&output.name)
                .cloned()
                .unwrap_or_default();
            definition.id = Some(format!("{}#porter-parameter-source-definition", GENERATED_BUNDLE_ID));
            definition.comment = Some(PORTER_INTERNAL.to_string());

            bundle.definitions.insert(wiring.clone(), definition);
            bundle
                .parameters
                .insert(wiring.clone(), wiring_parameter(&wiring, description));
            sources.set_parameter_from_output(&wiring, &output.name);
        }

        for (dependency, output) in self.manifest.templated_dependency_outputs() {
            let wiring = dependency_output_wiring_name(&dependency, &output);
            let description = format!(
                "Wires up the {} dependency {} output for use as a parameter. Porter internal parameter that should not be set manually.",
                dependency, output
            );
            // any type, the dependency's bundle is not known at build time
            let definition = Schema {
                id: Some(format!("{}#porter-parameter-source-definition", GENERATED_BUNDLE_ID)),
                comment: Some(PORTER_INTERNAL.to_string()),
                ..Default::default()
            };

            bundle.definitions.insert(wiring.clone(), definition);
            bundle
                .parameters
                .insert(wiring.clone(), wiring_parameter(&wiring, description));
            sources.set_parameter_from_dependency_output(&wiring, &dependency, &output);
        }

        sources
    }

    fn generate_custom_extensions(
        &self,
        sources: &ParameterSources,
    ) -> Result<BTreeMap<String, serde_json::Value>> {
        let mut custom = BTreeMap::from([(FILE_PARAMETERS_KEY.to_string(), json!({}))]);

        for (key, value) in &self.manifest.custom {
            custom.insert(key.clone(), value.clone());
        }

        if let Some(deps) = self.generate_dependencies() {
            let value = serde_json::to_value(deps)
                .context("could not marshal the dependencies extension")?;
            custom.insert(DEPENDENCIES_KEY.to_string(), value);
        }

        if !sources.is_empty() {
            let value = serde_json::to_value(sources)
                .context("could not marshal the parameter sources extension")?;
            custom.insert(PARAMETER_SOURCES_KEY.to_string(), value);
        }

        for ext in &self.manifest.required {
            custom.insert(
                lookup_extension_key(&ext.name),
                ext.config.clone().unwrap_or_else(|| json!({})),
            );
        }

        Ok(custom)
    }

    fn generate_required_extensions(&self, bundle: &Bundle) -> Vec<String> {
        let mut required = vec![FILE_PARAMETERS_KEY.to_string()];
        if bundle.has_dependencies() {
            required.push(DEPENDENCIES_KEY.to_string());
        }
        if bundle.custom.contains_key(PARAMETER_SOURCES_KEY) {
            required.push(PARAMETER_SOURCES_KEY.to_string());
        }
        for ext in &self.manifest.required {
            let key = lookup_extension_key(&ext.name);
            if !required.contains(&key) {
                required.push(key);
            }
        }
        required
    }
}

/// Add `schema` to the definitions as `<name>-<kind>`, unless the name
/// already ends with the kind. Returns the definition name.
fn add_definition(
    definitions: &mut BTreeMap<String, Schema>,
    name: &str,
    kind: &str,
    schema: &Schema,
) -> String {
    let def_name = if name.ends_with(kind) {
        name.to_string()
    } else {
        format!("{}-{}", name, kind)
    };
    definitions.insert(def_name.clone(), schema.normalized());
    def_name
}

fn wiring_parameter(wiring: &str, description: String) -> Parameter {
    Parameter {
        definition: wiring.to_string(),
        description,
        apply_to: Vec::new(),
        required: false,
        destination: Some(Location {
            env: env_var_name(wiring),
            path: String::new(),
        }),
    }
}

/// Full key of a supported extension; unknown names are used as is
fn lookup_extension_key(name: &str) -> String {
    match get_supported_extension(name) {
        Ok(ext) => ext.key.to_string(),
        Err(_) => {
            debug!("{} is not a supported extension, using it as the extension key", name);
            name.to_string()
        }
    }
}

/// Definition for a custom action used without being declared under
/// `customActions`. Well-known CNAB actions get their standard definition;
/// anything else is assumed to modify the installation.
fn default_action(action: &str) -> Action {
    let (description, modifies, stateless) = match action {
        "dry-run" | "io.cnab.dry-run" => (
            "Execute the installation in a dry-run mode, allowing to see what would happen with the given set of parameter values",
            false,
            true,
        ),
        "help" | "io.cnab.help" => ("Print an help message to the standard output", false, true),
        "log" | "io.cnab.log" => (
            "Print logs of the installed system to the standard output",
            false,
            false,
        ),
        "status" | "io.cnab.status" => (
            "Print a human readable status message to the standard output",
            false,
            false,
        ),
        "status+json" | "io.cnab.status+json" => (
            "Print a json payload describing the detailed status with the following the CNAB status schema",
            false,
            false,
        ),
        _ => (action, true, false),
    };
    Action {
        description: description.to_string(),
        modifies,
        stateless,
    }
}

fn default_parameters() -> Vec<ParameterDefinition> {
    vec![
        ParameterDefinition {
            name: PORTER_DEBUG.to_string(),
            destination: Location {
                env: "PORTER_DEBUG".to_string(),
                path: String::new(),
            },
            schema: Schema {
                id: Some(format!("{}#porter-debug", GENERATED_BUNDLE_ID)),
                comment: Some(PORTER_INTERNAL.to_string()),
                schema_type: Some("boolean".to_string()),
                description: Some(
                    "Print debug information from Porter when executing the bundle".to_string(),
                ),
                default: Some(json!(false)),
                ..Default::default()
            },
            ..Default::default()
        },
        ParameterDefinition {
            name: PORTER_STATE.to_string(),
            is_state: true,
            destination: Location {
                env: String::new(),
                path: STATE_ARCHIVE_IN.to_string(),
            },
            schema: state_schema(),
            ..Default::default()
        },
    ]
}

fn default_outputs() -> Vec<OutputDefinition> {
    vec![OutputDefinition {
        name: PORTER_STATE.to_string(),
        is_state: true,
        path: format!("{}/{}", BUNDLE_OUTPUTS_DIR, PORTER_STATE),
        schema: state_schema(),
        ..Default::default()
    }]
}

fn state_schema() -> Schema {
    Schema {
        id: Some(format!("{}#porter-state", GENERATED_BUNDLE_ID)),
        comment: Some(PORTER_INTERNAL.to_string()),
        schema_type: Some("string".to_string()),
        content_encoding: Some("base64".to_string()),
        description: Some(STATE_DESCRIPTION.to_string()),
        ..Default::default()
    }
}
