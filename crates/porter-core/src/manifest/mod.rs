//! The porter.yaml model
//!
//! A [`Manifest`] is loaded from YAML in two passes: fields with dedicated
//! keys are deserialized structurally and every remaining top-level key is
//! read as a custom action. The parsed YAML tree is kept alongside so steps
//! can be re-rendered from what the author wrote.

mod load;
mod validate;

pub use load::{DEPRECATED_KEYS, SUPPORTED_SCHEMA_VERSIONS};

use crate::schema::Schema;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use serde_yaml_ng::{Mapping, Value as YamlValue};
use std::collections::BTreeMap;
use std::fmt;

/// Core lifecycle actions every bundle understands
pub const ACTION_INSTALL: &str = "install";
pub const ACTION_UPGRADE: &str = "upgrade";
pub const ACTION_UNINSTALL: &str = "uninstall";

/// A parsed porter.yaml
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    /// Where the manifest was read from
    pub manifest_path: String,

    pub schema_version: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub maintainers: Vec<Maintainer>,

    /// OCI registry and org for the bundle
    pub registry: String,

    /// Full bundle reference, REGISTRY/NAME[:TAG]
    pub reference: String,

    /// Installer image reference, derived from the bundle reference
    pub image: String,

    /// Relative path to a Dockerfile template
    pub dockerfile: String,

    pub mixins: Vec<MixinDeclaration>,

    pub install: Option<Steps>,
    pub upgrade: Option<Steps>,
    pub uninstall: Option<Steps>,
    pub custom_actions: BTreeMap<String, Steps>,
    pub custom_action_definitions: BTreeMap<String, CustomActionDefinition>,

    pub parameters: Vec<ParameterDefinition>,
    pub credentials: Vec<CredentialDefinition>,
    pub outputs: Vec<OutputDefinition>,
    pub dependencies: Vec<Dependency>,
    pub images: BTreeMap<String, MappedImage>,
    pub custom: BTreeMap<String, serde_json::Value>,
    pub required: Vec<RequiredExtension>,
    pub state: Vec<StateVariable>,

    /// Every template variable referenced in the manifest, sorted
    pub template_variables: Vec<String>,

    /// The manifest exactly as read
    pub raw: Vec<u8>,

    /// Untyped tree of the manifest, used to re-render steps
    pub tree: YamlValue,
}

impl Manifest {
    /// Steps for `action`, including custom actions
    pub fn steps(&self, action: &str) -> Option<&Steps> {
        match action {
            ACTION_INSTALL => self.install.as_ref(),
            ACTION_UPGRADE => self.upgrade.as_ref(),
            ACTION_UNINSTALL => self.uninstall.as_ref(),
            _ => self.custom_actions.get(action),
        }
    }

    /// The authored YAML node of the step at `action[index]`
    pub fn step_node(&self, action: &str, index: usize) -> Option<&YamlValue> {
        self.tree.get(action)?.get(index)
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterDefinition> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&OutputDefinition> {
        self.outputs.iter().find(|o| o.name == name)
    }

    pub fn credential(&self, name: &str) -> Option<&CredentialDefinition> {
        self.credentials.iter().find(|c| c.name == name)
    }

    pub fn dependency(&self, name: &str) -> Option<&Dependency> {
        self.dependencies.iter().find(|d| d.name == name)
    }

    pub fn mixin(&self, name: &str) -> Option<&MixinDeclaration> {
        self.mixins.iter().find(|m| m.name == name)
    }

    /// Names of the declared mixins, in declaration order
    pub fn mixin_names(&self) -> Vec<String> {
        self.mixins.iter().map(|m| m.name.clone()).collect()
    }

    /// Template prefix matching the manifest's schema version
    pub fn template_prefix(&self) -> &'static str {
        crate::template::prefix_for_schema(&self.schema_version)
    }

    /// Bundle-level outputs referenced from templates as `bundle.outputs.<name>`
    pub fn templated_outputs(&self) -> Vec<&OutputDefinition> {
        self.template_variables
            .iter()
            .filter_map(|v| v.strip_prefix("bundle.outputs."))
            .filter_map(|name| self.output(name))
            .collect()
    }

    /// `(dependency, output)` pairs referenced from templates
    pub fn templated_dependency_outputs(&self) -> Vec<(String, String)> {
        let mut refs: Vec<(String, String)> = self
            .template_variables
            .iter()
            .filter_map(|v| v.strip_prefix("bundle.dependencies."))
            .filter_map(|rest| {
                let (dep, output) = rest.split_once(".outputs.")?;
                Some((dep.to_string(), output.to_string()))
            })
            .collect();
        refs.sort();
        refs.dedup();
        refs
    }

    /// Every action with steps: core actions first, then custom actions
    pub fn action_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for (name, steps) in [
            (ACTION_INSTALL, &self.install),
            (ACTION_UPGRADE, &self.upgrade),
            (ACTION_UNINSTALL, &self.uninstall),
        ] {
            if steps.is_some() {
                names.push(name.to_string());
            }
        }
        names.extend(self.custom_actions.keys().cloned());
        names
    }
}

/// Bundle maintainer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Maintainer {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
}

/// Where a parameter or credential is placed inside the installer image
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default, rename = "env", skip_serializing_if = "String::is_empty")]
    pub env: String,
}

impl Location {
    pub fn is_empty(&self) -> bool {
        self.path.is_empty() && self.env.is_empty()
    }
}

/// Output a parameter is sourced from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSource {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dependency: String,
    #[serde(default)]
    pub output: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDefinition {
    pub name: String,

    #[serde(default)]
    pub sensitive: bool,

    #[serde(default)]
    pub source: ParameterSource,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub apply_to: Vec<String>,

    #[serde(flatten)]
    pub destination: Location,

    #[serde(flatten)]
    pub schema: Schema,

    /// Generated from a state variable
    #[serde(skip)]
    pub is_state: bool,
}

impl ParameterDefinition {
    pub fn applies_to(&self, action: &str) -> bool {
        crate::utils::applies_to(&self.apply_to, action)
    }

    /// Sourced from an output and given neither an applyTo nor a default,
    /// so the value cannot exist before install
    pub fn exempt_from_install(&self) -> bool {
        !self.source.output.is_empty() && self.apply_to.is_empty() && self.schema.default.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialDefinition {
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default = "default_true")]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub apply_to: Vec<String>,

    #[serde(flatten)]
    pub location: Location,
}

fn default_true() -> bool {
    true
}

impl CredentialDefinition {
    pub fn applies_to(&self, action: &str) -> bool {
        crate::utils::applies_to(&self.apply_to, action)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputDefinition {
    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub apply_to: Vec<String>,

    #[serde(default)]
    pub sensitive: bool,

    /// File the mixin writes, collected as the output's value
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,

    #[serde(flatten)]
    pub schema: Schema,

    #[serde(skip)]
    pub is_state: bool,
}

impl OutputDefinition {
    pub fn applies_to(&self, action: &str) -> bool {
        crate::utils::applies_to(&self.apply_to, action)
    }
}

/// A file carried between runs in the state archive
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateVariable {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Mixin that manages the file, informational only
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mixin: String,
    #[serde(flatten)]
    pub location: Location,
}

/// An application image used by the bundle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappedImage {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_type: String,
    #[serde(default)]
    pub repository: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub digest: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub size: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub media_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tag: String,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomActionDefinition {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, rename = "modifies")]
    pub modifies_resources: bool,
    #[serde(default)]
    pub stateless: bool,
}

/// Another bundle this one depends on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependency {
    /// Alias the dependency is known by in templates
    pub name: String,
    /// REGISTRY/NAME, optionally with :TAG
    pub reference: String,
    /// Acceptable version ranges
    pub versions: Vec<String>,
    pub allow_prereleases: bool,
    pub parameters: BTreeMap<String, String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AliasedDependency {
    tag: String,
    #[serde(default)]
    versions: Vec<String>,
    #[serde(default)]
    allow_prereleases: bool,
    #[serde(default)]
    parameters: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct RequiredDependency {
    name: String,
    bundle: BundleCriteria,
    #[serde(default)]
    parameters: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct BundleCriteria {
    reference: String,
    #[serde(default)]
    version: String,
}

/// Dependencies in either authoring shape, in the order written:
///
/// ```yaml
/// dependencies:
///   requires:
///     - name: mysql
///       bundle:
///         reference: getporter/mysql:v0.1.0
/// ```
///
/// or the alias mapping `{mysql: {tag, versions, allowPrereleases}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependencies(pub Vec<Dependency>);

impl<'de> Deserialize<'de> for Dependencies {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DepsVisitor;

        impl<'de> Visitor<'de> for DepsVisitor {
            type Value = Dependencies;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a dependencies mapping")
            }

            fn visit_unit<E: de::Error>(self) -> Result<Dependencies, E> {
                Ok(Dependencies::default())
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Dependencies, A::Error> {
                let mut deps = Vec::new();
                while let Some(key) = map.next_key::<String>()? {
                    if key == "requires" {
                        let required: Vec<RequiredDependency> = map.next_value()?;
                        deps.extend(required.into_iter().map(|r| {
                            let allow_prereleases = semver::Version::parse(
                                r.bundle.version.trim_start_matches('v'),
                            )
                            .is_ok_and(|v| !v.pre.is_empty());
                            Dependency {
                                name: r.name,
                                reference: r.bundle.reference,
                                versions: if r.bundle.version.is_empty() {
                                    Vec::new()
                                } else {
                                    vec![r.bundle.version]
                                },
                                allow_prereleases,
                                parameters: r.parameters,
                            }
                        }));
                    } else {
                        let aliased: AliasedDependency = map.next_value()?;
                        deps.push(Dependency {
                            name: key,
                            reference: aliased.tag,
                            versions: aliased.versions,
                            allow_prereleases: aliased.allow_prereleases,
                            parameters: aliased.parameters,
                        });
                    }
                }
                Ok(Dependencies(deps))
            }
        }

        deserializer.deserialize_any(DepsVisitor)
    }
}

/// A mixin used by the bundle, with optional build-time configuration
#[derive(Debug, Clone, PartialEq)]
pub struct MixinDeclaration {
    pub name: String,
    pub config: Option<YamlValue>,
}

impl MixinDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: None,
        }
    }
}

/// A required extension, optionally with configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RequiredExtension {
    pub name: String,
    pub config: Option<serde_json::Value>,
}

/// Parse `name` or `{name: config}` list entries
fn named_with_config<E: de::Error>(
    value: YamlValue,
    what: &str,
) -> Result<(String, Option<YamlValue>), E> {
    match value {
        YamlValue::String(name) => Ok((name, None)),
        YamlValue::Mapping(map) => {
            if map.is_empty() {
                return Err(E::custom(format!("{} declaration was empty", what)));
            }
            if map.len() > 1 {
                return Err(E::custom(format!(
                    "{} declaration contained more than one {}",
                    what, what
                )));
            }
            let Some((key, config)) = map.into_iter().next() else {
                return Err(E::custom(format!("{} declaration was empty", what)));
            };
            let name = key
                .as_str()
                .ok_or_else(|| E::custom(format!("{} name must be a string", what)))?
                .to_string();
            Ok((name, Some(config)))
        }
        _ => Err(E::custom(format!(
            "could not parse {} declaration, expected a name or a mapping",
            what
        ))),
    }
}

impl<'de> Deserialize<'de> for MixinDeclaration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = YamlValue::deserialize(deserializer)?;
        let (name, config) = named_with_config(value, "mixin")?;
        Ok(Self { name, config })
    }
}

impl Serialize for MixinDeclaration {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.config {
            None => serializer.serialize_str(&self.name),
            Some(config) => {
                let mut map = Mapping::new();
                map.insert(YamlValue::String(self.name.clone()), config.clone());
                map.serialize(serializer)
            }
        }
    }
}

impl<'de> Deserialize<'de> for RequiredExtension {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = YamlValue::deserialize(deserializer)?;
        let (name, config) = named_with_config(value, "required extension")?;
        let config = config
            .map(serde_json::to_value)
            .transpose()
            .map_err(de::Error::custom)?;
        Ok(Self { name, config })
    }
}

/// One step of an action: `{mixin-name: body}`.
///
/// The body is opaque apart from its `description`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Step {
    pub data: Mapping,
}

impl Step {
    /// Name of the mixin that runs the step, when exactly one is named
    pub fn mixin_name(&self) -> Option<&str> {
        if self.data.len() != 1 {
            return None;
        }
        self.data.keys().next().and_then(YamlValue::as_str)
    }

    /// The mixin-specific body of the step
    pub fn body(&self) -> Option<&YamlValue> {
        self.data.values().next()
    }

    /// The step's description; an error when present but not a string
    pub fn description(&self) -> std::result::Result<Option<&str>, String> {
        match self.body().and_then(|b| b.get("description")) {
            None => Ok(None),
            Some(YamlValue::String(s)) => Ok(Some(s)),
            Some(other) => Err(format!(
                "invalid description type ({}) for mixin step ({})",
                yaml_type_name(other),
                self.mixin_name().unwrap_or_default()
            )),
        }
    }
}

pub type Steps = Vec<Step>;

fn yaml_type_name(v: &YamlValue) -> &'static str {
    match v {
        YamlValue::Null => "null",
        YamlValue::Bool(_) => "bool",
        YamlValue::Number(_) => "number",
        YamlValue::String(_) => "string",
        YamlValue::Sequence(_) => "sequence",
        YamlValue::Mapping(_) => "mapping",
        YamlValue::Tagged(_) => "tagged",
    }
}
