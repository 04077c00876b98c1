use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Extension describing where parameter values come from
pub const PARAMETER_SOURCES_KEY: &str = "io.cnab.parameter-sources";

/// Source type: an output of the bundle's previous run
pub const SOURCE_TYPE_OUTPUT: &str = "output";

/// Source type: an output of a dependency
pub const SOURCE_TYPE_DEPENDENCY_OUTPUT: &str = "dependencies.output";

/// Alternate spelling of [`SOURCE_TYPE_DEPENDENCY_OUTPUT`] accepted on read
const SOURCE_TYPE_DEPENDENCY_OUTPUT_ALIAS: &str = "dependencyOutput";

/// Parameter name to its sources
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSources(pub BTreeMap<String, ParameterSource>);

impl ParameterSources {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Populate `parameter` from an output of this bundle
    pub fn set_parameter_from_output(&mut self, parameter: &str, output: &str) {
        self.0.insert(
            parameter.to_string(),
            ParameterSource::single(
                SOURCE_TYPE_OUTPUT,
                ParameterSourceDefinition::Output {
                    name: output.to_string(),
                },
            ),
        );
    }

    /// Populate `parameter` from an output of a dependency
    pub fn set_parameter_from_dependency_output(
        &mut self,
        parameter: &str,
        dependency: &str,
        output: &str,
    ) {
        self.0.insert(
            parameter.to_string(),
            ParameterSource::single(
                SOURCE_TYPE_DEPENDENCY_OUTPUT,
                ParameterSourceDefinition::DependencyOutput {
                    dependency: dependency.to_string(),
                    name: output.to_string(),
                },
            ),
        );
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSource {
    /// Source types in the order they should be tried
    #[serde(default)]
    pub priority: Vec<String>,

    #[serde(deserialize_with = "deserialize_sources")]
    pub sources: BTreeMap<String, ParameterSourceDefinition>,
}

impl ParameterSource {
    fn single(source_type: &str, definition: ParameterSourceDefinition) -> Self {
        Self {
            priority: vec![source_type.to_string()],
            sources: BTreeMap::from([(source_type.to_string(), definition)]),
        }
    }

    /// Sources in priority order; every source when no priority is given
    pub fn by_priority(&self) -> Vec<&ParameterSourceDefinition> {
        if self.priority.is_empty() {
            return self.sources.values().collect();
        }
        self.priority
            .iter()
            .map(|t| match t.as_str() {
                SOURCE_TYPE_DEPENDENCY_OUTPUT_ALIAS => SOURCE_TYPE_DEPENDENCY_OUTPUT,
                other => other,
            })
            .filter_map(|t| self.sources.get(t))
            .collect()
    }
}

/// Where a single parameter value comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ParameterSourceDefinition {
    DependencyOutput { dependency: String, name: String },
    Output { name: String },
}

#[derive(Deserialize)]
struct OutputSource {
    name: String,
}

#[derive(Deserialize)]
struct DependencyOutputSource {
    dependency: String,
    name: String,
}

/// The map key decides how each definition is read
fn deserialize_sources<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, ParameterSourceDefinition>, D::Error> {
    let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
    let mut sources = BTreeMap::new();
    for (key, value) in raw {
        let invalid = |e: serde_json::Error| {
            de::Error::custom(format!(
                "invalid parameter source definition for key {}: {}",
                key, e
            ))
        };
        match key.as_str() {
            SOURCE_TYPE_OUTPUT => {
                let s: OutputSource = serde_json::from_value(value).map_err(invalid)?;
                sources.insert(key, ParameterSourceDefinition::Output { name: s.name });
            }
            SOURCE_TYPE_DEPENDENCY_OUTPUT | SOURCE_TYPE_DEPENDENCY_OUTPUT_ALIAS => {
                let s: DependencyOutputSource = serde_json::from_value(value).map_err(invalid)?;
                sources.insert(
                    SOURCE_TYPE_DEPENDENCY_OUTPUT.to_string(),
                    ParameterSourceDefinition::DependencyOutput {
                        dependency: s.dependency,
                        name: s.name,
                    },
                );
            }
            _ => {
                return Err(de::Error::custom(format!(
                    "unsupported parameter source key {}",
                    key
                )))
            }
        }
    }
    Ok(sources)
}
