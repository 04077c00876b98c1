//! Well-known CNAB extensions
//!
//! Each [`RequiredExtension`] pairs the shorthand authors use in porter.yaml
//! with the full key it is stored under in `bundle.custom`, and knows how to
//! read its payload back into a typed value.

mod dependencies;
mod docker;
mod parameter_sources;

pub use dependencies::{Dependencies, Dependency, DependencyVersion, DEPENDENCIES_KEY};
pub use docker::{Docker, DOCKER_KEY};
pub use parameter_sources::{
    ParameterSource, ParameterSourceDefinition, ParameterSources, PARAMETER_SOURCES_KEY,
    SOURCE_TYPE_DEPENDENCY_OUTPUT, SOURCE_TYPE_OUTPUT,
};

use crate::bundle::Bundle;
use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;

/// Prefix of the extensions defined by the CNAB project
pub const OFFICIAL_EXTENSIONS_PREFIX: &str = "io.cnab.";

/// Marks a bundle whose file parameters are base64 encoded
pub const FILE_PARAMETERS_KEY: &str = "io.cnab.file-parameters";

/// An extension porter knows how to process
#[derive(Debug)]
pub struct RequiredExtension {
    pub shorthand: &'static str,
    pub key: &'static str,
    pub schema: &'static str,
    pub reader: fn(&Bundle) -> Result<ProcessedExtension>,
}

/// A typed extension payload
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessedExtension {
    Dependencies(Dependencies),
    Docker(Docker),
    FileParameters,
    ParameterSources(ParameterSources),
}

pub static DEPENDENCIES_EXTENSION: RequiredExtension = RequiredExtension {
    shorthand: "dependencies",
    key: DEPENDENCIES_KEY,
    schema: "https://cnab.io/v1/dependencies.schema.json",
    reader: read_dependencies,
};

pub static DOCKER_EXTENSION: RequiredExtension = RequiredExtension {
    shorthand: "docker",
    key: DOCKER_KEY,
    schema: "schema/io-cnab-docker.schema.json",
    reader: read_docker,
};

pub static FILE_PARAMETERS_EXTENSION: RequiredExtension = RequiredExtension {
    shorthand: "file-parameters",
    key: FILE_PARAMETERS_KEY,
    schema: "https://cnab.io/v1/file-parameters.schema.json",
    reader: read_file_parameters,
};

pub static PARAMETER_SOURCES_EXTENSION: RequiredExtension = RequiredExtension {
    shorthand: "parameter-sources",
    key: PARAMETER_SOURCES_KEY,
    schema: "https://cnab.io/v1/parameter-sources.schema.json",
    reader: read_parameter_sources,
};

/// Every extension porter supports
pub static SUPPORTED_EXTENSIONS: &[&RequiredExtension] = &[
    &DEPENDENCIES_EXTENSION,
    &DOCKER_EXTENSION,
    &FILE_PARAMETERS_EXTENSION,
    &PARAMETER_SOURCES_EXTENSION,
];

/// Look up a supported extension by shorthand or full key
pub fn get_supported_extension(name: &str) -> Result<&'static RequiredExtension> {
    SUPPORTED_EXTENSIONS
        .iter()
        .copied()
        .find(|ext| ext.shorthand == name || ext.key == name)
        .ok_or_else(|| anyhow!("unsupported required extension: {}", name))
}

fn read_dependencies(bundle: &Bundle) -> Result<ProcessedExtension> {
    read_payload(bundle, DEPENDENCIES_KEY).map(ProcessedExtension::Dependencies)
}

fn read_docker(bundle: &Bundle) -> Result<ProcessedExtension> {
    read_payload(bundle, DOCKER_KEY).map(ProcessedExtension::Docker)
}

fn read_file_parameters(_: &Bundle) -> Result<ProcessedExtension> {
    Ok(ProcessedExtension::FileParameters)
}

fn read_parameter_sources(bundle: &Bundle) -> Result<ProcessedExtension> {
    read_payload(bundle, PARAMETER_SOURCES_KEY).map(ProcessedExtension::ParameterSources)
}

/// Deserialize the payload stored under `key` in the bundle's custom section
fn read_payload<T: DeserializeOwned>(bundle: &Bundle, key: &str) -> Result<T> {
    let data = bundle
        .custom
        .get(key)
        .ok_or_else(|| anyhow!("attempted to read {} from the bundle but none is defined", key))?;
    serde_json::from_value(data.clone())
        .with_context(|| format!("could not unmarshal the {:?} extension {}", key, data))
}

/// Payloads of every required extension, keyed by full extension key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessedExtensions(pub BTreeMap<String, ProcessedExtension>);

impl ProcessedExtensions {
    pub fn is_required(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Dependencies, when the extension is required
    pub fn dependencies(&self) -> Option<&Dependencies> {
        match self.0.get(DEPENDENCIES_KEY) {
            Some(ProcessedExtension::Dependencies(d)) => Some(d),
            _ => None,
        }
    }

    pub fn docker(&self) -> Option<&Docker> {
        match self.0.get(DOCKER_KEY) {
            Some(ProcessedExtension::Docker(d)) => Some(d),
            _ => None,
        }
    }

    pub fn parameter_sources(&self) -> Option<&ParameterSources> {
        match self.0.get(PARAMETER_SOURCES_KEY) {
            Some(ProcessedExtension::ParameterSources(p)) => Some(p),
            _ => None,
        }
    }
}

/// Read every extension listed in `requiredExtensions`. An unsupported
/// extension, or a required one whose payload is missing or malformed,
/// fails the whole bundle.
pub fn process_required_extensions(bundle: &Bundle) -> Result<ProcessedExtensions> {
    let mut processed = ProcessedExtensions::default();
    for name in &bundle.required_extensions {
        let ext = get_supported_extension(name)?;
        let payload = (ext.reader)(bundle)
            .with_context(|| format!("unable to process extension: {}", ext.shorthand))?;
        processed.0.insert(ext.key.to_string(), payload);
    }
    Ok(processed)
}

impl Bundle {
    /// Listed in `requiredExtensions`, by shorthand or full key
    pub fn supports_extension(&self, key: &str) -> bool {
        self.required_extensions.iter().any(|r| {
            r == key
                || get_supported_extension(r).is_ok_and(|ext| ext.key == key || ext.shorthand == key)
        })
    }

    pub fn supports_dependencies(&self) -> bool {
        self.supports_extension(DEPENDENCIES_KEY)
    }

    pub fn supports_parameter_sources(&self) -> bool {
        self.supports_extension(PARAMETER_SOURCES_KEY)
    }

    pub fn supports_docker(&self) -> bool {
        self.supports_extension(DOCKER_KEY)
    }

    pub fn has_dependencies(&self) -> bool {
        self.custom.contains_key(DEPENDENCIES_KEY)
    }

    pub fn read_dependencies(&self) -> Result<Dependencies> {
        read_payload(self, DEPENDENCIES_KEY)
    }

    pub fn read_parameter_sources(&self) -> Result<ParameterSources> {
        read_payload(self, PARAMETER_SOURCES_KEY)
    }

    /// The parameter is populated from a parameter source
    pub fn parameter_has_source(&self, name: &str) -> bool {
        self.read_parameter_sources()
            .is_ok_and(|sources| sources.0.contains_key(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case("docker", DOCKER_KEY)]
    #[test_case("io.cnab.docker", DOCKER_KEY)]
    #[test_case("dependencies", DEPENDENCIES_KEY)]
    #[test_case("parameter-sources", PARAMETER_SOURCES_KEY)]
    #[test_case("file-parameters", FILE_PARAMETERS_KEY)]
    fn test_get_supported_extension(name: &str, key: &str) {
        assert_eq!(get_supported_extension(name).unwrap().key, key);
    }

    #[test]
    fn test_every_key_uses_the_official_prefix() {
        for ext in SUPPORTED_EXTENSIONS {
            assert!(ext.key.starts_with(OFFICIAL_EXTENSIONS_PREFIX), "{}", ext.key);
        }
    }

    #[test]
    fn test_unsupported_extension() {
        let err = get_supported_extension("io.cnab.gpu").unwrap_err();
        assert_eq!(err.to_string(), "unsupported required extension: io.cnab.gpu");
    }

    #[test]
    fn test_process_required_extensions() {
        let mut bun = Bundle::default();
        bun.required_extensions = vec!["docker".into(), FILE_PARAMETERS_KEY.into()];
        bun.custom.insert(DOCKER_KEY.into(), json!({"privileged": true}));
        bun.custom.insert(FILE_PARAMETERS_KEY.into(), json!({}));

        let processed = process_required_extensions(&bun).unwrap();
        assert_eq!(processed.docker(), Some(&Docker { privileged: true }));
        assert!(processed.is_required(FILE_PARAMETERS_KEY));
        assert!(processed.dependencies().is_none());
        assert!(bun.supports_docker());
        assert!(bun.supports_extension("io.cnab.docker"));
        assert!(!bun.supports_dependencies());
    }

    #[test]
    fn test_required_extension_without_payload_fails() {
        let mut bun = Bundle::default();
        bun.required_extensions = vec!["dependencies".into()];
        let err = process_required_extensions(&bun).unwrap_err();
        assert!(format!("{:#}", err).contains("unable to process extension: dependencies"));
    }

    #[test]
    fn test_unrequired_payload_is_ignored() {
        let mut bun = Bundle::default();
        bun.custom.insert(DOCKER_KEY.into(), json!({"privileged": true}));
        let processed = process_required_extensions(&bun).unwrap();
        assert!(processed.docker().is_none());
    }
}
