//! CNAB bundle descriptor (bundle.json)

use anyhow::{Context, Result};
use porter_core::manifest::{Location, Maintainer};
use porter_core::Schema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// CNAB spec version written into generated bundles
pub const CNAB_SCHEMA_VERSION: &str = "1.2.0";

/// `$comment` marking definitions porter generates for its own use
pub const PORTER_INTERNAL: &str = "porter-internal";

/// Key of the porter stamp in `custom`
pub const PORTER_STAMP_KEY: &str = "sh.porter";

/// A CNAB bundle descriptor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub schema_version: String,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub maintainers: Vec<Maintainer>,
    #[serde(default)]
    pub invocation_images: Vec<BaseImage>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub images: BTreeMap<String, Image>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub actions: BTreeMap<String, Action>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, Parameter>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub credentials: BTreeMap<String, Credential>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, Output>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub definitions: BTreeMap<String, Schema>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_extensions: Vec<String>,
}

/// An image reference as carried by invocation images and the image map
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseImage {
    pub image: String,
    #[serde(default)]
    pub image_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content_digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub media_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    #[serde(flatten)]
    pub base: BaseImage,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(default)]
    pub modifies: bool,
    #[serde(default)]
    pub stateless: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub definition: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub apply_to: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<Location>,
}

impl Parameter {
    pub fn applies_to(&self, action: &str) -> bool {
        porter_core::utils::applies_to(&self.apply_to, action)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(flatten)]
    pub location: Location,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub apply_to: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Output {
    pub definition: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub apply_to: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
}

impl Output {
    pub fn applies_to(&self, action: &str) -> bool {
        porter_core::utils::applies_to(&self.apply_to, action)
    }
}

impl Bundle {
    /// Read a bundle.json from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .with_context(|| format!("cannot read the bundle at {}", path.display()))?;
        Self::from_slice(&data)
            .with_context(|| format!("cannot load the bundle at {}", path.display()))
    }

    pub fn from_slice(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).context("could not unmarshal the bundle")
    }

    /// Pretty JSON, as written to `.cnab/bundle.json`
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("could not marshal the bundle")
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("could not create {}", parent.display()))?;
        }
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("could not write the bundle to {}", path.display()))
    }

    /// Built by porter, i.e. carries a porter stamp
    pub fn is_porter_bundle(&self) -> bool {
        self.custom.contains_key(PORTER_STAMP_KEY)
    }

    /// Schema behind a parameter
    pub fn parameter_definition(&self, name: &str) -> Option<&Schema> {
        self.parameters
            .get(name)
            .and_then(|p| self.definitions.get(&p.definition))
    }

    /// Schema behind an output
    pub fn output_definition(&self, name: &str) -> Option<&Schema> {
        self.outputs
            .get(name)
            .and_then(|o| self.definitions.get(&o.definition))
    }

    /// Generated by porter rather than declared by the author
    pub fn is_internal_parameter(&self, name: &str) -> bool {
        self.parameter_definition(name)
            .is_some_and(|d| d.comment.as_deref() == Some(PORTER_INTERNAL))
    }

    pub fn is_internal_output(&self, name: &str) -> bool {
        self.output_definition(name)
            .is_some_and(|d| d.comment.as_deref() == Some(PORTER_INTERNAL))
    }

    pub fn is_sensitive_parameter(&self, name: &str) -> bool {
        self.parameter_definition(name)
            .is_some_and(Schema::is_write_only)
    }

    pub fn is_sensitive_output(&self, name: &str) -> bool {
        self.output_definition(name).is_some_and(Schema::is_write_only)
    }

    /// A base64 string definition, the shape `file` parameters are compiled to
    pub fn is_file_type(def: &Schema) -> bool {
        def.schema_type.as_deref() == Some("string")
            && def.content_encoding.as_deref() == Some("base64")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Bundle {
        serde_json::from_value(json!({
            "schemaVersion": "1.2.0",
            "name": "mysql",
            "version": "0.1.0",
            "invocationImages": [{"image": "localhost:5000/mysql:porter-abc", "imageType": "docker"}],
            "parameters": {
                "password": {"definition": "password-parameter", "required": true, "destination": {"env": "PASSWORD"}},
                "porter-debug": {"definition": "porter-debug-parameter", "destination": {"env": "PORTER_DEBUG"}}
            },
            "outputs": {
                "conn": {"definition": "conn-output", "path": "/cnab/app/outputs/conn", "applyTo": ["install"]}
            },
            "definitions": {
                "password-parameter": {"type": "string", "writeOnly": true},
                "porter-debug-parameter": {"type": "boolean", "$comment": "porter-internal"},
                "conn-output": {"type": "string", "contentEncoding": "base64"}
            },
            "custom": {"sh.porter": {"version": "v1.0.0"}}
        }))
        .unwrap()
    }

    #[test]
    fn test_definition_helpers() {
        let bun = sample();
        assert!(bun.is_porter_bundle());
        assert!(bun.is_sensitive_parameter("password"));
        assert!(!bun.is_sensitive_parameter("porter-debug"));
        assert!(bun.is_internal_parameter("porter-debug"));
        assert!(!bun.is_internal_parameter("missing"));
        assert!(Bundle::is_file_type(bun.output_definition("conn").unwrap()));
        assert!(bun.outputs["conn"].applies_to("install"));
        assert!(!bun.outputs["conn"].applies_to("upgrade"));
    }

    #[test]
    fn test_write_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".cnab/bundle.json");
        let bun = sample();
        bun.write(&path).unwrap();
        assert_eq!(Bundle::load(&path).unwrap(), bun);
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let bun = Bundle {
            schema_version: CNAB_SCHEMA_VERSION.into(),
            name: "x".into(),
            version: "1.0.0".into(),
            ..Default::default()
        };
        let value: serde_json::Value = serde_json::from_str(&bun.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"schemaVersion": "1.2.0", "name": "x", "version": "1.0.0", "invocationImages": []})
        );
    }
}
