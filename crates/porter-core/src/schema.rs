//! JSON Schema fragments used by parameter, output and bundle definitions

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::BTreeMap;

/// Porter-only type for parameters and outputs backed by a file
pub const FILE_TYPE: &str = "file";

/// A subset of JSON Schema, as carried by manifests and bundle descriptors.
///
/// A missing `type` means any type is accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(rename = "$id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "$comment", default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<Number>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<Number>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive_minimum: Option<Number>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive_maximum: Option<Number>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_only: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<Value>,
}

impl Schema {
    /// Schema with only a type set
    pub fn of_type(schema_type: impl Into<String>) -> Self {
        Self {
            schema_type: Some(schema_type.into()),
            ..Default::default()
        }
    }

    pub fn is_file(&self) -> bool {
        self.schema_type.as_deref() == Some(FILE_TYPE)
    }

    pub fn is_write_only(&self) -> bool {
        self.write_only.unwrap_or(false)
    }

    /// Copy with the porter `file` type rewritten to a base64 string
    pub fn normalized(&self) -> Self {
        let mut schema = self.clone();
        if schema.is_file() {
            schema.schema_type = Some("string".to_string());
            schema.content_encoding = Some("base64".to_string());
        }
        schema
    }

    /// Compile the normalized schema
    fn compile(&self) -> Result<jsonschema::Validator> {
        let mut value = serde_json::to_value(self.normalized())?;
        if let Some(obj) = value.as_object_mut() {
            // $id values are informational, not resolvable base URIs
            obj.remove("$id");
            obj.remove("default");
        }
        jsonschema::validator_for(&value)
            .map_err(|e| Error::invalid_config(format!("invalid schema: {}", e)))
    }

    /// Check the schema itself compiles
    pub fn check(&self) -> Result<()> {
        self.compile().map(|_| ())
    }

    /// Validate `value` against the schema, returning one message per violation
    pub fn validate_value(&self, value: &Value) -> Result<Vec<String>> {
        let validator = self.compile()?;
        Ok(validator
            .iter_errors(value)
            .map(|e| {
                let path = e.instance_path().to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{}: {}", path, e)
                }
            })
            .collect())
    }
}
