//! Error types for porter-core

use std::fmt;
use thiserror::Error;

/// Result type alias using porter-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for porter
#[derive(Error, Debug)]
pub enum Error {
    /// Manifest file not found
    #[error("Manifest not found: {path}")]
    ManifestNotFound { path: String },

    /// Manifest could not be interpreted
    #[error("Invalid manifest: {message}")]
    InvalidManifest { message: String },

    /// One or more manifest validation rules failed
    #[error("Manifest validation failed: {0}")]
    Validation(ErrorList),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Schema validation error
    #[error("Schema validation failed:\n{errors}")]
    SchemaValidation { errors: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid semver version
    #[error("Invalid version format: {version}")]
    InvalidVersion { version: String },

    /// Missing required field
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    /// Invalid OCI reference
    #[error("Invalid reference {reference:?}: {message}")]
    InvalidReference { reference: String, message: String },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Template could not be parsed or rendered
    #[error("Template error: {0}")]
    Template(String),

    /// Template referenced a variable absent from the template data
    #[error("missing variable \"{name}\"")]
    UnresolvedVariable { name: String },

    /// Several independent failures
    #[error(transparent)]
    Aggregate(#[from] ErrorList),
}

impl Error {
    /// Create a manifest not found error
    pub fn manifest_not_found(path: impl Into<String>) -> Self {
        Self::ManifestNotFound { path: path.into() }
    }

    /// Create an invalid manifest error
    pub fn invalid_manifest(message: impl Into<String>) -> Self {
        Self::InvalidManifest {
            message: message.into(),
        }
    }

    /// Create a schema validation error from a list of errors
    pub fn schema_validation(errors: Vec<String>) -> Self {
        Self::SchemaValidation {
            errors: errors.join("\n"),
        }
    }

    /// Create an invalid version error
    pub fn invalid_version(version: impl Into<String>) -> Self {
        Self::InvalidVersion {
            version: version.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Create an invalid reference error
    pub fn invalid_reference(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidReference {
            reference: reference.into(),
            message: message.into(),
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an unresolved template variable error
    pub fn unresolved_variable(name: impl Into<String>) -> Self {
        Self::UnresolvedVariable { name: name.into() }
    }
}

/// Accumulates independent failures so a whole batch can be attempted
/// before reporting.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ErrorList {
    errors: Vec<String>,
}

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure
    pub fn push(&mut self, err: impl fmt::Display) {
        self.errors.push(err.to_string());
    }

    /// Record a failure with the full `anyhow` context chain
    pub fn push_anyhow(&mut self, err: &anyhow::Error) {
        self.errors.push(format!("{:#}", err));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.errors.iter().map(String::as_str)
    }

    /// Ok when nothing was recorded
    pub fn into_result(self) -> std::result::Result<(), ErrorList> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.len() {
            0 => write!(f, "no errors"),
            1 => write!(f, "{}", self.errors[0]),
            n => {
                write!(f, "{} errors occurred:", n)?;
                for err in &self.errors {
                    write!(f, "\n\t* {}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ErrorList {}

impl<E: fmt::Display> FromIterator<E> for ErrorList {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        Self {
            errors: iter.into_iter().map(|e| e.to_string()).collect(),
        }
    }
}
