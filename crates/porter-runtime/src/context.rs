//! Template data for rendering steps inside the installer image
//!
//! The data is rebuilt before every step so outputs written by the previous
//! step are visible to the next one. Every value that must not reach the
//! console is collected into a [`SensitiveValues`] set alongside it.

use anyhow::{anyhow, Context, Result};
use porter_cnab::extensions::{ParameterSourceDefinition, PARAMETER_SOURCES_KEY};
use porter_cnab::Bundle;
use porter_core::manifest::MappedImage;
use porter_core::utils::{dependency_output_wiring_name, env_var_name, output_wiring_name};
use porter_core::{Manifest, ProcessContext};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// Installation name visible to templates as `installation.name`
pub const INSTALLATION_NAME_ENV: &str = "PORTER_INSTALLATION_NAME";

/// Installation namespace visible to templates as `installation.namespace`
pub const INSTALLATION_NAMESPACE_ENV: &str = "PORTER_INSTALLATION_NAMESPACE";

/// Values masked in console output, kept in insertion order without
/// duplicates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensitiveValues(Vec<String>);

impl SensitiveValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value; empty strings and repeats are ignored
    pub fn insert(&mut self, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() || self.0.contains(&value) {
            return;
        }
        self.0.push(value);
    }

    pub fn extend(&mut self, other: &SensitiveValues) {
        for value in other.iter() {
            self.insert(value);
        }
    }

    pub fn contains(&self, value: &str) -> bool {
        self.0.iter().any(|v| v == value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Copy handed to the censoring writer
    pub fn snapshot(&self) -> Vec<String> {
        self.0.clone()
    }
}

/// Rendered-ready template data plus the sensitive values it contains
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateData {
    pub data: Value,
    pub sensitive: SensitiveValues,
}

/// Builds the data steps are rendered against for one action
pub struct ContextBuilder<'a> {
    manifest: &'a Manifest,
    bundle: &'a Bundle,
    action: &'a str,
    dependencies: Option<&'a BTreeMap<String, Bundle>>,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(manifest: &'a Manifest, bundle: &'a Bundle, action: &'a str) -> Self {
        Self {
            manifest,
            bundle,
            action,
            dependencies: None,
        }
    }

    /// Descriptors of the installed dependencies, keyed by alias
    pub fn dependencies(mut self, dependencies: &'a BTreeMap<String, Bundle>) -> Self {
        self.dependencies = Some(dependencies);
        self
    }

    /// Build the data from the process environment and the outputs
    /// produced by earlier steps
    pub fn build(
        &self,
        ctx: &ProcessContext,
        step_outputs: &BTreeMap<String, String>,
    ) -> Result<TemplateData> {
        let mut sensitive = SensitiveValues::new();

        let parameters = self.parameters(ctx, &mut sensitive);
        let credentials = self.credentials(ctx, &mut sensitive)?;
        let mut dependencies = self.dependency_metadata();
        let mut outputs = self.step_outputs(step_outputs, &mut sensitive);
        self.apply_parameter_sources(
            ctx,
            step_outputs,
            &mut outputs,
            &mut dependencies,
            &mut sensitive,
        )?;

        let env: Map<String, Value> = ctx
            .env
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();

        let data = json!({
            "installation": {
                "namespace": ctx.getenv(INSTALLATION_NAMESPACE_ENV).unwrap_or_default(),
                "name": ctx.getenv(INSTALLATION_NAME_ENV).unwrap_or_default(),
            },
            "bundle": {
                "name": self.manifest.name,
                "version": self.manifest.version,
                "description": self.manifest.description,
                "installerImage": self.manifest.image,
                "custom": self.manifest.custom,
                "parameters": parameters,
                "credentials": credentials,
                "outputs": outputs,
                "dependencies": dependencies,
                "images": self.images(),
            },
            "env": env,
        });

        Ok(TemplateData { data, sensitive })
    }

    fn parameters(&self, ctx: &ProcessContext, sensitive: &mut SensitiveValues) -> Map<String, Value> {
        let mut parameters = Map::new();
        for param in &self.manifest.parameters {
            if !param.applies_to(self.action) {
                continue;
            }

            let value = if !param.destination.env.is_empty() {
                ctx.getenv(&param.destination.env).map(str::to_string)
            } else if !param.destination.path.is_empty() {
                Some(param.destination.path.clone())
            } else {
                ctx.getenv(&env_var_name(&param.name)).map(str::to_string)
            };
            // The driver normally injects defaults; fall back to them when it did not
            let value = value
                .or_else(|| param.schema.default.as_ref().map(value_to_string))
                .unwrap_or_default();

            if param.sensitive {
                sensitive.insert(value.as_str());
            }
            parameters.insert(param.name.clone(), Value::String(value));
        }
        parameters
    }

    fn credentials(
        &self,
        ctx: &ProcessContext,
        sensitive: &mut SensitiveValues,
    ) -> Result<Map<String, Value>> {
        let mut credentials = Map::new();
        for cred in &self.manifest.credentials {
            if !cred.applies_to(self.action) {
                continue;
            }
            let value = if !cred.location.env.is_empty() {
                ctx.getenv(&cred.location.env).unwrap_or_default().to_string()
            } else if !cred.location.path.is_empty() {
                cred.location.path.clone()
            } else {
                return Err(anyhow!("credential: {} is malformed", cred.name));
            };
            sensitive.insert(value.as_str());
            credentials.insert(cred.name.clone(), Value::String(value));
        }
        Ok(credentials)
    }

    fn dependency_metadata(&self) -> Map<String, Value> {
        let mut dependencies = Map::new();
        for dep in &self.manifest.dependencies {
            let bundle = self.dependencies.and_then(|d| d.get(&dep.name));
            dependencies.insert(
                dep.name.clone(),
                json!({
                    "name": bundle.map(|b| b.name.as_str()).unwrap_or_default(),
                    "version": bundle.map(|b| b.version.as_str()).unwrap_or_default(),
                    "description": bundle.map(|b| b.description.as_str()).unwrap_or_default(),
                    "outputs": {},
                }),
            );
        }
        dependencies
    }

    fn step_outputs(
        &self,
        step_outputs: &BTreeMap<String, String>,
        sensitive: &mut SensitiveValues,
    ) -> Map<String, Value> {
        let mut outputs = Map::new();
        for (name, value) in step_outputs {
            // Anything not declared as a non-sensitive bundle output is masked
            let is_sensitive = self.manifest.output(name).is_none_or(|o| o.sensitive);
            if is_sensitive {
                sensitive.insert(value.as_str());
            }
            outputs.insert(name.clone(), Value::String(value.clone()));
        }
        outputs
    }

    /// Values carried in through wiring parameters, for outputs of earlier
    /// runs and of dependencies. A value the driver did not inject stays
    /// unset, so a template that needs it fails on the variable.
    fn apply_parameter_sources(
        &self,
        ctx: &ProcessContext,
        step_outputs: &BTreeMap<String, String>,
        outputs: &mut Map<String, Value>,
        dependencies: &mut Map<String, Value>,
        sensitive: &mut SensitiveValues,
    ) -> Result<()> {
        if !self.bundle.custom.contains_key(PARAMETER_SOURCES_KEY) {
            return Ok(());
        }
        let sources = self
            .bundle
            .read_parameter_sources()
            .context("could not read the parameter sources of the bundle")?;

        let templated_outputs: Vec<&str> = self
            .manifest
            .templated_outputs()
            .into_iter()
            .map(|o| o.name.as_str())
            .collect();
        let templated_dependency_outputs = self.manifest.templated_dependency_outputs();

        for (param_name, source) in &sources.0 {
            if self
                .bundle
                .parameters
                .get(param_name)
                .is_some_and(|p| !p.applies_to(self.action))
            {
                continue;
            }

            for definition in source.by_priority() {
                match definition {
                    ParameterSourceDefinition::DependencyOutput { dependency, name } => {
                        let key = (dependency.clone(), name.clone());
                        if !templated_dependency_outputs.contains(&key) {
                            continue;
                        }
                        let env = env_var_name(&dependency_output_wiring_name(dependency, name));
                        let Some(value) = ctx.getenv(&env) else {
                            debug!(dependency = %dependency, output = %name, "No value was injected for dependency output");
                            continue;
                        };

                        let is_sensitive = self
                            .dependencies
                            .and_then(|d| d.get(dependency))
                            .is_none_or(|b| b.is_sensitive_output(name));
                        if is_sensitive {
                            sensitive.insert(value);
                        }

                        debug!(dependency = %dependency, output = %name, "Injecting dependency output");
                        let entry = dependencies
                            .entry(dependency.clone())
                            .or_insert_with(|| json!({ "outputs": {} }));
                        if let Some(dep_outputs) =
                            entry.get_mut("outputs").and_then(Value::as_object_mut)
                        {
                            dep_outputs.insert(name.clone(), Value::String(value.to_string()));
                        }
                        break;
                    }
                    ParameterSourceDefinition::Output { name } => {
                        if !templated_outputs.contains(&name.as_str()) {
                            continue;
                        }
                        // A value produced during this run wins over the injected one
                        if step_outputs.get(name).is_some_and(|v| !v.is_empty()) {
                            break;
                        }
                        let env = env_var_name(&output_wiring_name(name));
                        let Some(value) = ctx.getenv(&env) else {
                            debug!(output = %name, "No value was injected for output");
                            continue;
                        };

                        let is_sensitive = self.manifest.output(name).is_some_and(|o| o.sensitive)
                            || self.bundle.is_sensitive_output(name);
                        if is_sensitive {
                            sensitive.insert(value);
                        }

                        debug!(output = %name, "Injecting output from a previous run");
                        outputs.insert(name.clone(), Value::String(value.to_string()));
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn images(&self) -> Map<String, Value> {
        self.manifest
            .images
            .iter()
            .map(|(alias, image)| (alias.clone(), image_fields(image)))
            .collect()
    }
}

/// A manifest image as the string fields templates can reference
fn image_fields(image: &MappedImage) -> Value {
    json!({
        "description": image.description,
        "imageType": image.image_type,
        "repository": image.repository,
        "digest": image.digest,
        "size": image.size.to_string(),
        "mediaType": image.media_type,
        "labels": image.labels,
        "tag": image.tag,
    })
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
