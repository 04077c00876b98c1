//! Manifest validation and derived defaults

use super::{
    Dependency, Manifest, MappedImage, OutputDefinition, ParameterDefinition, Steps,
    ACTION_UNINSTALL, ACTION_UPGRADE, SUPPORTED_SCHEMA_VERSIONS,
};
use crate::error::{Error, ErrorList, Result};
use crate::reference::OciReference;
use sha2::{Digest, Sha256};
use tracing::warn;

impl Manifest {
    /// Validate the manifest, normalizing the version and deriving the
    /// bundle reference and installer image.
    ///
    /// Metadata problems fail immediately; everything else is collected
    /// into a single [`Error::Validation`].
    pub fn validate(&mut self) -> Result<()> {
        self.validate_metadata()?;
        self.set_defaults()?;

        if self.dockerfile.eq_ignore_ascii_case("dockerfile") {
            return Err(Error::invalid_manifest(
                "Dockerfile template cannot be named 'Dockerfile' because that is the filename generated during porter build",
            ));
        }

        let mut errs = ErrorList::new();

        if self.mixins.is_empty() {
            errs.push("no mixins declared");
        }

        match &self.install {
            None => errs.push("no install action defined"),
            Some(steps) => self.collect_step_errors("install", steps, &mut errs),
        }
        match &self.uninstall {
            None => errs.push("no uninstall action defined"),
            Some(steps) => self.collect_step_errors(ACTION_UNINSTALL, steps, &mut errs),
        }
        if let Some(steps) = &self.upgrade {
            self.collect_step_errors(ACTION_UPGRADE, steps, &mut errs);
        }
        for (action, steps) in &self.custom_actions {
            self.collect_step_errors(action, steps, &mut errs);
        }

        for dep in &self.dependencies {
            if let Err(e) = validate_dependency(dep) {
                errs.push(e);
            }
        }
        for output in &self.outputs {
            validate_output(output, &mut errs);
        }
        for param in &self.parameters {
            validate_parameter(param, &mut errs);
        }
        for (alias, image) in &self.images {
            if let Err(e) = validate_image(image) {
                errs.push(format!("invalid image {}: {}", alias, e));
            }
        }

        errs.into_result().map_err(Error::Validation)
    }

    fn validate_metadata(&mut self) -> Result<()> {
        if !self.schema_version.is_empty()
            && !SUPPORTED_SCHEMA_VERSIONS.contains(&self.schema_version.as_str())
        {
            warn!(
                "WARNING: The schema version {:?} of the manifest is not supported by this version of porter. Supported versions: {}",
                self.schema_version,
                SUPPORTED_SCHEMA_VERSIONS.join(", ")
            );
        }

        if self.name.is_empty() {
            return Err(Error::invalid_manifest("bundle name must be set"));
        }

        if self.registry.is_empty() && self.reference.is_empty() {
            return Err(Error::invalid_manifest(
                "a registry or reference value must be provided",
            ));
        }

        if !self.registry.is_empty() && !self.reference.is_empty() {
            warn!(
                "both registry and reference were provided; using the reference value of {} for the bundle reference",
                self.reference
            );
        }

        if !self.version.is_empty() {
            let v = semver::Version::parse(self.version.trim_start_matches('v')).map_err(|e| {
                Error::invalid_manifest(format!(
                    "version {:?} is not a valid semver value: {}",
                    self.version, e
                ))
            })?;
            self.version = v.to_string();
        }
        Ok(())
    }

    /// Derive the bundle reference and installer image
    pub fn set_defaults(&mut self) -> Result<()> {
        self.set_installer_image_and_reference(None)
    }

    /// Set the bundle reference, optionally overriding the manifest's own,
    /// and derive the installer image from it
    pub fn set_installer_image_and_reference(&mut self, reference: Option<&str>) -> Result<()> {
        if let Some(r) = reference.filter(|r| !r.is_empty()) {
            self.reference = r.to_string();
        }

        if self.reference.is_empty() && !self.registry.is_empty() {
            let joined = format!("{}/{}", self.registry.trim_end_matches('/'), self.name);
            let repo = OciReference::parse(&joined).map_err(|e| {
                Error::invalid_manifest(format!("invalid bundle reference {}: {}", joined, e))
            })?;
            self.reference = repo.repository();
        }

        let mut bundle_ref = OciReference::parse(&self.reference).map_err(|e| {
            Error::invalid_manifest(format!("invalid bundle reference {}: {}", self.reference, e))
        })?;

        if !bundle_ref.has_tag() {
            if bundle_ref.has_digest() {
                return Err(Error::invalid_manifest(format!(
                    "unable to derive docker tag from bundle reference {:?}: invalid bundle tag format, must be an OCI image tag",
                    self.reference
                )));
            }
            // '+' is legal in semver build metadata but not in a tag
            let tag = format!("v{}", self.version.replace('+', "_"));
            bundle_ref = bundle_ref.with_tag(&tag)?;
            self.reference = bundle_ref.to_string();
        }

        self.image = installer_image(&bundle_ref);
        Ok(())
    }

    /// applyTo for a parameter sourced from an output: every action that
    /// can run after install, sorted
    pub fn inferred_apply_to(&self) -> Vec<String> {
        let mut apply_to = vec![ACTION_UNINSTALL.to_string()];
        if self.upgrade.is_some() {
            apply_to.push(ACTION_UPGRADE.to_string());
        }
        apply_to.extend(self.custom_actions.keys().cloned());
        apply_to.sort();
        apply_to
    }

    /// Validate the steps of one action
    pub fn validate_steps(&self, steps: &Steps) -> std::result::Result<(), String> {
        for step in steps {
            if step.data.is_empty() {
                return Err("no mixin specified".to_string());
            }
            if step.data.len() > 1 {
                return Err("more than one mixin specified".to_string());
            }
            let mixin = step.mixin_name().unwrap_or_default();
            if self.mixin(mixin).is_none() {
                return Err(format!("mixin ({}) was not declared", mixin));
            }
            match step.description()? {
                Some(d) if !d.is_empty() => {}
                _ => return Err(format!("a description is required for the {} step", mixin)),
            }
        }
        Ok(())
    }

    fn collect_step_errors(&self, action: &str, steps: &Steps, errs: &mut ErrorList) {
        if let Err(e) = self.validate_steps(steps) {
            errs.push(format!("validation of action {:?} failed: {}", action, e));
        }
    }
}

/// Temporary installer image for a bundle, tagged by a digest of the
/// bundle reference so rebuilds of the same reference reuse the name
fn installer_image(bundle_ref: &OciReference) -> String {
    let digest = format!("{:x}", Sha256::digest(bundle_ref.to_string().as_bytes()));
    format!("{}:porter-{}", bundle_ref.repository(), &digest[..32])
}

fn validate_dependency(dep: &Dependency) -> std::result::Result<(), String> {
    if dep.name.is_empty() {
        return Err("dependency name is required".to_string());
    }
    if dep.reference.is_empty() {
        return Err(format!("reference is required for dependency {:?}", dep.name));
    }
    let reference = OciReference::parse(&dep.reference)
        .map_err(|e| format!("invalid reference for dependency {:?}: {}", dep.name, e))?;
    if reference.has_tag() && !dep.versions.is_empty() {
        return Err(format!(
            "reference for dependency {:?} can only specify REGISTRY/NAME when version ranges are specified",
            dep.name
        ));
    }
    Ok(())
}

fn validate_parameter(param: &ParameterDefinition, errs: &mut ErrorList) {
    if param.name.is_empty() {
        errs.push("parameter name is required");
    }
    if param.schema.is_file() && param.destination.path.is_empty() {
        errs.push(format!(
            "no destination path supplied for parameter {}",
            param.name
        ));
    }
    validate_default(&param.schema, "parameter", &param.name, errs);
}

fn validate_output(output: &OutputDefinition, errs: &mut ErrorList) {
    if output.name.is_empty() {
        errs.push("output name is required");
        return;
    }
    if output.schema.is_file() && output.path.is_empty() {
        errs.push(format!("no path supplied for output {}", output.name));
    }
    validate_default(&output.schema, "output", &output.name, errs);
}

fn validate_default(schema: &crate::schema::Schema, kind: &str, name: &str, errs: &mut ErrorList) {
    if let Err(e) = schema.check() {
        errs.push(format!(
            "encountered an error while validating definition for {} {:?}: {}",
            kind, name, e
        ));
        return;
    }
    let Some(default) = &schema.default else {
        return;
    };
    match schema.validate_value(default) {
        Ok(violations) => {
            for v in violations {
                errs.push(format!(
                    "encountered an error validating the default value {} for {} {:?}: {}",
                    default, kind, name, v
                ));
            }
        }
        Err(e) => errs.push(format!(
            "encountered error while validating {} {}: {}",
            kind, name, e
        )),
    }
}

fn validate_image(image: &MappedImage) -> Result<()> {
    let reference = OciReference::parse(&image.repository)?;
    if !image.digest.is_empty() {
        reference.with_digest(&image.digest)?;
    }
    Ok(())
}
