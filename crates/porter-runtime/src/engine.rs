//! Running one action of a bundle inside its installer image
//!
//! [`RuntimeManifest`] holds everything loaded for the action: the manifest,
//! the bundle descriptor, dependency descriptors, the outputs produced so far
//! and the sensitive values seen so far. [`RuntimeEngine`] drives it through
//! initialize, step execution and finalize, invoking mixins through a
//! [`MixinExecutor`].

use crate::context::{ContextBuilder, SensitiveValues, TemplateData};
use crate::files::decode_file_parameters;
use crate::images::{load_relocation_mapping, resolve_images, resolve_invocation_image};
use crate::outputs::{apply_unbound_outputs, collect_mixin_outputs, write_bundle_outputs};
use crate::state::{pack_state_bag, unpack_state_bag};
use anyhow::{anyhow, Context, Result};
use porter_cnab::Bundle;
use porter_core::manifest::{Step, Steps, ACTION_INSTALL, ACTION_UNINSTALL, ACTION_UPGRADE};
use porter_core::{template, CnabPaths, ErrorList, Manifest, ProcessContext};
use porter_mixins::runner::{run_step, StepDirectives};
use porter_mixins::{CommandOptions, MixinExecutor};
use serde_yaml_ng::{Mapping, Value as YamlValue};
use std::collections::BTreeMap;
use std::fs;
use tracing::{debug, info, warn};

/// Installation name set by the CNAB driver
pub const CNAB_INSTALLATION_NAME_ENV: &str = "CNAB_INSTALLATION_NAME";

/// Bundle name set by the CNAB driver
pub const CNAB_BUNDLE_NAME_ENV: &str = "CNAB_BUNDLE_NAME";

/// Everything loaded for running one action
#[derive(Debug, Clone)]
pub struct RuntimeManifest {
    pub manifest: Manifest,
    pub bundle: Bundle,
    pub dependencies: BTreeMap<String, Bundle>,
    action: String,
    steps: Steps,
    outputs: BTreeMap<String, String>,
    sensitive: SensitiveValues,
    paths: CnabPaths,
}

impl RuntimeManifest {
    /// Load the bundle and dependency descriptors and select the steps for
    /// `action`.
    ///
    /// An action the manifest does not define is an error unless it is one
    /// of the core actions, which then simply have nothing to do.
    pub fn load(manifest: Manifest, action: &str, paths: CnabPaths) -> Result<Self> {
        let bundle = Bundle::load(paths.bundle_json()).context("could not load the bundle")?;

        let mut dependencies = BTreeMap::new();
        for dep in &manifest.dependencies {
            let descriptor = Bundle::load(paths.dependency_bundle(&dep.name)).with_context(|| {
                format!("error unmarshaling bundle definition for dependency {}", dep.name)
            })?;
            dependencies.insert(dep.name.clone(), descriptor);
        }

        let steps = match manifest.steps(action) {
            Some(steps) => steps.clone(),
            None if [ACTION_INSTALL, ACTION_UPGRADE, ACTION_UNINSTALL].contains(&action) => {
                Steps::new()
            }
            None => {
                let custom: Vec<&str> = manifest.custom_actions.keys().map(String::as_str).collect();
                return Err(anyhow!(
                    "unsupported action {:?}, custom actions are defined for: {}",
                    action,
                    custom.join(", ")
                ));
            }
        };
        manifest
            .validate_steps(&steps)
            .map_err(|e| anyhow!("invalid action configuration: {}", e))?;

        Ok(Self {
            manifest,
            bundle,
            dependencies,
            action: action.to_string(),
            steps,
            outputs: BTreeMap::new(),
            sensitive: SensitiveValues::new(),
            paths,
        })
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn steps(&self) -> &Steps {
        &self.steps
    }

    pub fn paths(&self) -> &CnabPaths {
        &self.paths
    }

    /// Outputs produced by the steps run so far
    pub fn outputs(&self) -> &BTreeMap<String, String> {
        &self.outputs
    }

    pub fn sensitive_values(&self) -> &SensitiveValues {
        &self.sensitive
    }

    /// Prepare the filesystem: outputs directory, file parameters and the
    /// state bag from the previous run
    pub fn initialize(&self) -> Result<()> {
        let dir = self.paths.bundle_outputs_dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("could not create outputs directory {}", dir.display()))?;

        decode_file_parameters(&self.paths, &self.bundle, &self.action)?;
        unpack_state_bag(&self.paths, &self.manifest.state)
            .context("could not unpack the state bag")
    }

    /// Reconcile image references with the published and relocated images
    pub fn resolve_images(&mut self) -> Result<()> {
        let relocation = load_relocation_mapping(&self.paths)?;
        resolve_invocation_image(&mut self.manifest, &self.bundle, &relocation)?;
        resolve_images(&mut self.manifest, &self.bundle, &relocation)
    }

    /// Template data for the next step
    pub fn template_data(&self, ctx: &ProcessContext) -> Result<TemplateData> {
        ContextBuilder::new(&self.manifest, &self.bundle, &self.action)
            .dependencies(&self.dependencies)
            .build(ctx, &self.outputs)
    }

    /// Render the authored YAML of step `index` against fresh template data.
    /// Any variable missing from the data fails the step.
    pub fn resolve_step(&mut self, ctx: &ProcessContext, index: usize) -> Result<Step> {
        let data = self.template_data(ctx)?;
        self.sensitive.extend(&data.sensitive);

        let node = self
            .manifest
            .step_node(&self.action, index)
            .ok_or_else(|| anyhow!("could not find step {} of the {} action", index, self.action))?;
        let yaml = serde_yaml_ng::to_string(node).context("could not marshal the step")?;
        let tmpl = format!("{}{}", self.manifest.template_prefix(), yaml);

        debug!(step = index, "Rendering step template:\n{}", yaml);
        let rendered = template::render(&tmpl, &data.data)
            .with_context(|| format!("unable to resolve step {} of the {} action", index, self.action))?;

        serde_yaml_ng::from_str(&rendered)
            .with_context(|| format!("invalid step yaml after rendering:\n{}", rendered))
    }

    /// Merge outputs from the last step and publish the bundle outputs
    pub fn apply_step_outputs(&mut self, outputs: BTreeMap<String, String>) -> Result<()> {
        for (name, value) in &outputs {
            if self.manifest.output(name).is_none_or(|o| o.sensitive) {
                self.sensitive.insert(value.as_str());
            }
        }
        write_bundle_outputs(&self.paths, &self.manifest, &self.action, &outputs)?;
        self.outputs.extend(outputs);
        Ok(())
    }

    /// Collect file outputs no step produced and, when every step
    /// succeeded, write the state bag for the next run
    pub fn finalize(&self, succeeded: bool) -> Result<()> {
        let mut errs = ErrorList::new();
        if let Err(e) = apply_unbound_outputs(&self.paths, &self.manifest, &self.action, &self.outputs) {
            errs.push_anyhow(&e);
        }
        if succeeded {
            if let Err(e) = pack_state_bag(&self.paths, &self.manifest.state) {
                errs.push_anyhow(&e.context("could not pack the state bag"));
            }
        } else if !self.manifest.state.is_empty() {
            debug!("A step failed, leaving the state bag from the previous run in place");
        }
        errs.into_result().map_err(anyhow::Error::from)
    }
}

/// Drives a [`RuntimeManifest`] through an action
pub struct RuntimeEngine<'a> {
    executor: &'a dyn MixinExecutor,
}

impl<'a> RuntimeEngine<'a> {
    pub fn new(executor: &'a dyn MixinExecutor) -> Self {
        Self { executor }
    }

    /// Run every step of the action in order, stopping at the first failure.
    /// Outputs are finalized either way.
    pub async fn execute(&self, ctx: &ProcessContext, rm: &mut RuntimeManifest) -> Result<()> {
        let installation = ctx.getenv(CNAB_INSTALLATION_NAME_ENV).unwrap_or_default();
        let bundle_name = ctx
            .getenv(CNAB_BUNDLE_NAME_ENV)
            .unwrap_or(rm.manifest.name.as_str())
            .to_string();
        info!(action = %rm.action, installation = %installation, "Executing action");
        ctx.write_out(&format!(
            "executing {} action from {} (installation: {})\n",
            rm.action, bundle_name, installation
        ))?;

        rm.initialize()?;
        rm.resolve_images().context("unable to resolve bundle images")?;

        let mixin_outputs = rm.paths.mixin_outputs_dir();
        fs::create_dir_all(&mixin_outputs).with_context(|| {
            format!("could not create mixin outputs directory {}", mixin_outputs.display())
        })?;

        let mut step_err = None;
        for index in 0..rm.steps.len() {
            if let Err(e) = self.run_step(ctx, rm, index).await {
                step_err = Some(e);
                break;
            }
        }

        let finalized = rm.finalize(step_err.is_none());
        match (step_err, finalized) {
            (None, Ok(())) => {
                ctx.write_out("execution completed successfully!\n")?;
                Ok(())
            }
            (None, Err(e)) => Err(e.context("error finalizing the action")),
            (Some(e), Ok(())) => Err(e),
            (Some(e), Err(finalize_err)) => {
                warn!("Finalizing after a failed step also failed: {:#}", finalize_err);
                Err(e)
            }
        }
    }

    async fn run_step(&self, ctx: &ProcessContext, rm: &mut RuntimeManifest, index: usize) -> Result<()> {
        let step = rm.resolve_step(ctx, index)?;
        let mixin = step
            .mixin_name()
            .ok_or_else(|| anyhow!("step {} of the {} action names no mixin", index, rm.action))?
            .to_string();
        let description = step
            .description()
            .map_err(anyhow::Error::msg)?
            .unwrap_or_default()
            .to_string();

        ctx.set_sensitive_values(rm.sensitive.snapshot());
        ctx.write_out(&format!("{}\n", description))?;

        let body = step.body().cloned().unwrap_or(YamlValue::Null);
        let directives = StepDirectives::from_body(&mixin, &body)?;
        let opts = CommandOptions::new(rm.action.as_str())
            .with_input(action_input(&rm.action, &step)?)
            .runtime();

        debug!(mixin = %mixin, step = index, "Running step");
        run_step(
            self.executor,
            ctx,
            &mixin,
            &opts,
            &directives,
            &rm.paths.mixin_outputs_dir(),
        )
        .await
        .with_context(|| format!("step {:?} failed", description))?;

        let outputs = collect_mixin_outputs(&rm.paths.mixin_outputs_dir())?;
        rm.apply_step_outputs(outputs)
    }
}

/// The document sent to the mixin: `{<action>: [<step>]}`
fn action_input(action: &str, step: &Step) -> Result<String> {
    let mut input = Mapping::new();
    input.insert(
        YamlValue::String(action.to_string()),
        YamlValue::Sequence(vec![YamlValue::Mapping(step.data.clone())]),
    );
    serde_yaml_ng::to_string(&input).context("could not marshal the mixin input")
}
