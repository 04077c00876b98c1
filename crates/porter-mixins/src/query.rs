//! Sending one command to many mixins at once

use crate::runner::{CommandOptions, MixinExecutor};
use anyhow::{Context, Result};
use futures::future::join_all;
use porter_core::manifest::{Manifest, Step};
use porter_core::{ErrorList, ProcessContext, SharedBuffer, Sink};
use serde_yaml_ng::{Mapping, Value as YamlValue};
use std::collections::BTreeMap;
use tracing::debug;

/// Supplies the mixins to query and the stdin each one receives
pub trait InputGenerator: Sync {
    fn mixins(&self) -> Vec<String>;
    fn build_input(&self, mixin: &str) -> Result<String>;
}

/// Sends each mixin its config and the steps that use it, per action:
///
/// ```yaml
/// config: {...}
/// actions:
///   install:
///     - exec: {...}
/// ```
pub struct ManifestInputGenerator<'a> {
    manifest: &'a Manifest,
}

impl<'a> ManifestInputGenerator<'a> {
    pub fn new(manifest: &'a Manifest) -> Self {
        Self { manifest }
    }
}

impl InputGenerator for ManifestInputGenerator<'_> {
    fn mixins(&self) -> Vec<String> {
        self.manifest.mixin_names()
    }

    fn build_input(&self, mixin: &str) -> Result<String> {
        let mut input = Mapping::new();
        if let Some(config) = self.manifest.mixin(mixin).and_then(|m| m.config.clone()) {
            input.insert("config".into(), config);
        }

        let mut actions = Mapping::new();
        for action in self.manifest.action_names() {
            let steps: Vec<&Step> = self
                .manifest
                .steps(&action)
                .map(|steps| {
                    steps
                        .iter()
                        .filter(|s| s.mixin_name() == Some(mixin))
                        .collect()
                })
                .unwrap_or_default();
            actions.insert(
                action.clone().into(),
                serde_yaml_ng::to_value(&steps)
                    .with_context(|| format!("could not marshal {} steps", action))?,
            );
        }
        input.insert("actions".into(), YamlValue::Mapping(actions));

        serde_yaml_ng::to_string(&input)
            .with_context(|| format!("could not marshal input for mixin {}", mixin))
    }
}

/// Runs a command against every mixin concurrently and gathers their stdout
pub struct MixinQuery<'a> {
    executor: &'a dyn MixinExecutor,

    /// Every mixin must succeed. Off for commands that not all mixins
    /// implement, like `lint`.
    require_all_responses: bool,

    /// Send mixin stderr to the caller's stderr instead of discarding it
    log_mixin_errors: bool,
}

impl<'a> MixinQuery<'a> {
    pub fn new(executor: &'a dyn MixinExecutor) -> Self {
        Self {
            executor,
            require_all_responses: false,
            log_mixin_errors: false,
        }
    }

    pub fn require_all_responses(mut self, require: bool) -> Self {
        self.require_all_responses = require;
        self
    }

    pub fn log_mixin_errors(mut self, log: bool) -> Self {
        self.log_mixin_errors = log;
        self
    }

    /// Run `command` on every mixin the generator lists.
    ///
    /// Returns the stdout of each mixin that succeeded, keyed by name.
    pub async fn execute(
        &self,
        ctx: &ProcessContext,
        command: &str,
        generator: &dyn InputGenerator,
    ) -> Result<BTreeMap<String, String>> {
        let mixins = generator.mixins();
        debug!(command = %command, count = mixins.len(), "Querying mixins");

        let tasks = mixins.into_iter().map(|mixin| async move {
            let stdout = SharedBuffer::new();
            let err = if self.log_mixin_errors {
                ctx.err.clone()
            } else {
                Sink::Discard
            };
            let child = ctx.with_sinks(Sink::Buffer(stdout.clone()), err);

            let result = match generator.build_input(&mixin) {
                Ok(input) => {
                    let opts = CommandOptions::new(command).with_input(input);
                    self.executor
                        .run(&child, &mixin, &opts)
                        .await
                        .map(|_| ())
                        .map_err(anyhow::Error::new)
                }
                Err(e) => Err(e.context("could not build the mixin input")),
            };
            (mixin, stdout.contents(), result)
        });

        let mut responses = BTreeMap::new();
        let mut errs = ErrorList::new();
        for (mixin, stdout, result) in join_all(tasks).await {
            match result {
                Ok(()) => {
                    responses.insert(mixin, stdout);
                }
                Err(e) => errs.push(format!("error encountered from mixin {:?}: {:#}", mixin, e)),
            }
        }

        if !errs.is_empty() {
            if self.require_all_responses {
                return Err(anyhow::Error::new(errs));
            }
            debug!("not all mixins responded successfully: {}", errs);
        }

        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
name: hello
registry: localhost:5000
mixins:
  - exec
  - helm3:
      clientVersion: v3.8.0
install:
  - exec:
      description: Install exec
  - helm3:
      description: Install chart
uninstall:
  - helm3:
      description: Remove chart
"#;

    #[test]
    fn test_manifest_input_groups_steps_by_mixin() {
        let m = Manifest::from_bytes(MANIFEST.as_bytes()).unwrap();
        let gen = ManifestInputGenerator::new(&m);
        assert_eq!(gen.mixins(), vec!["exec", "helm3"]);

        let input: YamlValue = serde_yaml_ng::from_str(&gen.build_input("helm3").unwrap()).unwrap();
        assert_eq!(input["config"]["clientVersion"].as_str(), Some("v3.8.0"));
        assert_eq!(input["actions"]["install"].as_sequence().unwrap().len(), 1);
        assert_eq!(
            input["actions"]["uninstall"][0]["helm3"]["description"].as_str(),
            Some("Remove chart")
        );

        let input: YamlValue = serde_yaml_ng::from_str(&gen.build_input("exec").unwrap()).unwrap();
        assert!(input.get("config").is_none());
        assert_eq!(input["actions"]["uninstall"].as_sequence().unwrap().len(), 0);
    }
}
