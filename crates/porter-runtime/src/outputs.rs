//! Moving outputs from where mixins leave them to where the driver
//! collects them

use anyhow::{Context, Result};
use porter_core::{CnabPaths, ErrorList, Manifest};
use porter_mixins::outputs::write_output;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Read every output a mixin wrote to `dir`, removing the files so the next
/// step starts from an empty directory
pub fn collect_mixin_outputs(dir: &Path) -> Result<BTreeMap<String, String>> {
    let mut outputs = BTreeMap::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(outputs),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("could not list mixin outputs in {}", dir.display()))
        }
    };

    for entry in entries {
        let entry = entry.with_context(|| format!("could not list mixin outputs in {}", dir.display()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let contents = fs::read(&path)
            .with_context(|| format!("could not read output {}", name))?;
        fs::remove_file(&path).with_context(|| format!("could not remove output {}", name))?;
        debug!(output = %name, "Collected mixin output");
        outputs.insert(name, String::from_utf8_lossy(&contents).into_owned());
    }
    Ok(outputs)
}

/// Publish step outputs that are also bundle outputs for `action`
pub fn write_bundle_outputs(
    paths: &CnabPaths,
    manifest: &Manifest,
    action: &str,
    outputs: &BTreeMap<String, String>,
) -> Result<()> {
    let dir = paths.bundle_outputs_dir();
    for (name, value) in outputs {
        let Some(def) = manifest.output(name) else {
            continue;
        };
        if !def.applies_to(action) {
            debug!(output = %name, action = %action, "Output does not apply to this action");
            continue;
        }
        write_output(&dir, name, value.as_bytes())
            .with_context(|| format!("could not write bundle output {}", name))?;
    }
    Ok(())
}

/// Copy file outputs that no step produced from their declared path.
///
/// Every output is attempted; failures are reported together.
pub fn apply_unbound_outputs(
    paths: &CnabPaths,
    manifest: &Manifest,
    action: &str,
    outputs: &BTreeMap<String, String>,
) -> Result<()> {
    let mut errs = ErrorList::new();
    for def in &manifest.outputs {
        if def.is_state
            || def.path.is_empty()
            || !def.applies_to(action)
            || outputs.contains_key(&def.name)
        {
            continue;
        }

        let src = paths.resolve(&def.path);
        let dest = paths.bundle_output(&def.name);
        if !src.exists() || dest.exists() {
            continue;
        }

        debug!(output = %def.name, "Copying file output from {}", src.display());
        if let Err(e) = copy_output(&src, &dest) {
            errs.push(format!("unable to copy output file from {}: {:#}", src.display(), e));
        }
    }
    errs.into_result().map_err(anyhow::Error::from)
}

fn copy_output(src: &Path, dest: &Path) -> Result<()> {
    let contents = fs::read(src)?;
    let dir = dest.parent().unwrap_or(Path::new("."));
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    write_output(dir, &name, &contents)?;
    Ok(())
}
