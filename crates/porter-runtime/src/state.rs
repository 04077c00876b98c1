//! The state bag: files carried between runs in a gzip compressed tar
//!
//! Each state variable is stored as `porter-state/<name>`. The archive from
//! the previous run is mounted at `/porter/state.tgz` and unpacked before the
//! first step; a new archive is written to the `porter-state` output after
//! the last one.

use anyhow::{anyhow, Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use porter_core::manifest::StateVariable;
use porter_core::{CnabPaths, ErrorList};
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use tar::{Archive, Builder as TarBuilder};
use tracing::{debug, warn};

/// Directory inside the archive holding the state variables
pub const STATE_DIR: &str = "porter-state";

/// Restore state variables from the incoming archive.
///
/// A missing archive, an empty one and a literal `null` payload all mean
/// "no state yet".
pub fn unpack_state_bag(paths: &CnabPaths, state: &[StateVariable]) -> Result<()> {
    if state.is_empty() {
        debug!("No state variables declared, skipping the state bag");
        return Ok(());
    }

    let archive_path = paths.state_archive_in();
    let data = match fs::read(&archive_path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No state archive at {}", archive_path.display());
            return Ok(());
        }
        Err(e) => {
            return Err(e).with_context(|| {
                format!("could not read the state archive {}", archive_path.display())
            })
        }
    };

    if data.trim_ascii() == b"null" {
        debug!("State archive is null, removing it");
        fs::remove_file(&archive_path).with_context(|| {
            format!("could not remove the empty state archive {}", archive_path.display())
        })?;
        return Ok(());
    }
    if data.is_empty() {
        debug!("State archive is empty");
        return Ok(());
    }

    extract(paths, state, &data)
}

fn extract(paths: &CnabPaths, state: &[StateVariable], data: &[u8]) -> Result<()> {
    let mut archive = Archive::new(GzDecoder::new(data));
    let entries = match archive.entries() {
        Ok(entries) => entries,
        Err(e) => {
            debug!("State archive has no readable entries: {}", e);
            return Ok(());
        }
    };

    let mut seen_header = false;
    for entry in entries {
        let mut entry = match entry {
            Ok(entry) => entry,
            // Nothing was ever written to the archive
            Err(e) if !seen_header => {
                debug!("State archive has no readable entries: {}", e);
                return Ok(());
            }
            Err(e) => return Err(e).context("error reading the state archive"),
        };
        seen_header = true;

        if !entry.header().entry_type().is_file() {
            continue;
        }

        let entry_path = entry
            .path()
            .context("invalid path in the state archive")?
            .to_string_lossy()
            .into_owned();
        let Some(name) = entry_path.strip_prefix(&format!("{}/", STATE_DIR)) else {
            debug!("Ignoring {} in the state archive", entry_path);
            continue;
        };
        let Some(var) = state.iter().find(|v| v.name == name) else {
            warn!("State archive contains {} which is not a declared state variable", name);
            continue;
        };

        let expected = entry.size();
        let mut contents = Vec::new();
        entry
            .read_to_end(&mut contents)
            .with_context(|| format!("error reading {} from the state archive", entry_path))?;
        if contents.len() as u64 != expected {
            return Err(anyhow!(
                "state archive is truncated: {} has {} of {} bytes",
                entry_path,
                contents.len(),
                expected
            ));
        }

        let dest = paths.resolve(&var.location.path);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("could not create {}", parent.display()))?;
        }
        debug!(variable = %var.name, path = %dest.display(), "Restoring state variable");
        fs::write(&dest, contents)
            .with_context(|| format!("could not restore state variable {}", var.name))?;
    }
    Ok(())
}

/// Write every state variable that exists on disk into the outgoing archive.
///
/// A variable that cannot be added is reported without stopping the rest.
pub fn pack_state_bag(paths: &CnabPaths, state: &[StateVariable]) -> Result<()> {
    if state.is_empty() {
        return Ok(());
    }

    let archive_path = paths.state_archive_out();
    if let Some(parent) = archive_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("could not create {}", parent.display()))?;
    }
    let file = File::create(&archive_path)
        .with_context(|| format!("could not create the state archive {}", archive_path.display()))?;
    let mut tar = TarBuilder::new(GzEncoder::new(file, Compression::default()));

    let mut errs = ErrorList::new();
    for var in state {
        let src = paths.resolve(&var.location.path);
        if !src.exists() {
            debug!(variable = %var.name, "State variable does not exist, skipping");
            continue;
        }
        if let Err(e) = append_variable(&mut tar, &src, &var.name) {
            errs.push(format!("error adding state variable {} to the state archive: {}", var.name, e));
        }
    }

    tar.into_inner()
        .and_then(|encoder| encoder.finish())
        .context("could not finish writing the state archive")?;

    errs.into_result().map_err(anyhow::Error::from)
}

fn append_variable<W: std::io::Write>(tar: &mut TarBuilder<W>, src: &Path, name: &str) -> Result<()> {
    tar.append_path_with_name(src, format!("{}/{}", STATE_DIR, name))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use porter_core::manifest::Location;
    use tempfile::TempDir;

    fn var(name: &str, path: &str) -> StateVariable {
        StateVariable {
            name: name.to_string(),
            location: Location {
                path: path.to_string(),
                env: String::new(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_no_state_variables_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let paths = CnabPaths::with_root(tmp.path());
        pack_state_bag(&paths, &[]).unwrap();
        assert!(!paths.state_archive_out().exists());
    }

    #[test]
    fn test_missing_variables_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let paths = CnabPaths::with_root(tmp.path());
        pack_state_bag(&paths, &[var("cache", "/tmp/cache.db")]).unwrap();

        let file = File::open(paths.state_archive_out()).unwrap();
        let mut archive = Archive::new(GzDecoder::new(file));
        assert_eq!(archive.entries().unwrap().count(), 0);
    }

    #[test]
    fn test_null_archive_is_removed() {
        let tmp = TempDir::new().unwrap();
        let paths = CnabPaths::with_root(tmp.path());
        fs::create_dir_all(paths.state_archive_in().parent().unwrap()).unwrap();
        fs::write(paths.state_archive_in(), "null").unwrap();

        unpack_state_bag(&paths, &[var("cache", "/tmp/cache.db")]).unwrap();
        assert!(!paths.state_archive_in().exists());
    }
}
