//! Fake mixins written as shell scripts

#![allow(dead_code)]

use porter_core::{ProcessContext, SharedBuffer, Sink};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Install a shell script as both the client and runtime binary of `name`
#[cfg(unix)]
pub fn install_mixin(mixins_dir: &Path, name: &str, script: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let dir = mixins_dir.join(name);
    fs::create_dir_all(&dir).unwrap();
    let body = format!("#!/bin/sh\n{}\n", script);
    for file in [name.to_string(), format!("{}-runtime", name)] {
        let path = dir.join(file);
        fs::write(&path, &body).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }
    dir.join(name)
}

/// Context running in `working_dir` with stdout and stderr captured
pub fn capture_context(working_dir: &Path) -> (ProcessContext, SharedBuffer, SharedBuffer) {
    let out = SharedBuffer::new();
    let err = SharedBuffer::new();
    let mut env = BTreeMap::new();
    if let Ok(path) = std::env::var("PATH") {
        env.insert("PATH".to_string(), path);
    }
    let ctx = ProcessContext::new(env, working_dir)
        .with_sinks(Sink::Buffer(out.clone()), Sink::Buffer(err.clone()));
    (ctx, out, err)
}
