//! A fake exec mixin written as a shell script

use porter_core::{ProcessContext, SharedBuffer, Sink};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Runs the `command:` line of the step it is sent
pub const EXEC_SCRIPT: &str = r#"cmd=$(sed -n 's/^ *command: //p' | sed -e "s/^'\(.*\)'$/\1/" -e 's/^"\(.*\)"$/\1/')
eval "$cmd""#;

/// Install `script` as the runtime binary of `name`
#[cfg(unix)]
pub fn install_runtime_mixin(mixins_dir: &Path, name: &str, script: &str) {
    use std::os::unix::fs::PermissionsExt;

    let dir = mixins_dir.join(name);
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("{}-runtime", name));
    fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
}

/// Context running in `working_dir` with stdout and stderr captured
pub fn capture_context(working_dir: &Path) -> (ProcessContext, SharedBuffer, SharedBuffer) {
    let out = SharedBuffer::new();
    let err = SharedBuffer::new();
    let mut env = BTreeMap::new();
    if let Ok(path) = std::env::var("PATH") {
        env.insert("PATH".to_string(), path);
    }
    env.insert("CNAB_INSTALLATION_NAME".to_string(), "mybundle".to_string());
    let ctx = ProcessContext::new(env, working_dir)
        .with_sinks(Sink::Buffer(out.clone()), Sink::Buffer(err.clone()));
    (ctx, out, err)
}
