//! Running mixin executables
//!
//! A mixin lives at `<mixins-dir>/<name>/<name>` (client) or
//! `<mixins-dir>/<name>/<name>-runtime` (runtime). Commands are passed as
//! arguments and the payload, a YAML document, on stdin. Stdout is streamed
//! line by line through the censoring sink of the [`ProcessContext`] and
//! captured so outputs can be extracted from it afterwards.

use crate::error::{MixinError, Result};
use crate::handler::IgnoreErrorHandler;
use crate::outputs::{process_outputs, StepOutput};
use async_trait::async_trait;
use porter_core::ProcessContext;
use serde::Deserialize;
use serde_yaml_ng::Value as YamlValue;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::debug;

/// Commands every mixin implements directly. Anything else is a custom
/// action and is sent as `invoke --action <name>`.
pub const BUILTIN_COMMANDS: &[&str] = &[
    "install",
    "upgrade",
    "uninstall",
    "build",
    "schema",
    "version",
];

/// What to ask a mixin to do
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOptions {
    /// Command line after the executable, e.g. `version --output json`
    pub command: String,
    /// Written to stdin, then stdin is closed
    pub input: String,
    /// Passed as `-f <file>`
    pub file: Option<String>,
    /// Use the runtime binary instead of the client
    pub runtime: bool,
}

impl CommandOptions {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = input.into();
        self
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn runtime(mut self) -> Self {
        self.runtime = true;
        self
    }

    /// Arguments for the mixin executable
    pub fn args(&self, debug: bool) -> Vec<String> {
        let mut parts = self.command.split_whitespace();
        let command = parts.next().unwrap_or_default();

        let mut args: Vec<String> = if BUILTIN_COMMANDS.contains(&command) {
            vec![command.to_string()]
        } else {
            vec!["invoke".into(), "--action".into(), command.to_string()]
        };
        args.extend(parts.map(String::from));

        if let Some(file) = &self.file {
            args.push("-f".into());
            args.push(file.clone());
        }
        if debug {
            args.push("--debug".into());
        }
        args
    }
}

/// Captured output of a successful mixin command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs commands against installed mixins
#[async_trait]
pub trait MixinExecutor: Send + Sync {
    async fn run(
        &self,
        ctx: &ProcessContext,
        mixin: &str,
        opts: &CommandOptions,
    ) -> Result<CommandOutput>;
}

/// Runs mixins installed under a mixins directory
#[derive(Debug, Clone)]
pub struct MixinRunner {
    mixins_dir: PathBuf,
}

impl MixinRunner {
    pub fn new(mixins_dir: impl Into<PathBuf>) -> Self {
        Self {
            mixins_dir: mixins_dir.into(),
        }
    }

    pub fn mixins_dir(&self) -> &Path {
        &self.mixins_dir
    }

    /// Path of the client or runtime executable for `mixin`
    pub fn executable_path(&self, mixin: &str, runtime: bool) -> PathBuf {
        let dir = self.mixins_dir.join(mixin);
        if runtime {
            return dir.join(format!("{}-runtime", mixin));
        }
        if cfg!(windows) {
            dir.join(format!("{}.exe", mixin))
        } else {
            dir.join(mixin)
        }
    }
}

#[async_trait]
impl MixinExecutor for MixinRunner {
    async fn run(
        &self,
        ctx: &ProcessContext,
        mixin: &str,
        opts: &CommandOptions,
    ) -> Result<CommandOutput> {
        let path = self.executable_path(mixin, opts.runtime);
        if !path.exists() {
            return Err(MixinError::NotInstalled {
                mixin: mixin.to_string(),
                path,
            });
        }

        let args = opts.args(ctx.debug);
        debug!(mixin = %mixin, command = %args.join(" "), "Running mixin");

        let mut cmd = Command::new(&path);
        cmd.args(&args)
            .env_clear()
            .envs(&ctx.env)
            .current_dir(&ctx.working_dir)
            .stdin(if opts.input.is_empty() {
                Stdio::null()
            } else {
                Stdio::piped()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| MixinError::Start {
            mixin: mixin.to_string(),
            source,
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            let input = opts.input.clone();
            let name = mixin.to_string();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    debug!(mixin = %name, "Failed to write mixin stdin: {}", e);
                }
                // stdin closes when dropped here
            });
        }

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (stdout, stderr) = tokio::try_join!(
            pump(stdout, ctx, Stream::Out),
            pump(stderr, ctx, Stream::Err)
        )?;

        let status = child.wait().await?;
        if !status.success() {
            return Err(MixinError::Exit {
                mixin: mixin.to_string(),
                code: status.code().unwrap_or(-1),
                stdout,
                stderr,
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

#[derive(Clone, Copy)]
enum Stream {
    Out,
    Err,
}

/// Tee a child stream into the context's sink, returning everything read
async fn pump<R: AsyncRead + Unpin>(
    reader: Option<R>,
    ctx: &ProcessContext,
    stream: Stream,
) -> std::io::Result<String> {
    let Some(reader) = reader else {
        return Ok(String::new());
    };
    let mut reader = BufReader::new(reader);
    let mut captured = String::new();
    loop {
        let mut line = Vec::new();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        let text = String::from_utf8_lossy(&line);
        match stream {
            Stream::Out => ctx.write_out(&text)?,
            Stream::Err => ctx.write_err(&text)?,
        }
        captured.push_str(&text);
    }
    Ok(captured)
}

/// The parts of a step body the harness acts on; everything else belongs
/// to the mixin
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDirectives {
    #[serde(default)]
    pub outputs: Vec<StepOutput>,
    #[serde(default)]
    pub ignore_error: Option<IgnoreErrorHandler>,
}

impl StepDirectives {
    /// Read directives from a step body
    pub fn from_body(mixin: &str, body: &YamlValue) -> Result<Self> {
        if !body.is_mapping() {
            return Ok(Self::default());
        }
        serde_yaml_ng::from_value(body.clone()).map_err(|e| MixinError::InvalidStep {
            mixin: mixin.to_string(),
            message: e.to_string(),
        })
    }
}

/// Run one step: invoke the mixin, let the step's error handler decide on
/// a failed exit, then extract the step's declared outputs into
/// `outputs_dir`.
pub async fn run_step(
    executor: &dyn MixinExecutor,
    ctx: &ProcessContext,
    mixin: &str,
    opts: &CommandOptions,
    directives: &StepDirectives,
    outputs_dir: &Path,
) -> Result<CommandOutput> {
    let output = match executor.run(ctx, mixin, opts).await {
        Ok(output) => output,
        Err(MixinError::Exit {
            mixin: name,
            code,
            stdout,
            stderr,
        }) => {
            let handled = directives
                .ignore_error
                .as_ref()
                .is_some_and(|h| h.ignores(code, &stderr));
            if !handled {
                return Err(MixinError::Exit {
                    mixin: name,
                    code,
                    stdout,
                    stderr,
                });
            }
            CommandOutput { stdout, stderr }
        }
        Err(e) => return Err(e),
    };

    process_outputs(&directives.outputs, &output.stdout, &ctx.working_dir, outputs_dir)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("install", false, &["install"] ; "builtin")]
    #[test_case("status", false, &["invoke", "--action", "status"] ; "custom action")]
    #[test_case("version --output json", false, &["version", "--output", "json"] ; "builtin with flags")]
    #[test_case("build", true, &["build", "--debug"] ; "debug")]
    fn test_args(command: &str, debug: bool, expected: &[&str]) {
        assert_eq!(CommandOptions::new(command).args(debug), expected);
    }

    #[test]
    fn test_args_with_file() {
        let opts = CommandOptions::new("dry-run").with_file("porter.yaml");
        assert_eq!(
            opts.args(true),
            vec!["invoke", "--action", "dry-run", "-f", "porter.yaml", "--debug"]
        );
    }

    #[test]
    fn test_executable_path() {
        let runner = MixinRunner::new("/home/me/.porter/mixins");
        assert_eq!(
            runner.executable_path("exec", true),
            PathBuf::from("/home/me/.porter/mixins/exec/exec-runtime")
        );
        let client = runner.executable_path("exec", false);
        if cfg!(windows) {
            assert!(client.ends_with("exec/exec.exe"));
        } else {
            assert_eq!(client, PathBuf::from("/home/me/.porter/mixins/exec/exec"));
        }
    }

    #[test]
    fn test_step_directives_from_body() {
        let body: YamlValue = serde_yaml_ng::from_str(
            r#"
description: Install
command: ./install.sh
outputs:
  - name: token
    regex: "Token: (\\w+)"
ignoreError:
  exitCodes: [2]
"#,
        )
        .unwrap();
        let d = StepDirectives::from_body("exec", &body).unwrap();
        assert_eq!(d.outputs.len(), 1);
        assert_eq!(d.outputs[0].name, "token");
        assert_eq!(d.ignore_error.unwrap().exit_codes, vec![2]);

        let bad: YamlValue = serde_yaml_ng::from_str("outputs: 42").unwrap();
        assert!(StepDirectives::from_body("exec", &bad).is_err());
    }

    #[tokio::test]
    async fn test_missing_mixin() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = MixinRunner::new(dir.path());
        let err = runner
            .run(&ProcessContext::default(), "helm", &CommandOptions::new("version"))
            .await
            .unwrap_err();
        assert!(matches!(err, MixinError::NotInstalled { .. }));
    }
}
