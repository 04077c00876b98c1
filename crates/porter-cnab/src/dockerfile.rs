//! Installer image Dockerfile generation
//!
//! Starts from the embedded template or the manifest's `dockerfile`, lets
//! every mixin contribute lines through its `build` command and splices
//! them in at the `# PORTER_INIT` / `# PORTER_MIXINS` tokens. The result
//! and the files it copies are staged under `<build context>/.cnab`.

use anyhow::{bail, Context, Result};
use porter_core::manifest::Manifest;
use porter_core::ProcessContext;
use porter_mixins::{ManifestInputGenerator, MixinExecutor, MixinQuery, MixinRunner};
use rust_embed::RustEmbed;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Frontend used when the Dockerfile does not pick one
pub const DEFAULT_DOCKERFILE_SYNTAX: &str = "docker/dockerfile-upstream:1.4.0";

/// Replaced with the build arguments and bundle user
pub const INIT_TOKEN: &str = "# PORTER_INIT";

/// Replaced with the lines contributed by mixins
pub const MIXINS_TOKEN: &str = "# PORTER_MIXINS";

/// Staging directory inside the build context
pub const BUILD_DIR: &str = ".cnab";

#[derive(RustEmbed)]
#[folder = "templates/"]
struct BuildTemplates;

/// Generates the installer Dockerfile for a manifest
pub struct DockerfileGenerator<'a> {
    manifest: &'a Manifest,
    executor: &'a dyn MixinExecutor,
    build_context: PathBuf,
}

impl<'a> DockerfileGenerator<'a> {
    pub fn new(
        manifest: &'a Manifest,
        executor: &'a dyn MixinExecutor,
        build_context: impl Into<PathBuf>,
    ) -> Self {
        Self {
            manifest,
            executor,
            build_context: build_context.into(),
        }
    }

    /// `<build context>/.cnab`
    pub fn build_dir(&self) -> PathBuf {
        self.build_context.join(BUILD_DIR)
    }

    /// Build the Dockerfile, one entry per line
    pub async fn generate(&self, ctx: &ProcessContext) -> Result<Vec<String>> {
        let template = self.template()?;
        let mut lines: Vec<String> = template.lines().map(String::from).collect();
        ensure_syntax(&mut lines);

        let mixin_lines = self.mixin_lines(ctx).await?;
        if !replace_token(&mut lines, INIT_TOKEN, &init_section()) {
            insert_after_from(&mut lines, init_section());
        }
        if !replace_token(&mut lines, MIXINS_TOKEN, &mixin_lines) {
            lines.extend(mixin_lines);
        }

        lines.extend(self.porter_section());
        lines.extend(cnab_section());
        lines.push("WORKDIR ${BUNDLE_DIR}".to_string());
        lines.push(r#"CMD ["/cnab/app/run"]"#.to_string());
        Ok(lines)
    }

    /// Generate the Dockerfile and write it to `.cnab/Dockerfile`
    pub async fn write(&self, ctx: &ProcessContext) -> Result<PathBuf> {
        let lines = self.generate(ctx).await?;
        let dir = self.build_dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("could not create {}", dir.display()))?;
        let path = dir.join("Dockerfile");
        fs::write(&path, lines.join("\n") + "\n")
            .with_context(|| format!("could not write {}", path.display()))?;
        debug!("Wrote Dockerfile to {}", path.display());
        Ok(path)
    }

    /// Stage what the image needs under `.cnab/app`: the run script, the
    /// manifest, each mixin's runtime binary and, when given, the porter
    /// runtime itself.
    pub fn prepare_filesystem(&self, mixins_dir: &Path, porter_runtime: Option<&Path>) -> Result<()> {
        let app_dir = self.build_dir().join("app");
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("could not create {}", app_dir.display()))?;

        let run = embedded("run.tmpl")?;
        let run_path = app_dir.join("run");
        fs::write(&run_path, run).context("could not write the run script")?;
        make_executable(&run_path)?;

        fs::write(app_dir.join("porter.yaml"), &self.manifest.raw)
            .context("could not copy the manifest into the bundle")?;

        let runner = MixinRunner::new(mixins_dir);
        for mixin in self.manifest.mixin_names() {
            let src = runner.executable_path(&mixin, true);
            if !src.exists() {
                bail!(
                    "mixin {} is not installed: {} does not exist",
                    mixin,
                    src.display()
                );
            }
            let dest_dir = app_dir.join("mixins").join(&mixin);
            fs::create_dir_all(&dest_dir)?;
            let dest = dest_dir.join(format!("{}-runtime", mixin));
            fs::copy(&src, &dest)
                .with_context(|| format!("could not copy the {} mixin runtime", mixin))?;
            make_executable(&dest)?;
        }

        if let Some(runtime) = porter_runtime {
            let dest = app_dir.join("porter");
            fs::copy(runtime, &dest).with_context(|| {
                format!("could not copy the porter runtime from {}", runtime.display())
            })?;
            make_executable(&dest)?;
        }
        Ok(())
    }

    fn template(&self) -> Result<String> {
        if self.manifest.dockerfile.is_empty() {
            return embedded("Dockerfile.tmpl");
        }
        let path = self.build_context.join(&self.manifest.dockerfile);
        if !path.exists() {
            bail!(
                "the Dockerfile specified in the manifest doesn't exist: {:?}",
                path.display().to_string()
            );
        }
        debug!("Using Dockerfile template {}", path.display());
        fs::read_to_string(&path)
            .with_context(|| format!("error reading the Dockerfile at {}", path.display()))
    }

    async fn mixin_lines(&self, ctx: &ProcessContext) -> Result<Vec<String>> {
        let responses = MixinQuery::new(self.executor)
            .require_all_responses(true)
            .log_mixin_errors(true)
            .execute(ctx, "build", &ManifestInputGenerator::new(self.manifest))
            .await?;

        // Mixin order is the order declared in the manifest
        let mut lines = Vec::new();
        for mixin in self.manifest.mixin_names() {
            if let Some(stdout) = responses.get(&mixin) {
                lines.extend(stdout.lines().map(String::from));
            }
        }
        Ok(lines)
    }

    fn porter_section(&self) -> Vec<String> {
        match self.relative_manifest_path() {
            Some(rel) => vec![format!("RUN rm ${{BUNDLE_DIR}}/{}", rel)],
            None => Vec::new(),
        }
    }

    /// Manifest path relative to the build context, when it lives inside it
    fn relative_manifest_path(&self) -> Option<String> {
        if self.manifest.manifest_path.is_empty() {
            return None;
        }
        let manifest = normalize(Path::new(&self.manifest.manifest_path));
        let context = normalize(&self.build_context);
        let rel = manifest.strip_prefix(&context).ok()?;
        if rel.as_os_str().is_empty() || rel.components().any(|c| c == Component::ParentDir) {
            return None;
        }
        Some(rel.to_string_lossy().replace('\\', "/"))
    }
}

fn embedded(name: &str) -> Result<String> {
    let file = BuildTemplates::get(name)
        .with_context(|| format!("embedded template {} is missing", name))?;
    let content = std::str::from_utf8(file.data.as_ref())
        .with_context(|| format!("Invalid UTF-8 in template: {}", name))?;
    Ok(content.to_string())
}

fn init_section() -> Vec<String> {
    [
        "ARG BUNDLE_DIR",
        "ARG BUNDLE_UID=65532",
        "ARG BUNDLE_USER=nonroot",
        "ARG BUNDLE_GID=0",
        "RUN useradd ${BUNDLE_USER} -m -u ${BUNDLE_UID} -g ${BUNDLE_GID} -o",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn cnab_section() -> Vec<String> {
    [
        "RUN rm -fr ${BUNDLE_DIR}/.cnab",
        "COPY --link .cnab /cnab",
        "RUN chgrp -R ${BUNDLE_GID} /cnab && chmod -R g=u /cnab",
        "USER ${BUNDLE_UID}",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn ensure_syntax(lines: &mut Vec<String>) {
    if lines.iter().any(|l| l.trim_start().starts_with("# syntax=")) {
        return;
    }
    warn!(
        "No syntax was specified in the Dockerfile, defaulting to {}",
        DEFAULT_DOCKERFILE_SYNTAX
    );
    lines.insert(0, format!("# syntax={}", DEFAULT_DOCKERFILE_SYNTAX));
}

/// Replace every line equal to `token` with `replacement`
fn replace_token(lines: &mut Vec<String>, token: &str, replacement: &[String]) -> bool {
    if !lines.iter().any(|l| l.trim() == token) {
        return false;
    }
    let mut out = Vec::with_capacity(lines.len() + replacement.len());
    for line in lines.drain(..) {
        if line.trim() == token {
            out.extend(replacement.iter().cloned());
        } else {
            out.push(line);
        }
    }
    *lines = out;
    true
}

/// Insert after the first FROM; with no FROM at all, append
fn insert_after_from(lines: &mut Vec<String>, section: Vec<String>) {
    let from = lines
        .iter()
        .position(|l| l.trim_start().to_ascii_uppercase().starts_with("FROM "));
    match from {
        Some(i) => {
            lines.splice(i + 1..i + 1, section);
        }
        None => lines.extend(section),
    }
}

fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| *c != Component::CurDir)
        .collect()
}

fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
            .with_context(|| format!("could not make {} executable", path.display()))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use porter_core::{SharedBuffer, Sink};
    use porter_mixins::{CommandOptions, CommandOutput, MixinError};
    use tempfile::TempDir;

    /// Answers `build` with a line naming the mixin
    struct BuildLines;

    #[async_trait]
    impl MixinExecutor for BuildLines {
        async fn run(
            &self,
            ctx: &ProcessContext,
            mixin: &str,
            _opts: &CommandOptions,
        ) -> porter_mixins::Result<CommandOutput> {
            let line = format!("# {} mixin has no buildtime dependencies\n", mixin);
            ctx.write_out(&line).map_err(|e| MixinError::Start {
                mixin: mixin.to_string(),
                source: e,
            })?;
            Ok(CommandOutput::default())
        }
    }

    fn manifest(extra: &str) -> Manifest {
        let yaml = format!(
            "schemaVersion: 1.0.0\nname: hello\nversion: 0.1.0\nregistry: localhost:5000\nmixins:\n  - exec\n{}install:\n  - exec:\n      description: hi\n      command: echo\n",
            extra
        );
        Manifest::from_bytes(yaml.as_bytes()).unwrap()
    }

    fn quiet_context() -> ProcessContext {
        ProcessContext::default().with_sinks(Sink::Buffer(SharedBuffer::new()), Sink::Discard)
    }

    #[tokio::test]
    async fn test_default_template() {
        let m = manifest("");
        let dir = TempDir::new().unwrap();
        let lines = DockerfileGenerator::new(&m, &BuildLines, dir.path())
            .generate(&quiet_context())
            .await
            .unwrap();

        assert_eq!(lines[0], "# syntax=docker/dockerfile-upstream:1.4.0");
        assert!(lines.contains(&"ARG BUNDLE_UID=65532".to_string()));
        assert!(lines.contains(&"# exec mixin has no buildtime dependencies".to_string()));
        assert!(!lines.iter().any(|l| l.trim() == INIT_TOKEN || l.trim() == MIXINS_TOKEN));
        assert_eq!(lines.last().unwrap(), r#"CMD ["/cnab/app/run"]"#);
    }

    #[tokio::test]
    async fn test_custom_dockerfile_without_tokens() {
        let m = manifest("dockerfile: template.Dockerfile\n");
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("template.Dockerfile"),
            "FROM ubuntu:22.04\nRUN apt-get update\n",
        )
        .unwrap();

        let lines = DockerfileGenerator::new(&m, &BuildLines, dir.path())
            .generate(&quiet_context())
            .await
            .unwrap();

        assert_eq!(lines[0], "# syntax=docker/dockerfile-upstream:1.4.0");
        assert_eq!(lines[1], "FROM ubuntu:22.04");
        assert_eq!(lines[2], "ARG BUNDLE_DIR");
        let mixin_line = lines
            .iter()
            .position(|l| l.contains("exec mixin"))
            .unwrap();
        let apt = lines.iter().position(|l| l == "RUN apt-get update").unwrap();
        assert!(mixin_line > apt);
    }

    #[tokio::test]
    async fn test_missing_custom_dockerfile() {
        let m = manifest("dockerfile: nope.Dockerfile\n");
        let dir = TempDir::new().unwrap();
        let err = DockerfileGenerator::new(&m, &BuildLines, dir.path())
            .generate(&quiet_context())
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("the Dockerfile specified in the manifest doesn't exist"));
    }

    #[tokio::test]
    async fn test_manifest_in_build_context_is_removed() {
        let dir = TempDir::new().unwrap();
        let mut m = manifest("");
        m.manifest_path = dir.path().join("porter.yaml").display().to_string();
        let lines = DockerfileGenerator::new(&m, &BuildLines, dir.path())
            .generate(&quiet_context())
            .await
            .unwrap();
        assert!(lines.contains(&"RUN rm ${BUNDLE_DIR}/porter.yaml".to_string()));
    }

    #[tokio::test]
    async fn test_write() {
        let m = manifest("");
        let dir = TempDir::new().unwrap();
        let path = DockerfileGenerator::new(&m, &BuildLines, dir.path())
            .write(&quiet_context())
            .await
            .unwrap();
        assert_eq!(path, dir.path().join(".cnab/Dockerfile"));
        assert!(fs::read_to_string(path).unwrap().ends_with("CMD [\"/cnab/app/run\"]\n"));
    }

    #[test]
    fn test_prepare_filesystem_requires_runtime() {
        let m = manifest("");
        let dir = TempDir::new().unwrap();
        let mixins = TempDir::new().unwrap();
        let gen = DockerfileGenerator::new(&m, &BuildLines, dir.path());
        assert!(gen.prepare_filesystem(mixins.path(), None).is_err());

        fs::create_dir_all(mixins.path().join("exec")).unwrap();
        fs::write(mixins.path().join("exec/exec-runtime"), "#!/bin/sh\n").unwrap();
        gen.prepare_filesystem(mixins.path(), None).unwrap();
        assert!(dir.path().join(".cnab/app/run").exists());
        assert!(dir.path().join(".cnab/app/porter.yaml").exists());
        assert!(dir.path().join(".cnab/app/mixins/exec/exec-runtime").exists());
    }

    #[test]
    fn test_replace_token_matches_trimmed_lines() {
        let mut lines = vec!["FROM x".to_string(), "  # PORTER_MIXINS ".to_string()];
        assert!(replace_token(&mut lines, MIXINS_TOKEN, &["RUN a".into(), "RUN b".into()]));
        assert_eq!(lines, vec!["FROM x", "RUN a", "RUN b"]);
        assert!(!replace_token(&mut lines, INIT_TOKEN, &[]));
    }
}
