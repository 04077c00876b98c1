//! Running script mixins end to end
#![cfg(unix)]

mod common;

use common::*;
use porter_core::process::CENSORED;
use porter_mixins::runner::{run_step, StepDirectives};
use porter_mixins::{CommandOptions, MixinError, MixinExecutor, MixinRunner};
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const STEP: &str = r#"
description: Generate config
command: ./generate.sh
outputs:
  - name: file
    path: config.txt
  - name: jsonpath
    jsonPath: "$[*].id"
  - name: regex
    regex: "Token: (\\w+)"
"#;

#[tokio::test]
async fn test_step_outputs_are_extracted() {
    let mixins = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let outputs = TempDir::new().unwrap();
    install_mixin(
        mixins.path(),
        "exec",
        r#"cat > /dev/null
printf abc > config.txt
echo '[{"id":"1"},{"id":"2"}]'
echo 'Token: xyz'"#,
    );

    let runner = MixinRunner::new(mixins.path());
    let (ctx, out, _) = capture_context(work.path());
    let body = serde_yaml_ng::from_str(STEP).unwrap();
    let directives = StepDirectives::from_body("exec", &body).unwrap();
    let opts = CommandOptions::new("install")
        .with_input("install:\n  - exec: {}\n")
        .runtime();

    run_step(&runner, &ctx, "exec", &opts, &directives, outputs.path())
        .await
        .unwrap();

    let read = |name: &str| fs::read_to_string(outputs.path().join(name)).unwrap();
    assert_eq!(read("file"), "abc");
    assert_eq!(read("jsonpath"), r#"["1","2"]"#);
    assert_eq!(read("regex"), "xyz");
    assert!(out.contents().contains("Token: xyz"));
}

#[tokio::test]
async fn test_arguments_environment_and_stdin() {
    let mixins = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    install_mixin(
        mixins.path(),
        "exec",
        r#"echo "args: $*"
echo "greeting: $GREETING"
echo "home: ${HOME:-unset}"
echo "cwd: $(pwd)"
cat"#,
    );

    let runner = MixinRunner::new(mixins.path());
    let (mut ctx, _, _) = capture_context(work.path());
    ctx.setenv("GREETING", "hello");
    ctx.debug = true;

    let output = runner
        .run(
            &ctx,
            "exec",
            &CommandOptions::new("status")
                .with_input("payload from porter\n")
                .with_file("porter.yaml"),
        )
        .await
        .unwrap();

    let cwd = fs::canonicalize(work.path()).unwrap();
    assert!(output
        .stdout
        .contains("args: invoke --action status -f porter.yaml --debug"));
    assert!(output.stdout.contains("greeting: hello"));
    assert!(output.stdout.contains("home: unset"));
    assert!(output.stdout.contains(&format!("cwd: {}", cwd.display())));
    assert!(output.stdout.ends_with("payload from porter\n"));
}

#[tokio::test]
async fn test_exit_code_and_stderr_are_reported() {
    let mixins = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    install_mixin(
        mixins.path(),
        "helm",
        "echo 'release already exists' >&2\nexit 3",
    );

    let runner = MixinRunner::new(mixins.path());
    let (ctx, _, err) = capture_context(work.path());
    let result = runner
        .run(&ctx, "helm", &CommandOptions::new("install").runtime())
        .await;

    match result {
        Err(MixinError::Exit { code, stderr, .. }) => {
            assert_eq!(code, 3);
            assert!(stderr.contains("release already exists"));
        }
        other => panic!("expected an exit error, got {:?}", other),
    }
    assert!(err.contents().contains("release already exists"));
}

#[tokio::test]
async fn test_error_handler_swallows_matching_failure() {
    let mixins = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let outputs = TempDir::new().unwrap();
    install_mixin(
        mixins.path(),
        "helm",
        "echo 'Token: abc'\necho 'release already exists' >&2\nexit 1",
    );

    let runner = MixinRunner::new(mixins.path());
    let (ctx, _, _) = capture_context(work.path());
    let body = serde_yaml_ng::from_str(
        r#"
description: Install chart
outputs:
  - name: token
    regex: "Token: (\\w+)"
ignoreError:
  output:
    contains: ["already exists"]
"#,
    )
    .unwrap();
    let directives = StepDirectives::from_body("helm", &body).unwrap();
    let opts = CommandOptions::new("install").runtime();

    run_step(&runner, &ctx, "helm", &opts, &directives, outputs.path())
        .await
        .unwrap();
    assert_eq!(
        fs::read_to_string(outputs.path().join("token")).unwrap(),
        "abc"
    );

    let strict = StepDirectives::default();
    let err = run_step(&runner, &ctx, "helm", &opts, &strict, outputs.path())
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), Some(1));
}

#[tokio::test]
async fn test_sensitive_values_are_censored_in_sinks_only() {
    let mixins = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    install_mixin(mixins.path(), "exec", "echo 'password=secret123'");

    let runner = MixinRunner::new(mixins.path());
    let (ctx, out, _) = capture_context(work.path());
    ctx.set_sensitive_values(vec!["secret123".to_string()]);

    let output = runner
        .run(&ctx, "exec", &CommandOptions::new("install").runtime())
        .await
        .unwrap();

    assert_eq!(output.stdout, "password=secret123\n");
    let shown = out.contents();
    assert!(predicate::str::contains(CENSORED).eval(&shown));
    assert!(predicate::str::contains("secret123").not().eval(&shown));
}

#[tokio::test]
async fn test_unlaunchable_mixin_is_a_start_error() {
    let mixins = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let exe = install_mixin(mixins.path(), "broken", "exit 0");
    fs::write(exe.with_file_name("broken-runtime"), "not a script").unwrap();
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(
            exe.with_file_name("broken-runtime"),
            fs::Permissions::from_mode(0o644),
        )
        .unwrap();
    }

    let runner = MixinRunner::new(mixins.path());
    let (ctx, _, _) = capture_context(work.path());
    let err = runner
        .run(&ctx, "broken", &CommandOptions::new("install").runtime())
        .await
        .unwrap_err();
    assert!(matches!(err, MixinError::Start { .. }), "{:?}", err);
}
