//! Built-in plugins driving stand-in tools over the protocol

#![cfg(unix)]

mod common;

use common::*;
use porter_plugins::builtin::{Cosign, Syft};
use porter_plugins::{PluginError, SbomGeneratorProtocol, SigningProtocol};
use serde_json::json;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A tool that appends its arguments and selected env vars to `calls`
fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[tokio::test]
async fn test_cosign_signs_with_configured_key() {
    let tmp = TempDir::new().unwrap();
    let calls = tmp.path().join("calls");
    let tool = fake_tool(
        tmp.path(),
        "cosign",
        &format!("echo \"$@ experimental=$COSIGN_EXPERIMENTAL\" >> {}", calls.display()),
    );

    let (mut conn, _task) = connect_in_process(
        Cosign::default().with_program(tool),
        Some(json!({"privateKey": "cosign.key", "experimental": true})),
    )
    .await
    .unwrap();
    SigningProtocol::sign(&mut conn, "localhost:5000/hello:v1")
        .await
        .unwrap();

    let recorded = std::fs::read_to_string(&calls).unwrap();
    assert_eq!(
        recorded.trim(),
        "sign localhost:5000/hello:v1 --tlog-upload=false --key cosign.key --yes experimental=1"
    );
}

#[tokio::test]
async fn test_cosign_failure_carries_tool_output() {
    let tmp = TempDir::new().unwrap();
    let tool = fake_tool(tmp.path(), "cosign", "echo 'no matching signatures' >&2\nexit 1");

    let (mut conn, _task) = connect_in_process(
        Cosign::default().with_program(tool),
        Some(json!({"publicKey": "cosign.pub"})),
    )
    .await
    .unwrap();
    let err = SigningProtocol::verify(&mut conn, "localhost:5000/hello:v1")
        .await
        .unwrap_err();

    match err {
        PluginError::Remote { message, .. } => {
            assert!(message.contains("no matching signatures"), "{}", message)
        }
        other => panic!("expected a remote error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_syft_insecure_registry_sets_env() {
    let tmp = TempDir::new().unwrap();
    let calls = tmp.path().join("calls");
    let tool = fake_tool(
        tmp.path(),
        "syft",
        &format!(
            "echo \"$@ http=$SYFT_REGISTRY_INSECURE_USE_HTTP\" >> {}",
            calls.display()
        ),
    );

    let (mut conn, _task) = connect_in_process(Syft::default().with_program(tool), None)
        .await
        .unwrap();
    SbomGeneratorProtocol::generate(&mut conn, "localhost:5000/hello:v1", "/tmp/sbom.json", true)
        .await
        .unwrap();

    let recorded = std::fs::read_to_string(&calls).unwrap();
    assert_eq!(
        recorded.trim(),
        "scan registry:localhost:5000/hello:v1 -o spdx-json=/tmp/sbom.json http=true"
    );
}

#[tokio::test]
async fn test_missing_tool_is_reported() {
    let (mut conn, _task) = connect_in_process(
        Cosign::default().with_program("/nonexistent/cosign"),
        Some(json!({"privateKey": "k"})),
    )
    .await
    .unwrap();
    let err = SigningProtocol::sign(&mut conn, "localhost:5000/hello:v1")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("/nonexistent/cosign failed"), "{}", err);
}
