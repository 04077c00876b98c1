//! Starting plugins and calling their gRPC services

mod common;

use common::*;
use porter_plugins::connection::handshake;
use porter_plugins::protocol::PROTOCOL_VERSION;
use porter_plugins::{
    run, LaunchEnv, PluginConnection, PluginError, SbomGeneratorProtocol, SigningProtocol,
};
use serde_json::json;
use std::time::Duration;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

#[tokio::test]
async fn test_handshake_passes_plugin_config() {
    let plugin = RecordingPlugin::default();
    let (_conn, _task) = connect_in_process(plugin.clone(), Some(json!({"keyless": true})))
        .await
        .unwrap();

    assert_eq!(*plugin.config.lock().unwrap(), Some(json!({"keyless": true})));
}

#[tokio::test]
async fn test_sign_and_generate_reach_the_plugin() {
    let plugin = RecordingPlugin::default();
    let (mut conn, _task) = connect_in_process(plugin.clone(), None).await.unwrap();

    SigningProtocol::sign(&mut conn, "localhost:5000/hello:v1")
        .await
        .unwrap();
    SbomGeneratorProtocol::generate(&mut conn, "localhost:5000/hello:v1", "/tmp/sbom.json", true)
        .await
        .unwrap();

    assert_eq!(
        plugin.calls(),
        vec![
            "sign localhost:5000/hello:v1",
            "generate localhost:5000/hello:v1 /tmp/sbom.json true",
        ]
    );
}

#[tokio::test]
async fn test_unimplemented_operation_is_reported() {
    let (mut conn, _task) = connect_in_process(RecordingPlugin::default(), None)
        .await
        .unwrap();

    let err = SigningProtocol::verify(&mut conn, "localhost:5000/hello:v1")
        .await
        .unwrap_err();
    assert!(err.is_not_implemented(), "{}", err);
}

#[tokio::test]
async fn test_plugin_failure_carries_its_message() {
    let (mut conn, _task) = connect_in_process(RecordingPlugin::default(), None)
        .await
        .unwrap();

    let err = SigningProtocol::sign(&mut conn, "localhost:5000/bad:v1")
        .await
        .unwrap_err();
    match err {
        PluginError::Remote { key, message } => {
            assert_eq!(key, "signing.test.recorder");
            assert!(message.contains("registry unreachable"), "{}", message);
        }
        other => panic!("expected a remote error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_close_is_idempotent_and_ends_the_server() {
    let (mut conn, task) = connect_in_process(RecordingPlugin::default(), None)
        .await
        .unwrap();

    conn.close().await.unwrap();
    conn.close().await.unwrap();
    assert!(conn.is_closed());
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("the plugin did not stop after the shutdown request")
        .unwrap()
        .unwrap();

    let err = SigningProtocol::sign(&mut conn, "localhost:5000/hello:v1")
        .await
        .unwrap_err();
    assert!(matches!(err, PluginError::Closed { .. }));
}

#[tokio::test]
async fn test_plugin_refuses_foreign_launch() {
    let (_stdin, plugin_stdin) = duplex(1024);
    let (plugin_stdout, mut stdout) = duplex(1024);

    let err = run(
        Box::new(RecordingPlugin::default()),
        LaunchEnv::default(),
        plugin_stdin,
        plugin_stdout,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PluginError::NotLaunchedByPorter), "{:?}", err);

    let mut announced = String::new();
    stdout.read_to_string(&mut announced).await.unwrap();
    assert!(announced.is_empty(), "{}", announced);
}

#[tokio::test]
async fn test_plugin_rejects_malformed_config() {
    let (mut stdin, plugin_stdin) = duplex(1024);
    let (plugin_stdout, _stdout) = duplex(1024);
    stdin.write_all(b"{\"keyless\": ").await.unwrap();
    drop(stdin);

    let err = run(
        Box::new(RecordingPlugin::default()),
        LaunchEnv::porter(PROTOCOL_VERSION),
        plugin_stdin,
        plugin_stdout,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PluginError::Config { .. }), "{:?}", err);
}

#[tokio::test]
async fn test_host_rejects_other_service_versions() {
    let (stdin, _plugin_stdin) = duplex(1024);
    let (mut plugin_stdout, stdout) = duplex(1024);
    plugin_stdout
        .write_all(format!("1|{}|tcp|127.0.0.1:1|grpc\n", PROTOCOL_VERSION + 1).as_bytes())
        .await
        .unwrap();

    let err = handshake(&test_key(), stdin, stdout, None, PROTOCOL_VERSION)
        .await
        .unwrap_err();
    assert!(
        err.to_string().contains(&format!(
            "plugin speaks protocol version {}, porter requires {}",
            PROTOCOL_VERSION + 1,
            PROTOCOL_VERSION
        )),
        "{}",
        err
    );
}

#[tokio::test]
async fn test_plugin_exiting_before_the_handshake_fails() {
    let (stdin, _plugin_stdin) = duplex(1024);
    let (plugin_stdout, stdout) = duplex(1024);
    drop(plugin_stdout);

    let err = handshake(&test_key(), stdin, stdout, None, PROTOCOL_VERSION)
        .await
        .unwrap_err();
    assert!(matches!(err, PluginError::Handshake { .. }), "{:?}", err);
}

#[cfg(unix)]
mod process {
    use super::*;
    use porter_core::PorterConfig;
    use porter_plugins::signing::signing_plugin_type;
    use porter_plugins::PluginLoader;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::time::Instant;

    const START: Duration = Duration::from_secs(5);

    fn script(dir: &Path, body: &str) -> PathBuf {
        let bin = dir.join("plugin");
        std::fs::write(&bin, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
        bin
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_start() {
        let err = PluginConnection::start(
            test_key(),
            Path::new("/nonexistent/plugin"),
            &[],
            None,
            PROTOCOL_VERSION,
            START,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PluginError::Start { .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn test_silent_plugin_times_out_and_is_killed() {
        let started = Instant::now();
        let err = PluginConnection::start(
            test_key(),
            Path::new("sleep"),
            &["30".to_string()],
            None,
            PROTOCOL_VERSION,
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PluginError::StartTimeout { .. }), "{:?}", err);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_plugin_stderr_explains_a_failed_start() {
        let tmp = tempfile::TempDir::new().unwrap();
        let bin = script(tmp.path(), "echo \"cookie is $PORTER\" >&2\nexit 1");

        let err = PluginConnection::start(test_key(), &bin, &[], None, PROTOCOL_VERSION, START)
            .await
            .unwrap_err();
        match err {
            PluginError::Handshake { message, .. } => {
                assert!(
                    message.contains(&format!(
                        "cookie is {}",
                        porter_plugins::protocol::MAGIC_COOKIE
                    )),
                    "{}",
                    message
                );
            }
            other => panic!("expected a handshake error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_loader_reports_plugins_that_never_answer() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("cosign");
        std::fs::create_dir_all(&dir).unwrap();
        let bin = dir.join("cosign");
        std::fs::write(&bin, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = PorterConfig {
            plugins_dir: camino::Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).ok(),
            default_signing_plugin: "cosign.sigstore".to_string(),
            plugin_start_timeout: Duration::from_millis(100),
            plugin_stop_timeout: Duration::from_millis(50),
            ..Default::default()
        };

        let err = PluginLoader::new(config)
            .load(&signing_plugin_type())
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("could not connect to the signing.cosign.sigstore plugin"));
        assert!(err
            .chain()
            .any(|e| matches!(e.downcast_ref::<PluginError>(), Some(PluginError::StartTimeout { .. }))));
    }
}
