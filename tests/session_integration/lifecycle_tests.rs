//! Connect and disconnect tests

use std::time::Duration;

use ferry::config::Settings;
use ferry::error::{ConnectStage, RemoteError};
use ferry::ssh::ConnectRequest;

use super::fixtures::{FakeConnector, HOME, TestEnv};

#[tokio::test]
async fn connect_reports_the_session() {
    let env = TestEnv::new();
    assert!(!env.manager.is_connected());

    let info = env
        .manager
        .connect(ConnectRequest::direct("files.example", "tester").with_port(2200))
        .await
        .unwrap();

    assert_eq!(info.host_label, "files.example");
    assert_eq!(info.username, "tester");
    assert_eq!(info.home_dir, HOME);
    assert_eq!(env.manager.connection_info(), Some(info));

    let seen = env.connector.targets.lock()[0].clone();
    assert_eq!(seen.port, 2200);
    assert_eq!(seen.jump, None);
}

#[tokio::test]
async fn reconnecting_releases_the_previous_session_first() {
    let env = TestEnv::connected().await;
    let (client, _rx) = env.manager.hub().register();
    env.manager.start_terminal(client, 80, 24).await.unwrap();

    env.connect().await;

    assert_eq!(env.connector.live(), 1);
    assert_eq!(env.connector.max_live(), 1);
    assert_eq!(env.connector.fs.closes(), 1);
    let (pty, _, _) = env.connector.pty(0).unwrap();
    assert!(pty.is_closed());
}

#[tokio::test]
async fn concurrent_connects_are_serialized() {
    let connector = FakeConnector {
        delay: Duration::from_millis(50),
        ..FakeConnector::new()
    };
    let env = TestEnv::with(connector, Settings::default());

    let (a, b) = tokio::join!(
        env.manager
            .connect(ConnectRequest::direct("a.example", "tester")),
        env.manager
            .connect(ConnectRequest::direct("b.example", "tester")),
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(env.connector.live(), 1);
    assert_eq!(env.connector.max_live(), 1);
    assert!(env.manager.is_connected());
}

#[tokio::test]
async fn failed_connect_still_drops_the_old_session() {
    let env = TestEnv::connected().await;
    env.connector.fail_at(ConnectStage::Authentication);

    let err = env
        .manager
        .connect(ConnectRequest::direct("files.example", "tester"))
        .await
        .unwrap_err();
    match err {
        RemoteError::Connect(inner) => assert_eq!(inner.stage, ConnectStage::Authentication),
        other => panic!("unexpected error {other:?}"),
    }
    assert!(!env.manager.is_connected());
    assert_eq!(env.connector.live(), 0);
    assert_eq!(env.connector.fs.closes(), 1);
}

#[tokio::test]
async fn direct_connect_needs_a_hostname() {
    let env = TestEnv::new();
    let err = env
        .manager
        .connect(ConnectRequest::direct("", "tester"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_argument");
    assert!(env.connector.targets.lock().is_empty());
}

#[tokio::test]
async fn disconnect_releases_everything_and_is_idempotent() {
    let env = TestEnv::connected().await;
    let (client, _rx) = env.manager.hub().register();
    env.manager.start_terminal(client, 80, 24).await.unwrap();
    let (pty, _, _) = env.connector.pty(0).unwrap();

    env.manager.disconnect().await;
    env.manager.disconnect().await;

    assert!(!env.manager.is_connected());
    assert_eq!(env.manager.connection_info(), None);
    assert!(pty.is_closed());
    assert_eq!(env.connector.fs.closes(), 1);
    assert_eq!(env.connector.live(), 0);
}

#[tokio::test]
async fn operations_after_disconnect_report_not_connected() {
    let env = TestEnv::connected().await;
    let (client, _rx) = env.manager.hub().register();
    env.manager.start_terminal(client, 80, 24).await.unwrap();
    let (pty, _, _) = env.connector.pty(0).unwrap();
    env.manager.disconnect().await;

    assert!(matches!(
        env.manager.list(None).await,
        Err(RemoteError::NotConnected)
    ));
    assert!(matches!(
        env.manager.exec("uptime").await,
        Err(RemoteError::NotConnected)
    ));
    assert!(matches!(
        env.manager.preview("/etc/hosts").await,
        Err(RemoteError::NotConnected)
    ));
    assert!(matches!(
        env.manager.dir_sizes("/", &["etc".to_string()]).await,
        Err(RemoteError::NotConnected)
    ));

    env.manager.terminal_send(b"ls\r").await;
    env.manager.terminal_resize(10, 10).await;
    assert!(pty.writes.lock().is_empty());
    assert!(pty.resizes.lock().is_empty());
}
