//! Remote command tests

use ferry::ssh::{RemoteCommand, shell_quote};

use super::fixtures::TestEnv;

#[tokio::test]
async fn exec_returns_buffered_output() {
    let env = TestEnv::connected().await;
    env.connector
        .runner
        .on("uname", "Linux\n\n", "warning: locale\n", 0);

    let output = env.manager.exec("uname -s").await.unwrap();
    assert_eq!(output.stdout, "Linux");
    assert_eq!(output.stderr, "warning: locale");
    assert!(output.success());
}

#[tokio::test]
async fn exec_passes_the_command_through_unescaped() {
    let env = TestEnv::connected().await;
    let raw = "cd /tmp && ls $HOME; echo `whoami`";

    env.manager.exec(raw).await.unwrap();
    assert_eq!(env.connector.runner.commands(), vec![raw.to_string()]);
}

#[tokio::test]
async fn quoting_neutralizes_interpolated_names() {
    let env = TestEnv::connected().await;
    let hostile = "x; rm -rf ~";

    env.manager
        .exec(&format!("ls -l {}", shell_quote(hostile)))
        .await
        .unwrap();
    env.manager
        .run(&RemoteCommand::new("stat").arg(hostile))
        .await
        .unwrap();

    assert_eq!(
        env.connector.runner.commands(),
        vec![
            "ls -l 'x; rm -rf ~'".to_string(),
            "stat 'x; rm -rf ~'".to_string(),
        ]
    );
}

#[tokio::test]
async fn non_zero_exit_is_not_an_error() {
    let env = TestEnv::connected().await;
    env.connector.runner.on("false", "", "", 1);

    let output = env.manager.exec("false").await.unwrap();
    assert_eq!(output.exit_code, Some(1));
    assert!(!output.success());
}
