//! SSH config tests through the session manager

use ferry::config::NewHost;
use ferry::error::RemoteError;
use ferry::ssh::ConnectRequest;

use super::fixtures::TestEnv;

fn new_host(alias: &str, hostname: &str) -> NewHost {
    NewHost {
        alias: alias.to_string(),
        hostname: hostname.to_string(),
        user: "deploy".to_string(),
        port: 2222,
        identity_file: String::new(),
    }
}

#[tokio::test]
async fn saved_hosts_are_listed_in_alias_order() {
    let env = TestEnv::new();

    let (profiles, _) = env.manager.list_profiles().unwrap();
    assert!(profiles.is_empty());

    env.manager.save_host(&new_host("web", "10.0.0.5")).unwrap();
    env.manager.save_host(&new_host("api", "10.0.0.6")).unwrap();

    let (profiles, _) = env.manager.list_profiles().unwrap();
    let aliases: Vec<&str> = profiles.iter().map(|p| p.alias.as_str()).collect();
    assert_eq!(aliases, vec!["api", "web"]);
    assert_eq!(profiles[1].hostname, "10.0.0.5");
    assert_eq!(profiles[1].user, "deploy");
    assert_eq!(profiles[1].port, 2222);
}

#[tokio::test]
async fn duplicate_alias_is_refused_without_touching_the_file() {
    let env = TestEnv::new();
    env.manager.save_host(&new_host("web", "10.0.0.5")).unwrap();
    let before = std::fs::read_to_string(&env.ssh_config).unwrap();

    let err = env
        .manager
        .save_host(&new_host("web", "10.9.9.9"))
        .unwrap_err();
    assert!(matches!(err, RemoteError::DuplicateAlias(ref a) if a == "web"));
    assert_eq!(std::fs::read_to_string(&env.ssh_config).unwrap(), before);
}

#[tokio::test]
async fn save_host_keeps_existing_content() {
    let env = TestEnv::new();
    std::fs::create_dir_all(env.ssh_config.parent().unwrap()).unwrap();
    std::fs::write(&env.ssh_config, "Host *\n    ServerAliveInterval 30\n").unwrap();

    env.manager.save_host(&new_host("db", "db.internal")).unwrap();

    let content = std::fs::read_to_string(&env.ssh_config).unwrap();
    assert!(content.starts_with("Host *\n    ServerAliveInterval 30\n"));
    assert!(content.contains("\nHost db\n    HostName db.internal\n"));
}

#[cfg(unix)]
#[tokio::test]
async fn config_directory_is_private() {
    use std::os::unix::fs::PermissionsExt;

    let env = TestEnv::new();
    env.manager.save_host(&new_host("web", "10.0.0.5")).unwrap();

    let dir_mode = std::fs::metadata(env.ssh_config.parent().unwrap())
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(dir_mode & 0o777, 0o700);
}

#[tokio::test]
async fn alias_connect_resolves_the_jump_host() {
    let env = TestEnv::new();
    std::fs::create_dir_all(env.ssh_config.parent().unwrap()).unwrap();
    std::fs::write(
        &env.ssh_config,
        "Host inner\n    HostName 10.1.0.7\n    User app\n    ProxyJump bastion\n\n\
         Host bastion\n    HostName bastion.example\n    User hop\n    Port 2201\n",
    )
    .unwrap();

    let info = env
        .manager
        .connect(ConnectRequest::alias("inner"))
        .await
        .unwrap();
    assert_eq!(info.host_label, "inner");
    assert_eq!(info.username, "app");

    let seen = env.connector.targets.lock()[0].clone();
    assert_eq!(seen.hostname, "10.1.0.7");
    assert_eq!(seen.port, 22);
    assert_eq!(
        seen.jump,
        Some(("bastion.example".to_string(), 2201, "hop".to_string()))
    );
}

#[tokio::test]
async fn explicit_user_beats_the_profile() {
    let env = TestEnv::new();
    env.manager.save_host(&new_host("web", "10.0.0.5")).unwrap();

    let request = ConnectRequest {
        username: "root".to_string(),
        ..ConnectRequest::alias("web")
    };
    let info = env.manager.connect(request).await.unwrap();
    assert_eq!(info.username, "root");
    assert_eq!(env.connector.targets.lock()[0].port, 2222);
}
