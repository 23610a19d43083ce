use super::*;
use crate::config::DaemonConfig;

fn test_config(socket_path: &str) -> DaemonConfig {
    let mut config = DaemonConfig::default();
    config.ipc_socket_path = socket_path.to_string();
    config
}

#[tokio::test]
async fn daemon_initializes_with_no_printers() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("acproxycam.sock");
    let config_path = dir.path().join("config.json");

    let mut daemon = Daemon::new(test_config(socket_path.to_str().unwrap()), config_path.to_string_lossy().to_string(), false).await.unwrap();
    daemon.initialize().await.unwrap();

    assert_eq!(daemon.get_component_state("registry").await, Some(ComponentState::Running));
    assert_eq!(daemon.get_component_state("ipc").await, Some(ComponentState::Stopped));
}

#[tokio::test]
async fn daemon_start_then_shutdown_is_clean() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("acproxycam.sock");
    let config_path = dir.path().join("config.json");

    let mut daemon = Daemon::new(test_config(socket_path.to_str().unwrap()), config_path.to_string_lossy().to_string(), false).await.unwrap();
    daemon.initialize().await.unwrap();
    daemon.start().await.unwrap();

    assert_eq!(daemon.get_component_state("ipc").await, Some(ComponentState::Running));

    let exit_code = daemon.shutdown().await.unwrap();
    assert_eq!(exit_code, 0);
}
