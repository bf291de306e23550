//! Integration tests for configuration handling.

use std::collections::HashMap;
use std::time::Duration;

use ssh_driver::config::file::{DEFAULT_FILE_NAME, parse_config};
use ssh_driver::{ConfigLoader, DriverConfig, EnvConfig, RetryStrategy};

#[test]
fn driver_config_builder_pattern() {
    let config = DriverConfig::new("db01")
        .port(2200)
        .user("ops")
        .password("secret")
        .private_key("/keys/ops")
        .allow_agent(false)
        .timeout(Duration::from_secs(60))
        .chunk_size(4096)
        .pty_term("xterm");

    assert_eq!(config.address(), "db01:2200");
    assert_eq!(config.user, "ops");
    assert_eq!(config.password.as_deref(), Some("secret"));
    assert!(!config.allow_agent);
    assert_eq!(config.timeout, Some(Duration::from_secs(60)));
    assert_eq!(config.chunk_size, 4096);
    assert_eq!(config.pty_term, "xterm");
}

#[test]
fn debug_output_redacts_password() {
    let config = DriverConfig::new("db01").password("hunter2");
    let debug = format!("{config:?}");
    assert!(!debug.contains("hunter2"));
    assert!(debug.contains("<redacted>"));
}

#[test]
fn retry_settings_compose() {
    let config = DriverConfig::new("h")
        .retry_delay_of(Duration::from_secs(2))
        .num_retries(7);
    assert_eq!(config.retry.max_attempts(), 7);
    assert_eq!(config.retry_delay(), Duration::from_secs(2));

    let config = config.retry(RetryStrategy::none());
    assert_eq!(config.retry.max_attempts(), 1);
}

#[test]
fn env_overrides_apply_on_top_of_defaults() {
    let values = HashMap::from([
        ("APP_USER".to_string(), "builder".to_string()),
        ("APP_PRIVATE_KEY".to_string(), "/keys/ci".to_string()),
        ("APP_ALLOW_AGENT".to_string(), "off".to_string()),
    ]);
    let config = EnvConfig::from_map("APP", values).apply(DriverConfig::new("ci"));

    assert_eq!(config.user, "builder");
    assert_eq!(config.private_key.as_deref(), Some(std::path::Path::new("/keys/ci")));
    assert!(!config.allow_agent);
    assert_eq!(config.port, 22);
}

#[test]
fn parse_rejects_unknown_keys() {
    assert!(parse_config("[driver]\nhostname = \"x\"\n").is_err());
}

#[test]
fn loader_finds_file_in_search_paths() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    std::fs::write(
        second.path().join(DEFAULT_FILE_NAME),
        "[driver]\nhost = \"build01\"\nport = 2222\nchunk_size = 1024\n",
    )
    .unwrap();

    let loader = ConfigLoader::new()
        .add_path(first.path())
        .add_path(second.path());
    let config = loader.load_driver_config().unwrap();

    assert_eq!(config.host, "build01");
    assert_eq!(config.port, 2222);
    assert_eq!(config.chunk_size, 1024);
}

#[test]
fn loader_requires_a_host() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(DEFAULT_FILE_NAME), "[driver]\nport = 22\n").unwrap();

    let err = ConfigLoader::new()
        .add_path(dir.path())
        .load_driver_config()
        .unwrap_err();
    assert!(err.to_string().contains("does not name a host"));
}

#[test]
fn loader_reports_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = ConfigLoader::new()
        .add_path(dir.path())
        .load_driver_config()
        .unwrap_err();
    assert!(err.to_string().contains("config file not found"));
}
