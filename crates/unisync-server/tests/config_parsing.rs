use std::io::Write;
use std::time::Duration;

use unisync_server::config::loader::load_config;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("create temp config");
    file.write_all(contents.as_bytes()).expect("write temp config");
    file
}

#[test]
fn test_load_full_config() {
    let file = write_config(
        r#"
[server]
host = "127.0.0.1"
port = 9090

[engine]
workers = 8
resync_interval_secs = 120
debounce_window_ms = 500

[api]
base_url = "http://localhost:8787/client/v4"
request_timeout_ms = 2500

[api.credentials]
default = "t0ken"

[logging]
level = "debug"
"#,
    );

    let cfg = load_config(file.path().to_str()).expect("config loads");
    assert_eq!(cfg.addr().to_string(), "127.0.0.1:9090");
    assert_eq!(cfg.engine.workers, 8);
    assert_eq!(cfg.engine.settings().resync_interval, Duration::from_secs(120));
    assert_eq!(cfg.engine.debounce_window(), Duration::from_millis(500));
    // Unset fields keep their defaults.
    assert_eq!(cfg.engine.conflict_attempts, 5);
    assert_eq!(cfg.api.base_url, "http://localhost:8787/client/v4");
    assert_eq!(cfg.api.request_timeout(), Duration::from_millis(2500));
    assert_eq!(cfg.api.credentials.get("default").map(String::as_str), Some("t0ken"));
    assert_eq!(cfg.logging.level, "debug");
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    let cfg = load_config(path.to_str()).expect("defaults load");
    assert_eq!(cfg.server.port, 8080);
    assert_eq!(cfg.engine.workers, 4);
}

#[test]
fn test_invalid_values_are_rejected() {
    let file = write_config(
        r#"
[engine]
workers = 0
"#,
    );
    let err = load_config(file.path().to_str()).unwrap_err();
    assert!(err.contains("engine.workers"), "{err}");
}

#[test]
fn test_malformed_toml_is_rejected() {
    let file = write_config("[engine\nworkers = 2");
    assert!(load_config(file.path().to_str()).is_err());
}
