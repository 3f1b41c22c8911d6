// tests/config_loading.rs

use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;

use pitrix::config::{load_and_validate, PlanConfig};
use pitrix::errors::PitrixError;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

fn load(contents: &str) -> Result<PlanConfig, PitrixError> {
    let file = write_config(contents);
    load_and_validate(file.path())
}

#[test]
fn full_config_is_loaded() {
    let cfg = load(
        r#"
[pilot]
host = "pilot.internal"
port = 9200

[frontgate]
image_id = "img-fg"
etcd_endpoints = ["10.0.0.2:2379", "10.0.0.3:2379"]
listen_port = 9300

[defaults]
instance_size = 40
mount_point = "/opt/data"
file_system = "xfs"
image_id = "img-base"

[wait]
interval = "500ms"
timeout = "5m"
max_transient_errors = 7
"#,
    )
    .unwrap();

    assert_eq!(cfg.pilot.host, "pilot.internal");
    assert_eq!(cfg.pilot.port, 9200);
    assert_eq!(cfg.frontgate.image_id.as_deref(), Some("img-fg"));
    assert_eq!(cfg.frontgate.etcd_endpoints.len(), 2);
    assert_eq!(cfg.frontgate.listen_port, 9300);
    assert_eq!(cfg.defaults.instance_size, 40);
    assert_eq!(cfg.defaults.mount_point, "/opt/data");
    assert_eq!(cfg.defaults.file_system, "xfs");
    assert_eq!(cfg.defaults.image_id.as_deref(), Some("img-base"));
    assert_eq!(cfg.wait.interval, Duration::from_millis(500));
    assert_eq!(cfg.wait.timeout, Duration::from_secs(300));
    assert_eq!(cfg.wait.max_transient_errors, 7);
}

#[test]
fn empty_file_uses_defaults() {
    let cfg = load("").unwrap();
    assert_eq!(cfg.pilot.host, "openpitrix-pilot-service");
    assert_eq!(cfg.pilot.port, 9110);
    assert_eq!(cfg.frontgate.etcd_endpoints, vec!["127.0.0.1:2379"]);
    assert_eq!(cfg.defaults.instance_size, 20);
    assert_eq!(cfg.defaults.mount_point, "/data");
    assert_eq!(cfg.defaults.file_system, "ext4");
    assert_eq!(cfg.wait.interval, Duration::from_secs(2));
    assert_eq!(cfg.wait.timeout, Duration::from_secs(600));
}

#[test]
fn bad_duration_is_rejected() {
    let err = load("[wait]\ninterval = \"soon\"\n").unwrap_err();
    assert!(
        matches!(&err, PitrixError::ConfigError(msg) if msg.contains("[wait].interval")),
        "got {err:?}"
    );
}

#[test]
fn unknown_file_system_is_rejected() {
    let err = load("[defaults]\nfile_system = \"btrfs\"\n").unwrap_err();
    assert!(
        matches!(&err, PitrixError::ConfigError(msg) if msg.contains("btrfs")),
        "got {err:?}"
    );
}

#[test]
fn relative_mount_point_and_empty_endpoints_are_rejected() {
    let err = load("[defaults]\nmount_point = \"data\"\n").unwrap_err();
    assert!(matches!(err, PitrixError::ConfigError(_)));

    let err = load("[frontgate]\netcd_endpoints = []\n").unwrap_err();
    assert!(matches!(err, PitrixError::ConfigError(_)));
}

#[test]
fn malformed_toml_is_a_toml_error() {
    let err = load("[pilot\nhost = 1").unwrap_err();
    assert!(matches!(err, PitrixError::TomlError(_)), "got {err:?}");
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_and_validate(dir.path().join("Pitrix.toml")).unwrap_err();
    assert!(matches!(err, PitrixError::IoError(_)), "got {err:?}");
}
