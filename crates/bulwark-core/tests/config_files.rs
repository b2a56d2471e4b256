//! Loading plane configs from disk
//!
//! Tenet: a config file either loads into a validated plane config or is
//! refused with an error naming the file, format or offending section.

use bulwark_core::{ConfigError, ControlPlane, PlaneConfig};
use bulwark_escalation::EscalationLevel;
use pretty_assertions::assert_eq;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(suffix: &str, text: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

#[test]
fn yaml_file_builds_a_plane() {
    let file = write_config(
        ".yaml",
        "
name: checkout
supervise_interval: 0.5
breakers:
  named:
    payments:
      failure_threshold: 2
    inventory: {}
escalation:
  register_defaults: false
response:
  stop_level: critical
  auto_rollback: false
",
    );

    let config = PlaneConfig::load(file.path()).unwrap();
    assert_eq!(config.name, "checkout");
    assert_eq!(config.supervise_interval, Duration::from_millis(500));
    assert_eq!(config.response.stop_level, EscalationLevel::Critical);
    assert!(!config.response.auto_rollback);

    let plane = ControlPlane::new(config).unwrap();
    assert_eq!(plane.breakers().names(), vec!["inventory".to_string(), "payments".to_string()]);
    assert_eq!(plane.breakers().get("payments").unwrap().config().failure_threshold, 2);
    assert!(plane.ladder().actions_for(EscalationLevel::Emergency).is_empty());
}

#[test]
fn toml_file_loads() {
    let file = write_config(
        ".toml",
        r#"
name = "batch"

[rollback]
max_snapshots = 3

[estop]
enabled = false
history_limit = 10
"#,
    );

    let config = PlaneConfig::load(file.path()).unwrap();
    assert_eq!(config.rollback.settings.max_snapshots, 3);
    assert!(!config.estop.enabled);
    assert_eq!(config.estop.settings.history_limit, 10);
}

#[test]
fn unknown_extension_is_refused() {
    let file = write_config(".json", "{}");
    let err = PlaneConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
}

#[test]
fn missing_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.yml");
    let err = PlaneConfig::load(&path).unwrap_err();
    match err {
        ConfigError::Io { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("expected io error, got {other}"),
    }
}

#[test]
fn malformed_yaml_is_a_parse_error() {
    let file = write_config(".yml", "breakers: [not, a, mapping]");
    assert!(matches!(PlaneConfig::load(file.path()), Err(ConfigError::Yaml(_))));
}

#[test]
fn zero_capacity_fails_validation() {
    let file = write_config(".yaml", "rollback:\n  max_snapshots: 0\n");
    let err = PlaneConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { ref section, .. } if section == "rollback"));
}
