use blaze_config::{BlazeConfig, ConfigError};

#[test]
fn parses_every_section() {
    let config = BlazeConfig::load_from_str(
        r#"
[sync]
expand_sync_to_working_set = true
persist_sync_state = false

[build]
binary = "/usr/local/bin/bazel"
flags = ["--config=ide", "  "]

[logging]
level = "debug"
json = true
"#,
    )
    .unwrap();

    assert!(config.sync.expand_sync_to_working_set);
    assert!(!config.sync.persist_sync_state);
    assert_eq!(config.build.binary.as_deref(), Some("/usr/local/bin/bazel"));
    assert_eq!(config.build.flags, vec!["--config=ide".to_string()]);
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.json);
}

#[test]
fn persisting_sync_state_is_on_by_default() {
    let config = BlazeConfig::load_from_str("").unwrap();
    assert!(config.sync.persist_sync_state);
    assert!(!config.sync.expand_sync_to_working_set);
}

#[test]
fn zero_buffer_lines_falls_back_to_default() {
    let config = BlazeConfig::load_from_str("[logging]\nbuffer_lines = 0\n").unwrap();
    assert_eq!(config.logging.buffer_lines, 2_000);
}

#[test]
fn unknown_keys_are_rejected_without_echoing_the_source() {
    let err = BlazeConfig::load_from_str("[sync]\nsecret_token = \"abc123\"\n").unwrap_err();
    let ConfigError::Toml(message) = err else {
        panic!("expected a toml error, got {err:?}");
    };
    assert!(message.contains("unknown field"), "{message}");
    assert!(!message.contains("abc123"), "{message}");
}
