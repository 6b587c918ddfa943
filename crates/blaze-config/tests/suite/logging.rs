use blaze_config::{init_tracing, BlazeConfig};
use std::sync::Arc;

// The only test in this binary that installs the global subscriber.
#[test]
fn init_tracing_installs_once_and_feeds_the_buffer() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("sync.log");
    let mut config = BlazeConfig::load_from_str(
        r#"
[logging]
level = "blaze.config=debug,info"
stderr = false
json = true
"#,
    )
    .unwrap();
    config.logging.file = Some(log_path.clone());

    let buffer = init_tracing(&config.logging);
    tracing::info!(target: "blaze.config", marker = "first-install", "logging ready");

    let lines = buffer.last_lines(buffer.len());
    let event = lines
        .iter()
        .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
        .find(|event| event["fields"]["marker"] == "first-install")
        .expect("json event in buffer");
    assert_eq!(event["fields"]["message"], "logging ready");
    assert!(std::fs::read_to_string(&log_path)
        .unwrap()
        .contains("first-install"));

    // A second call keeps the first configuration.
    let mut other = config.logging.clone();
    other.json = false;
    other.file = None;
    let again = init_tracing(&other);
    assert!(Arc::ptr_eq(&buffer, &again));
}
