//! Building a running service from configuration files.

mod common;

use common::{call_log, catalog, drain, MemoryStore};
use quarry_config::{ConfigError, ConfigLoader, ValidationError};
use quarry_sequencing::{ChangeEvent, ChangeKind, NodeChangeListener, Node, SequencingError, SequencingService};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

const CONFIG: &str = r#"
workers = 2
accepted_events = ["property_changed", "property_removed"]

[[processors]]
name = "text"
description = "Derives text from document content"
class_name = "derive"
rules = [
    "/docs/*/@content => /derived/${1}",
    "/docs/*/@content => archive:/docs/$1",
]

[processors.properties]
charset = "utf-8"

[[processors]]
name = "images"
class_name = "derive"
enabled = false
rules = ["/images/*/@data => /meta/$1"]
"#;

fn write_config(content: &str, suffix: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_service_from_toml_file() {
    let file = write_config(CONFIG, ".toml");
    let config = ConfigLoader::load_from_file(file.path()).await.unwrap();

    let log = call_log();
    let service = SequencingService::from_config(&config, Arc::new(catalog(&log))).unwrap();
    assert_eq!(service.registry().len(), 2);
    assert_eq!(service.registry().instances().len(), 1);
    assert_eq!(
        service.registry().get("text").unwrap().properties["charset"],
        "utf-8"
    );

    let store = MemoryStore::new();
    store.insert(Node::new("default", "/docs/report1").with_property("content", "numbers"));
    service.set_execution_context(store.context()).unwrap();
    service.start().unwrap();

    // Node additions are not in the configured accepted events.
    let added = ChangeEvent::builder("default", "/docs/report1")
        .kind(ChangeKind::NodeAdded)
        .property("content")
        .build();
    let changed = ChangeEvent::builder("default", "/docs/report1").changed("content").build();
    service.on_changes(vec![added, changed]).await;
    drain(&service).await;

    let calls = log.lock().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].outputs,
        vec!["archive:/docs/report1".to_string(), "default:/derived/report1".to_string()]
    );
    assert_eq!(service.statistics().sequenced(), 1);
    assert!(store.node("default", "/derived/report1").is_some());
}

#[tokio::test]
async fn test_yaml_config_with_reject_policy() {
    let yaml = r#"
duplicate_policy: reject
processors:
  - name: text
    class_name: derive
    rules:
      - "/docs/*/@content => /derived/$1"
"#;
    let file = write_config(yaml, ".yaml");
    let config = ConfigLoader::load_from_file(file.path()).await.unwrap();

    let log = call_log();
    let service = SequencingService::from_config(&config, Arc::new(catalog(&log))).unwrap();

    let changed = quarry_sequencing::ProcessorConfig::new("text", "derive")
        .with_rule_str("/docs/*/@content => /other/$1")
        .unwrap();
    assert!(matches!(
        service.add_processor(changed.clone()),
        Err(SequencingError::DuplicateConfig(_))
    ));
    assert!(service.update_processor(changed).unwrap());
}

#[tokio::test]
async fn test_invalid_files_are_rejected() {
    let file = write_config(
        r#"
[[processors]]
name = "text"
class_name = "derive"
rules = ["/docs/*/@content"]
"#,
        ".toml",
    );
    let err = ConfigLoader::load_from_file(file.path()).await.unwrap_err();
    assert!(matches!(
        err,
        ConfigError::Validation(ValidationError::MalformedRule(_, _))
    ));

    let file = write_config("workers = 1", ".ini");
    assert!(matches!(
        ConfigLoader::load_from_file(file.path()).await,
        Err(ConfigError::UnsupportedFormat(_))
    ));
}

#[tokio::test]
async fn test_bad_template_fails_service_construction() {
    let file = write_config(
        r#"
[[processors]]
name = "text"
class_name = "derive"
rules = ["/docs/*/@content => /derived/$2"]
"#,
        ".toml",
    );
    let config = ConfigLoader::load_from_file(file.path()).await.unwrap();

    let log = call_log();
    let err = SequencingService::from_config(&config, Arc::new(catalog(&log))).unwrap_err();
    assert!(matches!(err, SequencingError::Rule(_)));
}
