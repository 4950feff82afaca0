//! Loading flows from disk and validating them as a set.

use flowbot::providers::{FileFlowProvider, FlowProvider};
use flowbot::validation::validate_flows;
use flowbot::Error;
use std::path::PathBuf;

async fn scratch_dir(files: &[(&str, &str)]) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("flowbot-test-{}", nanoid::nanoid!(10)));
    for (name, contents) in files {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.unwrap();
        }
        tokio::fs::write(path, contents).await.unwrap();
    }
    dir
}

const MAIN_JSON: &str = r#"{
    "name": "main",
    "startNode": "entry",
    "nodes": [
        { "name": "entry", "onEnter": ["greet"], "onReceive": [], "next": [
            { "condition": "intent == 'faq'", "node": "faq.flow.json#question" }
        ] }
    ]
}"#;

const FAQ_YAML: &str = r##"
name: faq.flow.json
startNode: question
nodes:
  - name: question
    onReceive: []
    next:
      - condition: "true"
        node: "#"
"##;

#[tokio::test]
async fn test_loads_json_and_yaml_recursively() {
    let dir = scratch_dir(&[
        ("main.flow.json", MAIN_JSON),
        ("support/faq.flow.yaml", FAQ_YAML),
        ("README.md", "not a flow"),
    ])
    .await;

    let provider = FileFlowProvider::load(&dir).await.unwrap();

    assert_eq!(
        provider.flow_names().await.unwrap(),
        vec!["faq.flow.json".to_string(), "main.flow.json".to_string()]
    );
    let main = provider.get_flow("main").await.unwrap();
    assert_eq!(main.name, "main.flow.json");
    assert_eq!(validate_flows(&provider).await.unwrap(), 2);

    tokio::fs::remove_dir_all(&dir).await.unwrap();
}

#[tokio::test]
async fn test_validation_catches_dangling_flow_reference() {
    let dir = scratch_dir(&[("main.flow.json", MAIN_JSON)]).await;
    let provider = FileFlowProvider::load(&dir).await.unwrap();

    let err = validate_flows(&provider).await.unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert!(err.to_string().contains("faq.flow.json"));

    tokio::fs::remove_dir_all(&dir).await.unwrap();
}

#[tokio::test]
async fn test_reload_picks_up_new_files() {
    let dir = scratch_dir(&[("support/faq.flow.yaml", FAQ_YAML)]).await;
    let provider = FileFlowProvider::load(&dir).await.unwrap();
    assert!(provider.find_flow("main").await.unwrap().is_none());

    tokio::fs::write(dir.join("main.flow.json"), MAIN_JSON).await.unwrap();
    assert_eq!(provider.reload().await.unwrap(), 2);
    assert!(provider.find_flow("main.flow.json").await.unwrap().is_some());

    tokio::fs::remove_dir_all(&dir).await.unwrap();
}

#[tokio::test]
async fn test_malformed_flow_is_rejected() {
    let dir = scratch_dir(&[("broken.flow.json", "{ not json")]).await;

    let err = FileFlowProvider::load(&dir).await.unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));

    tokio::fs::remove_dir_all(&dir).await.unwrap();
}

#[tokio::test]
async fn test_missing_directory_is_flow_error() {
    let err = FileFlowProvider::load("/definitely/not/here").await.unwrap_err();
    assert!(matches!(err, Error::Flow(_)));
}
