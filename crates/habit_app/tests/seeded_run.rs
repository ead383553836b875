use std::fs;

use habit_app::app::{load_seed, run, AppConfig};
use habit_domain::memory::MemoryDocumentStore;
use habit_domain::storage::HABITS_COLLECTION;
use tempfile::tempdir;

const SEED: &str = r#"{
  "habits": {
    "h1": {
      "title": "Meditate",
      "category": "Здоровье",
      "targetFrequency": "daily",
      "userId": "someone-else",
      "creationDate": "2024-01-01T08:00:00Z"
    },
    "h2": { "title": 3 },
    "h3": "not a document"
  },
  "users": {}
}"#;

fn config_for(pairs: Vec<(&'static str, String)>) -> AppConfig {
    AppConfig::from_lookup(move |key| {
        pairs
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| value.clone())
    })
}

#[test]
fn seed_file_populates_collections() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("seed.json");
    fs::write(&path, SEED).expect("write seed");

    let documents = MemoryDocumentStore::new();
    let inserted = load_seed(&documents, &path).expect("load seed");
    assert_eq!(inserted, 2);
    assert_eq!(documents.len(HABITS_COLLECTION), 2);
}

#[test]
fn malformed_seed_is_an_error() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("seed.json");
    fs::write(&path, "[1, 2]").expect("write seed");

    let documents = MemoryDocumentStore::new();
    assert!(load_seed(&documents, &path).is_err());
    assert!(load_seed(&documents, &temp.path().join("missing.json")).is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn library_only_without_credentials() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("seed.json");
    fs::write(&path, SEED).expect("write seed");

    let config = config_for(vec![("HABIT_SEED", path.display().to_string())]);
    let rendered = run(config).await.expect("run");
    assert_eq!(rendered, "1 habits in the library\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn new_user_sees_an_empty_day() {
    let config = config_for(vec![
        ("HABIT_USER_EMAIL", "anna@example.com".to_string()),
        ("HABIT_USER_PASSWORD", "long-password".to_string()),
        ("HABIT_USER_NAME", "Anna".to_string()),
        ("HABIT_TODAY", "2024-03-06".to_string()),
    ]);
    let rendered = run(config).await.expect("run");
    assert_eq!(rendered, "2024-03-06\n  nothing scheduled\n");
}
