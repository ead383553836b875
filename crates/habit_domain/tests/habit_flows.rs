use std::sync::Arc;

use chrono::NaiveDate;
use habit_domain::analytics::{AnalyticsEvent, RecordingAnalytics};
use habit_domain::memory::{MemoryAuthProvider, MemoryDocumentStore};
use habit_domain::schedule;
use habit_domain::storage::{Document, StorageError, HABITS_COLLECTION};
use habit_domain::ui_store::SnackbarSeverity;
use habit_domain::{
    Category, FilterCategory, Frequency, HabitFormData, HabitStore, OperationStatus, RootStore,
};
use serde_json::{json, Value};

fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        other => panic!("fixture is not an object: {other}"),
    }
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

struct Fixture {
    documents: Arc<MemoryDocumentStore>,
    analytics: Arc<RecordingAnalytics>,
    store: HabitStore,
}

fn fixture() -> Fixture {
    let documents = Arc::new(MemoryDocumentStore::new());
    let analytics = Arc::new(RecordingAnalytics::new());
    let store = HabitStore::new(documents.clone(), analytics.clone());
    Fixture {
        documents,
        analytics,
        store,
    }
}

fn seed_library(documents: &MemoryDocumentStore) {
    documents.insert(
        HABITS_COLLECTION,
        "h1",
        doc(json!({
            "title": "Meditate",
            "category": "Здоровье",
            "targetFrequency": "daily",
            "userId": "u2",
            "creationDate": "2024-01-01T08:00:00Z",
            "completionHistory": { "2024-03-05": true }
        })),
    );
    documents.insert(
        HABITS_COLLECTION,
        "h2",
        doc(json!({
            "title": "Budget review",
            "category": "Финансы",
            "targetFrequency": "monthly",
            "monthlyDay": 40,
            "userId": "u1",
            "creationDate": "2024-01-02T08:00:00Z"
        })),
    );
    documents.insert(
        HABITS_COLLECTION,
        "broken",
        doc(json!({ "title": 12, "userId": "u1" })),
    );
}

#[tokio::test]
async fn create_weekly_habit_lands_in_both_collections() {
    let fx = fixture();
    let form = HabitFormData::new("Run", Category::Sport, Frequency::Weekly)
        .with_days_of_week([4, 0, 2, 2]);

    let status = fx.store.create(&form, "u1", Some("Anna")).await;
    let created = status
        .success()
        .cloned()
        .flatten()
        .expect("created habit");

    assert_eq!(created.days_of_week, Some(vec![0, 2, 4]));
    assert_eq!(created.monthly_day, None);
    assert!(created.completion_history.is_empty());
    assert_eq!(created.user_name.as_deref(), Some("Anna"));

    let state = fx.store.snapshot();
    assert_eq!(state.all_habits.len(), 1);
    assert_eq!(state.user_habits.len(), 1);
    assert_eq!(state.all_habits[0], created);
    assert!(state.operation_status.is_success());

    let stored = fx
        .documents
        .snapshot(HABITS_COLLECTION, &created.id)
        .expect("stored document");
    assert_eq!(stored["category"], "Спорт");
    assert_eq!(stored["targetFrequency"], "weekly");
    assert_eq!(stored["monthlyDay"], Value::Null);
    assert_eq!(fx.analytics.events(), vec![AnalyticsEvent::HabitCreated]);
}

#[tokio::test]
async fn load_all_skips_invalid_documents_and_is_idempotent() {
    let fx = fixture();
    seed_library(&fx.documents);

    fx.store.load_all().await;
    let first = fx.store.all_habits();
    fx.store.load_all().await;
    let second = fx.store.all_habits();

    assert_eq!(first, second);
    let ids: Vec<&str> = first.iter().map(|habit| habit.id.as_str()).collect();
    assert_eq!(ids, vec!["h1", "h2"]);
    assert_eq!(first[1].monthly_day, Some(31));
    let legacy = &first[0].completion_history["2024-03-05"];
    assert!(legacy.completed);
    assert_eq!(legacy.date, "2024-03-05");
    assert!(!fx.store.snapshot().is_all_habits_loading);
}

#[tokio::test]
async fn load_for_user_reads_only_owned_habits() {
    let fx = fixture();
    seed_library(&fx.documents);

    fx.store.load_for_user("u1").await;
    let owned = fx.store.user_habits();
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].id, "h2");
}

#[tokio::test]
async fn load_failures_set_collection_errors() {
    let fx = fixture();
    fx.documents
        .fail_with(Some(StorageError::Backend(String::new())));

    fx.store.load_all().await;
    fx.store.load_for_user("u1").await;

    let state = fx.store.snapshot();
    assert_eq!(
        state.all_habits_error.as_deref(),
        Some("Ошибка загрузки привычек")
    );
    assert_eq!(
        state.user_habits_error.as_deref(),
        Some("Ошибка загрузки ваших привычек")
    );
    assert!(!state.is_all_habits_loading);
    assert!(!state.is_user_habits_loading);
}

#[tokio::test]
async fn add_to_user_clones_once_per_user() {
    let fx = fixture();
    seed_library(&fx.documents);
    fx.store.load_all().await;

    let first = fx.store.add_to_user("h1", "u1").await;
    let second = fx.store.add_to_user("h1", "u1").await;
    assert!(first.is_success() && second.is_success());

    let source = fx
        .documents
        .snapshot(HABITS_COLLECTION, "h1")
        .expect("source");
    assert_eq!(source["addedByUsers"], json!(["u1"]));

    let state = fx.store.snapshot();
    let library_source = state.any_habit("h1").expect("source in memory");
    assert_eq!(library_source.added_by_users, vec!["u1".to_string()]);

    let clone = first.success().cloned().flatten().expect("clone");
    assert_eq!(clone.user_id, "u1");
    assert_eq!(clone.original_habit_id.as_deref(), Some("h1"));
    assert!(clone.completion_history.is_empty());
    assert_eq!(clone.monthly_day, None);
    assert!(state.user_habits.iter().any(|habit| habit.id == clone.id));
}

#[tokio::test]
async fn add_to_user_reports_missing_source() {
    let fx = fixture();
    let status = fx.store.add_to_user("nope", "u1").await;
    assert_eq!(status, OperationStatus::Error("Привычка не найдена".into()));
    assert_eq!(fx.analytics.error_contexts(), vec!["habit_add_to_user"]);
}

#[tokio::test]
async fn update_patches_both_collections() {
    let fx = fixture();
    let form = HabitFormData::new("Run", Category::Sport, Frequency::Daily);
    let created = fx
        .store
        .create(&form, "u1", None)
        .await
        .success()
        .cloned()
        .flatten()
        .expect("created");

    let edit = HabitFormData::new("Run far", Category::Sport, Frequency::Monthly)
        .with_description("")
        .with_monthly_day(0);
    let status = fx.store.update(&created.id, &edit).await;
    let updated = status.success().cloned().flatten().expect("updated");

    assert_eq!(updated.title, "Run far");
    assert_eq!(updated.monthly_day, Some(1));
    assert_eq!(updated.description, None);
    let state = fx.store.snapshot();
    assert_eq!(state.all_habits[0], state.user_habits[0]);
    assert_eq!(state.all_habits[0].title, "Run far");
    assert!(fx.analytics.events().contains(&AnalyticsEvent::HabitUpdated));
}

#[tokio::test]
async fn completion_is_mirrored_and_written_by_path() {
    let fx = fixture();
    let form = HabitFormData::new("Water", Category::Health, Frequency::Daily);
    let created = fx
        .store
        .create(&form, "u1", None)
        .await
        .success()
        .cloned()
        .flatten()
        .expect("created");
    let today = day(2024, 3, 6);

    let status = fx.store.update_completion(&created.id, today, true).await;
    assert!(status.is_success());

    let state = fx.store.snapshot();
    assert!(schedule::is_completed_on(&state.user_habits[0], today));
    assert!(schedule::is_completed_on(&state.all_habits[0], today));

    let stored = fx
        .documents
        .snapshot(HABITS_COLLECTION, &created.id)
        .expect("stored");
    assert_eq!(stored["completionHistory"]["2024-03-06"]["completed"], true);
    assert_eq!(stored["title"], "Water");

    fx.store.update_completion(&created.id, today, false).await;
    let listed = schedule::today_habits(&fx.store.user_habits(), today);
    assert_eq!(listed.len(), 1);
    assert!(!listed[0].completed);
}

#[tokio::test]
async fn completion_failure_keeps_memory_untouched() {
    let fx = fixture();
    let status = fx
        .store
        .update_completion("missing", day(2024, 3, 6), true)
        .await;
    assert!(status.is_error());
    assert!(fx.store.user_habits().is_empty());
}

#[tokio::test]
async fn deleted_habits_are_not_resurrected() {
    let fx = fixture();
    seed_library(&fx.documents);
    fx.store.load_all().await;
    fx.store.load_for_user("u1").await;
    fx.store
        .set_selected_habit(fx.store.snapshot().any_habit("h2").cloned());

    let status = fx.store.delete("h2").await;
    assert_eq!(status, OperationStatus::Success(None));

    let state = fx.store.snapshot();
    assert!(state.any_habit("h2").is_none());
    assert!(state.selected_habit.is_none());

    fx.store.load_all().await;
    fx.store.load_for_user("u1").await;
    assert!(fx.store.snapshot().any_habit("h2").is_none());
    assert!(fx.analytics.events().contains(&AnalyticsEvent::HabitDeleted));
}

#[tokio::test]
async fn failed_delete_reports_storage_message() {
    let fx = fixture();
    seed_library(&fx.documents);
    fx.store.load_all().await;
    fx.documents
        .fail_with(Some(StorageError::PermissionDenied("read only".into())));

    let status = fx.store.delete("h1").await;
    assert!(status.is_error());
    assert_eq!(fx.store.all_habits().len(), 2);
    assert_eq!(fx.analytics.error_contexts(), vec!["habit_deletion"]);
}

#[tokio::test]
async fn filter_and_fetch_by_id() {
    let fx = fixture();
    seed_library(&fx.documents);
    fx.store.load_all().await;

    fx.store
        .set_filter_category(FilterCategory::Only(Category::Finance));
    let filtered = fx.store.filtered_habits();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].id, "h2");

    assert_eq!(
        fx.store.fetch_by_id("h1").await.map(|habit| habit.title),
        Some("Meditate".to_string())
    );
    assert!(fx.store.fetch_by_id("broken").await.is_none());
    assert!(fx.store.fetch_by_id("missing").await.is_none());
}

#[tokio::test]
async fn concurrent_loads_fill_separate_slices() {
    let fx = fixture();
    seed_library(&fx.documents);
    fx.documents.insert(
        HABITS_COLLECTION,
        "h3",
        doc(json!({
            "title": "Swim",
            "category": "Спорт",
            "targetFrequency": 7,
            "daysOfWeek": [5, 1, 1, 9],
            "userId": "u1",
            "creationDate": "2024-01-03T08:00:00Z"
        })),
    );

    tokio::join!(fx.store.load_all(), fx.store.load_for_user("u1"));

    let state = fx.store.snapshot();
    let all: Vec<&str> = state.all_habits.iter().map(|habit| habit.id.as_str()).collect();
    let own: Vec<&str> = state.user_habits.iter().map(|habit| habit.id.as_str()).collect();
    assert_eq!(all, vec!["h1", "h2", "h3"]);
    assert_eq!(own, vec!["h2", "h3"]);
    assert_eq!(state.user_habits[1].days_of_week, Some(vec![1, 5]));
    assert!(!state.is_all_habits_loading);
    assert!(!state.is_user_habits_loading);
    assert!(state.all_habits_error.is_none());
    assert!(state.user_habits_error.is_none());
}

#[tokio::test]
async fn toggle_today_flips_and_reports_failures() {
    let documents = Arc::new(MemoryDocumentStore::new());
    seed_library(&documents);
    documents.insert(
        HABITS_COLLECTION,
        "h4",
        doc(json!({
            "title": "Stretch",
            "category": "Здоровье",
            "targetFrequency": "daily",
            "userId": "u1",
            "creationDate": "2024-01-04T08:00:00Z"
        })),
    );
    let root = RootStore::builder()
        .with_documents(documents.clone())
        .with_auth(Arc::new(MemoryAuthProvider::new()))
        .with_analytics(Arc::new(RecordingAnalytics::new()))
        .build()
        .expect("build root store");
    root.habits.load_for_user("u1").await;
    let today = day(2024, 3, 6);

    assert!(root.toggle_today("h4", today).await.is_success());
    let listed = root.today_habits(today);
    assert!(listed.iter().any(|item| item.habit.id == "h4" && item.completed));

    assert!(root.toggle_today("h4", today).await.is_success());
    let listed = root.today_habits(today);
    assert!(listed.iter().any(|item| item.habit.id == "h4" && !item.completed));
    assert!(!root.ui.is_snackbar_open());

    documents.fail_with(Some(StorageError::Unavailable("offline".into())));
    let status = root.toggle_today("h4", today).await;
    assert!(status.is_error());

    let snackbar = root.ui.snapshot().snackbar;
    assert!(snackbar.is_open);
    assert_eq!(snackbar.severity, SnackbarSeverity::Error);
    assert_eq!(snackbar.message, "storage unavailable: offline");
    assert!(root
        .today_habits(today)
        .iter()
        .any(|item| item.habit.id == "h4" && !item.completed));
}
