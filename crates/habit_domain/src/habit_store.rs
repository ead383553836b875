//! Owner of the two in-memory habit collections.
//!
//! `all_habits` backs the shared library view, `user_habits` the signed-in
//! user's own list. The store is their only writer: every mutation that
//! touches a habit present in either collection patches both, in the same
//! published snapshot.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::Value;
use tokio::sync::watch;
use tracing::instrument;

use crate::analytics::{AnalyticsEvent, AnalyticsSink, EventParams};
use crate::codec::{self, EncodeError, HabitPatch, HabitRecord};
use crate::error::StoreError;
use crate::habit::{Category, CompletionEntry, FilterCategory, Habit, HabitFormData};
use crate::observable::Observable;
use crate::schedule;
use crate::status::OperationStatus;
use crate::storage::{DocumentStore, HABITS_COLLECTION};

pub type HabitOperationStatus = OperationStatus<Option<Habit>>;

const LOAD_ALL_FAILED: &str = "Ошибка загрузки привычек";
const LOAD_USER_FAILED: &str = "Ошибка загрузки ваших привычек";
const CREATE_FAILED: &str = "Ошибка создания привычки";
const UPDATE_FAILED: &str = "Update failed";
const ADD_FAILED: &str = "Ошибка добавления привычки";
const DELETE_FAILED: &str = "Ошибка удаления";
const COMPLETION_FAILED: &str = "Ошибка при обновлении привычки";
const HABIT_NOT_FOUND: &str = "Привычка не найдена";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HabitsState {
    pub all_habits: Vec<Habit>,
    pub user_habits: Vec<Habit>,
    pub selected_habit: Option<Habit>,
    pub filter_category: FilterCategory,
    pub operation_status: HabitOperationStatus,
    pub is_all_habits_loading: bool,
    pub is_user_habits_loading: bool,
    pub all_habits_error: Option<String>,
    pub user_habits_error: Option<String>,
}

impl HabitsState {
    /// `all_habits` narrowed to the active category filter.
    pub fn filtered_habits(&self) -> Vec<&Habit> {
        self.all_habits
            .iter()
            .filter(|habit| self.filter_category.matches(habit.category))
            .collect()
    }

    /// Filtered library entries the user does not own.
    pub fn library_for(&self, uid: &str) -> Vec<&Habit> {
        self.filtered_habits()
            .into_iter()
            .filter(|habit| !habit.is_owned_by(uid))
            .collect()
    }

    pub fn user_habit(&self, id: &str) -> Option<&Habit> {
        self.user_habits.iter().find(|habit| habit.id == id)
    }

    pub fn any_habit(&self, id: &str) -> Option<&Habit> {
        self.user_habit(id)
            .or_else(|| self.all_habits.iter().find(|habit| habit.id == id))
    }
}

/// The "all" sentinel followed by every category.
pub fn available_categories() -> Vec<FilterCategory> {
    std::iter::once(FilterCategory::All)
        .chain(Category::ALL.into_iter().map(FilterCategory::Only))
        .collect()
}

pub struct HabitStore {
    documents: Arc<dyn DocumentStore>,
    analytics: Arc<dyn AnalyticsSink>,
    state: Observable<HabitsState>,
}

impl HabitStore {
    pub fn new(documents: Arc<dyn DocumentStore>, analytics: Arc<dyn AnalyticsSink>) -> Self {
        Self {
            documents,
            analytics,
            state: Observable::default(),
        }
    }

    pub fn snapshot(&self) -> HabitsState {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<HabitsState> {
        self.state.subscribe()
    }

    /// Borrow the current state without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&HabitsState) -> R) -> R {
        self.state.read(f)
    }

    pub fn all_habits(&self) -> Vec<Habit> {
        self.state.read(|state| state.all_habits.clone())
    }

    pub fn user_habits(&self) -> Vec<Habit> {
        self.state.read(|state| state.user_habits.clone())
    }

    pub fn filtered_habits(&self) -> Vec<Habit> {
        self.state
            .read(|state| state.filtered_habits().into_iter().cloned().collect())
    }

    pub fn operation_status(&self) -> HabitOperationStatus {
        self.state.read(|state| state.operation_status.clone())
    }

    pub fn set_filter_category(&self, category: FilterCategory) {
        self.state.update(|state| state.filter_category = category);
    }

    pub fn set_selected_habit(&self, habit: Option<Habit>) {
        self.state.update(|state| state.selected_habit = habit);
    }

    /// Replace `all_habits` with every decodable document in storage.
    #[instrument(skip(self))]
    pub async fn load_all(&self) {
        self.state.update(|state| {
            state.is_all_habits_loading = true;
            state.all_habits_error = None;
        });
        let result = self.fetch_decoded(None).await;
        if let Err(err) = &result {
            tracing::warn!(%err, "failed to load habits");
        }
        self.state.update(|state| {
            match result {
                Ok(habits) => state.all_habits = habits,
                Err(err) => state.all_habits_error = Some(err.message_or(LOAD_ALL_FAILED)),
            }
            state.is_all_habits_loading = false;
        });
    }

    /// Replace `user_habits` with the decodable documents owned by `user_id`.
    #[instrument(skip(self))]
    pub async fn load_for_user(&self, user_id: &str) {
        self.state.update(|state| {
            state.is_user_habits_loading = true;
            state.user_habits_error = None;
        });
        let result = self.fetch_decoded(Some(user_id)).await;
        if let Err(err) = &result {
            tracing::warn!(%err, "failed to load user habits");
        }
        self.state.update(|state| {
            match result {
                Ok(habits) => state.user_habits = habits,
                Err(err) => state.user_habits_error = Some(err.message_or(LOAD_USER_FAILED)),
            }
            state.is_user_habits_loading = false;
        });
    }

    /// Point read outside of either collection. Failures are logged and read
    /// as "no such habit".
    #[instrument(skip(self))]
    pub async fn fetch_by_id(&self, id: &str) -> Option<Habit> {
        match self.documents.get(HABITS_COLLECTION, id).await {
            Ok(Some(raw)) => codec::decode(&raw, id),
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(%err, "failed to fetch habit");
                None
            }
        }
    }

    #[instrument(skip(self, form), fields(title = %form.title))]
    pub async fn create(
        &self,
        form: &HabitFormData,
        user_id: &str,
        user_name: Option<&str>,
    ) -> HabitOperationStatus {
        self.begin();
        match self.try_create(form, user_id, user_name).await {
            Ok(habit) => {
                self.analytics.log_event(
                    AnalyticsEvent::HabitCreated,
                    EventParams::from([
                        ("habit_id", habit.id.clone()),
                        ("category", form.category.to_string()),
                        ("frequency", form.target_frequency.to_string()),
                        ("user_id", user_id.to_string()),
                    ]),
                );
                self.succeed(Some(habit), |state, habit| {
                    state.all_habits.push(habit.clone());
                    state.user_habits.push(habit.clone());
                })
            }
            Err(err) => self.fail(err, CREATE_FAILED, Some("habit_creation")),
        }
    }

    async fn try_create(
        &self,
        form: &HabitFormData,
        user_id: &str,
        user_name: Option<&str>,
    ) -> Result<Habit, StoreError> {
        let record = HabitRecord::from_form(form, user_id, user_name, Utc::now().to_rfc3339());
        let document = codec::encode(&record)?;
        let id = self
            .documents
            .create(HABITS_COLLECTION, document.clone())
            .await?;
        codec::decode(&document, &id)
            .ok_or_else(|| StoreError::Invariant(format!("created habit {id} does not decode")))
    }

    /// Rewrite the user-editable fields of habit `id`. Both collections are
    /// patched in place; positions are preserved.
    #[instrument(skip(self, form))]
    pub async fn update(&self, id: &str, form: &HabitFormData) -> HabitOperationStatus {
        self.begin();
        let result = async {
            let fields = codec::encode(&HabitPatch::from(form))?;
            self.documents.update(HABITS_COLLECTION, id, fields).await?;
            Ok::<_, StoreError>(())
        }
        .await;
        if let Err(err) = result {
            return self.fail(err, UPDATE_FAILED, Some("habit_update"));
        }

        self.analytics.log_event(
            AnalyticsEvent::HabitUpdated,
            EventParams::from([
                ("habit_id", id.to_string()),
                ("category", form.category.to_string()),
                ("target_frequency", form.target_frequency.to_string()),
            ]),
        );
        self.finish(|state| {
            patch_by_id(&mut state.user_habits, id, |habit| habit.apply_form(form));
            patch_by_id(&mut state.all_habits, id, |habit| habit.apply_form(form));
            state.any_habit(id).cloned()
        })
    }

    /// Clone library habit `habit_id` into `user_id`'s list and record the
    /// user on the source's `addedByUsers` set.
    #[instrument(skip(self))]
    pub async fn add_to_user(&self, habit_id: &str, user_id: &str) -> HabitOperationStatus {
        self.begin();
        match self.try_add_to_user(habit_id, user_id).await {
            Ok(habit) => self.succeed(Some(habit), |state, habit| {
                if state.user_habit(&habit.id).is_none() {
                    state.user_habits.push(habit.clone());
                }
                patch_by_id(&mut state.all_habits, habit_id, |source| {
                    source.mark_added_by(user_id);
                });
                patch_by_id(&mut state.user_habits, habit_id, |source| {
                    source.mark_added_by(user_id);
                });
            }),
            Err(err) => self.fail(err, ADD_FAILED, Some("habit_add_to_user")),
        }
    }

    async fn try_add_to_user(&self, habit_id: &str, user_id: &str) -> Result<Habit, StoreError> {
        let raw = self
            .documents
            .get(HABITS_COLLECTION, habit_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(HABIT_NOT_FOUND.to_string()))?;
        let source = codec::decode(&raw, habit_id)
            .ok_or_else(|| StoreError::NotFound("Invalid habit data".to_string()))?;

        let record = HabitRecord::clone_for(&source, user_id, Utc::now().to_rfc3339());
        let document = codec::encode(&record)?;
        let new_id = self
            .documents
            .create(HABITS_COLLECTION, document.clone())
            .await?;
        self.documents
            .array_union(
                HABITS_COLLECTION,
                habit_id,
                "addedByUsers",
                Value::String(user_id.to_string()),
            )
            .await?;

        codec::decode(&document, &new_id)
            .ok_or_else(|| StoreError::Invariant(format!("cloned habit {new_id} does not decode")))
    }

    /// Hard delete from storage and from both collections.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> HabitOperationStatus {
        self.begin();
        if let Err(err) = self.documents.delete(HABITS_COLLECTION, id).await {
            return self.fail(err.into(), DELETE_FAILED, Some("habit_deletion"));
        }
        self.analytics.log_event(
            AnalyticsEvent::HabitDeleted,
            EventParams::from([("habit_id", id.to_string())]),
        );
        self.finish(|state| {
            state.user_habits.retain(|habit| habit.id != id);
            state.all_habits.retain(|habit| habit.id != id);
            if state
                .selected_habit
                .as_ref()
                .is_some_and(|habit| habit.id == id)
            {
                state.selected_habit = None;
            }
            None
        })
    }

    /// Record whether habit `habit_id` was done on `date`. Only the single
    /// history entry is written, not the whole document.
    #[instrument(skip(self))]
    pub async fn update_completion(
        &self,
        habit_id: &str,
        date: NaiveDate,
        completed: bool,
    ) -> HabitOperationStatus {
        self.begin();
        let date_key = schedule::date_key(date);
        let entry = CompletionEntry {
            completed,
            date: Utc::now().to_rfc3339(),
        };
        let result = async {
            let value = serde_json::to_value(&entry).map_err(EncodeError::from)?;
            self.documents
                .update_path(
                    HABITS_COLLECTION,
                    habit_id,
                    &format!("completionHistory.{date_key}"),
                    value,
                )
                .await?;
            Ok::<_, StoreError>(())
        }
        .await;
        if let Err(err) = result {
            return self.fail(err, COMPLETION_FAILED, Some("habit_completion"));
        }

        self.finish(|state| {
            patch_by_id(&mut state.user_habits, habit_id, |habit| {
                habit.record_completion(date_key.clone(), entry.clone());
            });
            patch_by_id(&mut state.all_habits, habit_id, |habit| {
                habit.record_completion(date_key.clone(), entry.clone());
            });
            state.any_habit(habit_id).cloned()
        })
    }

    async fn fetch_decoded(&self, owner: Option<&str>) -> Result<Vec<Habit>, StoreError> {
        let documents = match owner {
            None => self.documents.list(HABITS_COLLECTION).await?,
            Some(uid) => {
                self.documents
                    .list_where(HABITS_COLLECTION, "userId", &Value::String(uid.to_string()))
                    .await?
            }
        };
        Ok(documents
            .iter()
            .filter_map(|doc| codec::decode(&doc.data, &doc.id))
            .collect())
    }

    fn begin(&self) {
        self.state
            .update(|state| state.operation_status = OperationStatus::Loading);
    }

    /// Apply `mutate` and publish success carrying `habit`, in one snapshot.
    fn succeed(
        &self,
        habit: Option<Habit>,
        mutate: impl FnOnce(&mut HabitsState, &Habit),
    ) -> HabitOperationStatus {
        let status = OperationStatus::Success(habit);
        self.state.update(|state| {
            if let OperationStatus::Success(Some(habit)) = &status {
                mutate(state, habit);
            }
            state.operation_status = status.clone();
        });
        status
    }

    /// Apply `mutate`, which reports the habit to attach to the success status.
    fn finish(&self, mutate: impl FnOnce(&mut HabitsState) -> Option<Habit>) -> HabitOperationStatus {
        let mut status = OperationStatus::Idle;
        self.state.update(|state| {
            status = OperationStatus::Success(mutate(state));
            state.operation_status = status.clone();
        });
        status
    }

    fn fail(
        &self,
        err: StoreError,
        fallback: &str,
        context: Option<&'static str>,
    ) -> HabitOperationStatus {
        let message = err.message_or(fallback);
        match &err {
            StoreError::Invariant(_) => tracing::error!(%err, "habit store invariant violated"),
            _ => tracing::warn!(%err, "habit operation failed"),
        }
        if let Some(context) = context {
            self.analytics.capture_error(&message, context);
        }
        let status = OperationStatus::Error(message);
        self.state
            .update(|state| state.operation_status = status.clone());
        status
    }
}

fn patch_by_id(habits: &mut [Habit], id: &str, patch: impl FnOnce(&mut Habit)) {
    if let Some(habit) = habits.iter_mut().find(|habit| habit.id == id) {
        patch(habit);
    }
}
