use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use tokio::task::JoinHandle;

use crate::analytics::{AnalyticsEvent, AnalyticsSink, EventParams, TracingAnalytics};
use crate::habit_store::{HabitOperationStatus, HabitStore};
use crate::schedule::{self, TodayHabit};
use crate::storage::{AuthProvider, DocumentStore};
use crate::ui_store::{SnackbarSeverity, UiStore};
use crate::user_store::UserStore;

/// The three application stores wired to the same collaborators.
pub struct RootStore {
    pub user: Arc<UserStore>,
    pub habits: HabitStore,
    pub ui: UiStore,
    analytics: Arc<dyn AnalyticsSink>,
}

pub struct RootStoreBuilder {
    documents: Option<Arc<dyn DocumentStore>>,
    auth: Option<Arc<dyn AuthProvider>>,
    analytics: Option<Arc<dyn AnalyticsSink>>,
}

impl Default for RootStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RootStoreBuilder {
    pub fn new() -> Self {
        Self {
            documents: None,
            auth: None,
            analytics: None,
        }
    }

    pub fn with_documents(mut self, documents: Arc<dyn DocumentStore>) -> Self {
        self.documents = Some(documents);
        self
    }

    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_analytics(mut self, analytics: Arc<dyn AnalyticsSink>) -> Self {
        self.analytics = Some(analytics);
        self
    }

    pub fn build(self) -> Result<RootStore> {
        let documents = self
            .documents
            .ok_or_else(|| anyhow!("document store not configured"))?;
        let auth = self
            .auth
            .ok_or_else(|| anyhow!("auth provider not configured"))?;
        let analytics = self
            .analytics
            .unwrap_or_else(|| Arc::new(TracingAnalytics));

        Ok(RootStore {
            user: Arc::new(UserStore::new(
                auth,
                Arc::clone(&documents),
                Arc::clone(&analytics),
            )),
            habits: HabitStore::new(documents, Arc::clone(&analytics)),
            ui: UiStore::new(),
            analytics,
        })
    }
}

impl RootStore {
    pub fn builder() -> RootStoreBuilder {
        RootStoreBuilder::new()
    }

    /// Start following the auth provider's session changes.
    pub fn start_session_listener(&self) -> JoinHandle<()> {
        Arc::clone(&self.user).listen()
    }

    pub fn track_page_view(&self, path: &str) {
        self.analytics.log_event(
            AnalyticsEvent::PageView,
            EventParams::from([("page_path", path.to_string())]),
        );
    }

    /// Load the signed-in user's habits. Returns false when nobody is signed in.
    pub async fn refresh_user_habits(&self) -> bool {
        match self.user.current_user() {
            Some(user) => {
                self.habits.load_for_user(&user.uid).await;
                true
            }
            None => false,
        }
    }

    /// Today's list derived from the current `user_habits`.
    pub fn today_habits(&self, today: NaiveDate) -> Vec<TodayHabit> {
        self.habits
            .read(|state| schedule::today_habits(&state.user_habits, today))
    }

    /// Flip today's completion for `habit_id` and surface a failure on the
    /// snackbar.
    pub async fn toggle_today(&self, habit_id: &str, today: NaiveDate) -> HabitOperationStatus {
        let completed = self.habits.read(|state| {
            state
                .any_habit(habit_id)
                .is_some_and(|habit| schedule::is_completed_on(habit, today))
        });
        let status = self
            .habits
            .update_completion(habit_id, today, !completed)
            .await;
        if let Some(message) = status.error() {
            self.ui
                .show_snackbar(message, Some(SnackbarSeverity::Error));
        }
        status
    }
}
