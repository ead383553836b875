use std::collections::BTreeMap;

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalyticsEvent {
    UserSignup,
    UserLogin,
    HabitCreated,
    HabitUpdated,
    HabitDeleted,
    ErrorOccurred,
    PageView,
}

impl AnalyticsEvent {
    pub fn name(self) -> &'static str {
        match self {
            AnalyticsEvent::UserSignup => "user_signup",
            AnalyticsEvent::UserLogin => "user_login",
            AnalyticsEvent::HabitCreated => "habit_created",
            AnalyticsEvent::HabitUpdated => "habit_update",
            AnalyticsEvent::HabitDeleted => "habit_deleted",
            AnalyticsEvent::ErrorOccurred => "error_occurred",
            AnalyticsEvent::PageView => "page_view",
        }
    }
}

pub type EventParams = BTreeMap<&'static str, String>;

/// Fire-and-forget reporting. Implementations must never block or fail the
/// caller; anything that goes wrong inside a sink stays inside it.
pub trait AnalyticsSink: Send + Sync {
    fn log_event(&self, event: AnalyticsEvent, params: EventParams);
    fn capture_error(&self, message: &str, context: &'static str);
    fn set_user(&self, uid: &str, properties: EventParams);
}

/// Default sink: forwards everything to `tracing` under the `analytics` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAnalytics;

impl AnalyticsSink for TracingAnalytics {
    fn log_event(&self, event: AnalyticsEvent, params: EventParams) {
        tracing::info!(target: "analytics", event = event.name(), ?params, "analytics event");
    }

    fn capture_error(&self, message: &str, context: &'static str) {
        tracing::error!(
            target: "analytics",
            event = AnalyticsEvent::ErrorOccurred.name(),
            %context,
            %message,
            "application error"
        );
    }

    fn set_user(&self, uid: &str, properties: EventParams) {
        tracing::debug!(target: "analytics", %uid, ?properties, "analytics user properties");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Event(AnalyticsEvent, EventParams),
    Error { message: String, context: &'static str },
    User(String, EventParams),
}

/// Keeps every report in memory; lets tests assert on what was emitted.
#[derive(Debug, Default)]
pub struct RecordingAnalytics {
    records: Mutex<Vec<Recorded>>,
}

impl RecordingAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<Recorded> {
        self.records.lock().clone()
    }

    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.records
            .lock()
            .iter()
            .filter_map(|record| match record {
                Recorded::Event(event, _) => Some(*event),
                _ => None,
            })
            .collect()
    }

    pub fn error_contexts(&self) -> Vec<&'static str> {
        self.records
            .lock()
            .iter()
            .filter_map(|record| match record {
                Recorded::Error { context, .. } => Some(*context),
                _ => None,
            })
            .collect()
    }
}

impl AnalyticsSink for RecordingAnalytics {
    fn log_event(&self, event: AnalyticsEvent, params: EventParams) {
        self.records.lock().push(Recorded::Event(event, params));
    }

    fn capture_error(&self, message: &str, context: &'static str) {
        self.records.lock().push(Recorded::Error {
            message: message.to_string(),
            context,
        });
    }

    fn set_user(&self, uid: &str, properties: EventParams) {
        self.records
            .lock()
            .push(Recorded::User(uid.to_string(), properties));
    }
}
