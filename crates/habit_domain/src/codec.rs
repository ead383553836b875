//! Conversion between stored habit documents and [`Habit`].
//!
//! Decoding is the only place that knows about legacy document shapes:
//! numeric frequency codes and bare-boolean completion entries are upgraded
//! here and never seen elsewhere. A document that fails validation is
//! rejected whole.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::habit::{
    schedule_fields, Category, CompletionEntry, CompletionHistory, Frequency, Habit,
    HabitFormData, MAX_MONTHLY_DAY, MAX_WEEKDAY_INDEX, MIN_MONTHLY_DAY,
};
use crate::storage::Document;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid {0}")]
    InvalidField(&'static str),
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to serialize habit record: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("habit record serialized to a non-object value")]
    NotAnObject,
}

/// Decode a stored document. Invalid documents are logged and yield `None`;
/// callers skip them.
pub fn decode(raw: &Document, id: &str) -> Option<Habit> {
    match try_decode(raw, id) {
        Ok(habit) => Some(habit),
        Err(err) => {
            tracing::warn!(habit_id = %id, %err, "skipping malformed habit document");
            None
        }
    }
}

pub fn try_decode(raw: &Document, id: &str) -> Result<Habit, DecodeError> {
    let title = required_str(raw, "title")?;
    let category_label = required_str(raw, "category")?;
    let target_frequency = decode_frequency(raw.get("targetFrequency"))
        .ok_or(DecodeError::InvalidField("targetFrequency"))?;
    let user_id = required_str(raw, "userId")?;
    let creation_date = required_str(raw, "creationDate")?;

    let category = Category::from_label(category_label).unwrap_or_default();
    let days_of_week = raw.get("daysOfWeek").and_then(decode_days);
    let monthly_day = raw.get("monthlyDay").and_then(decode_monthly_day);
    let (days_of_week, monthly_day) =
        schedule_fields(target_frequency, days_of_week.as_deref(), monthly_day);

    Ok(Habit {
        id: id.to_string(),
        user_id: user_id.to_string(),
        user_name: optional_str(raw, "userName"),
        title: title.to_string(),
        description: optional_str(raw, "description"),
        category,
        target_frequency,
        days_of_week,
        monthly_day,
        creation_date: creation_date.to_string(),
        completion_history: decode_history(raw.get("completionHistory"), id),
        added_by_users: decode_added_by(raw.get("addedByUsers")),
        original_habit_id: optional_str(raw, "originalHabitId"),
    })
}

fn required_str<'a>(raw: &'a Document, field: &'static str) -> Result<&'a str, DecodeError> {
    raw.get(field)
        .and_then(Value::as_str)
        .ok_or(DecodeError::InvalidField(field))
}

fn optional_str(raw: &Document, field: &str) -> Option<String> {
    raw.get(field).and_then(Value::as_str).map(str::to_string)
}

fn decode_frequency(value: Option<&Value>) -> Option<Frequency> {
    match value? {
        Value::String(token) => Frequency::from_token(token),
        Value::Number(code) => code.as_f64().map(Frequency::from_legacy_code),
        _ => None,
    }
}

/// `None` unless every element is a number; out-of-range days are dropped.
fn decode_days(value: &Value) -> Option<Vec<u8>> {
    let items = value.as_array()?;
    let mut days = Vec::with_capacity(items.len());
    for item in items {
        let day = item.as_f64()?;
        if day.fract() == 0.0 && (0.0..=f64::from(MAX_WEEKDAY_INDEX)).contains(&day) {
            days.push(day as u8);
        }
    }
    Some(days)
}

fn decode_monthly_day(value: &Value) -> Option<u8> {
    let day = value.as_f64()?;
    if day.is_nan() {
        return None;
    }
    let clamped = day
        .trunc()
        .clamp(f64::from(MIN_MONTHLY_DAY), f64::from(MAX_MONTHLY_DAY));
    Some(clamped as u8)
}

fn decode_history(value: Option<&Value>, habit_id: &str) -> CompletionHistory {
    let Some(Value::Object(entries)) = value else {
        return CompletionHistory::new();
    };
    let mut history = CompletionHistory::new();
    for (key, entry) in entries {
        match entry {
            Value::Bool(completed) => {
                history.insert(
                    key.clone(),
                    CompletionEntry {
                        completed: *completed,
                        date: key.clone(),
                    },
                );
            }
            Value::Object(fields) => {
                let completed = fields.get("completed").and_then(Value::as_bool);
                let date = fields.get("date").and_then(Value::as_str);
                match (completed, date) {
                    (Some(completed), Some(date)) => {
                        history.insert(
                            key.clone(),
                            CompletionEntry {
                                completed,
                                date: date.to_string(),
                            },
                        );
                    }
                    _ => {
                        tracing::warn!(habit_id = %habit_id, date_key = %key, "dropping malformed completion entry");
                    }
                }
            }
            _ => {
                tracing::warn!(habit_id = %habit_id, date_key = %key, "dropping malformed completion entry");
            }
        }
    }
    history
}

fn decode_added_by(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    let mut users: Vec<String> = Vec::with_capacity(items.len());
    for uid in items.iter().filter_map(Value::as_str) {
        if !users.iter().any(|existing| existing == uid) {
            users.push(uid.to_string());
        }
    }
    users
}

/// Write shape of a habit document. Optional back-references are omitted
/// rather than written as `null` when absent.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HabitRecord {
    pub title: String,
    pub description: Option<String>,
    pub category: Category,
    pub target_frequency: Frequency,
    pub user_id: String,
    pub creation_date: String,
    pub completion_history: CompletionHistory,
    pub days_of_week: Option<Vec<u8>>,
    pub monthly_day: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub added_by_users: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_habit_id: Option<String>,
}

impl HabitRecord {
    pub fn from_form(
        form: &HabitFormData,
        user_id: &str,
        user_name: Option<&str>,
        creation_date: String,
    ) -> Self {
        let (days_of_week, monthly_day) = form.schedule_fields();
        Self {
            title: form.title.clone(),
            description: form.normalized_description(),
            category: form.category,
            target_frequency: form.target_frequency,
            user_id: user_id.to_string(),
            creation_date,
            completion_history: CompletionHistory::new(),
            days_of_week,
            monthly_day,
            user_name: user_name.filter(|name| !name.is_empty()).map(str::to_string),
            added_by_users: Vec::new(),
            original_habit_id: None,
        }
    }

    /// A fresh copy of `source` owned by `user_id`, with an empty history.
    pub fn clone_for(source: &Habit, user_id: &str, creation_date: String) -> Self {
        let (days_of_week, monthly_day) = schedule_fields(
            source.target_frequency,
            source.days_of_week.as_deref(),
            source.monthly_day,
        );
        Self {
            title: source.title.clone(),
            description: source.description.clone(),
            category: source.category,
            target_frequency: source.target_frequency,
            user_id: user_id.to_string(),
            creation_date,
            completion_history: CompletionHistory::new(),
            days_of_week,
            monthly_day,
            user_name: None,
            added_by_users: Vec::new(),
            original_habit_id: Some(source.id.clone()),
        }
    }
}

impl From<&Habit> for HabitRecord {
    fn from(habit: &Habit) -> Self {
        Self {
            title: habit.title.clone(),
            description: habit.description.clone(),
            category: habit.category,
            target_frequency: habit.target_frequency,
            user_id: habit.user_id.clone(),
            creation_date: habit.creation_date.clone(),
            completion_history: habit.completion_history.clone(),
            days_of_week: habit.days_of_week.clone(),
            monthly_day: habit.monthly_day,
            user_name: habit.user_name.clone(),
            added_by_users: habit.added_by_users.clone(),
            original_habit_id: habit.original_habit_id.clone(),
        }
    }
}

/// Fields rewritten by an edit of an existing habit.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HabitPatch {
    pub title: String,
    pub description: Option<String>,
    pub category: Category,
    pub target_frequency: Frequency,
    pub days_of_week: Option<Vec<u8>>,
    pub monthly_day: Option<u8>,
}

impl From<&HabitFormData> for HabitPatch {
    fn from(form: &HabitFormData) -> Self {
        let (days_of_week, monthly_day) = form.schedule_fields();
        Self {
            title: form.title.clone(),
            description: form.normalized_description(),
            category: form.category,
            target_frequency: form.target_frequency,
            days_of_week,
            monthly_day,
        }
    }
}

pub fn encode<T: Serialize>(record: &T) -> Result<Document, EncodeError> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        _ => Err(EncodeError::NotAnObject),
    }
}
