use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MONTHLY_DAY: u8 = 1;
pub const MIN_MONTHLY_DAY: u8 = 1;
pub const MAX_MONTHLY_DAY: u8 = 31;
/// Monday = 0 ... Sunday = 6.
pub const MAX_WEEKDAY_INDEX: u8 = 6;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Category {
    #[default]
    #[serde(rename = "Здоровье")]
    Health,
    #[serde(rename = "Спорт")]
    Sport,
    #[serde(rename = "Образование")]
    Education,
    #[serde(rename = "Продуктивность")]
    Productivity,
    #[serde(rename = "Финансы")]
    Finance,
    #[serde(rename = "Отношения")]
    Relationships,
    #[serde(rename = "Досуг")]
    Leisure,
    #[serde(rename = "Другое")]
    Other,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Health,
        Category::Sport,
        Category::Education,
        Category::Productivity,
        Category::Finance,
        Category::Relationships,
        Category::Leisure,
        Category::Other,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::Health => "Здоровье",
            Category::Sport => "Спорт",
            Category::Education => "Образование",
            Category::Productivity => "Продуктивность",
            Category::Finance => "Финансы",
            Category::Relationships => "Отношения",
            Category::Leisure => "Досуг",
            Category::Other => "Другое",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.label() == label)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Category filter used by the library view; `All` is the "no filter" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterCategory {
    #[default]
    All,
    Only(Category),
}

impl FilterCategory {
    pub const ALL_LABEL: &'static str = "Все";

    pub fn label(self) -> &'static str {
        match self {
            FilterCategory::All => Self::ALL_LABEL,
            FilterCategory::Only(category) => category.label(),
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        if label == Self::ALL_LABEL {
            return Some(FilterCategory::All);
        }
        Category::from_label(label).map(FilterCategory::Only)
    }

    pub fn matches(self, category: Category) -> bool {
        match self {
            FilterCategory::All => true,
            FilterCategory::Only(wanted) => wanted == category,
        }
    }
}

impl From<Category> for FilterCategory {
    fn from(category: Category) -> Self {
        FilterCategory::Only(category)
    }
}

impl fmt::Display for FilterCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "daily" => Some(Frequency::Daily),
            "weekly" => Some(Frequency::Weekly),
            "monthly" => Some(Frequency::Monthly),
            _ => None,
        }
    }

    /// Older documents stored the repeat interval in days.
    pub fn from_legacy_code(code: f64) -> Self {
        if code == 1.0 {
            Frequency::Daily
        } else if code == 7.0 {
            Frequency::Weekly
        } else {
            Frequency::Monthly
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionEntry {
    pub completed: bool,
    /// Timestamp of the toggle (or the date key for upgraded legacy entries).
    pub date: String,
}

/// Keyed by `YYYY-MM-DD`.
pub type CompletionHistory = BTreeMap<String, CompletionEntry>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Habit {
    pub id: String,
    pub user_id: String,
    pub user_name: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub category: Category,
    pub target_frequency: Frequency,
    pub days_of_week: Option<Vec<u8>>,
    pub monthly_day: Option<u8>,
    pub creation_date: String,
    pub completion_history: CompletionHistory,
    pub added_by_users: Vec<String>,
    pub original_habit_id: Option<String>,
}

impl Habit {
    pub fn is_owned_by(&self, uid: &str) -> bool {
        self.user_id == uid
    }

    pub fn is_added_by(&self, uid: &str) -> bool {
        self.added_by_users.iter().any(|existing| existing == uid)
    }

    /// Set semantics: returns `false` when `uid` was already recorded.
    pub fn mark_added_by(&mut self, uid: &str) -> bool {
        if self.is_added_by(uid) {
            return false;
        }
        self.added_by_users.push(uid.to_string());
        true
    }

    pub fn record_completion(&mut self, date_key: impl Into<String>, entry: CompletionEntry) {
        self.completion_history.insert(date_key.into(), entry);
    }

    pub fn apply_form(&mut self, form: &HabitFormData) {
        let (days_of_week, monthly_day) = form.schedule_fields();
        self.title = form.title.clone();
        self.description = form.normalized_description();
        self.category = form.category;
        self.target_frequency = form.target_frequency;
        self.days_of_week = days_of_week;
        self.monthly_day = monthly_day;
    }
}

/// User-editable subset of a habit, as submitted by the create/edit forms.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct HabitFormData {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: Category,
    pub target_frequency: Frequency,
    #[serde(default)]
    pub days_of_week: Option<Vec<u8>>,
    #[serde(default)]
    pub monthly_day: Option<u8>,
}

impl HabitFormData {
    pub fn new(title: impl Into<String>, category: Category, target_frequency: Frequency) -> Self {
        Self {
            title: title.into(),
            category,
            target_frequency,
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_days_of_week(mut self, days: impl IntoIterator<Item = u8>) -> Self {
        self.days_of_week = Some(days.into_iter().collect());
        self
    }

    pub fn with_monthly_day(mut self, day: u8) -> Self {
        self.monthly_day = Some(day);
        self
    }

    /// Derive `(daysOfWeek, monthlyDay)` from the frequency: only the field that
    /// belongs to the frequency survives, the other is `None`.
    pub fn schedule_fields(&self) -> (Option<Vec<u8>>, Option<u8>) {
        schedule_fields(
            self.target_frequency,
            self.days_of_week.as_deref(),
            self.monthly_day,
        )
    }

    /// Blank descriptions are stored as `null`.
    pub fn normalized_description(&self) -> Option<String> {
        self.description
            .as_ref()
            .filter(|text| !text.is_empty())
            .cloned()
    }
}

pub(crate) fn schedule_fields(
    frequency: Frequency,
    days_of_week: Option<&[u8]>,
    monthly_day: Option<u8>,
) -> (Option<Vec<u8>>, Option<u8>) {
    match frequency {
        Frequency::Daily => (None, None),
        Frequency::Weekly => (Some(normalize_days(days_of_week.unwrap_or_default())), None),
        Frequency::Monthly => {
            let day = match monthly_day {
                Some(0) | None => DEFAULT_MONTHLY_DAY,
                Some(day) => day.min(MAX_MONTHLY_DAY),
            };
            (None, Some(day))
        }
    }
}

/// Sorted, de-duplicated, restricted to 0..=6.
pub(crate) fn normalize_days(days: &[u8]) -> Vec<u8> {
    let mut normalized: Vec<u8> = days
        .iter()
        .copied()
        .filter(|day| *day <= MAX_WEEKDAY_INDEX)
        .collect();
    normalized.sort_unstable();
    normalized.dedup();
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_fields_follow_frequency() {
        let weekly = HabitFormData::new("Run", Category::Sport, Frequency::Weekly)
            .with_days_of_week([4, 0, 2, 2])
            .with_monthly_day(15);
        assert_eq!(weekly.schedule_fields(), (Some(vec![0, 2, 4]), None));

        let monthly = HabitFormData::new("Budget", Category::Finance, Frequency::Monthly)
            .with_days_of_week([1]);
        assert_eq!(monthly.schedule_fields(), (None, Some(DEFAULT_MONTHLY_DAY)));

        let daily = HabitFormData::new("Water", Category::Health, Frequency::Daily)
            .with_days_of_week([1])
            .with_monthly_day(3);
        assert_eq!(daily.schedule_fields(), (None, None));
    }

    #[test]
    fn weekly_without_days_keeps_an_empty_set() {
        let form = HabitFormData::new("Stretch", Category::Health, Frequency::Weekly);
        assert_eq!(form.schedule_fields(), (Some(Vec::new()), None));
    }

    #[test]
    fn category_labels_round_trip() {
        for category in Category::ALL {
            assert_eq!(Category::from_label(category.label()), Some(category));
        }
        assert_eq!(Category::from_label("Unknown"), None);
        assert_eq!(FilterCategory::from_label("Все"), Some(FilterCategory::All));
        assert_eq!(
            FilterCategory::from_label("Спорт"),
            Some(FilterCategory::Only(Category::Sport))
        );
    }

    #[test]
    fn legacy_frequency_codes() {
        assert_eq!(Frequency::from_legacy_code(1.0), Frequency::Daily);
        assert_eq!(Frequency::from_legacy_code(7.0), Frequency::Weekly);
        assert_eq!(Frequency::from_legacy_code(30.0), Frequency::Monthly);
        assert_eq!(Frequency::from_legacy_code(0.0), Frequency::Monthly);
    }

    #[test]
    fn added_by_users_has_set_semantics() {
        let mut habit = Habit {
            id: "h1".into(),
            user_id: "u1".into(),
            user_name: None,
            title: "Read".into(),
            description: None,
            category: Category::Education,
            target_frequency: Frequency::Daily,
            days_of_week: None,
            monthly_day: None,
            creation_date: "2025-01-01".into(),
            completion_history: CompletionHistory::new(),
            added_by_users: Vec::new(),
            original_habit_id: None,
        };
        assert!(habit.mark_added_by("u2"));
        assert!(!habit.mark_added_by("u2"));
        assert_eq!(habit.added_by_users, vec!["u2".to_string()]);
        assert!(habit.is_added_by("u2"));
        assert!(habit.is_owned_by("u1"));
    }
}
