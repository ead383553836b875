use chrono::{Datelike, Local, NaiveDate};
use serde::Serialize;

use crate::habit::{Frequency, Habit};

pub const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

/// A habit due on the day the list was derived for.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TodayHabit {
    #[serde(flatten)]
    pub habit: Habit,
    pub completed: bool,
}

/// Completion-history key for `date`.
pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_KEY_FORMAT).to_string()
}

pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

/// Monday = 0 ... Sunday = 6.
pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_monday() as u8
}

pub fn is_due_on(habit: &Habit, date: NaiveDate) -> bool {
    match habit.target_frequency {
        Frequency::Daily => true,
        Frequency::Weekly => habit
            .days_of_week
            .as_deref()
            .is_some_and(|days| days.contains(&weekday_index(date))),
        Frequency::Monthly => habit.monthly_day == Some(date.day() as u8),
    }
}

pub fn is_completed_on(habit: &Habit, date: NaiveDate) -> bool {
    habit
        .completion_history
        .get(&date_key(date))
        .is_some_and(|entry| entry.completed)
}

/// Habits due on `today`, in input order, each tagged with its completion.
/// The result is only valid for `today`; callers derive it again once the
/// date changes.
pub fn today_habits(habits: &[Habit], today: NaiveDate) -> Vec<TodayHabit> {
    habits
        .iter()
        .filter(|habit| is_due_on(habit, today))
        .map(|habit| TodayHabit {
            habit: habit.clone(),
            completed: is_completed_on(habit, today),
        })
        .collect()
}
