pub mod analytics;
pub mod codec;
pub mod error;
pub mod habit;
pub mod habit_store;
pub mod memory;
pub mod observable;
pub mod root;
pub mod schedule;
pub mod status;
pub mod storage;
pub mod ui_store;
pub mod user_store;

pub use crate::error::StoreError;
pub use crate::habit::{Category, FilterCategory, Frequency, Habit, HabitFormData};
pub use crate::habit_store::{HabitOperationStatus, HabitStore, HabitsState};
pub use crate::root::{RootStore, RootStoreBuilder};
pub use crate::status::OperationStatus;
pub use crate::ui_store::{SnackbarSeverity, UiStore};
pub use crate::user_store::{AppUser, UserOperationStatus, UserStore};
