use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::observable::Observable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnackbarSeverity {
    Success,
    Error,
    Warning,
    #[default]
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SnackbarState {
    pub is_open: bool,
    pub message: String,
    pub severity: SnackbarSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrawerState {
    Open,
    #[default]
    Closed,
}

impl DrawerState {
    pub fn toggled(self) -> Self {
        match self {
            DrawerState::Open => DrawerState::Closed,
            DrawerState::Closed => DrawerState::Open,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UiState {
    pub snackbar: SnackbarState,
    pub drawer: DrawerState,
}

/// Transient chrome state: one snackbar and the navigation drawer.
#[derive(Default)]
pub struct UiStore {
    state: Observable<UiState>,
}

impl UiStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> UiState {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<UiState> {
        self.state.subscribe()
    }

    pub fn show_snackbar(&self, message: impl Into<String>, severity: Option<SnackbarSeverity>) {
        let message = message.into();
        self.state.update(|state| {
            state.snackbar = SnackbarState {
                is_open: true,
                message,
                severity: severity.unwrap_or_default(),
            };
        });
    }

    /// Hides the snackbar. Message and severity stay so a closing animation
    /// can still render them.
    pub fn close_snackbar(&self) {
        self.state.update(|state| state.snackbar.is_open = false);
    }

    /// Flip the drawer, or force it into `target`.
    pub fn toggle_drawer(&self, target: Option<DrawerState>) {
        self.state.update(|state| {
            state.drawer = target.unwrap_or_else(|| state.drawer.toggled());
        });
    }

    pub fn is_snackbar_open(&self) -> bool {
        self.state.read(|state| state.snackbar.is_open)
    }

    pub fn is_drawer_open(&self) -> bool {
        self.state.read(|state| state.drawer == DrawerState::Open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snackbar_defaults_to_info() {
        let ui = UiStore::new();
        ui.show_snackbar("Saved", None);
        let snackbar = ui.snapshot().snackbar;
        assert!(snackbar.is_open);
        assert_eq!(snackbar.message, "Saved");
        assert_eq!(snackbar.severity, SnackbarSeverity::Info);
    }

    #[test]
    fn closing_keeps_message_and_severity() {
        let ui = UiStore::new();
        ui.show_snackbar("Ошибка удаления", Some(SnackbarSeverity::Error));
        ui.close_snackbar();
        let snackbar = ui.snapshot().snackbar;
        assert!(!ui.is_snackbar_open());
        assert_eq!(snackbar.message, "Ошибка удаления");
        assert_eq!(snackbar.severity, SnackbarSeverity::Error);
    }

    #[test]
    fn drawer_toggles_and_forces() {
        let ui = UiStore::new();
        assert!(!ui.is_drawer_open());
        ui.toggle_drawer(None);
        assert!(ui.is_drawer_open());
        ui.toggle_drawer(Some(DrawerState::Open));
        assert!(ui.is_drawer_open());
        ui.toggle_drawer(None);
        ui.toggle_drawer(Some(DrawerState::Closed));
        assert!(!ui.is_drawer_open());
    }
}
