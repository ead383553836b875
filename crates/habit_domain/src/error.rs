use thiserror::Error;

use crate::codec::EncodeError;
use crate::storage::{AuthError, StorageError};

pub const GENERIC_AUTH_MESSAGE: &str = "Ошибка аутентификации";
pub const GENERIC_OPERATION_MESSAGE: &str = "Operation failed";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("{0}")]
    NotFound(String),

    #[error("User not authenticated")]
    NotAuthenticated,

    /// A state the store itself should never produce; indicates a bug.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl StoreError {
    /// Message shown to the user for a failure inside the user store.
    pub fn user_message(&self) -> String {
        match self {
            StoreError::Auth(err) => auth_error_message(err),
            StoreError::Storage(_) => self.message_or(GENERIC_OPERATION_MESSAGE),
            StoreError::NotAuthenticated | StoreError::NotFound(_) => self.to_string(),
            StoreError::Encode(_) | StoreError::Invariant(_) => {
                GENERIC_OPERATION_MESSAGE.to_string()
            }
        }
    }

    /// Message attached to a habit operation; `fallback` is used when the
    /// underlying error carries no text.
    pub fn message_or(&self, fallback: &str) -> String {
        let message = self.to_string();
        if message.trim().is_empty() {
            fallback.to_string()
        } else {
            message
        }
    }
}

/// Translate a provider error into a user-facing message. Unknown codes fall
/// back to the provider's own message, then to a generic one.
pub fn auth_error_message(err: &AuthError) -> String {
    let known = match err.code.as_deref() {
        Some("auth/invalid-credential") => Some("Неверный email или пароль"),
        Some("auth/user-not-found") => Some("Пользователь с таким email не найден"),
        Some("auth/wrong-password") => Some("Неверный пароль"),
        Some("auth/email-already-in-use") => Some("Email уже используется"),
        Some("auth/too-many-requests") => Some("Слишком много попыток. Попробуйте позже"),
        Some("auth/weak-password") => Some("Пароль должен содержать не менее 6 символов"),
        Some("auth/invalid-email") => Some("Некорректный email"),
        Some("auth/network-request-failed") => {
            Some("Ошибка сети. Проверьте подключение к интернету")
        }
        Some("auth/operation-not-allowed") => Some("Этот метод аутентификации отключен"),
        _ => None,
    };
    match known {
        Some(message) => message.to_string(),
        None if !err.message.trim().is_empty() => err.message.clone(),
        None => GENERIC_AUTH_MESSAGE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_known_codes() {
        let err = AuthError::new("auth/wrong-password", "Firebase: wrong password");
        assert_eq!(auth_error_message(&err), "Неверный пароль");
        let err = AuthError::new("auth/email-already-in-use", "raw");
        assert_eq!(auth_error_message(&err), "Email уже используется");
    }

    #[test]
    fn unknown_codes_fall_back_to_raw_then_generic() {
        let err = AuthError::new("auth/popup-blocked", "popup was blocked");
        assert_eq!(auth_error_message(&err), "popup was blocked");
        let err = AuthError::new("auth/popup-blocked", "");
        assert_eq!(auth_error_message(&err), GENERIC_AUTH_MESSAGE);
    }

    #[test]
    fn storage_failures_keep_their_message() {
        let err = StoreError::from(StorageError::Unavailable("offline".into()));
        assert_eq!(err.user_message(), "storage unavailable: offline");
        let err = StoreError::from(StorageError::Backend("  ".into()));
        assert_eq!(err.user_message(), GENERIC_OPERATION_MESSAGE);
        assert_eq!(StoreError::NotAuthenticated.user_message(), "User not authenticated");
    }

    #[test]
    fn internal_failures_use_generic_user_message() {
        let err = StoreError::Invariant("profile missing after write".into());
        assert_eq!(err.user_message(), GENERIC_OPERATION_MESSAGE);
    }

    #[test]
    fn empty_messages_fall_back() {
        let err = StoreError::from(StorageError::Backend(String::new()));
        assert_eq!(err.message_or("Ошибка удаления"), "Ошибка удаления");
        let err = StoreError::from(StorageError::Backend("quota exceeded".into()));
        assert_eq!(err.message_or("Ошибка удаления"), "quota exceeded");
    }
}
