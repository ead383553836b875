//! Contracts of the remote collaborators: the document database, the
//! authentication provider, and their error types.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::watch;

pub type Document = Map<String, Value>;

pub const HABITS_COLLECTION: &str = "habits";
pub const USERS_COLLECTION: &str = "users";

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub data: Document,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Backend(String),
}

impl StorageError {
    pub fn not_found(collection: &str, id: &str) -> Self {
        Self::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

/// Document database consumed by the stores. Each method is one remote call;
/// none of them retry.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list(&self, collection: &str) -> Result<Vec<StoredDocument>, StorageError>;

    /// Documents whose top-level `field` equals `value`.
    async fn list_where(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<StoredDocument>, StorageError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StorageError>;

    /// Stores `data` under a freshly assigned id and returns that id.
    async fn create(&self, collection: &str, data: Document) -> Result<String, StorageError>;

    /// Creates or overwrites the document at `id`.
    async fn set(&self, collection: &str, id: &str, data: Document) -> Result<(), StorageError>;

    /// Merges top-level `fields` into an existing document.
    async fn update(&self, collection: &str, id: &str, fields: Document)
        -> Result<(), StorageError>;

    /// Writes `value` at a dotted field path such as `completionHistory.2024-03-01`,
    /// leaving sibling fields untouched.
    async fn update_path(
        &self,
        collection: &str,
        id: &str,
        path: &str,
        value: Value,
    ) -> Result<(), StorageError>;

    /// Appends `value` to the array at `field` unless already present.
    async fn array_union(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        value: Value,
    ) -> Result<(), StorageError>;

    /// Sets each of `fields` to the server's current time.
    async fn stamp(&self, collection: &str, id: &str, fields: &[&str])
        -> Result<(), StorageError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StorageError>;
}

/// Identity reported by the authentication provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthIdentity {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

/// Session as pushed by the provider. `Pending` until the provider has
/// resolved whether a session exists.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    Pending,
    SignedOut,
    SignedIn(AuthIdentity),
}

/// Failure reported by the authentication provider: a provider code such as
/// `auth/wrong-password` plus its raw message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct AuthError {
    pub code: Option<String>,
    pub message: String,
}

impl AuthError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    pub fn uncoded(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileChanges {
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

impl ProfileChanges {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.photo_url.is_none()
    }

    /// Blank values count as absent: they never clear an existing field.
    pub fn without_blanks(self) -> Self {
        let keep = |value: Option<String>| value.filter(|text| !text.trim().is_empty());
        Self {
            display_name: keep(self.display_name),
            photo_url: keep(self.photo_url),
        }
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Push channel of session changes.
    fn session_changes(&self) -> watch::Receiver<AuthState>;

    fn current_identity(&self) -> Option<AuthIdentity>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthIdentity, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthIdentity, AuthError>;

    /// Federated sign-in through the provider's popup flow.
    async fn sign_in_with_popup(&self) -> Result<AuthIdentity, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    async fn update_profile(&self, changes: &ProfileChanges) -> Result<(), AuthError>;
}
