//! In-process collaborators: a document store and an authentication
//! provider that keep everything in memory. Used by the desktop runner and
//! by the test-suite.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::watch;

use crate::storage::{
    AuthError, AuthIdentity, AuthProvider, AuthState, Document, DocumentStore, ProfileChanges,
    StorageError, StoredDocument,
};

#[derive(Debug, Default)]
struct Collections {
    next_id: u64,
    collections: HashMap<String, BTreeMap<String, Document>>,
}

impl Collections {
    fn collection(&self, name: &str) -> Option<&BTreeMap<String, Document>> {
        self.collections.get(name)
    }

    fn existing_mut(&mut self, collection: &str, id: &str) -> Result<&mut Document, StorageError> {
        self.collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StorageError::not_found(collection, id))
    }
}

#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    inner: RwLock<Collections>,
    failure: Mutex<Option<StorageError>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document directly, bypassing failure injection.
    pub fn insert(&self, collection: &str, id: impl Into<String>, data: Document) {
        self.inner
            .write()
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.into(), data);
    }

    pub fn snapshot(&self, collection: &str, id: &str) -> Option<Document> {
        self.inner
            .read()
            .collection(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    pub fn len(&self, collection: &str) -> usize {
        self.inner
            .read()
            .collection(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Every subsequent call fails with `error` until cleared with `None`.
    pub fn fail_with(&self, error: Option<StorageError>) {
        *self.failure.lock() = error;
    }

    fn check(&self) -> Result<(), StorageError> {
        match self.failure.lock().as_ref() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn collect(docs: Option<&BTreeMap<String, Document>>) -> Vec<StoredDocument> {
        docs.map(|docs| {
            docs.iter()
                .map(|(id, data)| StoredDocument {
                    id: id.clone(),
                    data: data.clone(),
                })
                .collect()
        })
        .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn list(&self, collection: &str) -> Result<Vec<StoredDocument>, StorageError> {
        self.check()?;
        Ok(Self::collect(self.inner.read().collection(collection)))
    }

    async fn list_where(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<StoredDocument>, StorageError> {
        self.check()?;
        let mut docs = Self::collect(self.inner.read().collection(collection));
        docs.retain(|doc| doc.data.get(field) == Some(value));
        Ok(docs)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StorageError> {
        self.check()?;
        Ok(self.snapshot(collection, id))
    }

    async fn create(&self, collection: &str, data: Document) -> Result<String, StorageError> {
        self.check()?;
        let mut inner = self.inner.write();
        inner.next_id += 1;
        let id = format!("doc-{}", inner.next_id);
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), data);
        Ok(id)
    }

    async fn set(&self, collection: &str, id: &str, data: Document) -> Result<(), StorageError> {
        self.check()?;
        self.insert(collection, id, data);
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Document,
    ) -> Result<(), StorageError> {
        self.check()?;
        let mut inner = self.inner.write();
        let doc = inner.existing_mut(collection, id)?;
        doc.extend(fields);
        Ok(())
    }

    async fn update_path(
        &self,
        collection: &str,
        id: &str,
        path: &str,
        value: Value,
    ) -> Result<(), StorageError> {
        self.check()?;
        let mut inner = self.inner.write();
        let doc = inner.existing_mut(collection, id)?;
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(StorageError::Backend(format!("invalid field path `{path}`")));
        }
        write_path(doc, &segments, value);
        Ok(())
    }

    async fn array_union(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        value: Value,
    ) -> Result<(), StorageError> {
        self.check()?;
        let mut inner = self.inner.write();
        let doc = inner.existing_mut(collection, id)?;
        let slot = doc
            .entry(field.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !slot.is_array() {
            *slot = Value::Array(Vec::new());
        }
        if let Value::Array(items) = slot {
            if !items.contains(&value) {
                items.push(value);
            }
        }
        Ok(())
    }

    async fn stamp(
        &self,
        collection: &str,
        id: &str,
        fields: &[&str],
    ) -> Result<(), StorageError> {
        self.check()?;
        let now = Value::String(Utc::now().to_rfc3339());
        let mut inner = self.inner.write();
        let doc = inner.existing_mut(collection, id)?;
        for field in fields {
            doc.insert((*field).to_string(), now.clone());
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StorageError> {
        self.check()?;
        let mut inner = self.inner.write();
        inner
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(collection, id))
    }
}

fn write_path(doc: &mut Document, segments: &[&str], value: Value) {
    match segments {
        [] => {}
        [leaf] => {
            doc.insert((*leaf).to_string(), value);
        }
        [head, rest @ ..] => {
            let slot = doc
                .entry((*head).to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            if !slot.is_object() {
                *slot = Value::Object(Document::new());
            }
            if let Value::Object(child) = slot {
                write_path(child, rest, value);
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Account {
    password: String,
    identity: AuthIdentity,
}

#[derive(Debug, Default)]
struct AuthInner {
    next_uid: u64,
    accounts: HashMap<String, Account>,
    federated: Option<AuthIdentity>,
    sign_out_failure: Option<AuthError>,
}

/// Email/password provider with an optional canned federated identity.
/// Starts in [`AuthState::Pending`]; call [`MemoryAuthProvider::resolve`] to
/// emit the first session callback.
pub struct MemoryAuthProvider {
    inner: Mutex<AuthInner>,
    session: watch::Sender<AuthState>,
}

impl Default for MemoryAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAuthProvider {
    pub const MIN_PASSWORD_LEN: usize = 6;

    pub fn new() -> Self {
        let (session, _) = watch::channel(AuthState::Pending);
        Self {
            inner: Mutex::new(AuthInner::default()),
            session,
        }
    }

    pub fn with_federated_identity(self, identity: AuthIdentity) -> Self {
        self.inner.lock().federated = Some(identity);
        self
    }

    /// Register an account without signing it in.
    pub fn register(&self, email: &str, password: &str, display_name: Option<&str>) -> AuthIdentity {
        let mut inner = self.inner.lock();
        let identity = Self::new_identity(&mut inner, email, display_name);
        inner.accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                identity: identity.clone(),
            },
        );
        identity
    }

    /// Emit the initial session state: signed in as `identity`, or signed out.
    pub fn resolve(&self, identity: Option<AuthIdentity>) {
        let state = match identity {
            Some(identity) => AuthState::SignedIn(identity),
            None => AuthState::SignedOut,
        };
        self.session.send_replace(state);
    }

    pub fn fail_sign_out(&self, error: Option<AuthError>) {
        self.inner.lock().sign_out_failure = error;
    }

    fn new_identity(inner: &mut AuthInner, email: &str, display_name: Option<&str>) -> AuthIdentity {
        inner.next_uid += 1;
        AuthIdentity {
            uid: format!("uid-{}", inner.next_uid),
            email: Some(email.to_string()),
            display_name: display_name.map(str::to_string),
            photo_url: None,
        }
    }

    fn signed_in(&self, identity: &AuthIdentity) {
        self.session.send_replace(AuthState::SignedIn(identity.clone()));
    }
}

#[async_trait]
impl AuthProvider for MemoryAuthProvider {
    fn session_changes(&self) -> watch::Receiver<AuthState> {
        self.session.subscribe()
    }

    fn current_identity(&self) -> Option<AuthIdentity> {
        match &*self.session.borrow() {
            AuthState::SignedIn(identity) => Some(identity.clone()),
            AuthState::Pending | AuthState::SignedOut => None,
        }
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthIdentity, AuthError> {
        if !email.contains('@') {
            return Err(AuthError::new("auth/invalid-email", "invalid email"));
        }
        if password.chars().count() < Self::MIN_PASSWORD_LEN {
            return Err(AuthError::new("auth/weak-password", "weak password"));
        }
        let identity = {
            let mut inner = self.inner.lock();
            if inner.accounts.contains_key(email) {
                return Err(AuthError::new(
                    "auth/email-already-in-use",
                    "email already in use",
                ));
            }
            let identity = Self::new_identity(&mut inner, email, None);
            inner.accounts.insert(
                email.to_string(),
                Account {
                    password: password.to_string(),
                    identity: identity.clone(),
                },
            );
            identity
        };
        self.signed_in(&identity);
        Ok(identity)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthIdentity, AuthError> {
        let identity = {
            let inner = self.inner.lock();
            let account = inner
                .accounts
                .get(email)
                .ok_or_else(|| AuthError::new("auth/user-not-found", "user not found"))?;
            if account.password != password {
                return Err(AuthError::new("auth/wrong-password", "wrong password"));
            }
            account.identity.clone()
        };
        self.signed_in(&identity);
        Ok(identity)
    }

    async fn sign_in_with_popup(&self) -> Result<AuthIdentity, AuthError> {
        let identity = self
            .inner
            .lock()
            .federated
            .clone()
            .ok_or_else(|| AuthError::new("auth/popup-closed-by-user", "popup closed by user"))?;
        self.signed_in(&identity);
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if let Some(err) = self.inner.lock().sign_out_failure.clone() {
            return Err(err);
        }
        self.session.send_replace(AuthState::SignedOut);
        Ok(())
    }

    async fn update_profile(&self, changes: &ProfileChanges) -> Result<(), AuthError> {
        let mut identity = self
            .current_identity()
            .ok_or_else(|| AuthError::uncoded("no signed-in user"))?;
        if let Some(name) = &changes.display_name {
            identity.display_name = Some(name.clone());
        }
        if let Some(photo) = &changes.photo_url {
            identity.photo_url = Some(photo.clone());
        }
        {
            let mut inner = self.inner.lock();
            if let Some(account) = inner
                .accounts
                .values_mut()
                .find(|account| account.identity.uid == identity.uid)
            {
                account.identity = identity.clone();
            }
        }
        // Profile edits do not count as a new session event.
        self.session.send_if_modified(|state| {
            if let AuthState::SignedIn(current) = state {
                *current = identity;
            }
            false
        });
        Ok(())
    }
}
