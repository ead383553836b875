use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::analytics::{AnalyticsEvent, AnalyticsSink, EventParams};
use crate::codec;
use crate::error::StoreError;
use crate::observable::Observable;
use crate::status::OperationStatus;
use crate::storage::{
    AuthIdentity, AuthProvider, AuthState, Document, DocumentStore, ProfileChanges,
    USERS_COLLECTION,
};

pub type UserOperationStatus = OperationStatus<AppUser>;

pub const MIN_PASSWORD_LEN: usize = 8;

/// Profile document stored under `users/<uid>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: String,
    #[serde(rename = "photoURL", default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

impl AppUser {
    /// Profile derived from the provider's identity. `display_name` wins over
    /// whatever name the provider carries.
    pub fn from_identity(identity: &AuthIdentity, display_name: Option<&str>) -> Self {
        Self {
            uid: identity.uid.clone(),
            email: identity.email.clone(),
            display_name: display_name
                .map(str::to_string)
                .or_else(|| identity.display_name.clone())
                .unwrap_or_default(),
            photo_url: identity.photo_url.clone(),
        }
    }

    /// Merge `changes`; absent or blank fields keep the current value.
    pub fn apply(&mut self, changes: &ProfileChanges) {
        let changes = changes.clone().without_blanks();
        if let Some(name) = changes.display_name {
            self.display_name = name;
        }
        if let Some(photo) = changes.photo_url {
            self.photo_url = Some(photo);
        }
    }
}

/// Shape check for profile documents read back from storage.
pub fn is_app_user(raw: &Document) -> bool {
    raw.get("uid").is_some_and(Value::is_string)
        && raw
            .get("email")
            .is_some_and(|email| email.is_string() || email.is_null())
        && raw.get("displayName").is_some_and(Value::is_string)
}

/// `local@domain.tld` shape, no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

pub fn is_valid_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LEN
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserState {
    pub current_user: Option<AppUser>,
    pub operation_status: UserOperationStatus,
    /// True until the provider reports its first session state.
    pub is_loading: bool,
}

impl Default for UserState {
    fn default() -> Self {
        Self {
            current_user: None,
            operation_status: OperationStatus::Idle,
            is_loading: true,
        }
    }
}

impl UserState {
    pub fn is_authenticated(&self) -> bool {
        self.current_user.is_some()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.current_user
            .as_ref()
            .map(|user| user.display_name.as_str())
    }

    pub fn email(&self) -> Option<&str> {
        self.current_user
            .as_ref()
            .and_then(|user| user.email.as_deref())
    }
}

pub struct UserStore {
    auth: Arc<dyn AuthProvider>,
    documents: Arc<dyn DocumentStore>,
    analytics: Arc<dyn AnalyticsSink>,
    state: Observable<UserState>,
}

impl UserStore {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        documents: Arc<dyn DocumentStore>,
        analytics: Arc<dyn AnalyticsSink>,
    ) -> Self {
        Self {
            auth,
            documents,
            analytics,
            state: Observable::default(),
        }
    }

    pub fn snapshot(&self) -> UserState {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<UserState> {
        self.state.subscribe()
    }

    pub fn current_user(&self) -> Option<AppUser> {
        self.state.read(|state| state.current_user.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.read(UserState::is_authenticated)
    }

    pub fn display_name(&self) -> Option<String> {
        self.state
            .read(|state| state.display_name().map(str::to_string))
    }

    pub fn email(&self) -> Option<String> {
        self.state.read(|state| state.email().map(str::to_string))
    }

    pub fn operation_status(&self) -> UserOperationStatus {
        self.state.read(|state| state.operation_status.clone())
    }

    /// Follow the provider's session channel until it closes.
    pub fn listen(self: Arc<Self>) -> JoinHandle<()> {
        let mut sessions = self.auth.session_changes();
        tokio::spawn(async move {
            loop {
                let session = sessions.borrow_and_update().clone();
                self.handle_auth_state(session).await;
                if sessions.changed().await.is_err() {
                    tracing::debug!("session channel closed");
                    break;
                }
            }
        })
    }

    /// Apply one session callback.
    #[instrument(skip_all)]
    pub async fn handle_auth_state(&self, session: AuthState) {
        match session {
            AuthState::Pending => {}
            AuthState::SignedOut => self.state.update(|state| {
                state.current_user = None;
                state.is_loading = false;
            }),
            AuthState::SignedIn(identity) => {
                let profile = self.fetch_user_profile(&identity.uid).await;
                if profile.is_none() {
                    tracing::warn!(uid = %identity.uid, "signed in without a profile");
                }
                self.state.update(|state| {
                    state.current_user = profile;
                    state.is_loading = false;
                });
            }
        }
    }

    /// Read the profile for `uid`, creating it from the provider's identity
    /// when the document is missing. Failures are logged and read as `None`.
    #[instrument(skip(self))]
    pub async fn fetch_user_profile(&self, uid: &str) -> Option<AppUser> {
        match self.try_fetch_profile(uid).await {
            Ok(user) => user,
            Err(err) => {
                tracing::warn!(%err, "failed to fetch user profile");
                None
            }
        }
    }

    async fn try_fetch_profile(&self, uid: &str) -> Result<Option<AppUser>, StoreError> {
        if let Some(raw) = self.documents.get(USERS_COLLECTION, uid).await? {
            if is_app_user(&raw) {
                match serde_json::from_value::<AppUser>(Value::Object(raw)) {
                    Ok(user) => return Ok(Some(user)),
                    Err(err) => tracing::warn!(%err, "undecodable user document"),
                }
            } else {
                tracing::warn!(%uid, "user document has an invalid shape");
            }
        }

        let Some(identity) = self
            .auth
            .current_identity()
            .filter(|identity| identity.uid == uid)
        else {
            return Ok(None);
        };
        let user = AppUser::from_identity(&identity, None);
        self.documents
            .set(USERS_COLLECTION, uid, codec::encode(&user)?)
            .await?;
        self.documents
            .stamp(USERS_COLLECTION, uid, &["createdAt", "updatedAt"])
            .await?;
        Ok(Some(user))
    }

    #[instrument(skip(self, password))]
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> UserOperationStatus {
        self.begin();
        match self.try_sign_up(email, password, display_name).await {
            Ok(user) => {
                self.analytics.log_event(
                    AnalyticsEvent::UserSignup,
                    EventParams::from([("method", "email".to_string())]),
                );
                self.succeed(user)
            }
            Err(err) => self.fail(err, Some("user_signup")),
        }
    }

    async fn try_sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<AppUser, StoreError> {
        let identity = self.auth.sign_up(email, password).await?;
        self.auth
            .update_profile(&ProfileChanges {
                display_name: Some(display_name.to_string()),
                photo_url: None,
            })
            .await?;
        let user = AppUser::from_identity(&identity, Some(display_name));
        self.documents
            .set(USERS_COLLECTION, &user.uid, codec::encode(&user)?)
            .await?;
        self.documents
            .stamp(USERS_COLLECTION, &user.uid, &["createdAt", "updatedAt"])
            .await?;
        Ok(user)
    }

    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> UserOperationStatus {
        self.begin();
        let result = match self.auth.sign_in(email, password).await {
            Ok(identity) => self.complete_login(&identity).await,
            Err(err) => Err(err.into()),
        };
        self.finish_login(result, "email")
    }

    /// Federated sign-in through the provider's popup flow.
    #[instrument(skip(self))]
    pub async fn login_with_provider(&self) -> UserOperationStatus {
        self.begin();
        let result = match self.auth.sign_in_with_popup().await {
            Ok(identity) => self.complete_login(&identity).await,
            Err(err) => Err(err.into()),
        };
        self.finish_login(result, "popup")
    }

    async fn complete_login(&self, identity: &AuthIdentity) -> Result<AppUser, StoreError> {
        let user = self
            .try_fetch_profile(&identity.uid)
            .await?
            .ok_or_else(|| StoreError::NotFound("User profile not found".to_string()))?;
        self.documents
            .stamp(USERS_COLLECTION, &user.uid, &["lastLogin", "updatedAt"])
            .await?;
        Ok(user)
    }

    fn finish_login(
        &self,
        result: Result<AppUser, StoreError>,
        method: &str,
    ) -> UserOperationStatus {
        match result {
            Ok(user) => {
                self.analytics.log_event(
                    AnalyticsEvent::UserLogin,
                    EventParams::from([("method", method.to_string())]),
                );
                self.succeed(user)
            }
            Err(err) => self.fail(err, Some("user_login")),
        }
    }

    /// Merge `changes` into the provider profile, the user document and the
    /// in-memory user. Absent fields are left untouched.
    #[instrument(skip(self))]
    pub async fn update_profile(&self, changes: ProfileChanges) -> UserOperationStatus {
        let changes = changes.without_blanks();
        let Some(current) = self.current_user() else {
            return self.fail(StoreError::NotAuthenticated, None);
        };
        self.begin();
        if let Err(err) = self.try_update_profile(&current.uid, &changes).await {
            return self.fail(err, Some("profile_update"));
        }

        let mut status = OperationStatus::Error(StoreError::NotAuthenticated.to_string());
        self.state.update(|state| {
            if let Some(user) = state.current_user.as_mut() {
                user.apply(&changes);
                status = OperationStatus::Success(user.clone());
            }
            state.operation_status = status.clone();
        });
        status
    }

    async fn try_update_profile(&self, uid: &str, changes: &ProfileChanges) -> Result<(), StoreError> {
        self.auth.update_profile(changes).await?;
        if changes.is_empty() {
            return Ok(());
        }
        let mut fields = Document::new();
        if let Some(name) = &changes.display_name {
            fields.insert("displayName".into(), Value::String(name.clone()));
        }
        if let Some(photo) = &changes.photo_url {
            fields.insert("photoURL".into(), Value::String(photo.clone()));
        }
        self.documents.update(USERS_COLLECTION, uid, fields).await?;
        self.documents
            .stamp(USERS_COLLECTION, uid, &["updatedAt"])
            .await?;
        if let Some(name) = &changes.display_name {
            self.analytics.set_user(
                uid,
                EventParams::from([("display_name", name.clone())]),
            );
        }
        Ok(())
    }

    /// Sign out and clear the current user. Provider failures are returned
    /// to the caller and leave the state untouched.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<(), StoreError> {
        if let Err(err) = self.auth.sign_out().await {
            tracing::warn!(%err, "sign out failed");
            self.analytics.capture_error(&err.to_string(), "user_signout");
            return Err(err.into());
        }
        self.state.update(|state| state.current_user = None);
        Ok(())
    }

    fn begin(&self) {
        self.state
            .update(|state| state.operation_status = OperationStatus::Loading);
    }

    fn succeed(&self, user: AppUser) -> UserOperationStatus {
        let status = OperationStatus::Success(user.clone());
        self.state.update(|state| {
            state.current_user = Some(user);
            state.operation_status = status.clone();
        });
        status
    }

    fn fail(&self, err: StoreError, context: Option<&'static str>) -> UserOperationStatus {
        let message = err.user_message();
        match &err {
            StoreError::Invariant(_) => tracing::error!(%err, "user store invariant violated"),
            _ => tracing::warn!(%err, "user operation failed"),
        }
        if let Some(context) = context {
            self.analytics.capture_error(&message, context);
        }
        let status = OperationStatus::Error(message);
        self.state
            .update(|state| state.operation_status = status.clone());
        status
    }
}
