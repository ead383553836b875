use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use habit_domain::memory::{MemoryAuthProvider, MemoryDocumentStore};
use habit_domain::schedule::{self, TodayHabit};
use habit_domain::storage::{HABITS_COLLECTION, USERS_COLLECTION};
use habit_domain::{OperationStatus, RootStore};
use serde_json::Value;
use tracing::{debug, info, warn};

pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub(crate) seed: Option<PathBuf>,
    pub(crate) credentials: Option<Credentials>,
    pub(crate) log_filter: String,
    pub(crate) today: Option<NaiveDate>,
    /// Settings that were present but unusable, reported once logging is up.
    pub(crate) ignored: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self::from_lookup(|key| std::env::var(key).ok()))
    }

    /// Build from any key lookup. Unparseable values are ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(seed) = lookup("HABIT_SEED").filter(|value| !value.trim().is_empty()) {
            config.seed = Some(PathBuf::from(seed));
        }
        if let (Some(email), Some(password)) =
            (lookup("HABIT_USER_EMAIL"), lookup("HABIT_USER_PASSWORD"))
        {
            config.credentials = Some(Credentials {
                email: email.trim().to_string(),
                password,
                display_name: lookup("HABIT_USER_NAME").filter(|name| !name.trim().is_empty()),
            });
        }
        if let Some(filter) = lookup("HABIT_LOG").filter(|value| !value.trim().is_empty()) {
            config.log_filter = filter;
        }
        if let Some(today) = lookup("HABIT_TODAY") {
            match NaiveDate::parse_from_str(today.trim(), schedule::DATE_KEY_FORMAT) {
                Ok(date) => config.today = Some(date),
                Err(err) => config
                    .ignored
                    .push(format!("HABIT_TODAY={today:?}: {err}")),
            }
        }
        config
    }

    /// Log every setting `from_lookup` had to ignore. Call after the
    /// subscriber is installed.
    pub fn report_ignored(&self) {
        for setting in &self.ignored {
            warn!(%setting, "ignoring unusable setting");
        }
    }

    pub fn ignored(&self) -> &[String] {
        &self.ignored
    }

    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    pub fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(schedule::local_today)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            seed: None,
            credentials: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            today: None,
            ignored: Vec::new(),
        }
    }
}

/// Load a seed file of the form `{ "habits": { "<id>": {...} }, "users": {...} }`
/// into `documents`. Returns the number of documents inserted.
pub fn load_seed(documents: &MemoryDocumentStore, path: &Path) -> Result<usize> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading seed file {}", path.display()))?;
    let root: Value = serde_json::from_str(&text)
        .with_context(|| format!("parsing seed file {}", path.display()))?;
    let Value::Object(collections) = root else {
        bail!("seed file {} is not a JSON object", path.display());
    };

    let mut inserted = 0;
    for collection in [HABITS_COLLECTION, USERS_COLLECTION] {
        let Some(entries) = collections.get(collection) else {
            continue;
        };
        let entries = entries
            .as_object()
            .ok_or_else(|| anyhow!("seed collection `{collection}` is not an object"))?;
        for (id, data) in entries {
            match data {
                Value::Object(map) => {
                    documents.insert(collection, id.clone(), map.clone());
                    inserted += 1;
                }
                _ => warn!(%collection, %id, "skipping non-object seed document"),
            }
        }
    }
    debug!(inserted, "seed loaded");
    Ok(inserted)
}

pub fn render_today(today: NaiveDate, habits: &[TodayHabit]) -> String {
    let mut out = format!("{}\n", schedule::date_key(today));
    if habits.is_empty() {
        out.push_str("  nothing scheduled\n");
    }
    for item in habits {
        let mark = if item.completed { 'x' } else { ' ' };
        out.push_str(&format!(
            "  [{mark}] {} ({}, {})\n",
            item.habit.title, item.habit.category, item.habit.target_frequency
        ));
    }
    out
}

pub async fn run(config: AppConfig) -> Result<String> {
    let documents = Arc::new(MemoryDocumentStore::new());
    if let Some(seed) = &config.seed {
        load_seed(&documents, seed)?;
    }
    let auth = Arc::new(MemoryAuthProvider::new());
    let store = RootStore::builder()
        .with_documents(documents.clone())
        .with_auth(auth.clone())
        .build()?;
    let listener = store.start_session_listener();
    auth.resolve(None);

    store.track_page_view("/today");
    store.habits.load_all().await;
    if let Some(err) = store.habits.snapshot().all_habits_error {
        warn!(%err, "library unavailable");
    }

    let Some(credentials) = &config.credentials else {
        info!(
            count = store.habits.all_habits().len(),
            "no user configured; showing library only"
        );
        listener.abort();
        return Ok(format!(
            "{} habits in the library\n",
            store.habits.all_habits().len()
        ));
    };

    sign_in(&store, credentials).await?;
    store.refresh_user_habits().await;

    let today = config.today();
    let rendered = render_today(today, &store.today_habits(today));
    listener.abort();
    Ok(rendered)
}

/// Log in, registering the account first when the provider does not know it.
async fn sign_in(store: &RootStore, credentials: &Credentials) -> Result<()> {
    let login_error = match store
        .user
        .login(&credentials.email, &credentials.password)
        .await
    {
        OperationStatus::Success(user) => {
            info!(uid = %user.uid, "signed in");
            return Ok(());
        }
        OperationStatus::Error(message) => message,
        OperationStatus::Idle | OperationStatus::Loading => String::new(),
    };
    debug!(%login_error, "login failed, trying to register");

    let display_name = credentials
        .display_name
        .clone()
        .unwrap_or_else(|| credentials.email.clone());
    match store
        .user
        .sign_up(&credentials.email, &credentials.password, &display_name)
        .await
    {
        OperationStatus::Success(user) => {
            info!(uid = %user.uid, "registered new account");
            Ok(())
        }
        OperationStatus::Error(message) => Err(anyhow!(
            "sign in failed: {login_error}; sign up failed: {message}"
        )),
        OperationStatus::Idle | OperationStatus::Loading => {
            Err(anyhow!("sign in did not complete"))
        }
    }
}
