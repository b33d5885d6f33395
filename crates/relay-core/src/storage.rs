//! Per-user settings persistence.
//!
//! One JSON document per user holds the model choice, chat mode, custom
//! models, expense ledger and a capped chat history.

use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::{domain::UserId, errors::Error, Result};

/// Most recent history entries kept per user.
pub const HISTORY_LIMIT: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    WithHistory,
    WithoutHistory,
}

impl ChatMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatMode::WithHistory => "with_history",
            ChatMode::WithoutHistory => "without_history",
        }
    }
}

impl fmt::Display for ChatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "with_history" => Ok(ChatMode::WithHistory),
            "without_history" => Ok(ChatMode::WithoutHistory),
            other => Err(Error::Validation(format!(
                "Invalid mode '{other}'. Use 'with_history' or 'without_history'"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// One completed request, as billed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub user_id: i64,
    pub current_model: String,
    pub chat_mode: ChatMode,
    #[serde(default)]
    pub custom_models: Vec<String>,
    #[serde(default)]
    pub total_expenses: f64,
    #[serde(default)]
    pub expense_history: Vec<ExpenseRecord>,
    #[serde(default)]
    pub chat_history: Vec<HistoryEntry>,
    pub last_updated: DateTime<Utc>,
}

impl UserSettings {
    pub fn new(user: UserId, model: impl Into<String>, chat_mode: ChatMode) -> Self {
        Self {
            user_id: user.0,
            current_model: model.into(),
            chat_mode,
            custom_models: Vec::new(),
            total_expenses: 0.0,
            expense_history: Vec::new(),
            chat_history: Vec::new(),
            last_updated: Utc::now(),
        }
    }

    /// Append a record and keep the running total in step with the ledger.
    pub fn push_expense(&mut self, mut record: ExpenseRecord) {
        if !record.cost.is_finite() || record.cost < 0.0 {
            record.cost = 0.0;
        }
        self.total_expenses += record.cost;
        self.expense_history.push(record);
    }

    pub fn push_history(&mut self, role: Role, content: impl Into<String>) {
        self.chat_history.push(HistoryEntry {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        });
        if self.chat_history.len() > HISTORY_LIMIT {
            let excess = self.chat_history.len() - HISTORY_LIMIT;
            self.chat_history.drain(..excess);
        }
    }
}

/// Settings persistence port.
///
/// Implementations must serialize `update` per user; the provided helpers all
/// go through it.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Stored settings, or fresh defaults for an unknown user.
    async fn load(&self, user: UserId) -> Result<UserSettings>;

    async fn save(&self, settings: &UserSettings) -> Result<()>;

    /// Atomic read-modify-write of one user's settings.
    ///
    /// The mutator may reject the change with an error; nothing is written then.
    async fn update(
        &self,
        user: UserId,
        mutator: &mut (dyn for<'s> FnMut(&'s mut UserSettings) -> Result<()> + Send),
    ) -> Result<UserSettings>;

    async fn add_expense(&self, user: UserId, record: ExpenseRecord) -> Result<()> {
        let mut record = Some(record);
        self.update(user, &mut |s| {
            if let Some(r) = record.take() {
                s.push_expense(r);
            }
            Ok(())
        })
        .await?;
        Ok(())
    }

    async fn total_expenses(&self, user: UserId) -> Result<f64> {
        Ok(self.load(user).await?.total_expenses)
    }

    async fn add_history_entry(&self, user: UserId, role: Role, content: &str) -> Result<()> {
        self.update(user, &mut |s| {
            s.push_history(role, content);
            Ok(())
        })
        .await?;
        Ok(())
    }

    async fn chat_history(&self, user: UserId) -> Result<Vec<HistoryEntry>> {
        Ok(self.load(user).await?.chat_history)
    }

    async fn clear_chat_history(&self, user: UserId) -> Result<()> {
        self.update(user, &mut |s| {
            s.chat_history.clear();
            Ok(())
        })
        .await?;
        Ok(())
    }

    async fn set_model(&self, user: UserId, model: &str) -> Result<()> {
        self.update(user, &mut |s| {
            s.current_model = model.to_string();
            Ok(())
        })
        .await?;
        Ok(())
    }

    async fn set_chat_mode(&self, user: UserId, mode: ChatMode) -> Result<()> {
        self.update(user, &mut |s| {
            s.chat_mode = mode;
            Ok(())
        })
        .await?;
        Ok(())
    }

    async fn add_custom_model(&self, user: UserId, model: &str) -> Result<()> {
        self.update(user, &mut |s| {
            if s.custom_models.iter().any(|m| m == model) {
                return Err(Error::Validation(format!("model {model} already exists")));
            }
            s.custom_models.push(model.to_string());
            Ok(())
        })
        .await?;
        Ok(())
    }
}

#[derive(Default)]
struct UserLocks {
    inner: Mutex<HashMap<i64, Arc<RwLock<()>>>>,
}

impl UserLocks {
    async fn get(&self, user: UserId) -> Arc<RwLock<()>> {
        let mut map = self.inner.lock().await;
        map.entry(user.0)
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    async fn read(&self, user: UserId) -> OwnedRwLockReadGuard<()> {
        self.get(user).await.read_owned().await
    }

    async fn write(&self, user: UserId) -> OwnedRwLockWriteGuard<()> {
        self.get(user).await.write_owned().await
    }
}

/// JSON-file store: `<data_dir>/user_<id>.json`.
pub struct FileStore {
    data_dir: PathBuf,
    default_model: String,
    default_chat_mode: ChatMode,
    locks: UserLocks,
}

impl FileStore {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        default_model: impl Into<String>,
        default_chat_mode: ChatMode,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            default_model: default_model.into(),
            default_chat_mode,
            locks: UserLocks::default(),
        }
    }

    fn path_for(&self, user_id: i64) -> PathBuf {
        self.data_dir.join(format!("user_{user_id}.json"))
    }

    async fn read_unlocked(&self, user: UserId) -> Result<UserSettings> {
        let path = self.path_for(user.0);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(UserSettings::new(
                    user,
                    self.default_model.clone(),
                    self.default_chat_mode,
                ));
            }
            Err(e) => {
                return Err(Error::Persistence(format!(
                    "failed to read {}: {e}",
                    path.display()
                )))
            }
        };

        serde_json::from_slice(&bytes).map_err(|e| {
            Error::Persistence(format!("failed to parse {}: {e}", path.display()))
        })
    }

    async fn write_unlocked(&self, settings: &UserSettings) -> Result<()> {
        let path = self.path_for(settings.user_id);
        let data = serde_json::to_vec_pretty(settings)?;
        write_atomic(&path, &data)
            .await
            .map_err(|e| Error::Persistence(format!("failed to write {}: {e}", path.display())))
    }
}

async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await
}

#[async_trait]
impl SettingsStore for FileStore {
    async fn load(&self, user: UserId) -> Result<UserSettings> {
        let _guard = self.locks.read(user).await;
        self.read_unlocked(user).await
    }

    async fn save(&self, settings: &UserSettings) -> Result<()> {
        let _guard = self.locks.write(UserId(settings.user_id)).await;
        let mut settings = settings.clone();
        settings.last_updated = Utc::now();
        self.write_unlocked(&settings).await
    }

    async fn update(
        &self,
        user: UserId,
        mutator: &mut (dyn for<'s> FnMut(&'s mut UserSettings) -> Result<()> + Send),
    ) -> Result<UserSettings> {
        let _guard = self.locks.write(user).await;
        let mut settings = self.read_unlocked(user).await?;
        mutator(&mut settings)?;
        settings.last_updated = Utc::now();
        self.write_unlocked(&settings).await?;
        Ok(settings)
    }
}
