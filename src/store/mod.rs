pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque per-account configuration. Providers pick the keys they need.
pub type ProviderData = serde_json::Map<String, serde_json::Value>;

/// Whether the runner should pick a record up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Disabled = 0,
    Enabled = 1,
}

impl Status {
    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn from_i64(value: i64) -> Self {
        if value == Status::Enabled as i64 {
            Status::Enabled
        } else {
            Status::Disabled
        }
    }
}

/// One stored configuration, keyed by (provider_type, name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRecord {
    pub provider_type: String,
    pub name: String,
    pub data: ProviderData,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no configuration store given (--db / VECTOR_DB)")]
    MissingUrl,

    #[error("store is not connected")]
    NotConnected,

    #[error("provider {provider_type}/{name} already exists")]
    Duplicate { provider_type: String, name: String },

    #[error("store lock poisoned")]
    Poisoned,

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid provider data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),
}

/// Where provider configurations live. The runner only reads; operators write.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Open the underlying connection. Calling it twice is a no-op.
    async fn connect(&self) -> Result<(), StoreError>;
    async fn close(&self) -> Result<(), StoreError>;

    /// Insert a new record; fails if (provider_type, name) exists.
    async fn add(
        &self,
        provider_type: &str,
        name: &str,
        data: &ProviderData,
        status: Status,
    ) -> Result<(), StoreError>;

    /// Insert or update. `created_at` survives updates.
    async fn save(
        &self,
        provider_type: &str,
        name: &str,
        data: &ProviderData,
        status: Status,
    ) -> Result<(), StoreError>;

    /// Enabled records of one type, sorted by name, optionally narrowed to one name.
    async fn get(
        &self,
        provider_type: &str,
        name: Option<&str>,
    ) -> Result<Vec<(String, ProviderData)>, StoreError>;

    async fn record(
        &self,
        provider_type: &str,
        name: &str,
    ) -> Result<Option<ProviderRecord>, StoreError>;

    /// Every record regardless of status, ordered by type then name.
    async fn list(&self, provider_type: Option<&str>) -> Result<Vec<ProviderRecord>, StoreError>;
}
