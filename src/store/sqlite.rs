use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use std::sync::Mutex;
use tracing::debug;

use super::{ConfigStore, ProviderData, ProviderRecord, Status, StoreError};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS providers (
    provider_type TEXT NOT NULL,
    name          TEXT NOT NULL,
    data          TEXT NOT NULL,
    status        INTEGER NOT NULL DEFAULT 1,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    PRIMARY KEY (provider_type, name)
)";

const SELECT_RECORD: &str =
    "SELECT provider_type, name, data, status, created_at, updated_at FROM providers";

/// SQLite-backed configuration store.
///
/// The connection string is a database path. The handle starts closed;
/// [`connect`](ConfigStore::connect) opens it and [`close`](ConfigStore::close)
/// drops it again.
pub struct SqliteStore {
    url: String,
    conn: Mutex<Option<Connection>>,
}

impl SqliteStore {
    pub fn new(url: impl Into<String>) -> Result<Self, StoreError> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(StoreError::MissingUrl);
        }
        Ok(Self {
            url,
            conn: Mutex::new(None),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.conn.lock().map(|c| c.is_some()).unwrap_or(false)
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let guard = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let conn = guard.as_ref().ok_or(StoreError::NotConnected)?;
        f(conn)
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

/// Raw column values; decoding JSON and timestamps happens outside rusqlite's closure.
struct RawRecord {
    provider_type: String,
    name: String,
    data: String,
    status: i64,
    created_at: String,
    updated_at: String,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            provider_type: row.get(0)?,
            name: row.get(1)?,
            data: row.get(2)?,
            status: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn decode(self) -> Result<ProviderRecord, StoreError> {
        Ok(ProviderRecord {
            provider_type: self.provider_type,
            name: self.name,
            data: serde_json::from_str(&self.data)?,
            status: Status::from_i64(self.status),
            created_at: parse_time(&self.created_at)?,
            updated_at: parse_time(&self.updated_at)?,
        })
    }
}

#[async_trait]
impl ConfigStore for SqliteStore {
    async fn connect(&self) -> Result<(), StoreError> {
        let mut guard = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        if guard.is_some() {
            return Ok(());
        }
        let conn = Connection::open(&self.url)?;
        conn.execute_batch(SCHEMA)?;
        debug!("connected to store {}", self.url);
        *guard = Some(conn);
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        let mut guard = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| StoreError::Sqlite(e))?;
            debug!("closed store {}", self.url);
        }
        Ok(())
    }

    async fn add(
        &self,
        provider_type: &str,
        name: &str,
        data: &ProviderData,
        status: Status,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(data)?;
        self.with_conn(|conn| {
            let ts = now();
            let inserted = conn.execute(
                "INSERT INTO providers (provider_type, name, data, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![provider_type, name, json, status.as_i64(), ts],
            );
            match inserted {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    Err(StoreError::Duplicate {
                        provider_type: provider_type.to_string(),
                        name: name.to_string(),
                    })
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    async fn save(
        &self,
        provider_type: &str,
        name: &str,
        data: &ProviderData,
        status: Status,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(data)?;
        self.with_conn(|conn| {
            let ts = now();
            conn.execute(
                "INSERT INTO providers (provider_type, name, data, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT(provider_type, name) DO UPDATE SET
                    data = excluded.data,
                    status = excluded.status,
                    updated_at = excluded.updated_at",
                params![provider_type, name, json, status.as_i64(), ts],
            )?;
            Ok(())
        })
    }

    async fn get(
        &self,
        provider_type: &str,
        name: Option<&str>,
    ) -> Result<Vec<(String, ProviderData)>, StoreError> {
        // An empty filter means "all names".
        let name = name.filter(|n| !n.is_empty());
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name, data FROM providers
                 WHERE provider_type = ?1 AND status = ?2 AND (?3 IS NULL OR name = ?3)
                 ORDER BY name ASC",
            )?;
            let rows = stmt
                .query_map(
                    params![provider_type, Status::Enabled.as_i64(), name],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        rows.into_iter()
            .map(|(name, json)| -> Result<_, StoreError> {
                Ok((name, serde_json::from_str(&json)?))
            })
            .collect()
    }

    async fn record(
        &self,
        provider_type: &str,
        name: &str,
    ) -> Result<Option<ProviderRecord>, StoreError> {
        let raw = self.with_conn(|conn| {
            let sql = format!("{SELECT_RECORD} WHERE provider_type = ?1 AND name = ?2");
            Ok(conn
                .query_row(&sql, params![provider_type, name], RawRecord::from_row)
                .optional()?)
        })?;
        raw.map(RawRecord::decode).transpose()
    }

    async fn list(&self, provider_type: Option<&str>) -> Result<Vec<ProviderRecord>, StoreError> {
        let raws = self.with_conn(|conn| {
            let sql = format!(
                "{SELECT_RECORD} WHERE (?1 IS NULL OR provider_type = ?1)
                 ORDER BY provider_type ASC, name ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let raws = stmt
                .query_map(params![provider_type], RawRecord::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(raws)
        })?;
        raws.into_iter().map(RawRecord::decode).collect()
    }
}
