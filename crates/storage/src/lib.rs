use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

use shared::domain::{Lobby, LobbyId};

mod subscription;

pub use subscription::LobbySubscription;

/// Updates buffered per watched lobby before a slow subscriber lags out.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("lobby {lobby_id} was modified concurrently (expected version {expected:?})")]
    Conflict {
        lobby_id: LobbyId,
        expected: Option<u64>,
    },
    #[error("lobby {0} does not exist")]
    Missing(LobbyId),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to encode lobby document: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("subscription fell behind by {0} updates")]
    Lagged(u64),
    #[error("subscription closed")]
    Closed,
}

/// Document-store contract the lobby service is written against.
#[async_trait]
pub trait LobbyStore: Send + Sync {
    /// Current snapshot, or `None` when no document exists under `lobby_id`.
    async fn read_lobby(&self, lobby_id: &LobbyId) -> Result<Option<Lobby>, StoreError>;

    /// Replaces the document iff the stored version equals `base_version`.
    /// `None` creates the document and fails if one already exists.
    async fn write_lobby(&self, lobby: &Lobby, base_version: Option<u64>)
        -> Result<(), StoreError>;

    /// Streams the current snapshot followed by every committed update.
    async fn subscribe(&self, lobby_id: &LobbyId) -> Result<LobbySubscription, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
    channels: Arc<Mutex<HashMap<LobbyId, broadcast::Sender<Lobby>>>>,
    event_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct LobbySummary {
    pub lobby_id: LobbyId,
    pub host: String,
    pub participant_count: usize,
    pub is_voting_started: bool,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::with_event_capacity(database_url, DEFAULT_EVENT_CAPACITY).await
    }

    pub async fn with_event_capacity(database_url: &str, event_capacity: usize) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every connection to `sqlite::memory:` opens its own empty database.
        let max_connections = if database_url.starts_with("sqlite::memory:") {
            1
        } else {
            5
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self {
            pool,
            channels: Arc::default(),
            event_capacity: event_capacity.max(1),
        })
    }

    pub async fn list_lobbies(&self) -> Result<Vec<LobbySummary>> {
        let rows =
            sqlx::query("SELECT document, updated_at FROM lobbies ORDER BY updated_at DESC, id ASC")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|r| -> Result<LobbySummary> {
                let lobby: Lobby = serde_json::from_str(&r.get::<String, _>(0))
                    .context("stored lobby document is not valid JSON")?;
                Ok(LobbySummary {
                    participant_count: lobby.participants.len(),
                    is_voting_started: lobby.is_voting_started,
                    version: lobby.version,
                    host: lobby.host,
                    lobby_id: lobby.id,
                    updated_at: r.get::<DateTime<Utc>, _>(1),
                })
            })
            .collect()
    }

    async fn lobby_exists(&self, lobby_id: &LobbyId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM lobbies WHERE id = ?")
            .bind(lobby_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl LobbyStore for Storage {
    async fn read_lobby(&self, lobby_id: &LobbyId) -> Result<Option<Lobby>, StoreError> {
        let row = sqlx::query("SELECT document FROM lobbies WHERE id = ?")
            .bind(lobby_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(r) => Ok(Some(serde_json::from_str(&r.get::<String, _>(0))?)),
            None => Ok(None),
        }
    }

    async fn write_lobby(
        &self,
        lobby: &Lobby,
        base_version: Option<u64>,
    ) -> Result<(), StoreError> {
        let document = serde_json::to_string(lobby)?;
        let version = i64::try_from(lobby.version).unwrap_or(i64::MAX);
        let now = Utc::now();

        let affected = match base_version {
            None => sqlx::query(
                "INSERT INTO lobbies (id, host, version, document, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO NOTHING",
            )
            .bind(lobby.id.as_str())
            .bind(&lobby.host)
            .bind(version)
            .bind(&document)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected(),
            Some(base) => sqlx::query(
                "UPDATE lobbies SET host = ?, version = ?, document = ?, updated_at = ?
                 WHERE id = ? AND version = ?",
            )
            .bind(&lobby.host)
            .bind(version)
            .bind(&document)
            .bind(now)
            .bind(lobby.id.as_str())
            .bind(i64::try_from(base).unwrap_or(i64::MAX))
            .execute(&self.pool)
            .await?
            .rows_affected(),
        };

        if affected == 0 {
            if base_version.is_some() && !self.lobby_exists(&lobby.id).await? {
                return Err(StoreError::Missing(lobby.id.clone()));
            }
            return Err(StoreError::Conflict {
                lobby_id: lobby.id.clone(),
                expected: base_version,
            });
        }

        debug!(lobby_id = %lobby.id, version = lobby.version, "lobby document written");
        let mut channels = self.channels.lock().await;
        if let Some(sender) = channels.get(&lobby.id) {
            if sender.send(lobby.clone()).is_err() {
                // Last watcher is gone.
                channels.remove(&lobby.id);
            }
        }
        Ok(())
    }

    async fn subscribe(&self, lobby_id: &LobbyId) -> Result<LobbySubscription, StoreError> {
        // Subscribe before reading so no commit can slip between the two.
        let receiver = {
            let mut channels = self.channels.lock().await;
            channels.retain(|_, sender| sender.receiver_count() > 0);
            channels
                .entry(lobby_id.clone())
                .or_insert_with(|| broadcast::channel(self.event_capacity).0)
                .subscribe()
        };
        let initial = self.read_lobby(lobby_id).await?;
        Ok(LobbySubscription::new(lobby_id.clone(), initial, receiver))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
