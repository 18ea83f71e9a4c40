//! Event Store - SQLite-backed append-only event log
//!
//! Events are stored with their property bag as JSON text and creation time
//! as Unix milliseconds. A composite index on `(type, created_at)` serves the
//! classifier's single bounded query.

use crate::events::{EventRow, EventStoreError, EventStoreResult, EventType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, types::Value as SqlValue, Connection, OpenFlags};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Query seam between the event log and its readers
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Events whose type is in `types` and that were created at or after
    /// `since`, newest first, at most `limit` rows.
    async fn query(
        &self,
        types: &[EventType],
        since: DateTime<Utc>,
        limit: usize,
    ) -> EventStoreResult<Vec<EventRow>>;

    /// Append an event, returning its row id
    async fn record(&self, event: &EventRow) -> EventStoreResult<i64>;

    /// Check that the log is reachable
    async fn health_check(&self) -> EventStoreResult<()>;
}

/// SQLite-backed event log
///
/// rusqlite calls block, so the async methods run them on tokio's blocking
/// pool; async workers never wait on the connection mutex.
pub struct SqliteEventStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteEventStore {
    /// Create or open an event log at `path`
    pub fn open(path: &Path) -> EventStoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        Self::from_connection(conn)
    }

    /// Create a throwaway in-memory event log
    pub fn open_in_memory() -> EventStoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> EventStoreResult<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                type TEXT NOT NULL,
                properties TEXT,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_events_type_created ON events(type, created_at)",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> EventStoreResult<T>,
    ) -> EventStoreResult<T> {
        lock_and_run(&self.conn, f)
    }

    /// Run `f` against the connection on the blocking thread pool
    async fn run_blocking<T, F>(&self, f: F) -> EventStoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> EventStoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || lock_and_run(&conn, f))
            .await
            .map_err(|e| EventStoreError::Task(e.to_string()))?
    }

    async fn query_rows(
        &self,
        types: &[EventType],
        since: DateTime<Utc>,
        limit: usize,
    ) -> EventStoreResult<Vec<EventRow>> {
        if types.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; types.len()].join(", ");
        let sql = format!(
            "SELECT type, properties, created_at FROM events
             WHERE type IN ({}) AND created_at >= ?
             ORDER BY created_at DESC, id DESC
             LIMIT ?",
            placeholders
        );

        let mut values: Vec<SqlValue> = types
            .iter()
            .map(|t| SqlValue::Text(t.as_str().to_string()))
            .collect();
        values.push(SqlValue::Integer(since.timestamp_millis()));
        values.push(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));

        self.run_blocking(move |conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt.query_map(params_from_iter(values), |row| {
                let event_type: String = row.get(0)?;
                let properties: Option<String> = row.get(1)?;
                let created_at: i64 = row.get(2)?;
                Ok((event_type, properties, created_at))
            })?;

            let mut events = Vec::new();
            for row in rows {
                let (event_type, properties, created_at) = row?;
                // Unparseable bags are kept as null so readers ignore them
                let properties = properties.and_then(|p| serde_json::from_str(&p).ok());
                let created_at =
                    DateTime::<Utc>::from_timestamp_millis(created_at).unwrap_or_default();
                events.push(EventRow {
                    event_type,
                    properties,
                    created_at,
                });
            }
            Ok(events)
        })
        .await
    }

    async fn insert(&self, event: &EventRow) -> EventStoreResult<i64> {
        if event.event_type.trim().is_empty() {
            return Err(EventStoreError::InvalidEvent(
                "event type must not be empty".to_string(),
            ));
        }

        let properties = match &event.properties {
            Some(p) => Some(serde_json::to_string(p)?),
            None => None,
        };

        let event_type = event.event_type.clone();
        let created_at = event.created_at.timestamp_millis();

        self.run_blocking(move |conn| {
            conn.execute(
                "INSERT INTO events (type, properties, created_at) VALUES (?, ?, ?)",
                params![event_type, properties, created_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Total number of stored events
    pub fn count(&self) -> EventStoreResult<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
            Ok(n as u64)
        })
    }
}

fn lock_and_run<T>(
    conn: &Mutex<Connection>,
    f: impl FnOnce(&Connection) -> EventStoreResult<T>,
) -> EventStoreResult<T> {
    let conn = conn
        .lock()
        .map_err(|e| EventStoreError::Lock(e.to_string()))?;
    f(&conn)
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn query(
        &self,
        types: &[EventType],
        since: DateTime<Utc>,
        limit: usize,
    ) -> EventStoreResult<Vec<EventRow>> {
        self.query_rows(types, since, limit).await
    }

    async fn record(&self, event: &EventRow) -> EventStoreResult<i64> {
        self.insert(event).await
    }

    async fn health_check(&self) -> EventStoreResult<()> {
        self.run_blocking(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(())
        })
        .await
    }
}
