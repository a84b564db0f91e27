//! `SQLite`-backed document store.
//!
//! Notes live in a single `notes` table. Writes are stamped with a commit
//! time that never goes backwards, and every committed change is announced on
//! a broadcast channel keyed by owner so live subscriptions can re-run their
//! query.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{migrations, policy, DocumentStore, NoteQuery, NoteSubscription, StoreError, StoreResult};
use crate::error::{Error, Result};
use crate::note::{NewNote, Note, NoteId, OwnerId, ServerTimestamp};
use crate::session::Session;

/// How long a write waits on another connection's lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Note store backed by a single `SQLite` connection.
///
/// The handle is cheap to clone; clones share the connection and the change
/// channel, so one store should be opened per process and shared.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    /// Path to the database file.
    path: PathBuf,
    /// Connection plus the last commit stamp handed out.
    db: Mutex<Db>,
    /// Owners whose notes changed.
    changes: broadcast::Sender<OwnerId>,
}

#[derive(Debug)]
struct Db {
    conn: Connection,
    last_stamp_us: i64,
}

impl SqliteStore {
    /// Open or create a store database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>, change_buffer: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        // WAL keeps readers from blocking the writer
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(StoreError::from)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(StoreError::from)?;

        let store = Self::from_connection(path.clone(), conn, change_buffer)?;
        info!("Database opened successfully at {}", path.display());
        Ok(store)
    }

    /// Create an in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory(change_buffer: usize) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        Self::from_connection(PathBuf::from(":memory:"), conn, change_buffer)
    }

    fn from_connection(path: PathBuf, conn: Connection, change_buffer: usize) -> Result<Self> {
        migrations::initialize_schema(&conn)?;

        let last_stamp_us: i64 = conn
            .query_row("SELECT COALESCE(MAX(created_at), 0) FROM notes", [], |row| {
                row.get(0)
            })
            .map_err(StoreError::from)?;

        let (changes, _) = broadcast::channel(change_buffer.max(1));
        Ok(Self {
            inner: Arc::new(Inner {
                path,
                db: Mutex::new(Db {
                    conn,
                    last_stamp_us,
                }),
                changes,
            }),
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Db>> {
        self.inner
            .db
            .lock()
            .map_err(|_| StoreError::unavailable("store connection lock poisoned"))
    }

    /// Run database work on the blocking pool.
    ///
    /// rusqlite calls block their thread, including while waiting on another
    /// connection's lock, so they must stay off the async executor for caller
    /// timeouts to fire.
    async fn run_blocking<T, F>(&self, work: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Self) -> StoreResult<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || work(&store))
            .await
            .map_err(|e| StoreError::unavailable(format!("store task failed: {e}")))?
    }

    async fn read_notes(&self, query: NoteQuery) -> StoreResult<Vec<Note>> {
        self.run_blocking(move |store| store.select_notes(&query)).await
    }

    fn announce(&self, owner: &OwnerId) {
        // No receivers just means nobody is subscribed
        let receivers = self.inner.changes.send(owner.clone()).unwrap_or(0);
        debug!(owner = %owner, receivers, "Announced note change");
    }

    fn insert_note(&self, draft: NewNote) -> StoreResult<Note> {
        let note = {
            let mut db = self.lock()?;
            let stamp = Utc::now().timestamp_micros().max(db.last_stamp_us);

            db.conn
                .execute(
                    "INSERT INTO notes (owner_id, text, created_at) VALUES (?1, ?2, ?3)",
                    params![draft.owner.as_str(), draft.text.as_str(), stamp],
                )
                .map_err(write_error)?;
            let id = db.conn.last_insert_rowid();
            db.last_stamp_us = stamp;

            Note {
                id: NoteId::new(id),
                text: String::from(draft.text),
                owner: draft.owner,
                created_at: timestamp_from_micros(Some(stamp)),
            }
        };

        debug!(id = %note.id, owner = %note.owner, "Inserted note");
        self.announce(&note.owner);
        Ok(note)
    }

    fn remove_note(&self, caller: &Session, id: NoteId) -> StoreResult<()> {
        {
            let db = self.lock()?;
            let owner: Option<String> = db
                .conn
                .query_row(
                    "SELECT owner_id FROM notes WHERE id = ?1",
                    [id.get()],
                    |row| row.get(0),
                )
                .optional()?;

            let owner = OwnerId::new(owner.ok_or(StoreError::NotFound { id })?);
            policy::authorize_delete(caller, &owner)?;

            db.conn.execute("DELETE FROM notes WHERE id = ?1", [id.get()])?;
        }

        debug!(id = %id, owner = %caller.uid, "Deleted note");
        self.announce(&caller.uid);
        Ok(())
    }

    fn select_notes(&self, query: &NoteQuery) -> StoreResult<Vec<Note>> {
        let db = self.lock()?;
        let mut stmt = db.conn.prepare_cached(
            r"
            SELECT id, owner_id, text, created_at
            FROM notes WHERE owner_id = ?1
            ORDER BY created_at IS NULL DESC, created_at DESC, id DESC
            LIMIT ?2
            ",
        )?;

        // A negative LIMIT means no limit in SQLite
        let limit = query
            .limit
            .map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
        let notes = stmt
            .query_map(params![query.owner.as_str(), limit], Self::row_to_note)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        debug_assert!(notes
            .windows(2)
            .all(|w| Note::newest_first(&w[0], &w[1]).is_le()));
        Ok(notes)
    }

    /// Count total notes in storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count(&self) -> StoreResult<i64> {
        let db = self.lock()?;
        let count: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> StoreResult<StoreStats> {
        let (total_notes, owners, newest) = {
            let db = self.lock()?;
            db.conn.query_row(
                "SELECT COUNT(*), COUNT(DISTINCT owner_id), MAX(created_at) FROM notes",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                    ))
                },
            )?
        };

        let db_size_bytes = if self.inner.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.inner.path)
                .map(|m| m.len())
                .unwrap_or(0)
        };

        Ok(StoreStats {
            total_notes,
            owners,
            newest_note: newest.and_then(DateTime::<Utc>::from_timestamp_micros),
            db_size_bytes,
        })
    }

    /// Convert a database row to a Note struct.
    fn row_to_note(row: &rusqlite::Row) -> rusqlite::Result<Note> {
        let id: i64 = row.get(0)?;
        let owner: String = row.get(1)?;
        let text: String = row.get(2)?;
        let created_at: Option<i64> = row.get(3)?;

        Ok(Note {
            id: NoteId::new(id),
            text,
            owner: OwnerId::new(owner),
            created_at: timestamp_from_micros(created_at),
        })
    }
}

/// Check a draft before it reaches the database.
fn validate_draft(draft: &NewNote) -> StoreResult<()> {
    if draft.owner.as_str().trim().is_empty() {
        return Err(StoreError::InvalidDocument("owner id is empty".to_string()));
    }
    Ok(())
}

/// Map a failed write, reporting rejected rows as invalid documents.
fn write_error(err: rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(failure, message)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            StoreError::InvalidDocument(message.unwrap_or_else(|| failure.to_string()))
        }
        other => StoreError::Database(other),
    }
}

fn timestamp_from_micros(micros: Option<i64>) -> ServerTimestamp {
    match micros {
        None => ServerTimestamp::Pending,
        Some(us) => match DateTime::<Utc>::from_timestamp_micros(us) {
            Some(at) => ServerTimestamp::Committed(at),
            None => {
                warn!(created_at = us, "Out-of-range commit time, treating as pending");
                ServerTimestamp::Pending
            }
        },
    }
}

#[async_trait::async_trait]
impl DocumentStore for SqliteStore {
    async fn add(&self, caller: &Session, draft: NewNote) -> StoreResult<Note> {
        policy::authorize_create(caller, &draft)?;
        validate_draft(&draft)?;
        self.run_blocking(move |store| store.insert_note(draft)).await
    }

    async fn delete(&self, caller: &Session, id: NoteId) -> StoreResult<()> {
        let caller = caller.clone();
        self.run_blocking(move |store| store.remove_note(&caller, id)).await
    }

    async fn query(&self, caller: &Session, query: &NoteQuery) -> StoreResult<Vec<Note>> {
        policy::authorize_read(caller, &query.owner)?;
        self.read_notes(query.clone()).await
    }

    async fn subscribe(
        &self,
        caller: &Session,
        query: NoteQuery,
    ) -> StoreResult<Box<dyn NoteSubscription>> {
        policy::authorize_read(caller, &query.owner)?;

        // Register for changes before the first read so nothing slips between them
        let changes = self.inner.changes.subscribe();
        debug!(owner = %query.owner, "Opened live query");
        Ok(Box::new(SqliteSubscription {
            store: self.clone(),
            query,
            changes,
            stale: true,
        }))
    }
}

/// Live query over a [`SqliteStore`].
#[derive(Debug)]
struct SqliteSubscription {
    store: SqliteStore,
    query: NoteQuery,
    changes: broadcast::Receiver<OwnerId>,
    /// A change arrived that the last snapshot does not reflect.
    stale: bool,
}

#[async_trait::async_trait]
impl NoteSubscription for SqliteSubscription {
    async fn next_snapshot(&mut self) -> Option<StoreResult<Vec<Note>>> {
        while !self.stale {
            match self.changes.recv().await {
                Ok(owner) if owner == self.query.owner => self.stale = true,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(owner = %self.query.owner, skipped, "Live query lagged, resyncing");
                    self.stale = true;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }

        // Cleared only after the read lands, so a cancelled call re-reads
        let snapshot = self.store.read_notes(self.query.clone()).await;
        self.stale = false;
        Some(snapshot)
    }
}

impl Drop for SqliteSubscription {
    fn drop(&mut self) {
        debug!(owner = %self.query.owner, "Closed live query");
    }
}

/// Statistics about the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Total number of notes stored.
    pub total_notes: i64,
    /// Number of distinct owners.
    pub owners: i64,
    /// Commit time of the newest note.
    pub newest_note: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}
