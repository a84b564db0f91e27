//! Shared helpers for unit tests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::logging::init_test_logging;
use crate::note::{NewNote, Note, NoteId};
use crate::session::Session;
use crate::store::{
    DocumentStore, NoteQuery, NoteSubscription, SqliteStore, StoreError, StoreResult,
};

/// How long a test waits for an asynchronous state before failing.
pub(crate) const WAIT: Duration = Duration::from_secs(2);

/// Wait until the watched value satisfies `pred`, then return a copy of it.
pub(crate) async fn wait_for_state<T: Clone>(
    rx: &mut watch::Receiver<T>,
    pred: impl FnMut(&T) -> bool,
) -> T {
    init_test_logging();
    let value = tokio::time::timeout(WAIT, rx.wait_for(pred))
        .await
        .expect("timed out waiting for state")
        .expect("sender dropped");
    T::clone(&value)
}

/// A [`SqliteStore`] whose calls can be made to fail or hang.
#[derive(Debug)]
pub(crate) struct FlakyStore {
    inner: SqliteStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    hang_reads: AtomicBool,
    stall_snapshots: AtomicBool,
    subscribes: Arc<AtomicU64>,
}

impl FlakyStore {
    pub(crate) fn new() -> Self {
        init_test_logging();
        Self {
            inner: SqliteStore::open_in_memory(16).unwrap(),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            hang_reads: AtomicBool::new(false),
            stall_snapshots: AtomicBool::new(false),
            subscribes: Arc::new(AtomicU64::new(0)),
        }
    }

    pub(crate) fn inner(&self) -> &SqliteStore {
        &self.inner
    }

    pub(crate) fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    pub(crate) fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    pub(crate) fn hang_reads(&self, on: bool) {
        self.hang_reads.store(on, Ordering::SeqCst);
    }

    /// Open live queries that never deliver a snapshot.
    pub(crate) fn stall_snapshots(&self, on: bool) {
        self.stall_snapshots.store(on, Ordering::SeqCst);
    }

    pub(crate) fn subscribe_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.subscribes)
    }

    async fn check_read(&self) -> StoreResult<()> {
        if self.hang_reads.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("index is still building"));
        }
        Ok(())
    }

    fn check_write(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("write quota exceeded"));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DocumentStore for FlakyStore {
    async fn add(&self, caller: &Session, draft: NewNote) -> StoreResult<Note> {
        self.check_write()?;
        self.inner.add(caller, draft).await
    }

    async fn delete(&self, caller: &Session, id: NoteId) -> StoreResult<()> {
        self.check_write()?;
        self.inner.delete(caller, id).await
    }

    async fn query(&self, caller: &Session, query: &NoteQuery) -> StoreResult<Vec<Note>> {
        self.check_read().await?;
        self.inner.query(caller, query).await
    }

    async fn subscribe(
        &self,
        caller: &Session,
        query: NoteQuery,
    ) -> StoreResult<Box<dyn NoteSubscription>> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        self.check_read().await?;
        let live = self.inner.subscribe(caller, query).await?;
        if self.stall_snapshots.load(Ordering::SeqCst) {
            return Ok(Box::new(StalledSubscription { _live: live }));
        }
        Ok(live)
    }
}

/// A live query that stays open but never produces a snapshot.
#[derive(Debug)]
struct StalledSubscription {
    _live: Box<dyn NoteSubscription>,
}

#[async_trait::async_trait]
impl NoteSubscription for StalledSubscription {
    async fn next_snapshot(&mut self) -> Option<StoreResult<Vec<Note>>> {
        std::future::pending().await
    }
}
