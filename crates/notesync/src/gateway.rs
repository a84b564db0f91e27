//! Note mutations.
//!
//! The gateway is the only path by which the client writes to the store. It
//! stamps the owner from the session it is handed and leaves identifiers and
//! creation timestamps to the store. In fetch mode it tells the subscriber
//! about every successful write so the list is re-fetched exactly once.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::deadline;
use crate::error::Result;
use crate::note::{NewNote, Note, NoteId, NoteText};
use crate::session::Session;
use crate::store::DocumentStore;
use crate::subscriber::Invalidator;

/// Why a create request did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The text was empty after trimming.
    EmptyText,
    /// Nobody is signed in.
    NoSession,
}

/// Result of a create request that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The note was committed.
    Created(Note),
    /// The request was a no-op and the store was not touched.
    Skipped(SkipReason),
}

impl CreateOutcome {
    /// The committed note, if any.
    #[must_use]
    pub fn note(&self) -> Option<&Note> {
        match self {
            Self::Created(note) => Some(note),
            Self::Skipped(_) => None,
        }
    }
}

/// Writes notes on behalf of the signed-in account.
#[derive(Debug, Clone)]
pub struct NoteGateway {
    store: Arc<dyn DocumentStore>,
    invalidator: Option<Invalidator>,
    timeout: Duration,
}

impl NoteGateway {
    /// Create a gateway over `store`.
    ///
    /// Pass the subscriber's invalidator in fetch mode so writes trigger a
    /// re-fetch; pass `None` in live mode.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        invalidator: Option<Invalidator>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            invalidator,
            timeout,
        }
    }

    /// Create a note with `text` for the signed-in account.
    ///
    /// Whitespace-only text and a missing session are skipped without a
    /// store call.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write or does not answer in
    /// time.
    pub async fn create(&self, session: Option<&Session>, text: &str) -> Result<CreateOutcome> {
        let Some(session) = session else {
            debug!("Create skipped, nobody signed in");
            return Ok(CreateOutcome::Skipped(SkipReason::NoSession));
        };
        let Some(text) = NoteText::parse(text) else {
            debug!("Create skipped, empty text");
            return Ok(CreateOutcome::Skipped(SkipReason::EmptyText));
        };

        let draft = NewNote::new(session.uid.clone(), text);
        let note = deadline::within("create note", self.timeout, self.store.add(session, draft))
            .await
            .inspect_err(|e| warn!(owner = %session.uid, error = %e, "Create rejected"))?;

        info!(owner = %note.owner, id = %note.id, "Note created");
        self.invalidate(session);
        Ok(CreateOutcome::Created(note))
    }

    /// Delete the note `id`.
    ///
    /// The store decides whether the caller may delete it.
    ///
    /// # Errors
    ///
    /// Returns an error if the note does not exist, belongs to another
    /// account, or the store fails or does not answer in time.
    pub async fn delete(&self, session: &Session, id: NoteId) -> Result<()> {
        deadline::within("delete note", self.timeout, self.store.delete(session, id))
            .await
            .inspect_err(|e| warn!(owner = %session.uid, id = %id, error = %e, "Delete rejected"))?;

        info!(owner = %session.uid, id = %id, "Note deleted");
        self.invalidate(session);
        Ok(())
    }

    fn invalidate(&self, session: &Session) {
        if let Some(invalidator) = &self.invalidator {
            invalidator.invalidate(&session.uid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::note::OwnerId;
    use crate::store::{NoteQuery, SqliteStore, StoreError};
    use crate::subscriber::{NoteSubscriber, QueryState, SubscriberOptions, SyncStrategy};
    use crate::session::{AuthProvider, LocalAuthProvider, SignInRequest};
    use crate::testing::{wait_for_state, FlakyStore, WAIT};

    fn session(uid: &str) -> Session {
        Session::new(OwnerId::new(uid), None)
    }

    fn gateway(store: &SqliteStore) -> NoteGateway {
        NoteGateway::new(Arc::new(store.clone()), None, Duration::from_secs(2))
    }

    async fn list(store: &SqliteStore, who: &Session) -> Vec<Note> {
        store
            .query(who, &NoteQuery::owned_by(who.uid.clone()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_trims_and_stamps_owner() {
        let store = SqliteStore::open_in_memory(16).unwrap();
        let alice = session("alice");

        let outcome = gateway(&store)
            .create(Some(&alice), "  buy milk \n")
            .await
            .unwrap();
        let note = outcome.note().unwrap();
        assert_eq!(note.text, "buy milk");
        assert_eq!(note.owner, alice.uid);
        assert!(!note.created_at.is_pending());
        assert_eq!(list(&store, &alice).await.len(), 1);
    }

    #[tokio::test]
    async fn test_create_skips_blank_text() {
        let store = SqliteStore::open_in_memory(16).unwrap();
        let alice = session("alice");

        let outcome = gateway(&store).create(Some(&alice), "   ").await.unwrap();
        assert_eq!(outcome, CreateOutcome::Skipped(SkipReason::EmptyText));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_skips_without_session() {
        let store = SqliteStore::open_in_memory(16).unwrap();

        let outcome = gateway(&store).create(None, "hello").await.unwrap();
        assert_eq!(outcome, CreateOutcome::Skipped(SkipReason::NoSession));
        assert!(outcome.note().is_none());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_removes_note() {
        let store = SqliteStore::open_in_memory(16).unwrap();
        let alice = session("alice");
        let gw = gateway(&store);

        let kept = gw.create(Some(&alice), "keep").await.unwrap();
        let gone = gw.create(Some(&alice), "remove").await.unwrap();
        gw.delete(&alice, gone.note().unwrap().id).await.unwrap();

        let notes = list(&store, &alice).await;
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].id, kept.note().unwrap().id);
    }

    #[tokio::test]
    async fn test_delete_other_owner_is_surfaced() {
        let store = SqliteStore::open_in_memory(16).unwrap();
        let gw = gateway(&store);
        let note = gw.create(Some(&session("alice")), "mine").await.unwrap();

        let err = gw
            .delete(&session("mallory"), note.note().unwrap().id)
            .await
            .unwrap_err();
        assert!(err.is_permission_denied());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_note_is_surfaced() {
        let store = SqliteStore::open_in_memory(16).unwrap();
        let err = gateway(&store)
            .delete(&session("alice"), NoteId::new(404))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_store_failure_is_an_error() {
        let store = FlakyStore::new();
        store.fail_writes(true);
        let gw = NoteGateway::new(Arc::new(store), None, Duration::from_secs(2));

        let err = gw.create(Some(&session("alice")), "hello").await.unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_locked_database_times_out() {
        let root =
            std::env::temp_dir().join(format!("notesync_test_locked_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&root);
        let store = SqliteStore::open(root.join("notes.db"), 8).unwrap();

        // Another process holds the write lock
        let locker = rusqlite::Connection::open(root.join("notes.db")).unwrap();
        locker.execute_batch("BEGIN EXCLUSIVE;").unwrap();

        let gw = NoteGateway::new(Arc::new(store.clone()), None, Duration::from_millis(100));
        let started = std::time::Instant::now();
        let err = gw.create(Some(&session("alice")), "hello").await.unwrap_err();
        assert!(err.is_timeout(), "expected a timeout, got {err}");
        assert!(started.elapsed() < Duration::from_secs(2));

        // The abandoned write lands once the lock is released
        drop(locker);
        let landed = std::time::Instant::now();
        while store.count().unwrap() == 0 {
            assert!(landed.elapsed() < WAIT, "abandoned write never finished");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        drop(store);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_invalidates_once_per_successful_mutation() {
        let auth = LocalAuthProvider::new("local", ".*").unwrap();
        auth.resolve(None);
        let store = Arc::new(FlakyStore::new());
        let sub = NoteSubscriber::spawn(
            store.clone(),
            auth.watch(),
            SubscriberOptions {
                strategy: SyncStrategy::Fetch,
                ..SubscriberOptions::default()
            },
        );
        let gw = NoteGateway::new(store.clone(), sub.invalidator(), Duration::from_secs(2));
        let mut rx = sub.state();

        let alice = auth.sign_in(&SignInRequest::new("alice")).await.unwrap();
        wait_for_state(&mut rx, |s| matches!(s, QueryState::Ready { .. })).await;
        assert_eq!(sub.fetch_count(), 1);

        let created = gw.create(Some(&alice), "first").await.unwrap();
        wait_for_state(&mut rx, |s| s.notes().len() == 1).await;
        assert_eq!(sub.fetch_count(), 2);

        // Skips and failures do not trigger a re-fetch
        gw.create(Some(&alice), "  ").await.unwrap();
        store.fail_writes(true);
        assert!(gw.create(Some(&alice), "second").await.is_err());
        store.fail_writes(false);

        gw.delete(&alice, created.note().unwrap().id).await.unwrap();
        wait_for_state(&mut rx, |s| s.notes().is_empty()).await;
        assert_eq!(sub.fetch_count(), 3);
        assert_eq!(store.inner().count().unwrap(), 0);
    }
}
