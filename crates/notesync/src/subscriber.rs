//! Session-scoped note list synchronization.
//!
//! A [`NoteSubscriber`] follows the auth state and keeps one query open for
//! whoever is signed in. A single driver task owns both the session watcher
//! and the current store subscription. When the session changes, the serving
//! loop returns and drops the old subscription before the next one opens, so
//! two owners' result sets can never be delivered concurrently.
//!
//! Two strategies are supported:
//!
//! - [`SyncStrategy::Live`]: a push subscription; every committed change to
//!   the owner's notes produces a fresh snapshot.
//! - [`SyncStrategy::Fetch`]: a point-in-time fetch. The list goes stale
//!   after a mutation until the gateway sends an [`Invalidation`], and each
//!   invalidation triggers exactly one re-fetch.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::Config;
use crate::deadline;
use crate::error::{Error, Result};
use crate::note::{Note, OwnerId};
use crate::session::{AuthState, Session, SessionWatcher};
use crate::store::{DocumentStore, NoteQuery, NoteSubscription};

/// How the note list follows the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    /// Standing query with pushed snapshots.
    #[default]
    Live,
    /// One-shot fetches, re-run after each invalidation.
    Fetch,
}

impl fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Fetch => write!(f, "fetch"),
        }
    }
}

/// The note list as seen by the client.
///
/// Every authenticated variant names the owner it was produced for.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum QueryState {
    /// Nobody is signed in; the list is empty.
    #[default]
    Idle,
    /// A query for `owner` is opening.
    Loading {
        /// Owner being queried.
        owner: OwnerId,
    },
    /// The latest result set for `owner`.
    Ready {
        /// Owner the notes belong to.
        owner: OwnerId,
        /// Notes, newest first.
        notes: Vec<Note>,
    },
    /// The query for `owner` was rejected.
    Error {
        /// Owner being queried.
        owner: OwnerId,
        /// Why the query failed.
        reason: String,
    },
}

impl QueryState {
    /// Owner this state was produced for.
    #[must_use]
    pub fn owner(&self) -> Option<&OwnerId> {
        match self {
            Self::Idle => None,
            Self::Loading { owner } | Self::Ready { owner, .. } | Self::Error { owner, .. } => {
                Some(owner)
            }
        }
    }

    /// Notes in this state; empty unless ready.
    #[must_use]
    pub fn notes(&self) -> &[Note] {
        match self {
            Self::Ready { notes, .. } => notes,
            _ => &[],
        }
    }
}

/// Request to re-fetch one owner's list after a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalidation {
    /// Owner whose cached list is stale.
    pub owner: OwnerId,
}

/// Sends invalidations to a fetch-mode subscriber.
#[derive(Debug, Clone)]
pub struct Invalidator {
    tx: mpsc::UnboundedSender<Invalidation>,
}

impl Invalidator {
    /// Mark `owner`'s list stale.
    pub fn invalidate(&self, owner: &OwnerId) {
        let sent = self.tx.send(Invalidation {
            owner: owner.clone(),
        });
        if sent.is_err() {
            debug!(owner = %owner, "Subscriber stopped, invalidation dropped");
        }
    }
}

/// Subscriber tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberOptions {
    /// Live or fetch.
    pub strategy: SyncStrategy,
    /// Bound for opening a query and for each fetch.
    pub timeout: Duration,
    /// Maximum notes per list.
    pub limit: Option<usize>,
}

impl Default for SubscriberOptions {
    fn default() -> Self {
        Self {
            strategy: SyncStrategy::Live,
            timeout: Duration::from_secs(10),
            limit: None,
        }
    }
}

impl SubscriberOptions {
    /// Options from the `[sync]` and `[notes]` configuration sections.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            strategy: config.sync.mode,
            timeout: config.operation_timeout(),
            limit: config.list_limit(),
        }
    }
}

/// Keeps the signed-in account's note list in sync.
///
/// Dropping the subscriber stops its driver task and closes any open query.
#[derive(Debug)]
pub struct NoteSubscriber {
    state: watch::Receiver<QueryState>,
    invalidator: Option<Invalidator>,
    fetches: Arc<AtomicU64>,
    strategy: SyncStrategy,
    task: JoinHandle<()>,
}

impl NoteSubscriber {
    /// Start following `sessions` against `store`.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(
        store: Arc<dyn DocumentStore>,
        sessions: SessionWatcher,
        options: SubscriberOptions,
    ) -> Self {
        let (publisher, state) = watch::channel(QueryState::Idle);
        let fetches = Arc::new(AtomicU64::new(0));

        let (invalidator, invalidations) = match options.strategy {
            SyncStrategy::Live => (None, None),
            SyncStrategy::Fetch => {
                let (tx, rx) = mpsc::unbounded_channel();
                (Some(Invalidator { tx }), Some(rx))
            }
        };

        let driver = Driver {
            store,
            sessions,
            publisher,
            invalidations,
            options,
            fetches: Arc::clone(&fetches),
        };
        let task = tokio::spawn(driver.run());

        Self {
            state,
            invalidator,
            fetches,
            strategy: options.strategy,
            task,
        }
    }

    /// A receiver for query state changes.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<QueryState> {
        self.state.clone()
    }

    /// The latest query state.
    #[must_use]
    pub fn current(&self) -> QueryState {
        self.state.borrow().clone()
    }

    /// Handle the gateway uses to request re-fetches; `None` in live mode.
    #[must_use]
    pub fn invalidator(&self) -> Option<Invalidator> {
        self.invalidator.clone()
    }

    /// The strategy in use.
    #[must_use]
    pub fn strategy(&self) -> SyncStrategy {
        self.strategy
    }

    /// Number of point-in-time fetches issued so far.
    #[must_use]
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Drop for NoteSubscriber {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// The task behind a [`NoteSubscriber`].
struct Driver {
    store: Arc<dyn DocumentStore>,
    sessions: SessionWatcher,
    publisher: watch::Sender<QueryState>,
    invalidations: Option<mpsc::UnboundedReceiver<Invalidation>>,
    options: SubscriberOptions,
    fetches: Arc<AtomicU64>,
}

impl Driver {
    async fn run(mut self) {
        let mut next = self.sessions.next().await;
        while let Some(auth) = next {
            next = match auth {
                AuthState::SignedIn(session) => match self.options.strategy {
                    SyncStrategy::Live => self.serve_live(session).await,
                    SyncStrategy::Fetch => self.serve_fetch(session).await,
                },
                AuthState::Pending | AuthState::SignedOut => {
                    self.publisher.send_replace(QueryState::Idle);
                    self.sessions.next().await
                }
            };
        }
        debug!("Session watcher closed, subscriber stopping");
    }

    fn query_for(&self, owner: &OwnerId) -> NoteQuery {
        NoteQuery::owned_by(owner.clone()).with_limit(self.options.limit)
    }

    /// Serve a live query until the session changes.
    ///
    /// Returns the next auth state, or `None` when the watcher closed.
    async fn serve_live(&mut self, session: Session) -> Option<AuthState> {
        let owner = session.uid.clone();
        debug!(owner = %owner, "Opening live note query");
        self.publisher.send_replace(QueryState::Loading {
            owner: owner.clone(),
        });

        let query = self.query_for(&owner);
        let limit = self.options.timeout;
        let mut subscription = tokio::select! {
            biased;
            next = self.sessions.next() => return next,
            opened = deadline::within("open live query", limit, self.store.subscribe(&session, query)) => {
                match opened {
                    Ok(subscription) => subscription,
                    Err(err) => {
                        publish_error(&self.publisher, &owner, &err);
                        return self.sessions.next().await;
                    }
                }
            }
        };

        let mut first = true;
        loop {
            let bound = first.then_some(limit);
            tokio::select! {
                biased;
                next = self.sessions.next() => {
                    debug!(owner = %owner, "Session changed, closing live note query");
                    return next;
                }
                snapshot = next_snapshot(subscription.as_mut(), bound) => {
                    first = false;
                    match snapshot {
                        Some(Ok(notes)) => {
                            debug!(owner = %owner, count = notes.len(), "Live snapshot");
                            self.publisher.send_replace(QueryState::Ready {
                                owner: owner.clone(),
                                notes,
                            });
                        }
                        Some(Err(err)) => {
                            drop(subscription);
                            publish_error(&self.publisher, &owner, &err);
                            return self.sessions.next().await;
                        }
                        None => {
                            drop(subscription);
                            let err = Error::from(crate::store::StoreError::unavailable(
                                "live query closed by the store",
                            ));
                            publish_error(&self.publisher, &owner, &err);
                            return self.sessions.next().await;
                        }
                    }
                }
            }
        }
    }

    /// Serve fetches until the session changes.
    ///
    /// Returns the next auth state, or `None` when the watcher closed.
    async fn serve_fetch(&mut self, session: Session) -> Option<AuthState> {
        let owner = session.uid.clone();
        self.publisher.send_replace(QueryState::Loading {
            owner: owner.clone(),
        });

        // The first fetch covers anything invalidated while nobody was served
        if let Some(rx) = self.invalidations.as_mut() {
            while rx.try_recv().is_ok() {}
        }

        loop {
            let query = self.query_for(&owner);
            let limit = self.options.timeout;
            tokio::select! {
                biased;
                next = self.sessions.next() => return next,
                fetched = fetch(self.store.as_ref(), &session, &query, limit, &self.fetches) => {
                    match fetched {
                        Ok(notes) => {
                            debug!(owner = %owner, count = notes.len(), "Fetched notes");
                            self.publisher.send_replace(QueryState::Ready {
                                owner: owner.clone(),
                                notes,
                            });
                        }
                        Err(err) => publish_error(&self.publisher, &owner, &err),
                    }
                }
            }

            loop {
                tokio::select! {
                    biased;
                    next = self.sessions.next() => return next,
                    invalidation = recv_invalidation(self.invalidations.as_mut()) => match invalidation {
                        Some(inv) if inv.owner == owner => break,
                        Some(inv) => debug!(owner = %inv.owner, "Ignoring invalidation for another owner"),
                        None => return self.sessions.next().await,
                    }
                }
            }
        }
    }
}

async fn next_snapshot(
    subscription: &mut dyn NoteSubscription,
    bound: Option<Duration>,
) -> Option<Result<Vec<Note>>> {
    match bound {
        Some(limit) => match tokio::time::timeout(limit, subscription.next_snapshot()).await {
            Ok(snapshot) => snapshot.map(|r| r.map_err(Error::from)),
            Err(_) => Some(Err(Error::timeout("first live snapshot"))),
        },
        None => subscription
            .next_snapshot()
            .await
            .map(|r| r.map_err(Error::from)),
    }
}

async fn fetch(
    store: &dyn DocumentStore,
    session: &Session,
    query: &NoteQuery,
    limit: Duration,
    fetches: &AtomicU64,
) -> Result<Vec<Note>> {
    fetches.fetch_add(1, Ordering::SeqCst);
    deadline::within("fetch notes", limit, store.query(session, query)).await
}

async fn recv_invalidation(
    rx: Option<&mut mpsc::UnboundedReceiver<Invalidation>>,
) -> Option<Invalidation> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn publish_error(publisher: &watch::Sender<QueryState>, owner: &OwnerId, err: &Error) {
    warn!(owner = %owner, error = %err, "Note query rejected");
    publisher.send_replace(QueryState::Error {
        owner: owner.clone(),
        reason: err.to_string(),
    });
}
