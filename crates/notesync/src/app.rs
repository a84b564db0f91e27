//! The note client.
//!
//! [`NotesApp`] owns one provider, one subscriber, one gateway, and the
//! surface they drive. User actions enter here; state flows back to the
//! surface through [`NotesApp::pump`], which always applies auth signals
//! before query signals.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::deadline;
use crate::error::{Error, Result};
use crate::gateway::{CreateOutcome, NoteGateway};
use crate::note::NoteId;
use crate::render::render;
use crate::session::{AuthProvider, Session, SessionWatcher, SignInRequest};
use crate::store::DocumentStore;
use crate::subscriber::{NoteSubscriber, QueryState, SubscriberOptions, SyncStrategy};
use crate::surface::{Notice, Screen, Surface};

/// A signed-in-or-not note client over one provider and one store.
#[derive(Debug)]
pub struct NotesApp {
    auth: Arc<dyn AuthProvider>,
    sessions: SessionWatcher,
    subscriber: NoteSubscriber,
    queries: watch::Receiver<QueryState>,
    gateway: NoteGateway,
    surface: Surface,
    timeout: Duration,
}

impl NotesApp {
    /// Wire a client together. Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn DocumentStore>,
        options: SubscriberOptions,
    ) -> Self {
        let subscriber = NoteSubscriber::spawn(Arc::clone(&store), auth.watch(), options);
        let gateway = NoteGateway::new(store, subscriber.invalidator(), options.timeout);
        let sessions = auth.watch();
        let queries = subscriber.state();

        Self {
            auth,
            sessions,
            subscriber,
            queries,
            gateway,
            surface: Surface::new(),
            timeout: options.timeout,
        }
    }

    /// The surface as of the last pump.
    #[must_use]
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// The surface rendered as text.
    #[must_use]
    pub fn render(&self) -> String {
        render(&self.surface)
    }

    /// The account on screen.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.surface.session()
    }

    /// Name of the identity provider.
    #[must_use]
    pub fn provider_name(&self) -> &str {
        self.auth.name()
    }

    /// The sync strategy in use.
    #[must_use]
    pub fn strategy(&self) -> SyncStrategy {
        self.subscriber.strategy()
    }

    /// Number of point-in-time fetches issued so far.
    #[must_use]
    pub fn fetch_count(&self) -> u64 {
        self.subscriber.fetch_count()
    }

    /// Apply any pending auth signal, then the latest query state.
    pub fn pump(&mut self) {
        while let Some(state) = self.sessions.try_next() {
            self.surface.on_auth(&state);
        }
        let query = self.queries.borrow_and_update().clone();
        self.surface.on_query(&query);
    }

    /// Pump until `pred` holds for the surface.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if `pred` does not hold within `limit`.
    pub async fn wait_for(&mut self, pred: impl Fn(&Surface) -> bool, limit: Duration) -> Result<()> {
        let wait = async {
            loop {
                self.pump();
                if pred(&self.surface) {
                    return Ok(());
                }
                tokio::select! {
                    auth = self.sessions.next() => match auth {
                        Some(state) => self.surface.on_auth(&state),
                        None => return Err(Error::internal("identity provider went away")),
                    },
                    changed = self.queries.changed() => {
                        if changed.is_err() {
                            return Err(Error::internal("note subscriber stopped"));
                        }
                    }
                }
            }
        };
        tokio::time::timeout(limit, wait)
            .await
            .map_err(|_| Error::timeout("wait for screen"))?
    }

    /// Wait until the list on screen is settled for the current account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if nothing settles within the operation
    /// timeout.
    pub async fn settle(&mut self) -> Result<()> {
        let limit = self.timeout;
        self.wait_for(
            |s| {
                matches!(
                    s.screen(),
                    Screen::Unauthenticated { pending: false }
                        | Screen::Ready { .. }
                        | Screen::Failed { .. }
                )
            },
            limit,
        )
        .await
    }

    /// Sign in as `account`.
    ///
    /// On failure a notice is shown and no session is established.
    ///
    /// # Errors
    ///
    /// Returns the provider's error, or [`Error::Timeout`].
    pub async fn sign_in(&mut self, account: &str) -> Result<()> {
        self.surface.set_busy(true);
        let request = SignInRequest::new(account);
        let result = deadline::within("sign in", self.timeout, self.auth.sign_in(&request)).await;
        self.surface.set_busy(false);

        match result {
            Ok(session) => {
                info!(account = session.label(), uid = %session.uid, "Signed in");
                self.pump();
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Sign-in failed");
                self.surface.show_notice(Notice::AuthFailed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Sign out.
    ///
    /// # Errors
    ///
    /// Returns the provider's error, or [`Error::Timeout`].
    pub async fn sign_out(&mut self) -> Result<()> {
        self.surface.set_busy(true);
        let result = deadline::within("sign out", self.timeout, self.auth.sign_out()).await;
        self.surface.set_busy(false);

        match result {
            Ok(()) => {
                info!("Signed out");
                self.pump();
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Sign-out failed");
                self.surface.show_notice(Notice::AuthFailed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Replace the text input.
    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.surface.set_draft(text);
    }

    /// Submit the text input as a new note.
    ///
    /// The input is cleared only once the store confirms the write.
    ///
    /// # Errors
    ///
    /// Returns the gateway's error; a `CreateFailed` notice is shown too.
    pub async fn submit(&mut self) -> Result<CreateOutcome> {
        self.pump();
        let session = self.surface.session().cloned();
        let text = self.surface.draft().to_string();

        self.surface.set_busy(true);
        let result = self.gateway.create(session.as_ref(), &text).await;
        self.surface.set_busy(false);

        match result {
            Ok(CreateOutcome::Created(note)) => {
                self.surface.clear_draft();
                if matches!(self.surface.notice(), Some(Notice::CreateFailed(_))) {
                    self.surface.dismiss_notice();
                }
                Ok(CreateOutcome::Created(note))
            }
            Ok(skipped) => Ok(skipped),
            Err(e) => {
                self.surface.show_notice(Notice::CreateFailed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Type `text` into the input and submit it.
    ///
    /// # Errors
    ///
    /// See [`submit`](Self::submit).
    pub async fn add(&mut self, text: &str) -> Result<CreateOutcome> {
        self.set_draft(text);
        self.submit().await
    }

    /// Delete the note `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSignedIn`] without a session, otherwise the
    /// gateway's error; a `DeleteFailed` notice is shown too.
    pub async fn delete(&mut self, id: NoteId) -> Result<()> {
        self.pump();
        let session = self.surface.session().cloned().ok_or(Error::NotSignedIn)?;

        self.surface.set_busy(true);
        let result = self.gateway.delete(&session, id).await;
        self.surface.set_busy(false);

        result.inspect_err(|e| {
            self.surface.show_notice(Notice::DeleteFailed {
                id,
                reason: e.to_string(),
            });
        })
    }

    /// Clear the notice.
    pub fn dismiss_notice(&mut self) {
        self.surface.dismiss_notice();
    }
}
