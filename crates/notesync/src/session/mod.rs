//! Identity sessions and the auth-state watcher.
//!
//! The identity provider owns the session; the client only observes it. An
//! [`AuthProvider`] pushes every sign-in/sign-out edge into a watch channel,
//! and each [`SessionWatcher`] registered on it sees the current state right
//! away and then every later edge, until it is dropped.
//!
//! State is always one of three tagged values ([`AuthState`]) so that "not
//! known yet" is never mistaken for "signed out".

mod local;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

use crate::note::OwnerId;

pub use local::LocalAuthProvider;

/// Errors reported by an identity provider.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The user closed or dismissed the sign-in prompt.
    #[error("sign-in was dismissed")]
    Cancelled,

    /// The provider refused the sign-in.
    #[error("sign-in rejected: {reason}")]
    Rejected {
        /// Why the provider refused.
        reason: String,
    },

    /// The provider could not be reached.
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Result type for identity provider operations.
pub type AuthResult<T> = std::result::Result<T, AuthError>;

/// An authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque identifier; recorded as the owner of every note written.
    pub uid: OwnerId,
    /// Human-readable label, such as an email address.
    pub display_label: Option<String>,
}

impl Session {
    /// Create a session with the given identifier.
    #[must_use]
    pub fn new(uid: OwnerId, display_label: Option<String>) -> Self {
        Self { uid, display_label }
    }

    /// The label to show for this session, falling back to the identifier.
    #[must_use]
    pub fn label(&self) -> &str {
        self.display_label
            .as_deref()
            .unwrap_or_else(|| self.uid.as_str())
    }
}

/// What the client currently knows about the session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    /// The provider has not reported yet.
    #[default]
    Pending,
    /// The provider reported that nobody is signed in.
    SignedOut,
    /// The provider reported a signed-in session.
    SignedIn(Session),
}

impl AuthState {
    /// The signed-in session, if any.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::SignedIn(session) => Some(session),
            Self::Pending | Self::SignedOut => None,
        }
    }

    /// Check if the provider has not reported yet.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Identifier of the signed-in session, if any.
    #[must_use]
    pub fn uid(&self) -> Option<&OwnerId> {
        self.session().map(|s| &s.uid)
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::SignedOut => write!(f, "signed out"),
            Self::SignedIn(session) => write!(f, "signed in as {}", session.label()),
        }
    }
}

/// Request to begin a sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInRequest {
    /// Account to sign in as. Empty means the prompt was dismissed.
    pub account: String,
}

impl SignInRequest {
    /// Create a request for the given account.
    #[must_use]
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
        }
    }
}

/// An identity provider.
///
/// Implementations own the session and publish every sign-in/sign-out edge to
/// their watchers. The protocol used to authenticate is the provider's
/// concern.
#[async_trait::async_trait]
pub trait AuthProvider: Send + Sync + fmt::Debug {
    /// Name of this provider (for logging and identifiers).
    fn name(&self) -> &str;

    /// Begin a sign-in.
    ///
    /// # Errors
    ///
    /// Returns an error if the user dismissed the prompt or the provider
    /// rejected or could not process the sign-in. The session is unchanged
    /// on error.
    async fn sign_in(&self, request: &SignInRequest) -> AuthResult<Session>;

    /// Sign the current session out.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider could not be reached.
    async fn sign_out(&self) -> AuthResult<()>;

    /// Register a watcher for session changes.
    fn watch(&self) -> SessionWatcher;
}

/// Observes auth state changes from one provider.
///
/// The first call to [`next`](Self::next) returns the current state without
/// waiting; later calls wait for the next edge. Dropping the watcher
/// unsubscribes it.
#[derive(Debug, Clone)]
pub struct SessionWatcher {
    rx: watch::Receiver<AuthState>,
    primed: bool,
}

impl SessionWatcher {
    /// Wrap a receiver from a provider's state channel.
    #[must_use]
    pub fn new(rx: watch::Receiver<AuthState>) -> Self {
        Self { rx, primed: false }
    }

    /// The state as of now, without consuming a pending change.
    #[must_use]
    pub fn current(&self) -> AuthState {
        self.rx.borrow().clone()
    }

    /// Wait for the next state to deliver.
    ///
    /// Returns `None` once the provider has gone away. Cancel safe.
    pub async fn next(&mut self) -> Option<AuthState> {
        if !self.primed {
            self.primed = true;
            return Some(self.rx.borrow_and_update().clone());
        }
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Return an undelivered state without waiting, if there is one.
    pub fn try_next(&mut self) -> Option<AuthState> {
        if !self.primed {
            self.primed = true;
            return Some(self.rx.borrow_and_update().clone());
        }
        match self.rx.has_changed() {
            Ok(true) => Some(self.rx.borrow_and_update().clone()),
            _ => None,
        }
    }

    /// Stop observing. Equivalent to dropping the watcher.
    pub fn unsubscribe(self) {}
}
