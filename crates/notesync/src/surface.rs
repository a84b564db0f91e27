//! Presentation state.
//!
//! The surface is a plain state machine driven by two signals: auth states
//! from the session watcher and query states from the subscriber. It never
//! talks to the store itself. Query states are only accepted when they were
//! produced for the session currently on screen, so a late snapshot for a
//! previous account is dropped rather than rendered.

use std::fmt;

use tracing::debug;

use crate::note::{Note, NoteId};
use crate::session::{AuthState, Session};
use crate::subscriber::QueryState;

/// Which screen is showing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    /// Sign-in controls.
    Unauthenticated {
        /// The provider has not reported a session yet.
        pending: bool,
    },
    /// Signed in, waiting for the first list.
    Loading {
        /// The signed-in account.
        session: Session,
    },
    /// Signed in with a list.
    Ready {
        /// The signed-in account.
        session: Session,
        /// Notes, newest first.
        notes: Vec<Note>,
    },
    /// Signed in, but the list could not be loaded.
    Failed {
        /// The signed-in account.
        session: Session,
        /// Why the query was rejected.
        reason: String,
    },
}

impl Default for Screen {
    fn default() -> Self {
        Self::Unauthenticated { pending: true }
    }
}

impl Screen {
    /// The account on screen, if any.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::Unauthenticated { .. } => None,
            Self::Loading { session } | Self::Ready { session, .. } | Self::Failed { session, .. } => {
                Some(session)
            }
        }
    }

    /// Notes on screen; empty unless ready.
    #[must_use]
    pub fn notes(&self) -> &[Note] {
        match self {
            Self::Ready { notes, .. } => notes,
            _ => &[],
        }
    }

    /// Short name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unauthenticated { pending: true } => "pending",
            Self::Unauthenticated { pending: false } => "unauthenticated",
            Self::Loading { .. } => "loading",
            Self::Ready { .. } => "ready",
            Self::Failed { .. } => "error",
        }
    }
}

/// A dismissible message about a failed user action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Sign-in did not complete.
    AuthFailed(String),
    /// A note could not be saved; the draft is kept.
    CreateFailed(String),
    /// A note could not be deleted.
    DeleteFailed {
        /// The note the user tried to delete.
        id: NoteId,
        /// Why it failed.
        reason: String,
    },
}

impl Notice {
    /// Whether this notice is about a note mutation.
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::AuthFailed(_))
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthFailed(reason) => write!(f, "Sign-in failed: {reason}"),
            Self::CreateFailed(reason) => write!(f, "Could not save note: {reason}"),
            Self::DeleteFailed { id, reason } => {
                write!(f, "Could not delete note {id}: {reason}")
            }
        }
    }
}

/// Everything the user sees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Surface {
    screen: Screen,
    draft: String,
    notice: Option<Notice>,
    busy: bool,
}

impl Surface {
    /// A surface waiting for the first auth signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current screen.
    #[must_use]
    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    /// The account on screen, if any.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.screen.session()
    }

    /// Notes on screen.
    #[must_use]
    pub fn notes(&self) -> &[Note] {
        self.screen.notes()
    }

    /// The text input.
    #[must_use]
    pub fn draft(&self) -> &str {
        &self.draft
    }

    /// The current notice.
    #[must_use]
    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    /// Whether an auth or store call is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Apply an auth signal.
    pub fn on_auth(&mut self, state: &AuthState) {
        match state {
            AuthState::Pending => {
                if self.session().is_some() {
                    self.clear_account_state();
                }
                self.screen = Screen::Unauthenticated { pending: true };
            }
            AuthState::SignedOut => {
                if self.session().is_some() {
                    self.clear_account_state();
                }
                self.screen = Screen::Unauthenticated { pending: false };
            }
            AuthState::SignedIn(session) => {
                if self.session().map(|s| &s.uid) == Some(&session.uid) {
                    return;
                }
                if self.session().is_some() {
                    self.clear_account_state();
                }
                if matches!(self.notice, Some(Notice::AuthFailed(_))) {
                    self.notice = None;
                }
                self.screen = Screen::Loading {
                    session: session.clone(),
                };
            }
        }
        debug!(screen = self.screen.name(), "Auth signal applied");
    }

    /// Apply a query signal.
    ///
    /// States produced for another owner, or arriving while signed out, are
    /// ignored.
    pub fn on_query(&mut self, state: &QueryState) {
        let Some(session) = self.session().cloned() else {
            return;
        };
        if state.owner() != Some(&session.uid) {
            if state.owner().is_some() {
                debug!(current = %session.uid, "Dropped query state for another owner");
            }
            return;
        }

        self.screen = match state {
            QueryState::Idle => return,
            QueryState::Loading { .. } => Screen::Loading { session },
            QueryState::Ready { notes, .. } => Screen::Ready {
                session,
                notes: notes.clone(),
            },
            QueryState::Error { reason, .. } => Screen::Failed {
                session,
                reason: reason.clone(),
            },
        };
    }

    /// Replace the text input.
    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// Empty the text input.
    pub fn clear_draft(&mut self) {
        self.draft.clear();
    }

    /// Mark a call as started or finished.
    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    /// Show a notice, replacing any previous one.
    pub fn show_notice(&mut self, notice: Notice) {
        self.notice = Some(notice);
    }

    /// Clear the notice.
    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    // Notes, draft and mutation notices belong to the account on screen
    fn clear_account_state(&mut self) {
        self.draft.clear();
        if self.notice.as_ref().is_some_and(Notice::is_mutation) {
            self.notice = None;
        }
    }
}
