//! Document store boundary.
//!
//! This module defines the contract the client holds with its note backend:
//! create, delete, one-shot queries, and live subscriptions over a single
//! logical collection of notes. Queries filter on owner equality and are
//! always ordered newest first; that order is authoritative and callers never
//! re-sort.
//!
//! Access control lives behind the boundary ([`policy`]). Callers pass their
//! session on every call and treat `PermissionDenied` as an ordinary,
//! recoverable error.

pub mod migrations;
pub mod policy;
pub mod schema;
mod sqlite;

use std::fmt;

use thiserror::Error;

use crate::note::{NewNote, Note, NoteId, OwnerId};
use crate::session::Session;

pub use sqlite::{SqliteStore, StoreStats};

/// Errors reported by a document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The access policy refused the operation.
    #[error("permission denied for {operation}: {reason}")]
    PermissionDenied {
        /// The refused operation.
        operation: &'static str,
        /// Why it was refused.
        reason: String,
    },

    /// The note does not exist.
    #[error("note {id} not found")]
    NotFound {
        /// The missing note.
        id: NoteId,
    },

    /// The document failed validation.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// The backend cannot serve requests right now.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A database operation failed.
    #[error("database query failed: {0}")]
    Database(#[from] rusqlite::Error),

    /// Schema migration failed.
    #[error("database migration failed: {message}")]
    Migration {
        /// Description of what went wrong.
        message: String,
    },
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Create a permission denied error.
    #[must_use]
    pub fn permission_denied(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::PermissionDenied {
            operation,
            reason: reason.into(),
        }
    }

    /// Create an unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// An owner-scoped, newest-first note query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteQuery {
    /// Only notes owned by this identifier are returned.
    pub owner: OwnerId,
    /// Maximum number of notes; `None` for all.
    pub limit: Option<usize>,
}

impl NoteQuery {
    /// Query every note owned by `owner`.
    #[must_use]
    pub fn owned_by(owner: OwnerId) -> Self {
        Self { owner, limit: None }
    }

    /// Cap the number of notes returned.
    #[must_use]
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }
}

/// A note backend.
///
/// Implementations assign note identifiers and creation timestamps at commit
/// and enforce the owner-only access policy against the calling session.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync + fmt::Debug {
    /// Write a new note.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy refuses the write or the backend fails.
    async fn add(&self, caller: &Session, draft: NewNote) -> StoreResult<Note>;

    /// Delete a note by identifier.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no such note, `PermissionDenied` if the
    /// caller does not own it, or a backend error.
    async fn delete(&self, caller: &Session, id: NoteId) -> StoreResult<()>;

    /// Run a point-in-time query.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy refuses the read or the backend fails.
    async fn query(&self, caller: &Session, query: &NoteQuery) -> StoreResult<Vec<Note>>;

    /// Open a live query.
    ///
    /// The subscription's first snapshot is the current result set; later
    /// snapshots follow every change to the queried owner's notes.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy refuses the read or the backend fails.
    async fn subscribe(
        &self,
        caller: &Session,
        query: NoteQuery,
    ) -> StoreResult<Box<dyn NoteSubscription>>;
}

/// A standing query that pushes result sets.
///
/// Dropping the subscription cancels it.
#[async_trait::async_trait]
pub trait NoteSubscription: Send + fmt::Debug {
    /// Wait for the next snapshot.
    ///
    /// Returns `None` when the backend closed the subscription. Cancel safe.
    async fn next_snapshot(&mut self) -> Option<StoreResult<Vec<Note>>>;
}
