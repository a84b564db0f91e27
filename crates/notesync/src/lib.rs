//! `notesync` - Account-scoped notes with session-aware live sync
//!
//! This library provides a small note client: an identity session watcher,
//! a note list subscriber that follows whoever is signed in, a mutation
//! gateway, and a presentation state machine. The identity provider and the
//! document store sit behind traits; a local provider and a SQLite store are
//! included.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod app;
pub mod cli;
pub mod config;
mod deadline;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod note;
pub mod render;
pub mod session;
pub mod shell;
pub mod store;
pub mod subscriber;
pub mod surface;

#[cfg(test)]
mod testing;

pub use app::NotesApp;
pub use config::Config;
pub use error::{Error, Result};
pub use gateway::{CreateOutcome, NoteGateway, SkipReason};
pub use logging::init_logging;
pub use note::{NewNote, Note, NoteId, NoteText, OwnerId, ServerTimestamp};
pub use session::{AuthProvider, AuthState, LocalAuthProvider, Session, SessionWatcher};
pub use store::{DocumentStore, NoteQuery, SqliteStore, StoreError, StoreStats};
pub use subscriber::{NoteSubscriber, QueryState, SubscriberOptions, SyncStrategy};
pub use surface::{Notice, Screen, Surface};
