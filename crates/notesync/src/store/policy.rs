//! Owner-only access policy.
//!
//! Every store operation carries the caller's session, the way a hosted
//! backend sees the authenticated request. A session may only read, create,
//! and delete notes it owns.

use super::{StoreError, StoreResult};
use crate::note::{NewNote, OwnerId};
use crate::session::Session;

/// Allow a query over `owner`'s notes.
///
/// # Errors
///
/// Returns `PermissionDenied` when the caller is not `owner`.
pub fn authorize_read(caller: &Session, owner: &OwnerId) -> StoreResult<()> {
    if caller.uid == *owner {
        Ok(())
    } else {
        Err(StoreError::permission_denied(
            "query",
            "notes belong to another account",
        ))
    }
}

/// Allow writing a new note.
///
/// # Errors
///
/// Returns `PermissionDenied` when the draft names a different owner than the
/// caller.
pub fn authorize_create(caller: &Session, draft: &NewNote) -> StoreResult<()> {
    if caller.uid == draft.owner {
        Ok(())
    } else {
        Err(StoreError::permission_denied(
            "create",
            "owner must be the signed-in account",
        ))
    }
}

/// Allow deleting a note owned by `note_owner`.
///
/// # Errors
///
/// Returns `PermissionDenied` when the caller does not own the note.
pub fn authorize_delete(caller: &Session, note_owner: &OwnerId) -> StoreResult<()> {
    if caller.uid == *note_owner {
        Ok(())
    } else {
        Err(StoreError::permission_denied(
            "delete",
            "note belongs to another account",
        ))
    }
}
