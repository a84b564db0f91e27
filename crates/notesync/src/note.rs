//! Core note types for notesync.
//!
//! This module defines the records exchanged with the document store: the
//! persisted [`Note`], the [`NewNote`] draft submitted by the gateway, and the
//! identifier and timestamp types that give notes their ordering.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque identifier of the account that owns a note.
///
/// This is the session identifier recorded on a note at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Wrap a raw identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Store-assigned note identifier.
///
/// Identifiers increase with write order, which makes them the tie-break for
/// notes committed at the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(i64);

impl NoteId {
    /// Wrap a raw identifier.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// The raw identifier value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NoteId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// Creation time stamped by the store at commit.
///
/// `Pending` marks a write whose commit time is not known yet. Pending
/// entries are the newest writes, so they order after every committed
/// timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "at", rename_all = "snake_case")]
pub enum ServerTimestamp {
    /// Not yet assigned by the store.
    Pending,
    /// Assigned at commit.
    Committed(DateTime<Utc>),
}

impl ServerTimestamp {
    /// Check if the timestamp is still pending.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// The committed time, if any.
    #[must_use]
    pub fn committed_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Pending => None,
            Self::Committed(at) => Some(*at),
        }
    }
}

impl Ord for ServerTimestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Pending, Self::Pending) => Ordering::Equal,
            (Self::Pending, Self::Committed(_)) => Ordering::Greater,
            (Self::Committed(_), Self::Pending) => Ordering::Less,
            (Self::Committed(a), Self::Committed(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for ServerTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ServerTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Committed(at) => write!(f, "{}", at.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

/// Note text that has been trimmed and checked to be non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NoteText(String);

impl NoteText {
    /// Trim raw input, returning `None` when nothing is left.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Borrow the text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NoteText {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| "note text must not be empty".to_string())
    }
}

impl From<NoteText> for String {
    fn from(text: NoteText) -> Self {
        text.0
    }
}

/// A note ready to be written, before the store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNote {
    /// Owner recorded on the note; must match the writing session.
    pub owner: OwnerId,
    /// Trimmed, non-empty text.
    pub text: NoteText,
}

impl NewNote {
    /// Create a draft for the given owner.
    #[must_use]
    pub fn new(owner: OwnerId, text: NoteText) -> Self {
        Self { owner, text }
    }
}

/// A persisted note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Identifier assigned by the store.
    pub id: NoteId,

    /// The note text (trimmed, non-empty).
    pub text: String,

    /// The owning account. Never changes after creation.
    pub owner: OwnerId,

    /// When the store committed the note.
    pub created_at: ServerTimestamp,
}

impl Note {
    /// Ordering used for note lists: newest first, identifier descending on ties.
    #[must_use]
    pub fn newest_first(a: &Self, b: &Self) -> Ordering {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn note(id: i64, created_at: ServerTimestamp) -> Note {
        Note {
            id: NoteId::new(id),
            text: format!("note {id}"),
            owner: OwnerId::new("owner"),
            created_at,
        }
    }

    fn at(secs: i64) -> ServerTimestamp {
        ServerTimestamp::Committed(Utc.timestamp_opt(secs, 0).unwrap())
    }

    #[test]
    fn test_note_text_trims() {
        let text = NoteText::parse("  buy milk \n").unwrap();
        assert_eq!(text.as_str(), "buy milk");
    }

    #[test]
    fn test_note_text_rejects_blank() {
        assert!(NoteText::parse("").is_none());
        assert!(NoteText::parse("   ").is_none());
        assert!(NoteText::parse("\t\n").is_none());
    }

    #[test]
    fn test_note_text_deserialize_rejects_blank() {
        let result: Result<NoteText, _> = serde_json::from_str("\"   \"");
        assert!(result.is_err());
    }

    #[test]
    fn test_pending_sorts_after_committed() {
        assert!(ServerTimestamp::Pending > at(1_700_000_000));
        assert!(at(1) < at(2));
        assert_eq!(ServerTimestamp::Pending.cmp(&ServerTimestamp::Pending), Ordering::Equal);
    }

    #[test]
    fn test_newest_first_orders_by_time_then_id() {
        let mut notes = vec![
            note(1, at(100)),
            note(2, at(200)),
            note(3, at(200)),
            note(4, ServerTimestamp::Pending),
            note(5, ServerTimestamp::Pending),
        ];
        notes.sort_by(Note::newest_first);

        let ids: Vec<i64> = notes.iter().map(|n| n.id.get()).collect();
        assert_eq!(ids, vec![5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_note_id_parse() {
        assert_eq!(" 42 ".parse::<NoteId>().unwrap(), NoteId::new(42));
        assert!("abc".parse::<NoteId>().is_err());
    }

    #[test]
    fn test_timestamp_display() {
        assert_eq!(ServerTimestamp::Pending.to_string(), "pending");
        assert_eq!(at(0).to_string(), "1970-01-01 00:00:00");
    }

    #[test]
    fn test_note_serialization() {
        let original = note(7, at(1_700_000_000));
        let json = serde_json::to_string(&original).unwrap();
        assert!(json.contains("\"committed\""));

        let decoded: Note = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_owner_id_display() {
        assert_eq!(OwnerId::new("abc").to_string(), "abc");
        assert_eq!(OwnerId::new("abc").as_str(), "abc");
    }
}
