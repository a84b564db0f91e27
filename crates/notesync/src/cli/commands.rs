//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::note::NoteId;

/// Interactive shell arguments.
#[derive(Debug, Args)]
pub struct ShellArgs {
    /// Sign in as this account before the first prompt
    #[arg(short, long)]
    pub account: Option<String>,

    /// Override the configured sync mode
    #[arg(short, long, value_enum)]
    pub mode: Option<SyncModeArg>,
}

/// One-shot note commands.
#[derive(Debug, Subcommand)]
pub enum NotesCommand {
    /// List an account's notes, newest first
    List {
        /// Account to sign in as
        #[arg(short, long)]
        account: String,

        /// Maximum number of notes to show
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Save a note
    Add {
        /// Account to sign in as
        #[arg(short, long)]
        account: String,

        /// The note text
        text: String,
    },

    /// Delete a note by id
    Delete {
        /// Account to sign in as
        #[arg(short, long)]
        account: String,

        /// The note id
        id: NoteId,
    },
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Sync mode argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SyncModeArg {
    /// Push snapshots on every change
    Live,
    /// Re-fetch after each change
    Fetch,
}

impl From<SyncModeArg> for crate::subscriber::SyncStrategy {
    fn from(arg: SyncModeArg) -> Self {
        match arg {
            SyncModeArg::Live => Self::Live,
            SyncModeArg::Fetch => Self::Fetch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriber::SyncStrategy;

    #[test]
    fn test_sync_mode_arg_conversion() {
        assert_eq!(SyncStrategy::from(SyncModeArg::Live), SyncStrategy::Live);
        assert_eq!(SyncStrategy::from(SyncModeArg::Fetch), SyncStrategy::Fetch);
    }

    #[test]
    fn test_notes_command_debug() {
        let cmd = NotesCommand::Delete {
            account: "alice".to_string(),
            id: NoteId::new(3),
        };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Delete"));
        assert!(debug_str.contains("alice"));
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Show { json: false };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Show"));
    }

    #[test]
    fn test_sync_mode_arg_debug() {
        assert_eq!(format!("{:?}", SyncModeArg::Fetch), "Fetch");
    }
}
