//! Interactive shell over a [`NotesApp`].
//!
//! Each line is one command. After every command the surface is rendered
//! again, so the output reads as a sequence of screens.

use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::app::NotesApp;
use crate::error::Result;
use crate::gateway::CreateOutcome;
use crate::note::NoteId;
use crate::surface::Surface;

const HELP: &str = "\
Commands:
  login <account>   Sign in
  logout            Sign out
  whoami            Show the signed-in account
  add <text>        Save a note
  type <text>       Put text in the input without saving
  submit            Save the input as a note
  rm <id>           Delete a note
  ls                Show the notes screen again
  dismiss           Clear the current message
  help              Show this help
  quit              Leave the shell
";

/// A parsed shell line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    /// `login <account>`
    Login(String),
    /// `logout`
    Logout,
    /// `whoami`
    Whoami,
    /// `add <text>`
    Add(String),
    /// `type <text>`
    Type(String),
    /// `submit`
    Submit,
    /// `rm <id>`
    Remove(NoteId),
    /// `ls`
    List,
    /// `dismiss`
    Dismiss,
    /// `help`
    Help,
    /// `quit`
    Quit,
}

/// Why a shell line could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The first word is not a command.
    #[error("unknown command `{0}`, type `help` for a list")]
    Unknown(String),

    /// A command was given without its argument.
    #[error("`{command}` needs {what}")]
    MissingArgument {
        /// The command.
        command: &'static str,
        /// What was expected.
        what: &'static str,
    },

    /// The argument to `rm` is not a number.
    #[error("`{0}` is not a note id")]
    BadId(String),
}

impl ShellCommand {
    /// Parse one line. Blank lines parse to `None`.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] for unknown commands and missing or bad
    /// arguments.
    pub fn parse(line: &str) -> std::result::Result<Option<Self>, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(w, r)| (w, r.trim()));

        let command = match word.to_ascii_lowercase().as_str() {
            "login" => Self::Login(required("login", "an account name", rest)?),
            "logout" => Self::Logout,
            "whoami" => Self::Whoami,
            // Blank text is passed through; the gateway skips it
            "add" => Self::Add(rest.to_string()),
            "type" => Self::Type(rest.to_string()),
            "submit" => Self::Submit,
            "rm" | "delete" => {
                let raw = required("rm", "a note id", rest)?;
                let id = raw.parse().map_err(|_| ParseError::BadId(raw))?;
                Self::Remove(id)
            }
            "ls" | "list" => Self::List,
            "dismiss" => Self::Dismiss,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(ParseError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

fn required(
    command: &'static str,
    what: &'static str,
    rest: &str,
) -> std::result::Result<String, ParseError> {
    if rest.is_empty() {
        Err(ParseError::MissingArgument { command, what })
    } else {
        Ok(rest.to_string())
    }
}

/// Run the shell until `quit` or end of input.
///
/// # Errors
///
/// Returns an error only if reading input or writing output fails. Failed
/// commands are shown on screen and the shell keeps going.
pub async fn run_shell<R, W>(app: &mut NotesApp, input: R, mut output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    settle(app).await;
    output.write_all(app.render().as_bytes()).await?;

    loop {
        output.write_all(b"> ").await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let command = match ShellCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                output.write_all(format!("{e}\n").as_bytes()).await?;
                continue;
            }
        };

        match command {
            ShellCommand::Quit => break,
            ShellCommand::Help => {
                output.write_all(HELP.as_bytes()).await?;
                continue;
            }
            ShellCommand::Whoami => {
                app.pump();
                let text = match app.session() {
                    Some(session) => format!(
                        "{} ({} via {})\n",
                        session.label(),
                        session.uid,
                        app.provider_name()
                    ),
                    None => "Not signed in\n".to_string(),
                };
                output.write_all(text.as_bytes()).await?;
                continue;
            }
            command => execute(app, command).await,
        }
        output.write_all(app.render().as_bytes()).await?;
    }

    output.flush().await?;
    Ok(())
}

// Failures already show up as notices or the error screen
async fn execute(app: &mut NotesApp, command: ShellCommand) {
    let result = match command {
        ShellCommand::Login(account) => match app.sign_in(&account).await {
            Ok(()) => {
                settle(app).await;
                Ok(())
            }
            Err(e) => Err(e),
        },
        ShellCommand::Logout => app.sign_out().await,
        ShellCommand::Add(text) => {
            app.set_draft(text);
            submit(app).await
        }
        ShellCommand::Type(text) => {
            app.set_draft(text);
            Ok(())
        }
        ShellCommand::Submit => submit(app).await,
        ShellCommand::Remove(id) => match app.delete(id).await {
            Ok(()) => {
                wait_briefly(app, |s| s.notes().iter().all(|n| n.id != id)).await;
                Ok(())
            }
            Err(e) => Err(e),
        },
        ShellCommand::List => {
            app.pump();
            Ok(())
        }
        ShellCommand::Dismiss => {
            app.dismiss_notice();
            Ok(())
        }
        ShellCommand::Whoami | ShellCommand::Help | ShellCommand::Quit => Ok(()),
    };
    if let Err(e) = result {
        debug!(error = %e, "Shell command failed");
    }
}

async fn submit(app: &mut NotesApp) -> Result<()> {
    match app.submit().await? {
        CreateOutcome::Created(note) => {
            wait_briefly(app, |s| s.notes().iter().any(|n| n.id == note.id)).await;
        }
        CreateOutcome::Skipped(reason) => debug!(?reason, "Nothing to save"),
    }
    Ok(())
}

async fn settle(app: &mut NotesApp) {
    if let Err(e) = app.settle().await {
        debug!(error = %e, "Screen did not settle");
    }
}

// The list catches up asynchronously; give it a moment before redrawing
async fn wait_briefly(app: &mut NotesApp, pred: impl Fn(&Surface) -> bool) {
    if let Err(e) = app.wait_for(pred, Duration::from_secs(2)).await {
        debug!(error = %e, "List did not catch up before redraw");
    }
}
