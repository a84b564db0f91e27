//! Text rendering of the surface.
//!
//! Two screens: the sign-in bar, always shown, and the notes screen, shown
//! only while signed in.

use std::fmt;

use crate::session::Session;
use crate::surface::{Screen, Surface};

/// Render the whole surface.
#[must_use]
pub fn render(surface: &Surface) -> String {
    View(surface).to_string()
}

#[derive(Debug)]
struct View<'a>(&'a Surface);

impl fmt::Display for View<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let surface = self.0;
        sign_in_bar(f, surface)?;

        match surface.screen() {
            Screen::Unauthenticated { .. } => {}
            Screen::Loading { .. } => {
                editor(f, surface)?;
                writeln!(f, "Loading notes...")?;
            }
            Screen::Failed { reason, .. } => {
                editor(f, surface)?;
                writeln!(f, "Could not load notes: {reason}")?;
            }
            Screen::Ready { notes, .. } => {
                editor(f, surface)?;
                if notes.is_empty() {
                    writeln!(f, "No notes yet.")?;
                }
                for note in notes {
                    writeln!(f, "  [{}] {}  ({})", note.id, note.text, note.created_at)?;
                }
            }
        }

        if let Some(notice) = surface.notice() {
            writeln!(f, "! {notice} (type `dismiss` to clear)")?;
        }
        Ok(())
    }
}

fn sign_in_bar(f: &mut fmt::Formatter<'_>, surface: &Surface) -> fmt::Result {
    let busy = if surface.is_busy() { " ..." } else { "" };
    match surface.screen() {
        Screen::Unauthenticated { pending: true } => writeln!(f, "Checking sign-in{busy}"),
        Screen::Unauthenticated { pending: false } => {
            writeln!(f, "Not signed in. Use `login <account>` to sign in.{busy}")
        }
        screen => {
            let label = screen.session().map_or("", Session::label);
            writeln!(f, "Signed in as {label}. Use `logout` to sign out.{busy}")
        }
    }
}

fn editor(f: &mut fmt::Formatter<'_>, surface: &Surface) -> fmt::Result {
    if surface.draft().is_empty() {
        writeln!(f, "New note: (empty)")
    } else {
        writeln!(f, "New note: {}", surface.draft())
    }
}
