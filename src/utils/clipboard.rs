//! Clipboard copy.
//!
//! The system clipboard is used when one can be opened. Otherwise the entry
//! goes through the OSC 52 terminal escape sequence, which most modern
//! terminal emulators (kitty, WezTerm, iTerm2, foot, tmux with
//! `set-clipboard on`) honor, including over SSH.

use base64::Engine;
use std::io::{self, IsTerminal, Write};
use thiserror::Error;

/// How the text reached the clipboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMethod {
    System,
    /// OSC 52; terminals without support drop it silently
    Terminal,
}

#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("No system clipboard ({0}) and standard error is not a terminal")]
    Unavailable(String),

    #[error("Failed to write to the terminal: {0}")]
    Io(#[from] io::Error),
}

/// The escape sequence that puts `text` on the clipboard
pub fn osc52_sequence(text: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(text.as_bytes());
    format!("\x1b]52;c;{}\x07", encoded)
}

/// Write the copy sequence for `text` to `out`
pub fn copy_to<W: Write + ?Sized>(out: &mut W, text: &str) -> io::Result<()> {
    out.write_all(osc52_sequence(text).as_bytes())?;
    out.flush()
}

fn copy_via(
    text: &str,
    system: impl FnOnce(&str) -> Result<(), String>,
    terminal: Option<&mut dyn Write>,
) -> Result<CopyMethod, ClipboardError> {
    let reason = match system(text) {
        Ok(()) => return Ok(CopyMethod::System),
        Err(reason) => reason,
    };
    tracing::debug!("System clipboard unavailable: {}", reason);

    match terminal {
        Some(out) => {
            copy_to(out, text)?;
            Ok(CopyMethod::Terminal)
        }
        None => Err(ClipboardError::Unavailable(reason)),
    }
}

fn set_system_clipboard(text: &str) -> Result<(), String> {
    arboard::Clipboard::new()
        .and_then(|mut clipboard| clipboard.set_text(text.to_string()))
        .map_err(|e| e.to_string())
}

/// Copy `text` to the system clipboard, falling back to the terminal on
/// standard error so standard output stays clean when it is piped.
pub fn copy(text: &str) -> Result<CopyMethod, ClipboardError> {
    let mut stderr = io::stderr().lock();
    let terminal: Option<&mut dyn Write> = if stderr.is_terminal() { Some(&mut stderr) } else { None };
    copy_via(text, set_system_clipboard, terminal)
}
