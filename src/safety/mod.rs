//! Confirmation gate for destructive operations.
//!
//! The delete command asks before removing each key unless prompting is
//! disabled. The question is answered through a [`ConfirmationPort`] so the
//! delete policy never touches a terminal directly.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};

// ---------------------------------------------------------------------------
// ConfirmationPort trait (for testability)
// ---------------------------------------------------------------------------

/// Asks the user a yes/no question.
///
/// The default implementation ([`StdioConfirmationPort`]) uses stdin/stdout.
/// Tests can provide custom implementations to avoid blocking on user input.
pub trait ConfirmationPort: Send + Sync {
    /// Show `message` and return whether the user accepted.
    fn ask(&self, message: &str) -> Result<bool>;
}

/// Default confirmation port using stdin/stdout.
///
/// Only `y` or `yes` (case-insensitive) accepts; anything else, including
/// end of input, declines.
pub struct StdioConfirmationPort;

impl ConfirmationPort for StdioConfirmationPort {
    fn ask(&self, message: &str) -> Result<bool> {
        let mut stdout = std::io::stdout().lock();
        write!(stdout, "{message} [y/N]: ").context("failed to write prompt")?;
        stdout.flush()?;
        drop(stdout);

        let mut input = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut input)
            .context("failed to read confirmation")?;
        Ok(is_affirmative(&input))
    }
}

pub(crate) fn is_affirmative(input: &str) -> bool {
    matches!(input.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Prompt shown before deleting `key`.
pub fn delete_prompt(key: &str) -> String {
    format!("Are you sure you want to delete -> {key}?")
}
