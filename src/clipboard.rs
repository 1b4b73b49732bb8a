//! Clipboard access for the assembled command line.

use anyhow::{Context, Result};

/// Places `text` on the system clipboard.
///
/// Headless environments without a display server will fail here; the
/// caller surfaces that as a normal error instead of skipping silently.
pub fn copy_text(text: &str) -> Result<()> {
    let mut clipboard = arboard::Clipboard::new().context("failed to access clipboard")?;
    clipboard
        .set_text(text.to_string())
        .context("failed to set clipboard text")?;
    Ok(())
}
