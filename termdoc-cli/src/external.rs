//! Bridges to programs outside the terminal: browser, system viewer, editor,
//! clipboard. Every failure comes back as a `ViewerError::External`.

use std::path::Path;
use std::process::Command;

use anyhow::Result;
use termdoc_core::ViewerError;
use tracing::{debug, info};
use url::Url;

fn external(program: &str, reason: impl ToString) -> anyhow::Error {
    ViewerError::External {
        program: program.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

/// Only web and mail links are handed to the browser.
pub fn checked_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|err| external("browser", err))?;
    match url.scheme() {
        "http" | "https" | "mailto" => Ok(url),
        other => Err(external("browser", format!("refusing {other}: link"))),
    }
}

pub fn open_url(raw: &str) -> Result<()> {
    let url = checked_url(raw)?;
    info!(%url, "opening link");
    open::that(url.as_str()).map_err(|err| external("browser", err))
}

pub fn open_in_gui(path: &Path) -> Result<()> {
    info!(path = %path.display(), "opening in system viewer");
    open::that(path).map_err(|err| external("open", err))
}

pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let mut clipboard = arboard::Clipboard::new().map_err(|err| external("clipboard", err))?;
    clipboard
        .set_text(text.to_owned())
        .map_err(|err| external("clipboard", err))?;
    debug!(chars = text.chars().count(), "copied selection");
    Ok(())
}

/// Keys sent to the editor: insert a citation for `label` and return to normal mode.
pub fn note_keys(citation_key: &str, label: &str) -> String {
    format!("<C-\\><C-N>a[@{citation_key}, p. {label}]<Esc>")
}

/// Inserts a citation into the editor listening on `address`.
pub fn send_note(address: &str, citation_key: Option<&str>, label: &str) -> Result<()> {
    let Some(key) = citation_key else {
        return Err(external("nvim", "no citation key for this document"));
    };
    let output = Command::new("nvim")
        .arg("--server")
        .arg(address)
        .arg("--remote-send")
        .arg(note_keys(key, label))
        .output()
        .map_err(|err| external("nvim", err))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(external("nvim", stderr.trim()));
    }
    info!(address, key, label, "sent note");
    Ok(())
}
