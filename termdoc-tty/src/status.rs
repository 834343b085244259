use std::io::{self, Write};

use crossterm::cursor::MoveTo;
use crossterm::queue;
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};
use termdoc_core::{CropMode, DocumentInstance};

/// One-line summary of the active buffer shown on the bottom row.
pub fn format_document_status(doc: &DocumentInstance, index: usize, total: usize) -> String {
    let name = doc
        .info
        .path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("<unknown>");
    let mut status = String::new();
    if total > 1 {
        status.push_str(&format!("[{}/{}] ", index + 1, total));
    }
    status.push_str(&format!(
        "{} | p. {} ({}/{})",
        name,
        doc.current_label(),
        doc.current_page() + 1,
        doc.page_count()
    ));

    let view = doc.view();
    if view.rotation.degrees() != 0 {
        status.push_str(&format!(" | {}°", view.rotation.degrees()));
    }
    if view.crop != CropMode::None {
        status.push_str(" | ");
        status.push_str(view.crop.label());
    }
    let flags: Vec<&str> = [
        (view.alpha, "alpha"),
        (view.invert, "invert"),
        (view.tint, "tint"),
    ]
    .into_iter()
    .filter_map(|(on, name)| on.then_some(name))
    .collect();
    if !flags.is_empty() {
        status.push_str(" | ");
        status.push_str(&flags.join(" "));
    }
    if let Some(key) = doc.citation_key() {
        status.push_str(&format!(" | @{key}"));
    }
    status
}

pub fn combine_status(base: Option<String>, pending_input: Option<&str>) -> Option<String> {
    match (base, pending_input.filter(|s| !s.is_empty())) {
        (Some(mut base), Some(pending)) => {
            base.push_str(" | ");
            base.push_str(pending);
            Some(base)
        }
        (Some(base), None) => Some(base),
        (None, Some(pending)) => Some(pending.to_string()),
        (None, None) => None,
    }
}

/// Cuts `text` to `width` characters, ending in `...` when shortened, and pads
/// the remainder with spaces.
pub fn truncate_with_ellipsis(text: &str, width: usize) -> String {
    let len = text.chars().count();
    let mut out: String = if len > width {
        if width <= 3 {
            text.chars().take(width).collect()
        } else {
            let mut truncated: String = text.chars().take(width - 3).collect();
            truncated.push_str("...");
            truncated
        }
    } else {
        text.to_string()
    };
    let used = out.chars().count();
    if used < width {
        out.push_str(&" ".repeat(width - used));
    }
    out
}

/// Replaces the contents of `row` with `label`, clipped to `cols` cells.
pub fn write_status_line<W: Write>(writer: &mut W, row: u32, cols: u32, label: &str) -> io::Result<()> {
    queue!(
        writer,
        MoveTo(0, row as u16),
        Clear(ClearType::CurrentLine),
        Print(truncate_with_ellipsis(label, cols.saturating_sub(1) as usize))
    )?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::path::PathBuf;
    use std::sync::Arc;
    use termdoc_core::{
        document_id_for_bytes, DocumentBackend, DocumentInfo, PageRect, PersistedDocumentState,
        RenderImage, RenderRequest,
    };

    struct Pages(DocumentInfo);

    impl DocumentBackend for Pages {
        fn info(&self) -> &DocumentInfo {
            &self.0
        }

        fn page_bounds(&self, _page_index: usize) -> Result<PageRect> {
            Ok(PageRect::from_size(100.0, 100.0))
        }

        fn rasterize(&self, _request: RenderRequest) -> Result<RenderImage> {
            anyhow::bail!("not rendered in status tests")
        }
    }

    fn doc() -> DocumentInstance {
        let info = DocumentInfo {
            id: document_id_for_bytes(b"status"),
            path: PathBuf::from("/papers/paper.pdf"),
            page_count: 12,
            title: None,
        };
        let state = PersistedDocumentState {
            current_page: 4,
            ..PersistedDocumentState::default()
        };
        DocumentInstance::new(info.clone(), Arc::new(Pages(info)), state)
    }

    #[test]
    fn status_names_page_label_and_position() {
        let doc = doc();
        let status = format_document_status(&doc, 0, 1);
        assert!(status.starts_with("paper.pdf | p. "));
        assert!(status.contains("(5/12)"));
    }

    #[test]
    fn status_lists_buffer_and_view_flags() {
        let mut doc = doc();
        doc.rotate(1);
        doc.toggle_invert();
        doc.set_citation_key(Some("knuth84".into()));
        let status = format_document_status(&doc, 1, 3);
        assert!(status.starts_with("[2/3] paper.pdf"));
        assert!(status.contains("| 90°"));
        assert!(status.contains("| invert"));
        assert!(status.ends_with("@knuth84"));
    }

    #[test]
    fn pending_keys_are_appended() {
        assert_eq!(
            combine_status(Some("doc".into()), Some("12")).as_deref(),
            Some("doc | 12")
        );
        assert_eq!(combine_status(Some("doc".into()), Some("")).as_deref(), Some("doc"));
        assert_eq!(combine_status(None, None), None);
    }

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_with_ellipsis("abcdefgh", 6), "abc...");
        assert_eq!(truncate_with_ellipsis("ab", 4), "ab  ");
        assert_eq!(truncate_with_ellipsis("é°é°é°", 5), "é°...");
        assert_eq!(truncate_with_ellipsis("abcdef", 2), "ab");
    }

    #[test]
    fn status_line_is_clipped_to_width() {
        let mut out = Vec::new();
        write_status_line(&mut out, 3, 8, "a long status line").unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("\x1b[4;1H"));
        assert!(text.ends_with("a lo..."));
    }
}
