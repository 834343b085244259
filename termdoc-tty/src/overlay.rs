//! Modal list windows: table of contents, metadata and links.

use termdoc_core::{LinkAction, LinkDefinition, OutlineItem};

use crate::input::OverlayKind;

#[derive(Debug, Clone, PartialEq)]
pub enum EntryTarget {
    None,
    Page(usize),
    Uri(String),
    /// Something the viewer cannot follow; shown as a message.
    Other(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayEntry {
    pub text: String,
    pub depth: usize,
    pub target: EntryTarget,
}

/// What selecting an entry asks the event loop to do.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayOutcome {
    Jump(usize),
    OpenUri(String),
    Message(String),
    Stay,
}

#[derive(Debug, Clone)]
pub struct ListOverlay {
    kind: OverlayKind,
    entries: Vec<OverlayEntry>,
    selected: usize,
    scroll_offset: usize,
}

impl ListOverlay {
    pub fn new(kind: OverlayKind, entries: Vec<OverlayEntry>, selected: usize) -> Self {
        let selected = selected.min(entries.len().saturating_sub(1));
        Self {
            kind,
            entries,
            selected,
            scroll_offset: 0,
        }
    }

    /// Starts on the chapter that contains `current_page`.
    pub fn table_of_contents(outline: &[OutlineItem], current_page: usize) -> Self {
        let selected = outline
            .iter()
            .rposition(|item| item.page_index <= current_page)
            .unwrap_or(0);
        let entries = outline
            .iter()
            .map(|item| OverlayEntry {
                text: item.title.clone(),
                depth: item.depth,
                target: EntryTarget::Page(item.page_index),
            })
            .collect();
        Self::new(OverlayKind::TableOfContents, entries, selected)
    }

    pub fn metadata(pairs: &[(String, String)]) -> Self {
        let width = pairs.iter().map(|(k, _)| k.chars().count()).max().unwrap_or(0);
        let entries = pairs
            .iter()
            .map(|(key, value)| OverlayEntry {
                text: format!("{key:<width$}  {value}"),
                depth: 0,
                target: EntryTarget::None,
            })
            .collect();
        Self::new(OverlayKind::Metadata, entries, 0)
    }

    /// `label` turns a physical page into the label shown to the user.
    pub fn links(links: &[LinkDefinition], label: impl Fn(usize) -> String) -> Self {
        let entries = links
            .iter()
            .map(|link| match &link.action {
                LinkAction::GoTo { page } => OverlayEntry {
                    text: format!("page {}", label(*page)),
                    depth: 0,
                    target: EntryTarget::Page(*page),
                },
                LinkAction::Uri { uri } => OverlayEntry {
                    text: uri.clone(),
                    depth: 0,
                    target: EntryTarget::Uri(uri.clone()),
                },
                LinkAction::Launch { target } => OverlayEntry {
                    text: format!("launch {target}"),
                    depth: 0,
                    target: EntryTarget::Other(format!("Cannot launch {target}")),
                },
                LinkAction::External { target } => OverlayEntry {
                    text: format!("external {target}"),
                    depth: 0,
                    target: EntryTarget::Other(format!("Cannot follow {target}")),
                },
                LinkAction::None => OverlayEntry {
                    text: "(no action)".into(),
                    depth: 0,
                    target: EntryTarget::None,
                },
            })
            .collect();
        Self::new(OverlayKind::Links, entries, 0)
    }

    pub fn kind(&self) -> OverlayKind {
        self.kind
    }

    pub fn entries(&self) -> &[OverlayEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    pub fn selected_entry(&self) -> Option<&OverlayEntry> {
        self.entries.get(self.selected)
    }

    pub fn move_selection(&mut self, delta: isize) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let last = self.entries.len() - 1;
        let next = if delta.is_negative() {
            self.selected.saturating_sub(delta.unsigned_abs())
        } else {
            self.selected.saturating_add(delta as usize).min(last)
        };
        if next != self.selected {
            self.selected = next;
            true
        } else {
            false
        }
    }

    /// Keeps the selected row inside the `viewport_height` rows that are drawn.
    pub fn ensure_visible(&mut self, viewport_height: usize) {
        if viewport_height == 0 || self.entries.is_empty() {
            self.scroll_offset = 0;
            return;
        }
        let max_offset = self.entries.len().saturating_sub(viewport_height);
        if self.scroll_offset > max_offset {
            self.scroll_offset = max_offset;
        }
        if self.selected < self.scroll_offset {
            self.scroll_offset = self.selected;
        } else if self.selected >= self.scroll_offset + viewport_height {
            self.scroll_offset = self.selected + 1 - viewport_height;
        }
    }

    pub fn visible(&self, viewport_height: usize) -> impl Iterator<Item = (usize, &OverlayEntry)> {
        self.entries
            .iter()
            .enumerate()
            .skip(self.scroll_offset)
            .take(viewport_height)
    }

    pub fn activate(&self) -> OverlayOutcome {
        match self.selected_entry().map(|entry| &entry.target) {
            Some(EntryTarget::Page(page)) => OverlayOutcome::Jump(*page),
            Some(EntryTarget::Uri(uri)) => OverlayOutcome::OpenUri(uri.clone()),
            Some(EntryTarget::Other(message)) => OverlayOutcome::Message(message.clone()),
            Some(EntryTarget::None) | None => OverlayOutcome::Stay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use termdoc_core::PageRect;

    fn outline(starts: &[usize]) -> Vec<OutlineItem> {
        starts
            .iter()
            .enumerate()
            .map(|(idx, &page_index)| OutlineItem {
                title: format!("Section {idx}"),
                page_index,
                depth: idx % 2,
            })
            .collect()
    }

    #[test]
    fn toc_selects_chapter_of_current_page() {
        let toc = ListOverlay::table_of_contents(&outline(&[0, 5, 9, 20]), 12);
        assert_eq!(toc.selected(), 2);
        assert_eq!(toc.activate(), OverlayOutcome::Jump(9));
    }

    #[test]
    fn selection_is_clamped() {
        let mut toc = ListOverlay::table_of_contents(&outline(&[0, 5, 9]), 0);
        assert!(!toc.move_selection(-4));
        assert!(toc.move_selection(10));
        assert_eq!(toc.selected(), 2);
    }

    #[test]
    fn scroll_window_follows_selection() {
        let mut toc = ListOverlay::table_of_contents(&outline(&(0..30).collect::<Vec<_>>()), 0);
        toc.ensure_visible(5);
        assert_eq!(toc.scroll_offset(), 0);
        toc.move_selection(7);
        toc.ensure_visible(5);
        assert_eq!(toc.scroll_offset(), 3);
        assert!(toc.visible(5).any(|(idx, _)| idx == toc.selected()));
        toc.move_selection(-6);
        toc.ensure_visible(5);
        assert_eq!(toc.scroll_offset(), 1);
        toc.move_selection(100);
        toc.ensure_visible(5);
        assert_eq!(toc.scroll_offset(), 25);
    }

    #[test]
    fn metadata_aligns_keys_and_does_nothing_on_enter() {
        let meta = ListOverlay::metadata(&[
            ("Title".into(), "Book".into()),
            ("Author".into(), "Someone".into()),
        ]);
        assert_eq!(meta.entries()[0].text, "Title   Book");
        assert_eq!(meta.activate(), OverlayOutcome::Stay);
    }

    #[test]
    fn links_map_actions_to_outcomes() {
        let rect = PageRect::from_size(1.0, 1.0);
        let mut links = ListOverlay::links(
            &[
                LinkDefinition {
                    rect,
                    action: LinkAction::GoTo { page: 4 },
                },
                LinkDefinition {
                    rect,
                    action: LinkAction::Uri {
                        uri: "https://example.org".into(),
                    },
                },
                LinkDefinition {
                    rect,
                    action: LinkAction::Launch {
                        target: "run.sh".into(),
                    },
                },
            ],
            |page| format!("{}", page + 1),
        );
        assert_eq!(links.entries()[0].text, "page 5");
        assert_eq!(links.activate(), OverlayOutcome::Jump(4));
        links.move_selection(1);
        assert_eq!(
            links.activate(),
            OverlayOutcome::OpenUri("https://example.org".into())
        );
        links.move_selection(1);
        assert!(matches!(links.activate(), OverlayOutcome::Message(_)));
    }
}
