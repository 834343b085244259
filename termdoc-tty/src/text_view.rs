use termdoc_core::wrap_text;

/// Widest text column shown, whatever the terminal width.
pub const MAX_TEXT_WIDTH: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextScroll {
    Moved,
    Unchanged,
    NextPage,
    PreviousPage,
}

/// Page text shown one screenful ("window") at a time.
#[derive(Debug, Clone)]
pub struct TextView {
    page: usize,
    lines: Vec<String>,
    width: usize,
    height: usize,
    window: usize,
}

impl TextView {
    pub fn new(page: usize, text: &str, cols: u32, rows: u32) -> Self {
        let width = (cols as usize).saturating_sub(2).clamp(1, MAX_TEXT_WIDTH);
        Self {
            page,
            lines: wrap_text(text, width),
            width,
            height: (rows as usize).max(1),
            window: 0,
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn last_window(&self) -> usize {
        self.lines.len().saturating_sub(1) / self.height
    }

    /// Scrolls by whole windows. Running off either end asks for a page turn
    /// and leaves the view where it was.
    pub fn scroll(&mut self, delta: isize) -> TextScroll {
        let target = self.window as isize + delta;
        if target < 0 {
            return TextScroll::PreviousPage;
        }
        let target = target as usize;
        if target > self.last_window() {
            return TextScroll::NextPage;
        }
        if target == self.window {
            return TextScroll::Unchanged;
        }
        self.window = target;
        TextScroll::Moved
    }

    pub fn visible(&self) -> &[String] {
        let start = (self.window * self.height).min(self.lines.len());
        let end = (start + self.height).min(self.lines.len());
        &self.lines[start..end]
    }
}
