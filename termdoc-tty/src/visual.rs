use termdoc_core::{PageRect, PageTransform, Placement};

/// Cell-granular rectangular selection over a placed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisualSelection {
    bounds: Placement,
    row: u32,
    anchor: Option<u32>,
    left: u32,
    right: u32,
}

impl VisualSelection {
    /// Starts on the top row with the full page width selected.
    pub fn new(bounds: Placement) -> Self {
        Self {
            bounds,
            row: bounds.top_row,
            anchor: None,
            left: bounds.left_col,
            right: bounds.right_col.max(bounds.left_col + 1),
        }
    }

    pub fn row(&self) -> u32 {
        self.row
    }

    pub fn anchor(&self) -> Option<u32> {
        self.anchor
    }

    /// Left (inclusive) and right (exclusive) columns.
    pub fn columns(&self) -> (u32, u32) {
        (self.left, self.right)
    }

    /// Top (inclusive) and bottom (exclusive) rows.
    pub fn rows(&self) -> (u32, u32) {
        match self.anchor {
            Some(anchor) => (anchor.min(self.row), anchor.max(self.row) + 1),
            None => (self.row, self.row + 1),
        }
    }

    pub fn move_row(&mut self, delta: isize) {
        let last = self.bounds.bottom_row.saturating_sub(1).max(self.bounds.top_row);
        self.row = shift(self.row, delta).clamp(self.bounds.top_row, last);
    }

    /// A sticky anchor makes row movement extend the selection instead of moving it.
    pub fn toggle_anchor(&mut self) {
        self.anchor = match self.anchor {
            Some(_) => None,
            None => Some(self.row),
        };
    }

    pub fn move_left(&mut self, delta: isize) {
        self.left = shift(self.left, delta).clamp(self.bounds.left_col, self.right - 1);
    }

    pub fn move_right(&mut self, delta: isize) {
        let max = self.bounds.right_col.max(self.left + 1);
        self.right = shift(self.right, delta).clamp(self.left + 1, max);
    }

    pub fn page_rect(&self, transform: &PageTransform) -> PageRect {
        let (top, bottom) = self.rows();
        transform.cells_to_page_rect(self.left, top, self.right, bottom)
    }
}

fn shift(value: u32, delta: isize) -> u32 {
    let shifted = value as i64 + delta as i64;
    shifted.clamp(0, u32::MAX as i64) as u32
}
