//! Conversions between page space, raster pixels and terminal cells.

use crate::document::PageRect;
use crate::view::Rotation;

/// Terminal dimensions as reported by the window-size ioctl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenGeometry {
    pub rows: u32,
    pub cols: u32,
    pub width_px: u32,
    pub height_px: u32,
    pub cell_width: u32,
    pub cell_height: u32,
}

impl ScreenGeometry {
    /// Returns `None` when the terminal does not report pixel dimensions.
    pub fn new(cols: u32, rows: u32, width_px: u32, height_px: u32) -> Option<Self> {
        if width_px == 0 || height_px == 0 || cols == 0 || rows == 0 {
            return None;
        }
        Some(Self {
            rows,
            cols,
            width_px,
            height_px,
            cell_width: (width_px / cols).max(1),
            cell_height: (height_px / rows).max(1),
        })
    }

    /// Pixel area available to page images; the last row holds the status bar.
    pub fn viewport_px(&self) -> (u32, u32) {
        (
            self.width_px,
            self.height_px.saturating_sub(self.cell_height).max(1),
        )
    }

    pub fn status_row(&self) -> u32 {
        self.rows.saturating_sub(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fit {
    pub zoom: f32,
    pub display_width: f32,
    pub display_height: f32,
}

/// Cell rectangle covered by a placed image. Right/bottom are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Placement {
    pub left_col: u32,
    pub top_row: u32,
    pub right_col: u32,
    pub bottom_row: u32,
}

impl Placement {
    pub fn cols(&self) -> u32 {
        self.right_col.saturating_sub(self.left_col)
    }

    pub fn rows(&self) -> u32 {
        self.bottom_row.saturating_sub(self.top_row)
    }
}

pub fn effective_page_size(page_width: f32, page_height: f32, rotation: Rotation) -> (f32, f32) {
    if rotation.swaps_axes() {
        (page_height, page_width)
    } else {
        (page_width, page_height)
    }
}

/// Largest zoom at which the (rotated) page fits inside the screen, preserving aspect ratio.
pub fn fit(
    page_width: f32,
    page_height: f32,
    screen_width_px: u32,
    screen_height_px: u32,
    rotation: Rotation,
) -> Fit {
    let (width, height) = effective_page_size(page_width, page_height, rotation);
    if width <= 0.0 || height <= 0.0 {
        return Fit {
            zoom: 1.0,
            display_width: 0.0,
            display_height: 0.0,
        };
    }
    let x_factor = screen_width_px as f32 / width;
    let y_factor = screen_height_px as f32 / height;
    let zoom = x_factor.min(y_factor);
    Fit {
        zoom,
        display_width: zoom * width,
        display_height: zoom * height,
    }
}

/// Centers an image of the given pixel size inside the screen.
pub fn place(
    display_width_px: u32,
    display_height_px: u32,
    screen_width_px: u32,
    screen_height_px: u32,
    cell_width_px: u32,
    cell_height_px: u32,
) -> Placement {
    let cell_width = cell_width_px.max(1);
    let cell_height = cell_height_px.max(1);
    let x_offset = screen_width_px.saturating_sub(display_width_px) / 2;
    let y_offset = screen_height_px.saturating_sub(display_height_px) / 2;
    let left_col = x_offset / cell_width;
    let top_row = y_offset / cell_height;
    Placement {
        left_col,
        top_row,
        right_col: left_col + display_width_px / cell_width,
        bottom_row: top_row + display_height_px / cell_height,
    }
}

/// Pixel window `(x, y, width, height)` of `clip` inside a raster of the whole
/// `page` rendered at `zoom` and `rotation`.
pub fn clip_in_raster(
    clip: &PageRect,
    page: &PageRect,
    zoom: f32,
    rotation: Rotation,
) -> (u32, u32, u32, u32) {
    let clip = clip.intersect(page);
    let (w, h) = (page.width(), page.height());
    let (x0, y0) = (clip.x0 - page.x0, clip.y0 - page.y0);
    let (x1, y1) = (clip.x1 - page.x0, clip.y1 - page.y0);
    let rect = match rotation {
        Rotation::Deg0 => PageRect::new(x0, y0, x1, y1),
        Rotation::Deg90 => PageRect::new(h - y1, x0, h - y0, x1),
        Rotation::Deg180 => PageRect::new(w - x1, h - y1, w - x0, h - y0),
        Rotation::Deg270 => PageRect::new(y0, w - x1, y1, w - x0),
    };
    let px = |v: f32| (v * zoom).round().max(0.0) as u32;
    (
        px(rect.x0),
        px(rect.y0),
        px(rect.width()).max(1),
        px(rect.height()).max(1),
    )
}

/// Maps between terminal cells and unrotated page coordinates for one placed page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageTransform {
    pub zoom: f32,
    pub rotation: Rotation,
    /// Region of the page that was rasterized (the crop box, or the full page).
    pub source: PageRect,
    pub placement: Placement,
    pub cell_width: u32,
    pub cell_height: u32,
}

impl PageTransform {
    /// Page-space point under the top-left corner of a cell.
    pub fn cell_to_page(&self, col: u32, row: u32) -> (f32, f32) {
        let dx = (col as f32 - self.placement.left_col as f32) * self.cell_width as f32;
        let dy = (row as f32 - self.placement.top_row as f32) * self.cell_height as f32;
        let zoom = if self.zoom > 0.0 { self.zoom } else { 1.0 };
        let (rx, ry) = (dx / zoom, dy / zoom);
        let w = self.source.width();
        let h = self.source.height();
        let (x, y) = match self.rotation {
            Rotation::Deg0 => (rx, ry),
            Rotation::Deg90 => (ry, h - rx),
            Rotation::Deg180 => (w - rx, h - ry),
            Rotation::Deg270 => (w - ry, rx),
        };
        (x + self.source.x0, y + self.source.y0)
    }

    /// Cell containing the given page-space point.
    pub fn page_to_cell(&self, x: f32, y: f32) -> (i64, i64) {
        let w = self.source.width();
        let h = self.source.height();
        let (px, py) = (x - self.source.x0, y - self.source.y0);
        let (rx, ry) = match self.rotation {
            Rotation::Deg0 => (px, py),
            Rotation::Deg90 => (h - py, px),
            Rotation::Deg180 => (w - px, h - py),
            Rotation::Deg270 => (py, w - px),
        };
        let col = (rx * self.zoom / self.cell_width.max(1) as f32).floor() as i64;
        let row = (ry * self.zoom / self.cell_height.max(1) as f32).floor() as i64;
        (
            col + self.placement.left_col as i64,
            row + self.placement.top_row as i64,
        )
    }

    /// Page-space rectangle covered by the cells `[left, right) x [top, bottom)`.
    pub fn cells_to_page_rect(&self, left: u32, top: u32, right: u32, bottom: u32) -> PageRect {
        let (ax, ay) = self.cell_to_page(left, top);
        let (bx, by) = self.cell_to_page(right, bottom);
        PageRect::new(ax, ay, bx, by).intersect(&self.source)
    }
}
