use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::labels::PageLabelRange;
use crate::view::Rotation;

pub type DocumentId = Uuid;

const DOCUMENT_NAMESPACE: Uuid = Uuid::from_u128(0x7b2c58f1_99c6_5a5c_a6ea_50f9e7f1cc20);

/// Identifies a document by the bytes it contains, so renamed or moved copies
/// share persisted view state.
pub fn document_id_for_file(path: &Path) -> Result<DocumentId> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {:?}", path))?;
    Ok(document_id_for_bytes(&bytes))
}

pub fn document_id_for_bytes(bytes: &[u8]) -> DocumentId {
    Uuid::new_v5(&DOCUMENT_NAMESPACE, bytes)
}

#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub id: DocumentId,
    pub path: PathBuf,
    pub page_count: usize,
    pub title: Option<String>,
}

/// Axis-aligned rectangle in page space (points, origin at the top-left corner).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PageRect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl PageRect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn from_size(width: f32, height: f32) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn is_empty(&self) -> bool {
        !(self.width() > 0.0 && self.height() > 0.0)
    }

    pub fn union(&self, other: &PageRect) -> PageRect {
        PageRect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    pub fn intersect(&self, other: &PageRect) -> PageRect {
        PageRect {
            x0: self.x0.max(other.x0),
            y0: self.y0.max(other.y0),
            x1: self.x1.min(other.x1).max(self.x0.max(other.x0)),
            y1: self.y1.min(other.y1).max(self.y0.max(other.y0)),
        }
    }

    pub fn padded(&self, amount: f32) -> PageRect {
        PageRect {
            x0: self.x0 - amount,
            y0: self.y0 - amount,
            x1: self.x1 + amount,
            y1: self.y1 + amount,
        }
    }

    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutlineItem {
    pub title: String,
    pub page_index: usize,
    pub depth: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkAction {
    None,
    GoTo { page: usize },
    Uri { uri: String },
    Launch { target: String },
    External { target: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkDefinition {
    pub rect: PageRect,
    pub action: LinkAction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WordBox {
    pub rect: PageRect,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub page_index: usize,
    pub zoom: f32,
    pub rotation: Rotation,
    pub alpha: bool,
    /// Region of the page to keep, in unrotated page space.
    pub clip: Option<PageRect>,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self {
            page_index: 0,
            zoom: 1.0,
            rotation: Rotation::default(),
            alpha: false,
            clip: None,
        }
    }
}

/// Raster produced by the document engine: tightly packed rows of
/// `channels` bytes per pixel (3 = RGB, 4 = RGBA).
#[derive(Debug, Clone)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub pixels: Vec<u8>,
}

impl RenderImage {
    pub fn has_alpha(&self) -> bool {
        self.channels == 4
    }

    pub fn stride(&self) -> usize {
        self.width as usize * self.channels as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PaperSize {
    #[default]
    A4,
    Letter,
    A5,
    Legal,
}

impl PaperSize {
    pub const ALL: [PaperSize; 4] = [
        PaperSize::A4,
        PaperSize::Letter,
        PaperSize::A5,
        PaperSize::Legal,
    ];

    pub fn from_index(index: usize) -> Self {
        Self::ALL[index % Self::ALL.len()]
    }

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|p| *p == self).unwrap_or(0)
    }

    /// Width and height in points.
    pub fn dimensions(self) -> (f32, f32) {
        match self {
            PaperSize::A4 => (595.0, 842.0),
            PaperSize::Letter => (612.0, 792.0),
            PaperSize::A5 => (420.0, 595.0),
            PaperSize::Legal => (612.0, 1008.0),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PaperSize::A4 => "A4",
            PaperSize::Letter => "Letter",
            PaperSize::A5 => "A5",
            PaperSize::Legal => "Legal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    pub paper: PaperSize,
    pub font_size: f32,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            paper: PaperSize::default(),
            font_size: 12.0,
        }
    }
}

/// The document engine. Everything about byte formats lives behind this trait.
pub trait DocumentBackend: Send + Sync {
    fn info(&self) -> &DocumentInfo;

    fn page_count(&self) -> usize {
        self.info().page_count
    }

    fn page_bounds(&self, page_index: usize) -> Result<PageRect>;

    fn table_of_contents(&self) -> Result<Vec<OutlineItem>> {
        Ok(Vec::new())
    }

    fn metadata(&self) -> Result<Vec<(String, String)>> {
        Ok(Vec::new())
    }

    fn rasterize(&self, request: RenderRequest) -> Result<RenderImage>;

    fn word_boxes(&self, _page_index: usize) -> Result<Vec<WordBox>> {
        Ok(Vec::new())
    }

    fn links(&self, _page_index: usize) -> Result<Vec<LinkDefinition>> {
        Ok(Vec::new())
    }

    fn page_label_ranges(&self) -> Result<Vec<PageLabelRange>> {
        Ok(Vec::new())
    }

    /// Re-paginates reflowable documents. Returns the new page count, or `None`
    /// when the format has a fixed layout.
    fn relayout(&self, _layout: Layout) -> Result<Option<usize>> {
        Ok(None)
    }
}

#[async_trait::async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Arc<dyn DocumentBackend>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn document_id_follows_content_not_path() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("a.pdf");
        let second = dir.path().join("b.pdf");
        std::fs::write(&first, b"same bytes").unwrap();
        std::fs::write(&second, b"same bytes").unwrap();

        assert_eq!(
            document_id_for_file(&first).unwrap(),
            document_id_for_file(&second).unwrap()
        );

        std::fs::write(&second, b"other bytes").unwrap();
        assert_ne!(
            document_id_for_file(&first).unwrap(),
            document_id_for_file(&second).unwrap()
        );
    }

    #[test]
    fn page_rect_normalizes_and_intersects() {
        let rect = PageRect::new(10.0, 20.0, 0.0, 5.0);
        assert_eq!(rect, PageRect::new(0.0, 5.0, 10.0, 20.0));

        let other = PageRect::new(5.0, 0.0, 30.0, 10.0);
        let overlap = rect.intersect(&other);
        assert_eq!(overlap, PageRect::new(5.0, 5.0, 10.0, 10.0));

        let disjoint = PageRect::new(50.0, 50.0, 60.0, 60.0);
        assert!(rect.intersect(&disjoint).is_empty());
    }

    #[test]
    fn paper_size_index_wraps() {
        assert_eq!(PaperSize::from_index(5), PaperSize::Letter);
        assert_eq!(PaperSize::Legal.index(), 3);
    }
}
