use std::sync::Arc;

use anyhow::Result;
use tracing::{instrument, warn};

use crate::cache::RenderCache;
use crate::document::{
    DocumentBackend, DocumentInfo, Layout, LinkDefinition, OutlineItem, PageRect, PaperSize,
    RenderRequest,
};
use crate::error::ViewerError;
use crate::geometry::{fit, place, PageTransform, ScreenGeometry};
use crate::labels::{LogicalPages, PageLabelRange};
use crate::pixels::{PostProcess, Rgb};
use crate::state::PersistedDocumentState;
use crate::text::{content_bounds, text_in_rect};
use crate::view::{CropMode, ViewOptions};

const MIN_FONT_SIZE: f32 = 6.0;
const MAX_FONT_SIZE: f32 = 48.0;

/// An open document plus everything the viewer tracks about it.
pub struct DocumentInstance {
    pub info: DocumentInfo,
    pub backend: Arc<dyn DocumentBackend>,
    pub cache: RenderCache,
    page_count: usize,
    current_page: usize,
    previous_page: Option<usize>,
    chapter: Option<usize>,
    first_page_offset: i64,
    citation_key: Option<String>,
    layout: Layout,
    view: ViewOptions,
    outline: Vec<OutlineItem>,
    chapter_starts: Vec<usize>,
    label_ranges: Vec<PageLabelRange>,
    logical: LogicalPages,
}

impl DocumentInstance {
    pub fn new(
        info: DocumentInfo,
        backend: Arc<dyn DocumentBackend>,
        state: PersistedDocumentState,
    ) -> Self {
        let layout = Layout {
            paper: PaperSize::from_index(state.paper_size),
            font_size: state.font_size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE),
        };
        let mut page_count = backend.page_count();
        if layout != Layout::default() {
            match backend.relayout(layout) {
                Ok(Some(count)) => page_count = count,
                Ok(None) => {}
                Err(err) => warn!(?err, path = %info.path.display(), "failed to restore layout"),
            }
        }

        let mut doc = Self {
            info,
            backend,
            cache: RenderCache::new(page_count),
            page_count,
            current_page: 0,
            previous_page: None,
            chapter: None,
            first_page_offset: state.first_page_offset,
            citation_key: state.citation_key.clone(),
            layout,
            view: state.view_options(),
            outline: Vec::new(),
            chapter_starts: Vec::new(),
            label_ranges: Vec::new(),
            logical: LogicalPages::default(),
        };
        doc.reload_structure();
        doc.current_page = doc.clamp_page(state.current_page);
        doc.update_chapter();
        doc
    }

    fn reload_structure(&mut self) {
        self.outline = self.backend.table_of_contents().unwrap_or_else(|err| {
            warn!(?err, path = %self.info.path.display(), "failed to read table of contents");
            Vec::new()
        });
        let mut starts: Vec<usize> = self.outline.iter().map(|item| item.page_index).collect();
        starts.sort_unstable();
        self.chapter_starts = starts;
        self.label_ranges = self.backend.page_label_ranges().unwrap_or_else(|err| {
            warn!(?err, path = %self.info.path.display(), "failed to read page labels");
            Vec::new()
        });
        self.recompute_logical_pages();
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn last_page(&self) -> usize {
        self.page_count.saturating_sub(1)
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn previous_page(&self) -> Option<usize> {
        self.previous_page
    }

    pub fn current_chapter(&self) -> Option<usize> {
        self.chapter
    }

    pub fn view(&self) -> &ViewOptions {
        &self.view
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn outline(&self) -> &[OutlineItem] {
        &self.outline
    }

    pub fn citation_key(&self) -> Option<&str> {
        self.citation_key.as_deref()
    }

    pub fn set_citation_key(&mut self, key: Option<String>) {
        self.citation_key = key;
    }

    pub fn first_page_offset(&self) -> i64 {
        self.first_page_offset
    }

    fn clamp_page(&self, page: usize) -> usize {
        page.min(self.last_page())
    }

    fn update_chapter(&mut self) {
        self.chapter = self
            .outline
            .iter()
            .rposition(|item| item.page_index <= self.current_page);
    }

    /// Clamps into the document and remembers where we came from.
    pub fn goto_physical_page(&mut self, page: usize) -> usize {
        let target = self.clamp_page(page);
        if target != self.current_page {
            self.previous_page = Some(self.current_page);
            self.current_page = target;
            self.update_chapter();
        }
        self.current_page
    }

    pub fn goto_logical_page(&mut self, label: &str) -> usize {
        let physical = self.logical.physical_for(label);
        self.goto_physical_page(physical)
    }

    pub fn next_page(&mut self, count: usize) -> usize {
        self.goto_physical_page(self.current_page.saturating_add(count))
    }

    pub fn prev_page(&mut self, count: usize) -> usize {
        self.goto_physical_page(self.current_page.saturating_sub(count))
    }

    /// Single-level history: going back twice returns to where we started.
    pub fn go_back(&mut self) -> usize {
        match self.previous_page {
            Some(previous) => self.goto_physical_page(previous),
            None => self.current_page,
        }
    }

    pub fn next_chapter_target(&self, count: usize) -> usize {
        let Some(&last) = self.chapter_starts.last() else {
            return self.current_page;
        };
        let mut remaining = count.max(1);
        for &start in &self.chapter_starts {
            if start > self.current_page {
                remaining -= 1;
                if remaining == 0 {
                    return start;
                }
            }
        }
        last
    }

    pub fn prev_chapter_target(&self, count: usize) -> usize {
        let Some(&first) = self.chapter_starts.first() else {
            return self.current_page;
        };
        let mut remaining = count.max(1);
        for &start in self.chapter_starts.iter().rev() {
            if start < self.current_page {
                remaining -= 1;
                if remaining == 0 {
                    return start;
                }
            }
        }
        first
    }

    pub fn next_chapter(&mut self, count: usize) -> usize {
        let target = self.next_chapter_target(count);
        self.goto_physical_page(target)
    }

    pub fn prev_chapter(&mut self, count: usize) -> usize {
        let target = self.prev_chapter_target(count);
        self.goto_physical_page(target)
    }

    /// Must follow anything that changes the page count or the numbering scheme.
    pub fn recompute_logical_pages(&mut self) {
        self.logical =
            LogicalPages::compute(self.page_count, &self.label_ranges, self.first_page_offset);
    }

    pub fn logical_label(&self, physical: usize) -> String {
        self.logical
            .label(physical)
            .map(str::to_string)
            .unwrap_or_else(|| (physical as i64).saturating_add(self.first_page_offset).to_string())
    }

    pub fn current_label(&self) -> String {
        self.logical_label(self.current_page)
    }

    pub fn physical_for_label(&self, label: &str) -> usize {
        self.logical.physical_for(label)
    }

    pub fn set_first_page_offset(&mut self, offset: i64) {
        self.first_page_offset = offset;
        self.recompute_logical_pages();
    }

    /// Makes the current page read as `number`; custom ranges are replaced by plain numbering.
    pub fn assign_page_label(&mut self, number: i64) {
        self.label_ranges.clear();
        self.set_first_page_offset(number.saturating_sub(self.current_page as i64));
    }

    pub fn rotate(&mut self, quarter_turns: i32) {
        self.view.rotate(quarter_turns);
        self.cache.mark_all_stale();
    }

    pub fn cycle_crop(&mut self) -> CropMode {
        let mode = self.view.cycle_crop();
        self.cache.mark_all_stale();
        mode
    }

    pub fn set_manual_crop(&mut self, rect: PageRect) {
        self.view.set_manual_crop(rect);
        self.cache.mark_all_stale();
    }

    pub fn toggle_alpha(&mut self) -> bool {
        self.view.alpha = !self.view.alpha;
        self.cache.mark_all_stale();
        self.view.alpha
    }

    pub fn toggle_invert(&mut self) -> bool {
        self.view.invert = !self.view.invert;
        self.cache.mark_all_stale();
        self.view.invert
    }

    pub fn toggle_tint(&mut self) -> bool {
        self.view.tint = !self.view.tint;
        self.cache.mark_all_stale();
        self.view.tint
    }

    /// Screen geometry changed: placements are stale everywhere.
    pub fn refresh(&mut self) {
        self.cache.mark_all_stale();
    }

    #[instrument(skip(self), fields(path = %self.info.path.display()))]
    pub fn set_layout(&mut self, layout: Layout) -> Result<()> {
        let Some(page_count) = self.backend.relayout(layout)? else {
            return Err(ViewerError::NotReflowable.into());
        };
        let label = self.current_label();
        self.layout = layout;
        self.page_count = page_count;
        self.cache.reset(page_count);
        self.previous_page = None;
        self.reload_structure();
        let target = self.physical_for_label(&label);
        self.current_page = self.clamp_page(target);
        self.update_chapter();
        Ok(())
    }

    pub fn cycle_paper_size(&mut self) -> Result<PaperSize> {
        let paper = PaperSize::from_index(self.layout.paper.index() + 1);
        self.set_layout(Layout {
            paper,
            ..self.layout
        })?;
        Ok(paper)
    }

    pub fn adjust_font_size(&mut self, delta: f32) -> Result<f32> {
        let font_size = (self.layout.font_size + delta).clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);
        self.set_layout(Layout {
            font_size,
            ..self.layout
        })?;
        Ok(font_size)
    }

    /// Region of the page that is rasterized under the current crop mode.
    pub fn visible_bounds(&self, page: usize) -> Result<PageRect> {
        let bounds = self.backend.page_bounds(page)?;
        let visible = match self.view.crop {
            CropMode::None => bounds,
            CropMode::Auto => {
                let words = self.backend.word_boxes(page)?;
                content_bounds(&words, &bounds).unwrap_or(bounds)
            }
            CropMode::Manual => match self.view.manual_crop {
                Some(rect) if !rect.intersect(&bounds).is_empty() => rect.intersect(&bounds),
                _ => bounds,
            },
        };
        Ok(visible)
    }

    /// Zoom and cell placement of `page` on `screen` under the current view options.
    pub fn page_transform(&self, page: usize, screen: &ScreenGeometry) -> Result<PageTransform> {
        let source = self.visible_bounds(page)?;
        let (width, height) = screen.viewport_px();
        let fitted = fit(
            source.width(),
            source.height(),
            width,
            height,
            self.view.rotation,
        );
        let placement = place(
            fitted.display_width as u32,
            fitted.display_height as u32,
            width,
            height,
            screen.cell_width,
            screen.cell_height,
        );
        Ok(PageTransform {
            zoom: fitted.zoom,
            rotation: self.view.rotation,
            source,
            placement,
            cell_width: screen.cell_width,
            cell_height: screen.cell_height,
        })
    }

    pub fn render_request(&self, page: usize, zoom: f32, clip: PageRect) -> RenderRequest {
        let full = self.backend.page_bounds(page).ok();
        RenderRequest {
            page_index: page,
            zoom,
            rotation: self.view.rotation,
            alpha: self.view.alpha,
            clip: match full {
                Some(full) if full == clip => None,
                _ => Some(clip),
            },
        }
    }

    pub fn post_process(&self, tint_color: Rgb) -> PostProcess {
        PostProcess {
            invert: self.view.invert,
            tint: self.view.tint.then_some(tint_color),
        }
    }

    pub fn metadata(&self) -> Result<Vec<(String, String)>> {
        self.backend.metadata()
    }

    pub fn links(&self, page: usize) -> Result<Vec<LinkDefinition>> {
        self.backend.links(page)
    }

    pub fn text_in(&self, page: usize, rect: &PageRect) -> Result<String> {
        let words = self.backend.word_boxes(page)?;
        Ok(text_in_rect(&words, rect))
    }

    /// All text of `page`, one line per text line.
    pub fn page_text(&self, page: usize) -> Result<String> {
        let bounds = self.backend.page_bounds(page)?;
        self.text_in(page, &bounds)
    }

    pub fn snapshot(&self) -> PersistedDocumentState {
        let mut state = PersistedDocumentState {
            citation_key: self.citation_key.clone(),
            paper_size: self.layout.paper.index(),
            font_size: self.layout.font_size,
            current_page: self.current_page,
            logical_page: Some(self.current_label()),
            first_page_offset: self.first_page_offset,
            ..PersistedDocumentState::default()
        };
        state.set_view_options(&self.view);
        state
    }
}
