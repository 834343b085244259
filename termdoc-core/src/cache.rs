//! Per-page bookkeeping for images that live in terminal memory.

use crate::geometry::Placement;

/// Identifier of a page image inside the terminal. Stable per physical page:
/// page `n` always uses id `n + 1`.
pub type ImageId = u32;

pub fn image_id_for_page(page_index: usize) -> ImageId {
    u32::try_from(page_index + 1).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageState {
    pub stale: bool,
    pub zoom: f32,
    pub placement: Placement,
}

impl Default for PageState {
    fn default() -> Self {
        Self {
            stale: true,
            zoom: 1.0,
            placement: Placement::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RenderCache {
    pages: Vec<PageState>,
    invalidations: u64,
}

impl RenderCache {
    pub fn new(page_count: usize) -> Self {
        Self {
            pages: vec![PageState::default(); page_count],
            invalidations: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Resizes after a relayout; every page, old or new, starts stale.
    pub fn reset(&mut self, page_count: usize) {
        self.pages = vec![PageState::default(); page_count];
        self.invalidations += 1;
    }

    pub fn page(&self, page_index: usize) -> Option<&PageState> {
        self.pages.get(page_index)
    }

    pub fn page_mut(&mut self, page_index: usize) -> Option<&mut PageState> {
        self.pages.get_mut(page_index)
    }

    /// Global view options are document-wide, so invalidation always covers every page.
    pub fn mark_all_stale(&mut self) {
        for page in &mut self.pages {
            page.stale = true;
        }
        self.invalidations += 1;
    }

    pub fn mark_stale(&mut self, page_index: usize) {
        if let Some(page) = self.pages.get_mut(page_index) {
            page.stale = true;
        }
    }

    pub fn mark_fresh(&mut self, page_index: usize) {
        if let Some(page) = self.pages.get_mut(page_index) {
            page.stale = false;
        }
    }

    /// True when the page is stale, or when `still_shown` reports the terminal
    /// no longer holds the image. `still_shown` is not called for stale pages.
    pub fn needs_render<P>(&self, page_index: usize, still_shown: P) -> bool
    where
        P: FnOnce(ImageId) -> bool,
    {
        match self.pages.get(page_index) {
            Some(page) if !page.stale => !still_shown(image_id_for_page(page_index)),
            _ => true,
        }
    }

    /// Number of whole-document invalidations since creation.
    pub fn invalidations(&self) -> u64 {
        self.invalidations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_one_based() {
        assert_eq!(image_id_for_page(0), 1);
        assert_eq!(image_id_for_page(41), 42);
    }

    #[test]
    fn fresh_cache_needs_everything() {
        let cache = RenderCache::new(3);
        for page in 0..3 {
            assert!(cache.needs_render(page, |_| true));
        }
    }

    #[test]
    fn render_clears_only_that_page() {
        let mut cache = RenderCache::new(4);
        cache.mark_all_stale();
        cache.mark_fresh(2);
        for page in 0..4 {
            assert_eq!(cache.needs_render(page, |_| true), page != 2);
        }
    }

    #[test]
    fn lost_image_forces_render() {
        let mut cache = RenderCache::new(2);
        cache.mark_fresh(1);
        let mut asked = None;
        assert!(cache.needs_render(1, |id| {
            asked = Some(id);
            false
        }));
        assert_eq!(asked, Some(2));
    }

    #[test]
    fn stale_pages_skip_redisplay_check() {
        let cache = RenderCache::new(1);
        assert!(cache.needs_render(0, |_| panic!("stale pages are never redisplayed")));
    }

    #[test]
    fn out_of_range_pages_need_render() {
        let cache = RenderCache::new(1);
        assert!(cache.needs_render(5, |_| true));
    }
}
