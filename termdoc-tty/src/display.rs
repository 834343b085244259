//! Putting page images on screen: redisplay by id when the terminal still has
//! the image, otherwise rasterize and retransmit.

use std::io::Write;

use anyhow::{Context, Result};
use crossterm::cursor::MoveTo;
use crossterm::queue;
use png::{BitDepth, ColorType, Encoder};
use termdoc_core::{
    image_id_for_page, DocumentInstance, ImageId, PageTransform, RenderImage, Rgb,
    ScreenGeometry, TransferFormat,
};
use tracing::{debug, warn};

use crate::kitty::{Format, GraphicsCommand, ReplySource, Transport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayOutcome {
    /// The terminal still held the image and placed it again.
    Redisplayed,
    /// The page was rasterized and sent.
    Rendered,
    /// Rendering or placement failed; the page stays stale.
    Failed(String),
}

pub struct PageDisplay<W: Write, R: ReplySource> {
    transport: Transport<W, R>,
    tint_color: Rgb,
    format: TransferFormat,
    shown: Option<ImageId>,
}

impl<W: Write, R: ReplySource> PageDisplay<W, R> {
    pub fn new(transport: Transport<W, R>, tint_color: Rgb, format: TransferFormat) -> Self {
        Self {
            transport,
            tint_color,
            format,
            shown: None,
        }
    }

    pub fn transport(&self) -> &Transport<W, R> {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut Transport<W, R> {
        &mut self.transport
    }

    /// Shows the current page of `doc`. Errors are only raised for write
    /// failures on the terminal; everything else is a [`DisplayOutcome::Failed`].
    pub fn display(
        &mut self,
        doc: &mut DocumentInstance,
        screen: &ScreenGeometry,
    ) -> Result<DisplayOutcome> {
        let page = doc.current_page();
        let id = image_id_for_page(page);
        let transform = match doc.page_transform(page, screen) {
            Ok(transform) => transform,
            Err(err) => return Ok(DisplayOutcome::Failed(format!("{err:#}"))),
        };

        let layout_changed = doc
            .cache
            .page(page)
            .map(|state| state.placement != transform.placement || state.zoom != transform.zoom)
            .unwrap_or(true);
        if layout_changed {
            doc.cache.mark_stale(page);
        }

        self.hide_previous(id)?;
        let mut place_error = None;
        let needs_render = doc
            .cache
            .needs_render(page, |id| match self.place(id, &transform) {
                Ok(placed) => placed,
                Err(err) => {
                    place_error = Some(err);
                    false
                }
            });
        if let Some(err) = place_error {
            return Err(err);
        }
        if !needs_render {
            self.shown = Some(id);
            return Ok(DisplayOutcome::Redisplayed);
        }

        if let Err(err) = self.render(doc, page, &transform) {
            warn!(?err, page, "failed to render page");
            doc.cache.mark_stale(page);
            return Ok(DisplayOutcome::Failed(format!("{err:#}")));
        }
        if !self.place(id, &transform)? {
            doc.cache.mark_stale(page);
            return Ok(DisplayOutcome::Failed(format!(
                "terminal refused to display page {}",
                page + 1
            )));
        }
        self.shown = Some(id);
        Ok(DisplayOutcome::Rendered)
    }

    /// Rasterizes `page` and uploads it under its image id. Only marks the page
    /// fresh once the upload went through.
    pub fn render(
        &mut self,
        doc: &mut DocumentInstance,
        page: usize,
        transform: &PageTransform,
    ) -> Result<()> {
        let request = doc.render_request(page, transform.zoom, transform.source);
        let mut image = doc
            .backend
            .rasterize(request)
            .with_context(|| format!("failed to rasterize page {}", page + 1))?;
        let post = doc.post_process(self.tint_color);
        if !post.is_identity() {
            post.apply(&mut image);
        }

        let id = image_id_for_page(page);
        let (format, payload) = match self.format {
            TransferFormat::Png => (Format::Png, encode_png(&image)?),
            TransferFormat::Raw => (Format::for_channels(image.channels), image.pixels),
        };
        let command = GraphicsCommand::transmit(id, format, image.width, image.height);
        let frames = self.transport.transmit_chunked(command, &payload)?;
        debug!(page, id, frames, width = image.width, height = image.height, "page uploaded");

        doc.cache.mark_fresh(page);
        if let Some(state) = doc.cache.page_mut(page) {
            state.zoom = transform.zoom;
            state.placement = transform.placement;
        }
        Ok(())
    }

    fn place(&mut self, id: ImageId, transform: &PageTransform) -> Result<bool> {
        let placement = transform.placement;
        queue!(
            self.transport.writer_mut(),
            MoveTo(placement.left_col as u16, placement.top_row as u16)
        )?;
        let z = self.transport.z_index();
        self.transport
            .transmit_with_ack(&GraphicsCommand::place(id, z), None)
    }

    fn hide_previous(&mut self, next: ImageId) -> Result<()> {
        match self.shown {
            Some(previous) if previous != next => {
                self.transport.clear_placement(previous)?;
                self.shown = None;
            }
            _ => {}
        }
        Ok(())
    }

    /// Hides whatever page is on screen, e.g. before an overlay is drawn.
    pub fn hide(&mut self) -> Result<()> {
        if let Some(id) = self.shown.take() {
            self.transport.clear_placement(id)?;
        }
        Ok(())
    }

    /// Forgets every image this session put into the terminal.
    pub fn teardown(&mut self) -> Result<()> {
        self.shown = None;
        self.transport.delete_all_at_z()
    }
}

fn encode_png(image: &RenderImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut encoder = Encoder::new(&mut buffer, image.width, image.height);
    encoder.set_color(if image.has_alpha() {
        ColorType::Rgba
    } else {
        ColorType::Rgb
    });
    encoder.set_depth(BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&image.pixels)?;
    writer.finish()?;
    Ok(buffer)
}
