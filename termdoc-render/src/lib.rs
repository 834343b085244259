use std::convert::TryFrom;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use rayon::prelude::*;
use termdoc_core::{
    clip_in_raster, crop_render_image, document_id_for_file, infer_ranges, DocumentBackend,
    DocumentInfo, DocumentProvider, LinkAction, LinkDefinition, OutlineItem, PageLabelRange,
    PageRect, RenderImage, RenderRequest, Rotation, ViewerError, WordBox,
};
use tracing::{debug, instrument, warn};

const METADATA_TAGS: [(PdfDocumentMetadataTagType, &str); 8] = [
    (PdfDocumentMetadataTagType::Title, "Title"),
    (PdfDocumentMetadataTagType::Author, "Author"),
    (PdfDocumentMetadataTagType::Subject, "Subject"),
    (PdfDocumentMetadataTagType::Keywords, "Keywords"),
    (PdfDocumentMetadataTagType::Creator, "Creator"),
    (PdfDocumentMetadataTagType::Producer, "Producer"),
    (PdfDocumentMetadataTagType::CreationDate, "Created"),
    (PdfDocumentMetadataTagType::ModificationDate, "Modified"),
];

pub struct PdfiumRenderFactory {
    pdfium: Arc<Pdfium>,
}

impl PdfiumRenderFactory {
    pub fn new() -> Result<Self> {
        let pdfium = match bind_pdfium_from_build_hint() {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

#[async_trait]
impl DocumentProvider for PdfiumRenderFactory {
    async fn open(&self, path: &Path) -> Result<Arc<dyn DocumentBackend>> {
        let opened = path
            .canonicalize()
            .with_context(|| format!("failed to resolve path for {:?}", path))
            .and_then(|absolute| {
                let info = build_document_info(&self.pdfium, &absolute)?;
                Ok(PdfiumDocument::new(Arc::clone(&self.pdfium), absolute, info))
            });
        match opened {
            Ok(document) => Ok(Arc::new(document)),
            Err(err) => Err(ViewerError::Open {
                path: path.to_path_buf(),
                reason: format!("{err:#}"),
            }
            .into()),
        }
    }
}

struct PdfiumDocument {
    // Declared before `pdfium` so it is dropped first.
    document: Mutex<Option<PdfDocument<'static>>>,
    last_raster: Mutex<Option<(RenderRequest, RenderImage)>>,
    pdfium: Arc<Pdfium>,
    path: PathBuf,
    info: DocumentInfo,
}

impl PdfiumDocument {
    fn new(pdfium: Arc<Pdfium>, path: PathBuf, info: DocumentInfo) -> Self {
        Self {
            document: Mutex::new(None),
            last_raster: Mutex::new(None),
            pdfium,
            path,
            info,
        }
    }

    fn open_document(&self) -> Result<PdfDocument<'static>> {
        let document = self
            .pdfium
            .load_pdf_from_file(&self.path, None)
            .with_context(|| format!("failed to open {:?}", self.path))?;
        // SAFETY: the document borrows the bindings owned by `self.pdfium`. It is
        // stored in `self.document`, which is declared before `pdfium` and therefore
        // dropped before it, so the borrow never outlives the bindings.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
        Ok(document)
    }

    fn with_document<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&PdfDocument<'static>) -> Result<R>,
    {
        let mut guard = self.document.lock();
        if guard.is_none() {
            *guard = Some(self.open_document()?);
        }
        let document = guard
            .as_ref()
            .ok_or_else(|| anyhow!("{:?} is not loaded", self.path))?;
        f(document)
    }

    fn with_page<R, F>(&self, page_index: usize, f: F) -> Result<R>
    where
        F: FnOnce(&PdfPage<'_>) -> Result<R>,
    {
        self.with_document(|document| {
            let index: PdfPageIndex = page_index
                .try_into()
                .map_err(|_| anyhow!("page {} is out of supported range", page_index))?;
            let page = document
                .pages()
                .get(index)
                .with_context(|| format!("page {} out of range", page_index))?;
            f(&page)
        })
    }

    fn rasterize_page(&self, page: &PdfPage<'_>, request: &RenderRequest) -> Result<RenderImage> {
        let bounds = PageRect::from_size(page.width().value, page.height().value);
        let mut config = PdfRenderConfig::new()
            .scale_page_by_factor(request.zoom.max(0.05))
            .rotate(render_rotation(request.rotation), true);
        if request.alpha {
            config = config.set_clear_color(PdfColor::new(255, 255, 255, 0));
        }
        let bitmap = page
            .render_with_config(&config)
            .with_context(|| format!("failed to render page {}", request.page_index))?;
        let rgba: image::RgbaImage = bitmap.as_image().to_rgba8();
        let (width, height) = rgba.dimensions();
        let rgba = rgba.into_raw();

        let (channels, pixels) = if request.alpha {
            (4, rgba)
        } else {
            (3, strip_alpha(&rgba))
        };
        let image = RenderImage {
            width,
            height,
            channels,
            pixels,
        };

        match request.clip {
            Some(clip) => {
                let (x, y, w, h) = clip_in_raster(&clip, &bounds, request.zoom, request.rotation);
                Ok(crop_render_image(&image, x, y, w, h))
            }
            None => Ok(image),
        }
    }

    fn link_action_from_pdfium(&self, link: &PdfLink<'_>) -> LinkAction {
        if let Some(action) = link.action() {
            match action.action_type() {
                PdfActionType::GoToDestinationInSameDocument => {
                    if let Some(local) = action.as_local_destination_action() {
                        if let Ok(destination) = local.destination() {
                            if let Ok(page_index) = destination.page_index() {
                                return LinkAction::GoTo {
                                    page: page_index as usize,
                                };
                            }
                        }
                    }
                }
                PdfActionType::Uri => {
                    if let Some(uri_action) = action.as_uri_action() {
                        if let Ok(uri) = uri_action.uri() {
                            if !uri.is_empty() {
                                return LinkAction::Uri { uri };
                            }
                        }
                    }
                }
                PdfActionType::Launch => {
                    return LinkAction::Launch {
                        target: "application".into(),
                    };
                }
                PdfActionType::Unsupported => {}
                other => {
                    return LinkAction::External {
                        target: format!("{other:?}"),
                    };
                }
            }
        }

        if let Some(destination) = link.destination() {
            if let Ok(page_index) = destination.page_index() {
                return LinkAction::GoTo {
                    page: page_index as usize,
                };
            }
        }

        LinkAction::None
    }
}

impl DocumentBackend for PdfiumDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    fn page_bounds(&self, page_index: usize) -> Result<PageRect> {
        self.with_page(page_index, |page| {
            Ok(PageRect::from_size(page.width().value, page.height().value))
        })
    }

    fn table_of_contents(&self) -> Result<Vec<OutlineItem>> {
        self.with_document(|document| {
            let mut outline = Vec::new();
            if let Some(root) = document.bookmarks().root() {
                collect_outline(root, 0, &mut outline);
            }
            Ok(outline)
        })
    }

    fn metadata(&self) -> Result<Vec<(String, String)>> {
        self.with_document(|document| {
            let metadata = document.metadata();
            Ok(METADATA_TAGS
                .iter()
                .filter_map(|(tag, name)| {
                    let value = metadata.get(*tag)?.value().trim().to_owned();
                    (!value.is_empty()).then(|| (name.to_string(), value))
                })
                .collect())
        })
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn rasterize(&self, request: RenderRequest) -> Result<RenderImage> {
        if let Some((cached, image)) = self.last_raster.lock().as_ref() {
            if *cached == request {
                debug!(page = request.page_index, "reusing last raster");
                return Ok(image.clone());
            }
        }

        let image = self.with_page(request.page_index, |page| self.rasterize_page(page, &request))?;
        *self.last_raster.lock() = Some((request, image.clone()));
        Ok(image)
    }

    fn word_boxes(&self, page_index: usize) -> Result<Vec<WordBox>> {
        self.with_page(page_index, |page| {
            let page_height = page.height().value;
            let text = page
                .text()
                .with_context(|| format!("failed to extract text for page {}", page_index))?;
            let mut words = Vec::new();
            for segment in text.segments().iter() {
                let bounds = segment.bounds();
                let rect = PageRect::new(
                    bounds.left().value,
                    page_height - bounds.top().value,
                    bounds.right().value,
                    page_height - bounds.bottom().value,
                );
                split_words(&segment.text(), rect, &mut words);
            }
            Ok(words)
        })
    }

    fn links(&self, page_index: usize) -> Result<Vec<LinkDefinition>> {
        self.with_page(page_index, |page| {
            let page_height = page.height().value;
            let mut definitions = Vec::new();
            for link in page.links().iter() {
                let rect = match link.rect() {
                    Ok(rect) => rect,
                    Err(err) => {
                        warn!(
                            ?err,
                            page = page_index,
                            path = %self.path.display(),
                            "failed to resolve link rectangle"
                        );
                        continue;
                    }
                };
                definitions.push(LinkDefinition {
                    rect: PageRect::new(
                        rect.left().value,
                        page_height - rect.top().value,
                        rect.right().value,
                        page_height - rect.bottom().value,
                    ),
                    action: self.link_action_from_pdfium(&link),
                });
            }
            Ok(definitions)
        })
    }

    fn page_label_ranges(&self) -> Result<Vec<PageLabelRange>> {
        self.with_document(|document| {
            let labels: Vec<Option<String>> = document
                .pages()
                .iter()
                .map(|page| page.label().map(|label| label.to_string()))
                .collect();
            Ok(infer_ranges(&labels))
        })
    }
}

fn render_rotation(rotation: Rotation) -> PdfPageRenderRotation {
    match rotation {
        Rotation::Deg0 => PdfPageRenderRotation::None,
        Rotation::Deg90 => PdfPageRenderRotation::Degrees90,
        Rotation::Deg180 => PdfPageRenderRotation::Degrees180,
        Rotation::Deg270 => PdfPageRenderRotation::Degrees270,
    }
}

fn strip_alpha(rgba: &[u8]) -> Vec<u8> {
    rgba.par_chunks_exact(4)
        .flat_map_iter(|px| [px[0], px[1], px[2]])
        .collect()
}

/// Splits a text run into words, giving each a share of `rect` proportional to
/// its position in the run.
fn split_words(text: &str, rect: PageRect, out: &mut Vec<WordBox>) {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return;
    }
    let step = rect.width() / chars.len() as f32;
    let mut start = None;
    for (idx, ch) in chars.iter().chain(std::iter::once(&' ')).enumerate() {
        match (ch.is_whitespace(), start) {
            (false, None) => start = Some(idx),
            (true, Some(first)) => {
                out.push(WordBox {
                    rect: PageRect::new(
                        rect.x0 + step * first as f32,
                        rect.y0,
                        rect.x0 + step * idx as f32,
                        rect.y1,
                    ),
                    text: chars[first..idx].iter().collect(),
                });
                start = None;
            }
            _ => {}
        }
    }
}

fn collect_outline(mut bookmark: PdfBookmark<'_>, depth: usize, out: &mut Vec<OutlineItem>) {
    loop {
        if let Some(title) = bookmark.title() {
            if let Some(destination) = bookmark.destination() {
                if let Ok(page_index) = destination.page_index() {
                    out.push(OutlineItem {
                        title,
                        page_index: page_index as usize,
                        depth,
                    });
                }
            }
        }

        if let Some(child) = bookmark.first_child() {
            collect_outline(child, depth + 1, out);
        }

        match bookmark.next_sibling() {
            Some(next) => bookmark = next,
            None => break,
        }
    }
}

fn build_document_info(pdfium: &Pdfium, path: &Path) -> Result<DocumentInfo> {
    let document = pdfium
        .load_pdf_from_file(path, None)
        .with_context(|| format!("failed to open {:?}", path))?;
    let page_count = usize::try_from(document.pages().len()).unwrap_or_default();
    let title = document
        .metadata()
        .get(PdfDocumentMetadataTagType::Title)
        .map(|t| t.value().trim().to_owned())
        .filter(|t| !t.is_empty());

    Ok(DocumentInfo {
        id: document_id_for_file(path)?,
        path: path.to_path_buf(),
        page_count,
        title,
    })
}

pub type PdfRenderFactory = PdfiumRenderFactory;

fn bind_pdfium_from_build_hint() -> Option<Pdfium> {
    match option_env!("TERMDOC_PDFIUM_LIBRARY_PATH") {
        Some(path) if !path.is_empty() => match Pdfium::bind_to_library(path) {
            Ok(bindings) => Some(Pdfium::new(bindings)),
            Err(err) => {
                warn!(
                    "failed to load Pdfium from build-provided path {}: {}",
                    path, err
                );
                None
            }
        },
        _ => None,
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");
    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => errors.push(format!("{}: {}", cwd_path.display(), err)),
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; ensure it is installed ({})",
                errors.join(", ")
            ))
        }
    }
}
