//! Document state, navigation and render bookkeeping for the terminal viewer.
//! Nothing in here touches the terminal.

pub mod buffer;
pub mod cache;
pub mod config;
pub mod document;
pub mod error;
pub mod geometry;
pub mod labels;
pub mod pixels;
pub mod session;
pub mod state;
pub mod text;
pub mod view;
pub mod watch;

pub use buffer::DocumentInstance;
pub use cache::{image_id_for_page, ImageId, PageState, RenderCache};
pub use config::{Config, TransferFormat};
pub use document::{
    document_id_for_bytes, document_id_for_file, DocumentBackend, DocumentId, DocumentInfo,
    DocumentProvider, Layout, LinkAction, LinkDefinition, OutlineItem, PageRect, PaperSize,
    RenderImage, RenderRequest, WordBox,
};
pub use error::ViewerError;
pub use geometry::{clip_in_raster, fit, place, Fit, PageTransform, Placement, ScreenGeometry};
pub use labels::{infer_ranges, LogicalPages, NumberingStyle, PageLabelRange};
pub use pixels::{crop_render_image, PostProcess, Rgb, DEFAULT_TINT};
pub use session::{Command, Session, SessionEvent};
pub use state::{FileStateStore, MemoryStateStore, PersistedDocumentState, StateStore};
pub use text::wrap_text;
pub use view::{CropMode, Rotation, ViewOptions};
pub use watch::FileWatcher;
