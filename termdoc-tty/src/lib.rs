//! Terminal side of the viewer: the kitty graphics transport, page display,
//! key handling and the modal overlays.

pub mod display;
pub mod input;
pub mod kitty;
pub mod overlay;
pub mod screen;
pub mod status;
pub mod text_view;
pub mod visual;

pub use display::{DisplayOutcome, PageDisplay};
pub use input::{events_from_bytes, EventMapper, InputMode, OverlayKind, UiEvent};
pub use kitty::{
    CancellationToken, Format, GraphicsCommand, ReplySource, TransferError, Transport, TtyReplies,
};
pub use overlay::{EntryTarget, ListOverlay, OverlayEntry, OverlayOutcome};
pub use screen::query_screen_geometry;
pub use status::{combine_status, format_document_status, truncate_with_ellipsis, write_status_line};
pub use text_view::{TextScroll, TextView};
pub use visual::VisualSelection;
