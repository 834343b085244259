use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("unable to open {path:?}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("terminal does not support the graphics protocol: {0}")]
    UnsupportedTerminal(String),

    #[error("terminal does not report screen sizes in pixels")]
    ScreenGeometry,

    #[error("No ToC available.")]
    NoTableOfContents,

    #[error("No metadata available.")]
    NoMetadata,

    #[error("No links on page.")]
    NoLinks,

    #[error("Document layout is fixed.")]
    NotReflowable,

    #[error("{program} failed: {reason}")]
    External { program: String, reason: String },
}
