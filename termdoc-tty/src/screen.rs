use anyhow::{Context, Result};
use crossterm::terminal::{self, WindowSize};
use termdoc_core::{ScreenGeometry, ViewerError};

/// Reads rows, columns and pixel size of the controlling terminal.
pub fn query_screen_geometry() -> Result<ScreenGeometry> {
    let size = terminal::window_size().context("failed to query terminal size")?;
    geometry_from_window(size)
}

/// Fails when the terminal reports zero pixels, since nothing can be fitted then.
pub fn geometry_from_window(size: WindowSize) -> Result<ScreenGeometry> {
    ScreenGeometry::new(
        u32::from(size.columns),
        u32::from(size.rows),
        u32::from(size.width),
        u32::from(size.height),
    )
    .ok_or_else(|| ViewerError::ScreenGeometry.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_size_is_required() {
        let size = WindowSize {
            rows: 40,
            columns: 100,
            width: 0,
            height: 0,
        };
        let err = geometry_from_window(size).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ViewerError>(),
            Some(ViewerError::ScreenGeometry)
        ));
    }

    #[test]
    fn cell_size_is_derived() {
        let size = WindowSize {
            rows: 40,
            columns: 100,
            width: 1000,
            height: 800,
        };
        let screen = geometry_from_window(size).unwrap();
        assert_eq!((screen.cell_width, screen.cell_height), (10, 20));
    }
}
