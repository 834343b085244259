use std::io::Write;

use anyhow::Result;
use crossterm::cursor::MoveTo;
use crossterm::queue;
use crossterm::style::{Attribute, Print, SetAttribute};
use termdoc_core::ScreenGeometry;
use termdoc_tty::{
    truncate_with_ellipsis, EntryTarget, ListOverlay, OverlayEntry, OverlayKind, TextView,
    VisualSelection,
};

fn title(kind: OverlayKind) -> &'static str {
    match kind {
        OverlayKind::TableOfContents => "Table of Contents",
        OverlayKind::Metadata => "Metadata",
        OverlayKind::Links => "Links",
    }
}

fn line_length(entry: &OverlayEntry) -> usize {
    let suffix = match entry.target {
        EntryTarget::Page(page) => format!(" (p{})", page + 1).len(),
        _ => 0,
    };
    2 + entry.depth.min(8) * 2 + entry.text.chars().count() + suffix
}

fn format_line(entry: &OverlayEntry, selected: bool, inner_width: usize) -> String {
    let mut text = String::new();
    text.push(if selected { '>' } else { ' ' });
    text.push(' ');
    text.push_str(&"  ".repeat(entry.depth.min(8)));
    text.push_str(&entry.text);
    if let EntryTarget::Page(page) = entry.target {
        text.push_str(&format!(" (p{})", page + 1));
    }
    truncate_with_ellipsis(&text, inner_width)
}

fn print_inverted(writer: &mut impl Write, col: u16, row: u16, content: &str) -> Result<()> {
    queue!(
        writer,
        MoveTo(col, row),
        SetAttribute(Attribute::Reverse),
        Print(content),
        SetAttribute(Attribute::Reset)
    )?;
    Ok(())
}

/// Draws `overlay` as a centred box above the status row. Screens too small
/// for a usable box draw nothing.
pub fn draw_overlay(
    writer: &mut impl Write,
    overlay: &mut ListOverlay,
    screen: &ScreenGeometry,
) -> Result<()> {
    const EMPTY_MESSAGE: &str = "Nothing to show";

    let total_cols = screen.cols;
    let rows_available = screen.status_row();
    if total_cols < 20 || rows_available < 6 {
        return Ok(());
    }
    let max_inner_width = total_cols.saturating_sub(6) as usize;
    let heading = title(overlay.kind());

    let base_width = if overlay.is_empty() {
        EMPTY_MESSAGE.len() + 2
    } else {
        overlay
            .entries()
            .iter()
            .map(line_length)
            .max()
            .unwrap_or(0)
            .max(heading.len())
    };
    let inner_width = base_width.min(max_inner_width).max(20.min(max_inner_width));

    let max_window_height = rows_available.saturating_sub(2);
    let max_content_height = max_window_height.saturating_sub(4) as usize;
    if max_content_height == 0 {
        return Ok(());
    }
    let total_entries = overlay.entries().len().max(1);
    let content_height = total_entries.min(max_content_height);
    overlay.ensure_visible(content_height);

    let window_height = (content_height + 4) as u32;
    let window_width = (inner_width + 2) as u32;
    let col = (total_cols.saturating_sub(window_width) / 2) as u16;
    let mut row = (rows_available.saturating_sub(window_height) / 2) as u16;
    let border = format!("+{}+", "-".repeat(inner_width));

    print_inverted(writer, col, row, &border)?;
    row += 1;
    print_inverted(writer, col, row, &format!("|{heading: ^inner_width$}|"))?;
    row += 1;
    print_inverted(writer, col, row, &format!("|{}|", "-".repeat(inner_width)))?;
    row += 1;

    if overlay.is_empty() {
        let content = truncate_with_ellipsis(&format!("  {EMPTY_MESSAGE}"), inner_width);
        print_inverted(writer, col, row, &format!("|{content}|"))?;
        row += 1;
    } else {
        let selected = overlay.selected();
        let mut drawn = 0;
        for (idx, entry) in overlay.visible(content_height) {
            let content = format_line(entry, idx == selected, inner_width);
            print_inverted(writer, col, row, &format!("|{content}|"))?;
            row += 1;
            drawn += 1;
        }
        for _ in drawn..content_height {
            print_inverted(writer, col, row, &format!("|{}|", " ".repeat(inner_width)))?;
            row += 1;
        }
    }
    print_inverted(writer, col, row, &border)?;
    Ok(())
}

/// Draws the visible window of `view` in a centred column.
pub fn draw_text(writer: &mut impl Write, view: &TextView, screen: &ScreenGeometry) -> Result<()> {
    let col = (screen.cols as usize).saturating_sub(view.width()) / 2;
    if view.is_empty() {
        queue!(writer, MoveTo(col as u16, 0), Print("No text on this page"))?;
        return Ok(());
    }
    for (row, line) in view.visible().iter().enumerate() {
        queue!(writer, MoveTo(col as u16, row as u16), Print(line))?;
    }
    Ok(())
}

/// Marks the selected rows with brackets just outside the selected columns,
/// leaving the page image itself uncovered.
pub fn draw_selection(writer: &mut impl Write, selection: &VisualSelection) -> Result<()> {
    let (left, right) = selection.columns();
    let (top, bottom) = selection.rows();
    for row in top..bottom {
        if left > 0 {
            print_inverted(writer, (left - 1) as u16, row as u16, "[")?;
        }
        print_inverted(writer, right as u16, row as u16, "]")?;
    }
    Ok(())
}
