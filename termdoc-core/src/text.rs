use crate::document::{PageRect, WordBox};

const AUTO_CROP_PADDING: f32 = 6.0;

/// Text of the words whose centers fall inside `rect`, one output line per text line.
pub fn text_in_rect(words: &[WordBox], rect: &PageRect) -> String {
    let mut selected: Vec<&WordBox> = words
        .iter()
        .filter(|word| {
            let (x, y) = word.rect.center();
            rect.contains_point(x, y)
        })
        .collect();
    selected.sort_by(|a, b| {
        a.rect
            .y0
            .total_cmp(&b.rect.y0)
            .then(a.rect.x0.total_cmp(&b.rect.x0))
    });

    let mut lines: Vec<(f32, Vec<&WordBox>)> = Vec::new();
    for word in selected {
        let (_, center_y) = word.rect.center();
        match lines.last_mut() {
            Some((baseline, line)) if (center_y - *baseline).abs() <= word.rect.height() / 2.0 => {
                line.push(word);
            }
            _ => lines.push((center_y, vec![word])),
        }
    }

    lines
        .into_iter()
        .map(|(_, mut line)| {
            line.sort_by(|a, b| a.rect.x0.total_cmp(&b.rect.x0));
            line.iter()
                .map(|word| word.text.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Wraps each line of `text` to `width` columns; blank lines survive.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut wrapped = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            wrapped.push(String::new());
            continue;
        }
        wrapped.extend(textwrap::wrap(line, width).into_iter().map(|part| part.into_owned()));
    }
    wrapped
}

/// Bounding box of all text on the page, padded and clamped to the page.
pub fn content_bounds(words: &[WordBox], page: &PageRect) -> Option<PageRect> {
    let union = words
        .iter()
        .map(|word| word.rect)
        .filter(|rect| !rect.is_empty())
        .reduce(|acc, rect| acc.union(&rect))?;
    let bounds = union.padded(AUTO_CROP_PADDING).intersect(page);
    (!bounds.is_empty()).then_some(bounds)
}
