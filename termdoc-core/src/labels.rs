//! Logical page labels: the user-facing page numbers printed on the pages,
//! as opposed to zero-based physical indices.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NumberingStyle {
    Arabic,
    RomanUpper,
    RomanLower,
    LettersUpper,
    LettersLower,
    /// Prefix only, no number.
    None,
}

impl NumberingStyle {
    pub fn format(self, number: i64) -> String {
        if number <= 0 {
            return match self {
                NumberingStyle::None => String::new(),
                _ => number.to_string(),
            };
        }
        match self {
            NumberingStyle::Arabic => number.to_string(),
            NumberingStyle::RomanUpper => to_roman(number),
            NumberingStyle::RomanLower => to_roman(number).to_lowercase(),
            NumberingStyle::LettersUpper => to_letters(number),
            NumberingStyle::LettersLower => to_letters(number).to_lowercase(),
            NumberingStyle::None => String::new(),
        }
    }
}

/// One numbering scheme starting at a physical page and running until the next range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLabelRange {
    pub start_page: usize,
    pub style: NumberingStyle,
    pub prefix: String,
    pub first_number: i64,
}

impl PageLabelRange {
    pub fn new(start_page: usize, style: NumberingStyle, prefix: impl Into<String>) -> Self {
        Self {
            start_page,
            style,
            prefix: prefix.into(),
            first_number: 1,
        }
    }

    pub fn starting_at(mut self, first_number: i64) -> Self {
        self.first_number = first_number;
        self
    }

    fn label_for(&self, physical: usize) -> String {
        let step = physical.saturating_sub(self.start_page) as i64;
        let number = self.first_number.saturating_add(step);
        format!("{}{}", self.prefix, self.style.format(number))
    }
}

/// Physical page index -> logical label, one entry per physical page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogicalPages {
    labels: Vec<String>,
}

impl LogicalPages {
    /// Builds the mapping from declared ranges; without ranges every page is
    /// labelled `physical + offset` in arabic numerals.
    pub fn compute(page_count: usize, ranges: &[PageLabelRange], offset: i64) -> Self {
        let mut sorted: Vec<&PageLabelRange> = ranges.iter().collect();
        sorted.sort_by_key(|range| range.start_page);

        let labels = (0..page_count)
            .map(|physical| {
                match sorted
                    .iter()
                    .rev()
                    .find(|range| range.start_page <= physical)
                {
                    Some(range) => range.label_for(physical),
                    None => (physical as i64).saturating_add(offset).to_string(),
                }
            })
            .collect();
        Self { labels }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn label(&self, physical: usize) -> Option<&str> {
        self.labels.get(physical).map(String::as_str)
    }

    /// First page carrying exactly `label`, or page 0 when none does.
    pub fn physical_for(&self, label: &str) -> usize {
        self.labels
            .iter()
            .position(|candidate| candidate == label)
            .unwrap_or(0)
    }
}

/// Reconstructs numbering ranges from per-page labels as reported by document engines
/// that only expose the resolved label of each page.
pub fn infer_ranges(labels: &[Option<String>]) -> Vec<PageLabelRange> {
    if labels.iter().all(Option::is_none) {
        return Vec::new();
    }

    let mut ranges: Vec<PageLabelRange> = Vec::new();
    for (physical, label) in labels.iter().enumerate() {
        let label = label.as_deref().unwrap_or("");
        if let Some(current) = ranges.last() {
            if current.label_for(physical) == label {
                continue;
            }
        }
        let (prefix, style, number) = parse_label(label);
        ranges.push(PageLabelRange {
            start_page: physical,
            style,
            prefix,
            first_number: number,
        });
    }
    ranges
}

fn parse_label(label: &str) -> (String, NumberingStyle, i64) {
    let digits_start = label
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(idx, _)| idx);
    if let Some(idx) = digits_start {
        if let Ok(number) = label[idx..].parse::<i64>() {
            if number > 0 && !label[idx..].starts_with('0') {
                return (label[..idx].to_string(), NumberingStyle::Arabic, number);
            }
        }
    }

    let alpha_start = label
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_alphabetic())
        .last()
        .map(|(idx, _)| idx);
    // The whole trailing alphabetic run must be a numeral, so "Cover" stays a plain label.
    if let Some(idx) = alpha_start {
        if let Some((style, number)) = parse_numeral(&label[idx..]) {
            return (label[..idx].to_string(), style, number);
        }
    }

    (label.to_string(), NumberingStyle::None, 1)
}

fn parse_numeral(candidate: &str) -> Option<(NumberingStyle, i64)> {
    let is_upper = candidate.chars().all(|c| c.is_ascii_uppercase());
    let is_lower = candidate.chars().all(|c| c.is_ascii_lowercase());
    if !is_upper && !is_lower {
        return None;
    }
    if let Some(number) = from_roman(candidate) {
        let style = if is_upper {
            NumberingStyle::RomanUpper
        } else {
            NumberingStyle::RomanLower
        };
        return Some((style, number));
    }
    if let Some(number) = from_letters(candidate) {
        let style = if is_upper {
            NumberingStyle::LettersUpper
        } else {
            NumberingStyle::LettersLower
        };
        return Some((style, number));
    }
    None
}

const ROMAN: [(i64, &str); 13] = [
    (1000, "M"),
    (900, "CM"),
    (500, "D"),
    (400, "CD"),
    (100, "C"),
    (90, "XC"),
    (50, "L"),
    (40, "XL"),
    (10, "X"),
    (9, "IX"),
    (5, "V"),
    (4, "IV"),
    (1, "I"),
];

pub fn to_roman(mut number: i64) -> String {
    let mut out = String::new();
    for (value, numeral) in ROMAN {
        while number >= value {
            out.push_str(numeral);
            number -= value;
        }
    }
    out
}

fn from_roman(text: &str) -> Option<i64> {
    if text.is_empty() {
        return None;
    }
    let upper = text.to_ascii_uppercase();
    let value = |c: char| match c {
        'I' => Some(1),
        'V' => Some(5),
        'X' => Some(10),
        'L' => Some(50),
        'C' => Some(100),
        'D' => Some(500),
        'M' => Some(1000),
        _ => None,
    };
    let digits: Option<Vec<i64>> = upper.chars().map(value).collect();
    let digits = digits?;
    let mut total = 0;
    for (idx, digit) in digits.iter().enumerate() {
        match digits.get(idx + 1) {
            Some(next) if next > digit => total -= digit,
            _ => total += digit,
        }
    }
    (total > 0 && to_roman(total) == upper).then_some(total)
}

/// A..Z, then AA..ZZ, AAA.. as used by PDF page labels.
pub fn to_letters(number: i64) -> String {
    let index = (number - 1) % 26;
    let repeat = ((number - 1) / 26 + 1) as usize;
    let letter = (b'A' + index as u8) as char;
    std::iter::repeat(letter).take(repeat).collect()
}

fn from_letters(text: &str) -> Option<i64> {
    let mut chars = text.chars();
    let first = chars.next()?.to_ascii_uppercase();
    if !first.is_ascii_uppercase() || !text.chars().all(|c| c.to_ascii_uppercase() == first) {
        return None;
    }
    let repeat = text.chars().count() as i64;
    Some((repeat - 1) * 26 + (first as u8 - b'A') as i64 + 1)
}
