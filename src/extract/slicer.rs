//! Bounded prompt excerpts from extracted article text
//!
//! [`primer_slice`] picks a few leading body paragraphs for a fast first
//! summary. [`structure_slice`] keeps the document's shape (intro,
//! headings with their neighbours, conclusion) and fills the remaining
//! budget with paragraphs sampled evenly from the middle.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Paragraph length window for slicing candidates, in characters
pub const MIN_PARAGRAPH_CHARS: usize = 30;
pub const MAX_PARAGRAPH_CHARS: usize = 1200;

/// Primer takes at most this many paragraphs
pub const PRIMER_MAX_PARAGRAPHS: usize = 3;

/// Structure slicing only looks at this many paragraphs
pub const STRUCTURE_MAX_PARAGRAPHS: usize = 60;

/// Upper bound for the "short" heading rules
pub const HEADING_MAX_CHARS: usize = 80;

const UPPERCASE_RATIO: f64 = 0.6;

const SEPARATOR: &str = "\n\n";

/// Case-insensitive markers of page furniture that leaked into the text
const BOILERPLATE_MARKERS: &[&str] = &[
    "related posts",
    "related articles",
    "recommended for you",
    "subscribe",
    "newsletter",
    "advertisement",
    "sponsored content",
    "sign up for",
    "share this",
    "follow us",
    "all rights reserved",
    "cookie policy",
];

static PARAGRAPH_BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t\r\f\v]*\n").expect("valid paragraph regex"));

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// First `max_chars` characters of `text`
fn prefix(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

/// Split on blank lines, trimming each paragraph and dropping empty ones
pub fn split_paragraphs(text: &str) -> Vec<&str> {
    PARAGRAPH_BREAK_RE
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

fn is_boilerplate(paragraph: &str) -> bool {
    let lower = paragraph.to_lowercase();
    BOILERPLATE_MARKERS.iter().any(|m| lower.contains(m))
}

/// Heading heuristic for a single paragraph.
///
/// A paragraph is a heading when it is short and ends with a colon, when
/// most of its words start with a capital letter, or when it is short and
/// mostly uppercase letters.
///
/// ```rust
/// use feedbrief::extract::slicer::is_heading;
///
/// assert!(is_heading("What we found:"));
/// assert!(is_heading("Results And Discussion"));
/// assert!(is_heading("BREAKING NEWS"));
/// assert!(!is_heading("the committee met on tuesday to discuss the budget."));
/// ```
pub fn is_heading(paragraph: &str) -> bool {
    let trimmed = paragraph.trim();
    if trimmed.is_empty() {
        return false;
    }
    let short = char_len(trimmed) <= HEADING_MAX_CHARS;

    if short && trimmed.ends_with(':') {
        return true;
    }

    let words: Vec<&str> = trimmed.split_whitespace().collect();
    let capitalized = words
        .iter()
        .filter(|w| {
            w.chars()
                .find(|c| c.is_alphabetic())
                .is_some_and(char::is_uppercase)
        })
        .count();
    if capitalized * 2 > words.len() {
        return true;
    }

    if short {
        let (upper, letters) = trimmed
            .chars()
            .filter(|c| c.is_alphabetic())
            .fold((0usize, 0usize), |(u, l), c| {
                (u + usize::from(c.is_uppercase()), l + 1)
            });
        if letters > 0 && upper as f64 / letters as f64 >= UPPERCASE_RATIO {
            return true;
        }
    }

    false
}

/// Short excerpt for the primer stage.
///
/// Takes up to three paragraphs of acceptable length, in order, whose
/// blank-line-joined length stays within `max_chars`. Falls back to a raw
/// prefix of `max_chars` characters when no paragraph qualifies.
pub fn primer_slice(text: &str, max_chars: usize) -> String {
    let mut picked: Vec<&str> = Vec::new();
    let mut used = 0usize;

    for paragraph in split_paragraphs(text) {
        if picked.len() == PRIMER_MAX_PARAGRAPHS {
            break;
        }
        let len = char_len(paragraph);
        if !(MIN_PARAGRAPH_CHARS..=MAX_PARAGRAPH_CHARS).contains(&len) {
            continue;
        }
        let extra = if picked.is_empty() {
            len
        } else {
            len + SEPARATOR.len()
        };
        if used + extra > max_chars {
            continue;
        }
        used += extra;
        picked.push(paragraph);
    }

    if picked.is_empty() {
        return prefix(text.trim(), max_chars).trim_end().to_string();
    }
    picked.join(SEPARATOR)
}

/// Structure-preserving excerpt for the full stage.
///
/// Only paragraphs inside the length window are considered. Output
/// paragraphs keep their original order and the result never exceeds
/// `target_chars` characters.
pub fn structure_slice(text: &str, target_chars: usize) -> String {
    let paragraphs: Vec<&str> = split_paragraphs(text)
        .into_iter()
        .filter(|p| (MIN_PARAGRAPH_CHARS..=MAX_PARAGRAPH_CHARS).contains(&char_len(p)))
        .filter(|p| !is_boilerplate(p))
        .take(STRUCTURE_MAX_PARAGRAPHS)
        .collect();

    if paragraphs.is_empty() {
        return prefix(text.trim(), target_chars).trim_end().to_string();
    }

    let last = paragraphs.len() - 1;
    let mut selected: BTreeSet<usize> = BTreeSet::new();
    selected.insert(0);
    if last >= 1 {
        selected.insert(1);
    }
    selected.insert(last);
    for (i, paragraph) in paragraphs.iter().enumerate() {
        if is_heading(paragraph) {
            selected.insert(i);
            if i > 0 {
                selected.insert(i - 1);
            }
            if i < last {
                selected.insert(i + 1);
            }
        }
    }

    let joined_len = |set: &BTreeSet<usize>| -> usize {
        let body: usize = set.iter().map(|&i| char_len(paragraphs[i])).sum();
        body + SEPARATOR.len() * set.len().saturating_sub(1)
    };

    let mut total = joined_len(&selected);
    if total < target_chars {
        let remaining: Vec<usize> = (0..paragraphs.len())
            .filter(|i| !selected.contains(i))
            .collect();
        for i in stride_order(&remaining, &paragraphs, target_chars - total) {
            if total >= target_chars {
                break;
            }
            selected.insert(i);
            total = joined_len(&selected);
        }
    }

    let joined = selected
        .iter()
        .map(|&i| paragraphs[i])
        .collect::<Vec<_>>()
        .join(SEPARATOR);
    prefix(&joined, target_chars).to_string()
}

/// Visit `candidates` at an even stride sized so the first sweep roughly
/// fills `budget`, then sweep again from shifted offsets until every
/// candidate has been offered
fn stride_order(candidates: &[usize], paragraphs: &[&str], budget: usize) -> Vec<usize> {
    if candidates.is_empty() {
        return Vec::new();
    }
    let total: usize = candidates.iter().map(|&i| char_len(paragraphs[i])).sum();
    let average = (total / candidates.len()).max(1);
    let wanted = budget.div_ceil(average + SEPARATOR.len()).max(1);
    let stride = (candidates.len() / wanted).max(1);

    let mut order = Vec::with_capacity(candidates.len());
    for offset in 0..stride {
        order.extend(candidates.iter().skip(offset).step_by(stride).copied());
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn body(n: usize) -> String {
        format!(
            "this is body paragraph number {n}, which carries enough ordinary prose to qualify."
        )
    }

    #[test]
    fn test_split_paragraphs_on_blank_lines() {
        let text = "one\n\ntwo\n  \nthree\nstill three\n\n\n";
        assert_eq!(split_paragraphs(text), vec!["one", "two", "three\nstill three"]);
    }

    #[rstest]
    #[case("Key takeaways:", true)]
    #[case("How The Deal Came Together", true)]
    #[case("UPDATE 2", true)]
    #[case("a sentence that simply ends with a colon but runs on far too long to count as a heading:", false)]
    #[case("the market rallied after the announcement on monday.", false)]
    #[case("", false)]
    fn test_is_heading(#[case] paragraph: &str, #[case] expected: bool) {
        assert_eq!(is_heading(paragraph), expected);
    }

    #[test]
    fn test_primer_takes_up_to_three_qualifying_paragraphs() {
        let text = [
            "short".to_string(),
            body(1),
            body(2),
            "x".repeat(MAX_PARAGRAPH_CHARS + 1),
            body(3),
            body(4),
        ]
        .join("\n\n");

        let slice = primer_slice(&text, 1200);
        assert_eq!(slice, [body(1), body(2), body(3)].join("\n\n"));
    }

    #[test]
    fn test_primer_respects_max_chars() {
        let text = [body(1), body(2), body(3)].join("\n\n");
        let one = char_len(&body(1));
        let slice = primer_slice(&text, one + 5);
        assert_eq!(slice, body(1));
    }

    #[test]
    fn test_primer_falls_back_to_prefix() {
        let text = "word ".repeat(500);
        let slice = primer_slice(&text, 100);
        assert!(char_len(&slice) <= 100);
        assert!(text.starts_with(&slice));
        assert_eq!(primer_slice("", 100), "");
    }

    #[test]
    fn test_structure_slice_keeps_all_five_with_heading_in_middle() {
        let heading = "Why The Results Matter For Everyone Involved";
        let paragraphs = [
            body(1),
            body(2),
            heading.to_string(),
            body(4),
            body(5),
        ];
        let text = paragraphs.join("\n\n");

        let slice = structure_slice(&text, text.len() * 2);
        assert_eq!(slice, text);
    }

    #[test]
    fn test_structure_slice_keeps_edges_and_heading_neighbours() {
        let mut paragraphs: Vec<String> = (0..20).map(body).collect();
        paragraphs[10] = "Background to the negotiations:".to_string();
        let text = paragraphs.join("\n\n");

        // Budget too small for any stride fill beyond the structural picks
        let slice = structure_slice(&text, 1);
        assert_eq!(char_len(&slice), 1);

        let structural = [0, 1, 9, 10, 11, 19]
            .iter()
            .map(|&i| paragraphs[i].as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let slice = structure_slice(&text, char_len(&structural));
        assert_eq!(slice, structural);
    }

    #[test]
    fn test_structure_slice_fills_evenly_in_document_order() {
        let paragraphs: Vec<String> = (0..40).map(body).collect();
        let text = paragraphs.join("\n\n");
        let target = char_len(&text) / 2;

        let slice = structure_slice(&text, target);
        assert!(char_len(&slice) <= target);

        let kept: Vec<usize> = (0..40)
            .filter(|&i| slice.contains(&format!("number {i},")))
            .collect();
        let positions: Vec<usize> = kept
            .iter()
            .filter_map(|i| slice.find(&format!("number {i},")))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(kept.contains(&0) && kept.contains(&1));
        // Fill reaches past the first quarter of the document
        assert!(kept.iter().any(|&i| i > 20 && i < 39));
    }

    #[test]
    fn test_structure_slice_drops_boilerplate_and_caps_paragraphs() {
        let mut paragraphs: Vec<String> = (0..80).map(body).collect();
        paragraphs[3] = "Subscribe to our newsletter for more stories like this one.".to_string();
        let text = paragraphs.join("\n\n");

        let slice = structure_slice(&text, usize::MAX / 4);
        assert!(!slice.contains("Subscribe"));
        assert!(slice.contains("number 60,"));
        assert!(!slice.contains("number 61,"));
    }

    #[test]
    fn test_structure_slice_skips_paragraphs_outside_length_window() {
        let huge = "y".repeat(MAX_PARAGRAPH_CHARS + 300);
        let text = [
            body(1),
            body(2),
            "Photo: AP".to_string(),
            huge.clone(),
            body(5),
            body(6),
        ]
        .join("\n\n");

        let slice = structure_slice(&text, 100_000);
        assert!(!slice.contains(&huge));
        assert!(!slice.contains("Photo: AP"));
        assert_eq!(slice, [body(1), body(2), body(5), body(6)].join("\n\n"));
    }

    #[test]
    fn test_structure_slice_single_blob_is_truncated() {
        let text = "word ".repeat(4000);
        let slice = structure_slice(&text, 8000);
        assert_eq!(char_len(&slice), 8000);
    }
}
