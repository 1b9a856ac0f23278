//! Best-effort readable text extraction from raw HTML
//!
//! This is a regex pipeline, not an HTML parser. Unbalanced or nested
//! markup can make a removal pass over- or under-match; that imprecision is
//! accepted. The extractor never fails, it only returns less text.

use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Only this many leading characters of a page are examined
pub const MAX_HTML_CHARS: usize = 200_000;

/// Blocks whose whole content is dropped before tags are stripped
const BOILERPLATE_BLOCKS: &[&str] = &["nav", "header", "footer", "aside", "script", "style"];

static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid comment regex"));

static ARTICLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<article\b[^>]*>(.*?)</article\s*>").expect("valid article regex")
});

static BLOCK_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    BOILERPLATE_BLOCKS
        .iter()
        .map(|tag| {
            Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")).expect("valid block regex")
        })
        .collect()
});

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag regex"));

static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z][a-zA-Z0-9]{1,31});")
        .expect("valid entity regex")
});

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Strips page chrome and markup, leaving plain readable text
pub struct TextExtractor;

impl TextExtractor {
    /// Extract readable text from `html`.
    ///
    /// ```rust
    /// use feedbrief::extract::TextExtractor;
    ///
    /// let html = "<nav>Home | About</nav><p>Rust &amp; friends</p><script>x()</script>";
    /// assert_eq!(TextExtractor::extract_readable_text(html), "Rust & friends");
    /// ```
    pub fn extract_readable_text(html: &str) -> String {
        let html = Self::bounded(html);
        let without_comments = COMMENT_RE.replace_all(html, " ");

        let mut body = match ARTICLE_RE.captures(&without_comments) {
            Some(caps) => caps.get(1).map_or("", |m| m.as_str()).to_string(),
            None => without_comments.into_owned(),
        };

        for block in BLOCK_RES.iter() {
            if block.is_match(&body) {
                body = block.replace_all(&body, " ").into_owned();
            }
        }

        let stripped = TAG_RE.replace_all(&body, " ");
        let decoded = Self::decode_entities(&stripped);
        WHITESPACE_RE.replace_all(&decoded, " ").trim().to_string()
    }

    /// Leading slice of at most [`MAX_HTML_CHARS`] characters
    fn bounded(html: &str) -> &str {
        match html.char_indices().nth(MAX_HTML_CHARS) {
            Some((cut, _)) => &html[..cut],
            None => html,
        }
    }

    /// Decode named and numeric character references; unknown names are kept verbatim
    pub fn decode_entities(text: &str) -> String {
        ENTITY_RE
            .replace_all(text, |caps: &Captures| {
                let entity = &caps[1];
                Self::decode_entity(entity)
                    .map(String::from)
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    fn decode_entity(entity: &str) -> Option<char> {
        if let Some(numeric) = entity.strip_prefix('#') {
            let code = match numeric.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => numeric.parse::<u32>().ok()?,
            };
            return char::from_u32(code).filter(|c| *c != '\0');
        }

        let c = match entity {
            "amp" => '&',
            "lt" => '<',
            "gt" => '>',
            "quot" => '"',
            "apos" => '\'',
            "nbsp" => '\u{a0}',
            "ndash" => '\u{2013}',
            "mdash" => '\u{2014}',
            "hellip" => '\u{2026}',
            "lsquo" => '\u{2018}',
            "rsquo" => '\u{2019}',
            "ldquo" => '\u{201c}',
            "rdquo" => '\u{201d}',
            "laquo" => '\u{ab}',
            "raquo" => '\u{bb}',
            "bull" => '\u{2022}',
            "middot" => '\u{b7}',
            "copy" => '\u{a9}',
            "reg" => '\u{ae}',
            "trade" => '\u{2122}',
            "deg" => '\u{b0}',
            "euro" => '\u{20ac}',
            "pound" => '\u{a3}',
            "yen" => '\u{a5}',
            "cent" => '\u{a2}',
            "times" => '\u{d7}',
            "divide" => '\u{f7}',
            "shy" => '\u{ad}',
            _ => return None,
        };
        Some(c)
    }
}
