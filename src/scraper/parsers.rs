use crate::models::RawOffer;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use scraper::Html;
use std::ops::Range;

// ── Offer blocks ──────────────────────────────────────────────────────────────

/// Start of an embedded schema.org offer, e.g.
/// `{"@type":"Offer","name":"Stan 45m2","price":"95000",...,"seller":{"name":"Ana"}}`
static OFFER_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\{\s*"@type"\s*:\s*"Offer""#).expect("valid offer start regex")
});

/// Candidate offer blocks in document order. Borrowing, so every call
/// walks the same document afresh.
pub fn offer_blocks(html: &str) -> OfferBlocks<'_> {
    OfferBlocks { html, pos: 0 }
}

pub struct OfferBlocks<'a> {
    html: &'a str,
    pos: usize,
}

impl<'a> Iterator for OfferBlocks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let start_match = OFFER_START.find_at(self.html, self.pos)?;
        let start = start_match.start();

        let end = match balanced_object_len(&self.html[start..]) {
            Some(len) => start + len,
            // Unterminated: hand over everything up to the next offer so the
            // caller can still salvage (or reject) it on its own.
            None => OFFER_START
                .find_at(self.html, start_match.end())
                .map(|m| m.start())
                .unwrap_or(self.html.len()),
        };

        self.pos = end;
        Some(&self.html[start..end])
    }
}

/// Brackets and braces of a JSON text that sit outside string literals.
fn structural_bytes(s: &str) -> impl Iterator<Item = (usize, u8)> + '_ {
    let mut in_string = false;
    let mut escaped = false;
    s.bytes().enumerate().filter(move |&(_, b)| {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            return false;
        }
        if b == b'"' {
            in_string = true;
            return false;
        }
        matches!(b, b'{' | b'}' | b'[' | b']')
    })
}

/// Byte length of the JSON object opening at `s[0]`, string-aware.
fn balanced_object_len(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in structural_bytes(s) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Byte ranges of the objects and arrays nested directly inside the
/// object opening at `s[0]`. An unterminated one runs to the end.
fn nested_spans(s: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut open_at = 0;
    for (i, b) in structural_bytes(s) {
        match b {
            b'{' | b'[' => {
                if depth == 1 {
                    open_at = i;
                }
                depth += 1;
            }
            _ => {
                depth = depth.saturating_sub(1);
                if depth == 1 {
                    spans.push(open_at..i + 1);
                } else if depth == 0 {
                    return spans;
                }
            }
        }
    }
    if depth > 1 {
        spans.push(open_at..s.len());
    }
    spans
}

/// A JSON object text together with the spans of its nested values, so
/// key lookups can be limited to the object's own keys.
struct ObjectView<'a> {
    text: &'a str,
    nested: Vec<Range<usize>>,
}

impl<'a> ObjectView<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, nested: nested_spans(text) }
    }

    fn is_own(&self, pos: usize) -> bool {
        !self.nested.iter().any(|span| span.contains(&pos))
    }

    /// First match of `re` that starts at this object's own level.
    fn own_captures(&self, re: &Regex) -> Option<Captures<'a>> {
        re.captures_iter(self.text)
            .find(|c| c.get(0).is_some_and(|m| self.is_own(m.start())))
    }

    /// The nested object starting at `pos`, if one does.
    fn object_at(&self, pos: usize) -> Option<ObjectView<'a>> {
        let rest = &self.text[pos..];
        if !rest.starts_with('{') {
            return None;
        }
        let len = balanced_object_len(rest).unwrap_or(rest.len());
        Some(ObjectView::new(&rest[..len]))
    }
}

// ── Field schema ──────────────────────────────────────────────────────────────

/// Body of a JSON string literal, escapes included.
const JSON_STR: &str = r#""(?P<value>(?:[^"\\]|\\.)*)""#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferField {
    Title,
    Price,
    Url,
    Location,
    Image,
    Seller,
    Published,
}

impl OfferField {
    pub const ALL: [OfferField; 7] = [
        OfferField::Title,
        OfferField::Price,
        OfferField::Url,
        OfferField::Location,
        OfferField::Image,
        OfferField::Seller,
        OfferField::Published,
    ];

    fn pattern(self) -> String {
        match self {
            OfferField::Title => format!(r#""name"\s*:\s*{JSON_STR}"#),
            OfferField::Price => {
                r#""price"\s*:\s*(?:"(?P<value>[^"]*)"|(?P<number>[-+0-9.eE]+))"#.to_string()
            }
            OfferField::Url => format!(r#""url"\s*:\s*{JSON_STR}"#),
            OfferField::Location => format!(r#""addressLocality"\s*:\s*{JSON_STR}"#),
            OfferField::Image => format!(r#""image"\s*:\s*(?:(?P<object>\{{)|{JSON_STR})"#),
            OfferField::Seller => format!(r#""seller"\s*:\s*(?:(?P<object>\{{)|{JSON_STR})"#),
            OfferField::Published => format!(r#""datePublished"\s*:\s*{JSON_STR}"#),
        }
    }
}

/// Whole price literal: digits, optionally grouped or with decimals
/// (`125000`, `1.250.000`, `89000.50`).
static CLEAN_PRICE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+(?:[.,]\d+)*$").expect("valid price regex"));

static FIELD_PATTERNS: Lazy<Vec<(OfferField, Regex)>> = Lazy::new(|| {
    OfferField::ALL
        .iter()
        .map(|f| (*f, Regex::new(&f.pattern()).expect("valid offer field regex")))
        .collect()
});

fn field_regex(field: OfferField) -> &'static Regex {
    FIELD_PATTERNS
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, re)| re)
        .expect("every OfferField has a pattern")
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Resolve HTML entities (`&quot;`, `&amp;`, `&#353;`) in a block.
pub fn decode_entities(block: &str) -> String {
    if !block.contains('&') {
        return block.to_string();
    }
    Html::parse_fragment(block)
        .root_element()
        .text()
        .collect::<String>()
}

/// Decode JSON string escapes (`\/`, `\u0161`, `\"`); falls back to the
/// common `\/` rewrite when the literal is not valid JSON.
pub fn unescape_json_str(raw: &str) -> String {
    match serde_json::from_str::<String>(&format!("\"{raw}\"")) {
        Ok(s) => s,
        Err(_) => raw.replace("\\/", "/"),
    }
}

// ── Block → RawOffer ──────────────────────────────────────────────────────────

fn string_value(c: &Captures<'_>) -> Option<String> {
    c.name("value")
        .map(|m| unescape_json_str(m.as_str()).trim().to_string())
        .filter(|s| !s.is_empty())
}

/// A key whose value is either a string or an object carrying that
/// string under `inner` (`"seller":{"name":..}`, `"image":{"url":..}`).
fn string_or_object_field(
    offer: &ObjectView<'_>,
    field: OfferField,
    inner: OfferField,
) -> Option<String> {
    let c = offer.own_captures(field_regex(field))?;
    match c.name("object") {
        Some(open) => {
            let nested = offer.object_at(open.start())?;
            nested.own_captures(field_regex(inner)).as_ref().and_then(string_value)
        }
        None => string_value(&c),
    }
}

fn price_value(offer: &ObjectView<'_>) -> Option<String> {
    let c = offer.own_captures(field_regex(OfferField::Price))?;
    let raw = c.name("value").or_else(|| c.name("number"))?.as_str().trim();
    CLEAN_PRICE.is_match(raw).then(|| raw.to_string())
}

/// Extract every field independently; a miss leaves that field `None`.
/// Scalar fields come from the offer's own keys only, never from the
/// seller or image objects nested inside it.
pub fn parse_offer_block(block: &str) -> RawOffer {
    let block = decode_entities(block);
    let offer = ObjectView::new(&block);

    let own = |field: OfferField| -> Option<String> {
        offer.own_captures(field_regex(field)).as_ref().and_then(string_value)
    };

    // Locality lives in a nested address object, so it is searched deep.
    let location = field_regex(OfferField::Location)
        .captures(&block)
        .as_ref()
        .and_then(string_value);

    RawOffer {
        title: own(OfferField::Title),
        price: price_value(&offer),
        url: own(OfferField::Url),
        location,
        image_url: string_or_object_field(&offer, OfferField::Image, OfferField::Url),
        seller: string_or_object_field(&offer, OfferField::Seller, OfferField::Title),
        published_at: own(OfferField::Published),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
