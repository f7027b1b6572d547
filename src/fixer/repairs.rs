//! Fragment repair implementations.
//!
//! Each repair takes a search fragment and returns a rewritten fragment
//! closer to typographic house style. Repairs are idempotent and never look at
//! the document; the orchestrator in `mod.rs` decides whether a repair helped.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::char::is_combining_mark;

use crate::normalize::is_apostrophe_like;

/// Typographic apostrophe written by [`apostrophe_repair`].
pub const HOUSE_APOSTROPHE: char = '\u{2019}';

static LONE_HYPHEN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?m)(^|[ \t\u{00A0}])-([ \t\u{00A0}]|$)").ok());

static QUOTED_SPAN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new("[\"\u{201C}\u{201D}\u{201E}]([^\"\u{201C}\u{201D}\u{201E}]+)[\"\u{201C}\u{201D}\u{201E}]").ok()
});

// ---------------------------------------------------------------------------
// Stage 1: dash
// ---------------------------------------------------------------------------

/// Lone hyphen between spaces (or at a line edge) becomes an em dash; the
/// surrounding spacing is kept as is.
pub fn dash_repair(fragment: &str) -> String {
    let Some(re) = LONE_HYPHEN.as_ref() else {
        return fragment.to_owned();
    };
    // Run twice so "a - - b" style overlaps are fully rewritten.
    let once = re.replace_all(fragment, "${1}\u{2014}${2}");
    re.replace_all(&once, "${1}\u{2014}${2}").into_owned()
}

// ---------------------------------------------------------------------------
// Stage 2: quotes
// ---------------------------------------------------------------------------

/// ASCII or curly double quotes around a span become guillemets.
pub fn quote_repair(fragment: &str) -> String {
    match QUOTED_SPAN.as_ref() {
        Some(re) => re.replace_all(fragment, "\u{00AB}${1}\u{00BB}").into_owned(),
        None => fragment.to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Stage 3: whitespace
// ---------------------------------------------------------------------------

/// Non-breaking and thin spaces become regular spaces, zero-width spaces are
/// dropped, runs collapse to one space and the ends are trimmed.
pub fn whitespace_repair(fragment: &str) -> String {
    fragment
        .replace(['\u{200B}', '\u{FEFF}'], "")
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Stage 4: apostrophes
// ---------------------------------------------------------------------------

/// Every apostrophe-like character becomes the typographic apostrophe.
/// Combining accents are left alone when they sit on a base char.
pub fn apostrophe_repair(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut prev: Option<char> = None;
    for ch in fragment.chars() {
        let has_base = prev.is_some_and(|p| !p.is_whitespace());
        if is_apostrophe_like(ch) && !(has_base && is_combining_mark(ch)) {
            out.push(HOUSE_APOSTROPHE);
        } else {
            out.push(ch);
        }
        prev = Some(ch);
    }
    out
}
