//! Text substitution engine shared by preview, apply and undo.
//!
//! Each substituter takes `(text, fragment, replacement)` and returns the
//! rewritten text, or `None` when it cannot find the fragment. The
//! orchestrator tries them in order and stops at the first hit.
//!
//! # Layers
//!
//! 1. `literal`: every literal occurrence, through an escaped regex so the
//!    fragment is never read as a pattern
//! 2. `normalized`: every occurrence found in normalized space, mapped back
//!    to its original byte span; the span is replaced verbatim, so matching is
//!    case-insensitive but the replacement is not case-adjusted

pub mod diff;

use regex::{NoExpand, Regex};
use tracing::debug;

use crate::normalize::{NormalizedText, locate, normalize};

/// A substituter signature: `(text, fragment, replacement) -> new text`.
type Substituter = fn(&str, &str, &str) -> Option<String>;

/// The ordered substitution chain.
const SUBSTITUTION_CHAIN: &[(&str, Substituter)] = &[
    ("literal", literal_substitute),
    ("normalized", normalized_substitute),
];

/// Replace every occurrence of `fragment` in `text` with `replacement`.
///
/// Returns `None` if no layer finds the fragment.
pub fn substitute(text: &str, fragment: &str, replacement: &str) -> Option<String> {
    for &(name, substituter) in SUBSTITUTION_CHAIN {
        if let Some(out) = substituter(text, fragment, replacement) {
            debug!(layer = name, "fragment substituted");
            return Some(out);
        }
    }
    None
}

/// True when `fragment` is present literally or in normalized space.
pub fn contains_fragment(text: &str, fragment: &str) -> bool {
    position(text, fragment).is_some()
}

/// Byte offset of the first occurrence of `fragment`, literal first.
pub fn position(text: &str, fragment: &str) -> Option<usize> {
    if fragment.is_empty() {
        return None;
    }
    text.find(fragment)
        .or_else(|| locate(text, fragment).map(|r| r.start))
}

/// Layer 1: literal, regex-escaped, global.
pub fn literal_substitute(text: &str, fragment: &str, replacement: &str) -> Option<String> {
    if fragment.is_empty() || !text.contains(fragment) {
        return None;
    }
    match Regex::new(&regex::escape(fragment)) {
        Ok(re) => Some(re.replace_all(text, NoExpand(replacement)).into_owned()),
        // Oversized patterns: plain replace has the same semantics.
        Err(_) => Some(text.replace(fragment, replacement)),
    }
}

/// Layer 2: normalized spans, global.
pub fn normalized_substitute(text: &str, fragment: &str, replacement: &str) -> Option<String> {
    let spans = NormalizedText::new(text).find_all(&normalize(fragment));
    if spans.is_empty() {
        return None;
    }
    let mut out = String::with_capacity(text.len() + replacement.len() * spans.len());
    let mut cursor = 0;
    for span in spans {
        out.push_str(&text[cursor..span.start]);
        out.push_str(replacement);
        cursor = span.end;
    }
    out.push_str(&text[cursor..]);
    Some(out)
}
