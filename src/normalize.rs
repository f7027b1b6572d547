//! Text normalizer used purely as a comparison key.
//!
//! [`normalize`] composes to NFC, lowercases, trims, collapses whitespace runs, folds every
//! apostrophe-like code point to `'` and every dash-like code point to `-`,
//! and drops everything else that is not a letter or digit. Stored text is
//! never rewritten with it.
//!
//! [`NormalizedText`] keeps a map from each normalized character back to the
//! byte span it came from, so a hit found in normalized space can be located
//! in the original string.

use std::ops::Range;

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Canonical apostrophe emitted by the normalizer.
pub const CANONICAL_APOSTROPHE: char = '\'';

/// Canonical dash emitted by the normalizer.
pub const CANONICAL_DASH: char = '-';

/// Returns true for typewriter/curly apostrophes, back-ticks, primes, modifier
/// letters and the combining accents commonly typed in their place. A
/// combining accent only counts when it has no base char to compose with.
pub const fn is_apostrophe_like(ch: char) -> bool {
    matches!(
        ch,
        '\'' | '`'
            | '\u{00B4}' // acute accent
            | '\u{2018}'
            | '\u{2019}'
            | '\u{201B}'
            | '\u{2032}' // prime
            | '\u{02B9}'
            | '\u{02BB}'
            | '\u{02BC}'
            | '\u{02BD}'
            | '\u{02C8}'
            | '\u{0300}' // combining grave
            | '\u{0301}' // combining acute
            | '\u{FF07}'
    )
}

/// Returns true for hyphen, en/em dashes, minus and their compatibility forms.
pub const fn is_dash_like(ch: char) -> bool {
    matches!(
        ch,
        '-' | '\u{2010}'
            | '\u{2011}'
            | '\u{2012}'
            | '\u{2013}' // en dash
            | '\u{2014}' // em dash
            | '\u{2015}'
            | '\u{2212}' // minus
            | '\u{FE58}'
            | '\u{FE63}'
            | '\u{FF0D}'
    )
}

/// Normalize `text` into its comparison key.
///
/// Idempotent: `normalize(&normalize(x)) == normalize(x)`.
pub fn normalize(text: &str) -> String {
    NormalizedText::new(text).text
}

/// Normalized text plus a back-map into the source string.
#[derive(Debug, Clone)]
pub struct NormalizedText {
    /// The normalized comparison key.
    pub text: String,
    /// One entry per normalized char: (byte offset in `text`, source byte span).
    spans: Vec<(usize, Range<usize>)>,
}

impl NormalizedText {
    /// Normalize `source`, recording where each output char came from.
    ///
    /// A base char and the combining marks after it are composed to NFC as
    /// one cluster, and every char the cluster yields maps to the whole
    /// cluster's span. Marks that still remain uncomposed are dropped. A mark
    /// with no base (at the start, or after whitespace) stands on its own and
    /// folds like any other char.
    pub fn new(source: &str) -> Self {
        let mut text = String::with_capacity(source.len());
        let mut spans = Vec::with_capacity(source.len());
        // Source span of the whitespace run waiting to be emitted, if any.
        let mut pending_space: Option<Range<usize>> = None;
        let mut chars = source.char_indices().peekable();

        while let Some((offset, ch)) = chars.next() {
            if ch.is_whitespace() {
                if pending_space.is_none() {
                    pending_space = Some(offset..offset + ch.len_utf8());
                }
                continue;
            }

            let mut end = offset + ch.len_utf8();
            if !is_combining_mark(ch) {
                while let Some(&(at, mark)) = chars.peek() {
                    if !is_combining_mark(mark) {
                        break;
                    }
                    end = at + mark.len_utf8();
                    chars.next();
                }
            }
            let src = offset..end;
            let cluster = &source[src.clone()];

            for (i, composed) in cluster.nfc().enumerate() {
                if i > 0 && is_combining_mark(composed) {
                    continue;
                }
                for lowered in composed.to_lowercase() {
                    let mapped = if is_apostrophe_like(lowered) {
                        CANONICAL_APOSTROPHE
                    } else if is_dash_like(lowered) {
                        CANONICAL_DASH
                    } else if lowered.is_alphanumeric() {
                        lowered
                    } else {
                        continue;
                    };

                    if let Some(space) = pending_space.take() {
                        // Leading whitespace is trimmed, not emitted.
                        if !text.is_empty() {
                            spans.push((text.len(), space));
                            text.push(' ');
                        }
                    }
                    spans.push((text.len(), src.clone()));
                    text.push(mapped);
                }
            }
        }

        Self { text, spans }
    }

    /// Map a byte range of `self.text` back to a byte range of the source.
    fn source_range(&self, normalized: Range<usize>) -> Option<Range<usize>> {
        if normalized.is_empty() {
            return None;
        }
        let first = self.spans.partition_point(|(at, _)| *at < normalized.start);
        let last = self
            .spans
            .partition_point(|(at, _)| *at < normalized.end)
            .checked_sub(1)?;
        let start = self.spans.get(first)?.1.start;
        let end = self.spans.get(last)?.1.end;
        (start < end).then_some(start..end)
    }

    /// Locate every non-overlapping occurrence of the already-normalized
    /// `needle`, returned as byte ranges into the source string.
    pub fn find_all(&self, needle: &str) -> Vec<Range<usize>> {
        if needle.is_empty() {
            return Vec::new();
        }
        self.text
            .match_indices(needle)
            .filter_map(|(at, m)| self.source_range(at..at + m.len()))
            .collect()
    }
}

/// Byte range of the first occurrence of `fragment` in `text`, compared in
/// normalized space.
pub fn locate(text: &str, fragment: &str) -> Option<Range<usize>> {
    let needle = normalize(fragment);
    NormalizedText::new(text).find_all(&needle).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_and_trims_whitespace() {
        assert_eq!(normalize("  a   b \t c\n"), "a b c");
        assert_eq!(normalize("a   b"), normalize("a b"));
    }

    #[test]
    fn test_folds_dashes_and_apostrophes() {
        assert_eq!(normalize("well \u{2014} known"), "well - known");
        assert_eq!(normalize("well \u{2013} known"), "well - known");
        assert_eq!(normalize("don\u{2019}t"), "don't");
        assert_eq!(normalize("don`t"), "don't");
        assert_eq!(normalize("don\u{02BC}t"), "don't");
    }

    #[test]
    fn test_strips_punctuation_and_quotes() {
        assert_eq!(normalize("\u{00AB}Hello,\u{00BB} \"World\"!"), "hello world");
    }

    #[test]
    fn test_keeps_extended_latin_and_digits() {
        assert_eq!(normalize("Łódź Ärger 42"), "łódź ärger 42");
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "  Teh\u{00A0}Quick \u{2014} Brown\u{2019}s FOX!! ",
            "İstanbul",
            "«quoted» – text",
            "cafe\u{301} \u{301}s",
            "",
            "   ",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn test_composes_before_folding() {
        assert_eq!(normalize("cafe\u{301}"), normalize("caf\u{e9}"));
        assert_eq!(normalize("CAFE\u{301}"), "caf\u{e9}");
        // No base to compose with: still an apostrophe substitute.
        assert_eq!(normalize("don \u{301}t"), "don 't");
        assert_eq!(normalize("\u{301}s"), "'s");
        // Marks that do not compose are dropped.
        assert_eq!(normalize("q\u{301}"), "q");
    }

    #[test]
    fn test_locate_decomposed_source() {
        let text = "Meet at the cafe\u{301} today";
        let range = locate(text, "caf\u{e9} today").expect("located");
        assert_eq!(&text[range], "cafe\u{301} today");
    }

    #[test]
    fn test_locate_maps_back_to_source() {
        let text = "Teh Quick Brown Fox";
        let range = locate(text, "teh quick").expect("located");
        assert_eq!(&text[range], "Teh Quick");
    }

    #[test]
    fn test_locate_across_typographic_drift() {
        let text = "It was \u{2014} as they say \u{2014} done.";
        let range = locate(text, "was - as they").expect("located");
        assert_eq!(&text[range], "was \u{2014} as they");
    }

    #[test]
    fn test_find_all_non_overlapping() {
        let norm = NormalizedText::new("Cat, cat and CAT.");
        let hits = norm.find_all("cat");
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[2], 13..16);
    }

    #[test]
    fn test_empty_needle_never_matches() {
        assert!(locate("anything", "!!!").is_none());
        assert!(locate("anything", "").is_none());
    }
}
