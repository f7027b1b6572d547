//! Candidate narrowing before a ranking call.
//!
//! Composite similarity = 0.5 word overlap + 0.3 long-word overlap +
//! 0.2 length ratio, all computed on normalized text. Chunks are runs of
//! whole sentences, sliced straight out of the element text so a chosen chunk
//! can be located again verbatim.

use std::collections::HashSet;

use crate::normalize::normalize;

const WORD_WEIGHT: f64 = 0.5;
const IMPORTANT_WEIGHT: f64 = 0.3;
const LENGTH_WEIGHT: f64 = 0.2;

/// Words at least this many chars long count as "important".
const IMPORTANT_WORD_CHARS: usize = 5;

fn word_set(normalized: &str) -> HashSet<&str> {
    normalized.split(' ').filter(|w| !w.is_empty()).collect()
}

fn overlap(needle: &HashSet<&str>, hay: &HashSet<&str>) -> f64 {
    if needle.is_empty() {
        return 0.0;
    }
    let shared = needle.iter().filter(|w| hay.contains(*w)).count();
    shared as f64 / needle.len() as f64
}

/// Composite similarity of `fragment` against `text`, in `[0, 1]`.
pub fn similarity(fragment: &str, text: &str) -> f64 {
    let f = normalize(fragment);
    let t = normalize(text);
    if f.is_empty() || t.is_empty() {
        return 0.0;
    }

    let f_words = word_set(&f);
    let t_words = word_set(&t);
    let words = overlap(&f_words, &t_words);

    let f_important: HashSet<&str> = f_words
        .iter()
        .copied()
        .filter(|w| w.chars().count() >= IMPORTANT_WORD_CHARS)
        .collect();
    let important = if f_important.is_empty() {
        words
    } else {
        overlap(&f_important, &t_words)
    };

    let (f_len, t_len) = (f.chars().count() as f64, t.chars().count() as f64);
    let length = f_len.min(t_len) / f_len.max(t_len);

    (WORD_WEIGHT * words + IMPORTANT_WEIGHT * important + LENGTH_WEIGHT * length).clamp(0.0, 1.0)
}

/// Byte ranges of sentences in `text`, trimmed, in order.
fn sentence_ranges(text: &str) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((at, ch)) = chars.next() {
        let terminal = matches!(ch, '.' | '!' | '?' | '\u{2026}' | ';') || ch == '\n';
        let boundary = chars.peek().is_none_or(|(_, next)| next.is_whitespace());
        if terminal && boundary {
            let end = at + ch.len_utf8();
            push_trimmed(text, start, end, &mut out);
            start = end;
        }
    }
    push_trimmed(text, start, text.len(), &mut out);
    out
}

fn push_trimmed(text: &str, start: usize, end: usize, out: &mut Vec<(usize, usize)>) {
    let slice = &text[start..end];
    let lead = slice.len() - slice.trim_start().len();
    let trimmed = slice.trim();
    if !trimmed.is_empty() {
        out.push((start + lead, start + lead + trimmed.len()));
    }
}

/// Split `text` into chunks of whole sentences of about `chunk_chars`
/// characters. A single sentence longer than that is its own chunk.
pub fn chunk_text(text: &str, chunk_chars: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut current: Option<(usize, usize)> = None;

    for (s, e) in sentence_ranges(text) {
        current = match current {
            None => Some((s, e)),
            Some((cs, _)) if text[cs..e].chars().count() <= chunk_chars => Some((cs, e)),
            Some((cs, ce)) => {
                chunks.push(&text[cs..ce]);
                Some((s, e))
            }
        };
    }
    if let Some((cs, ce)) = current {
        chunks.push(&text[cs..ce]);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_text_scores_one() {
        let s = similarity("The quick brown fox", "the quick brown fox!");
        assert!((s - 1.0).abs() < 1e-9, "got {s}");
    }

    #[test]
    fn test_unrelated_text_scores_low() {
        let s = similarity(
            "quarterly revenue growth",
            "a long poem about the sea, the sky and the wandering birds at dusk",
        );
        assert!(s < 0.15, "got {s}");
    }

    #[test]
    fn test_partial_overlap_is_between() {
        let s = similarity("revenue grew strongly", "In 2023 revenue grew by ten percent across regions.");
        assert!(s > 0.5 && s < 1.0, "got {s}");
    }

    #[test]
    fn test_empty_inputs() {
        assert!(similarity("", "text").abs() < f64::EPSILON);
        assert!(similarity("text", "...").abs() < f64::EPSILON);
    }

    #[test]
    fn test_chunks_are_verbatim_slices() {
        let text = "First sentence here. Second one follows! Third? Last without stop";
        let chunks = chunk_text(text, 25);
        assert!(chunks.len() >= 3);
        for chunk in &chunks {
            assert!(text.contains(chunk));
            assert_eq!(chunk.trim(), *chunk);
        }
        assert_eq!(chunks[0], "First sentence here.");
        assert!(chunks.last().is_some_and(|c| c.ends_with("Last without stop")));
    }

    #[test]
    fn test_short_sentences_merge() {
        let chunks = chunk_text("A. B. C.", 100);
        assert_eq!(chunks, vec!["A. B. C."]);
    }

    #[test]
    fn test_decimal_point_is_not_a_boundary() {
        let chunks = chunk_text("Pi is 3.14 roughly. Next.", 5);
        assert_eq!(chunks, vec!["Pi is 3.14 roughly.", "Next."]);
    }
}
