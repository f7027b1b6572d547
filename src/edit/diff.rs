//! Word-level diff rendering using the `similar` crate.
//!
//! Previews show each suggestion as an inline diff, `[-old-]{+new+}`, so the
//! caller can approve changes without a rich diff view.

use similar::{ChangeTag, TextDiff};

/// Render an inline word diff between `old` and `new`.
pub fn inline_diff(old: &str, new: &str) -> String {
    let diff = TextDiff::from_words(old, new);
    let mut out = String::with_capacity(old.len() + new.len());
    let mut open: Option<ChangeTag> = None;

    for change in diff.iter_all_changes() {
        let tag = change.tag();
        if open != Some(tag) {
            close(&mut out, open);
            match tag {
                ChangeTag::Delete => out.push_str("[-"),
                ChangeTag::Insert => out.push_str("{+"),
                ChangeTag::Equal => {}
            }
            open = Some(tag);
        }
        out.push_str(change.value());
    }
    close(&mut out, open);
    out
}

fn close(out: &mut String, tag: Option<ChangeTag>) {
    match tag {
        Some(ChangeTag::Delete) => out.push_str("-]"),
        Some(ChangeTag::Insert) => out.push_str("+}"),
        Some(ChangeTag::Equal) | None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_diff() {
        assert_eq!(inline_diff("hello world", "hello world"), "hello world");
    }

    #[test]
    fn test_word_change() {
        let result = inline_diff("Teh quick fox", "The quick fox");
        assert!(result.contains("[-Teh-]"));
        assert!(result.contains("{+The+}"));
        assert!(result.ends_with("quick fox"));
    }
}
