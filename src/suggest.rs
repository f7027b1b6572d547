//! Suggestion builder: one displayable change per target element.
//!
//! EXACT candidates in a group are folded into one composite suggestion by
//! substituting each fragment globally, in group order. A group with no EXACT
//! candidate becomes a single AI suggestion whose new text is the element
//! text with the ranked chunk rewritten. When both kinds hit one element the
//! EXACT composite wins and the AI candidate is reported as skipped.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::ElementType;
use crate::edit;
use crate::matching::{MatchCandidate, MatchOutcome, MatchType, SkippedMatch};

/// Separator of composite `fragment`/`replaceWith` display strings.
///
/// Tokens are escaped with [`escape_token`] before joining, so a display
/// string always splits into exactly `replacementCount` pieces.
pub const COMPOSITE_SEPARATOR: &str = " + ";

/// Prefix `\` and `+` with a backslash.
pub fn escape_token(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    for ch in token.chars() {
        if matches!(ch, '\\' | '+') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Inverse of [`escape_token`].
pub fn unescape_token(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
                continue;
            }
        }
        out.push(ch);
    }
    out
}

/// Split a composite display string into its unescaped tokens.
pub fn split_composite(display: &str) -> Vec<String> {
    display.split(COMPOSITE_SEPARATOR).map(unescape_token).collect()
}

/// One fragment/replacement pair folded into a suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplacementPart {
    pub directive_index: usize,
    pub fragment: String,
    pub replace_with: String,
}

/// A proposed change to one element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    #[serde(rename = "type")]
    pub match_type: MatchType,
    pub para_index: usize,
    pub element_id: String,
    pub element_type: ElementType,
    pub similarity: f64,
    pub old_text: String,
    pub new_text: String,
    /// Display form; escaped parts joined by [`COMPOSITE_SEPARATOR`].
    pub fragment: String,
    pub replace_with: String,
    /// First directive folded into this suggestion.
    pub directive_index: usize,
    pub replacement_count: usize,
    /// Structured pairs, in application order.
    #[serde(default)]
    pub parts: Vec<ReplacementPart>,
}

impl Suggestion {
    /// The replacement pairs. A suggestion sent back without `parts` is
    /// rebuilt from its display strings.
    pub fn parts(&self) -> Vec<ReplacementPart> {
        if !self.parts.is_empty() {
            return self.parts.clone();
        }
        let fragments = split_composite(&self.fragment);
        let replacements = split_composite(&self.replace_with);
        if fragments.len() != replacements.len() {
            return vec![ReplacementPart {
                directive_index: self.directive_index,
                fragment: unescape_token(&self.fragment),
                replace_with: unescape_token(&self.replace_with),
            }];
        }
        fragments
            .into_iter()
            .zip(replacements)
            .map(|(fragment, replace_with)| ReplacementPart {
                directive_index: self.directive_index,
                fragment,
                replace_with,
            })
            .collect()
    }
}

/// Output of [`build`].
#[derive(Debug, Clone, Default)]
pub struct BuildOutcome {
    /// Sorted by ascending `para_index`.
    pub suggestions: Vec<Suggestion>,
    pub skipped: Vec<SkippedMatch>,
}

/// Turn grouped matches into suggestions.
pub fn build(outcome: &MatchOutcome) -> BuildOutcome {
    let mut built = BuildOutcome {
        suggestions: Vec::with_capacity(outcome.groups.len()),
        skipped: Vec::new(),
    };

    for (&para_index, group) in &outcome.groups {
        let (exact, ai): (Vec<&MatchCandidate>, Vec<&MatchCandidate>) =
            group.iter().partition(|c| c.match_type == MatchType::Exact);

        if exact.is_empty() {
            if let Some(candidate) = ai.first() {
                if let Some(s) = ai_suggestion(candidate) {
                    built.suggestions.push(s);
                } else {
                    built.skipped.push(skip(candidate, "ranked chunk no longer in element text"));
                }
            }
            continue;
        }

        for candidate in &ai {
            debug!(para_index, directive_index = candidate.directive_index, "AI match loses to EXACT");
            built
                .skipped
                .push(skip(candidate, "exact replacement already targets this element"));
        }

        if let Some(s) = exact_suggestion(&exact, &mut built.skipped) {
            built.suggestions.push(s);
        }
    }

    built.suggestions.sort_by_key(|s| s.para_index);
    built
}

fn skip(candidate: &MatchCandidate, reason: &str) -> SkippedMatch {
    SkippedMatch {
        directive_index: candidate.directive_index,
        para_index: candidate.element.original_index,
        reason: reason.to_owned(),
    }
}

fn exact_suggestion(exact: &[&MatchCandidate], skipped: &mut Vec<SkippedMatch>) -> Option<Suggestion> {
    let first = exact.first()?;
    let old_text = first.element.text.clone();
    let mut new_text = old_text.clone();
    let mut parts = Vec::with_capacity(exact.len());

    for candidate in exact {
        match edit::substitute(&new_text, &candidate.fragment, &candidate.replace_with) {
            Some(next) => {
                new_text = next;
                parts.push(ReplacementPart {
                    directive_index: candidate.directive_index,
                    fragment: candidate.fragment.clone(),
                    replace_with: candidate.replace_with.clone(),
                });
            }
            None => skipped.push(skip(
                candidate,
                "fragment consumed by an earlier replacement in this element",
            )),
        }
    }

    if parts.is_empty() {
        return None;
    }
    if new_text == old_text {
        debug!(para_index = first.element.original_index, "replacement is a no-op");
        for part in &parts {
            skipped.push(SkippedMatch {
                directive_index: part.directive_index,
                para_index: first.element.original_index,
                reason: "replacement leaves the text unchanged".to_owned(),
            });
        }
        return None;
    }

    Some(Suggestion {
        match_type: MatchType::Exact,
        para_index: first.element.original_index,
        element_id: first.element.id.clone(),
        element_type: first.element.type_name,
        similarity: 1.0,
        fragment: join(parts.iter().map(|p| p.fragment.as_str())),
        replace_with: join(parts.iter().map(|p| p.replace_with.as_str())),
        directive_index: parts[0].directive_index,
        replacement_count: parts.len(),
        old_text,
        new_text,
        parts,
    })
}

fn ai_suggestion(candidate: &MatchCandidate) -> Option<Suggestion> {
    let chunk = candidate.chunk.as_deref()?;
    let old_text = candidate.element.text.clone();
    if !old_text.contains(chunk) {
        return None;
    }
    let new_text = old_text.replacen(chunk, &candidate.replace_with, 1);

    Some(Suggestion {
        match_type: MatchType::Ai,
        para_index: candidate.element.original_index,
        element_id: candidate.element.id.clone(),
        element_type: candidate.element.type_name,
        similarity: candidate.similarity,
        old_text,
        new_text,
        fragment: escape_token(&candidate.fragment),
        replace_with: escape_token(&candidate.replace_with),
        directive_index: candidate.directive_index,
        replacement_count: 1,
        parts: vec![ReplacementPart {
            directive_index: candidate.directive_index,
            fragment: candidate.fragment.clone(),
            replace_with: candidate.replace_with.clone(),
        }],
    })
}

fn join<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items.map(escape_token).collect::<Vec<_>>().join(COMPOSITE_SEPARATOR)
}
