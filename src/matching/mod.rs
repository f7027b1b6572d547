//! Matching engine: resolve each directive to its target elements.
//!
//! Per directive, evaluated once against the whole element set:
//!
//! 1. EXACT: every element whose normalized text contains the normalized
//!    fragment. A fragment present in several elements yields one candidate
//!    per element.
//! 2. AI: only when EXACT found nothing anywhere and a semantic matcher is
//!    configured. The ranked chunk becomes the match; "not found", an
//!    out-of-range index or a backend failure leaves the directive unmatched.
//!
//! Candidates are grouped by the target's `original_index` in a `BTreeMap`,
//! so iteration order never depends on hashing. Within a group EXACT
//! candidates are ordered by where their fragment sits in the element text,
//! and at most one AI candidate survives after them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::Settings;
use crate::document::DocumentElement;
use crate::fixer::FixedDirective;
use crate::normalize::{NormalizedText, normalize};
use crate::semantic::SemanticMatcher;

/// How a candidate was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchType {
    Exact,
    Ai,
}

/// One directive hitting one element.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub element: DocumentElement,
    pub similarity: f64,
    pub match_type: MatchType,
    pub directive_index: usize,
    pub fragment: String,
    pub replace_with: String,
    /// Byte offset of the fragment (EXACT) or chunk (AI) in the element text.
    pub position: usize,
    /// Chunk the ranking backend picked; AI only.
    pub chunk: Option<String>,
}

/// A match that will not become part of a suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedMatch {
    pub directive_index: usize,
    pub para_index: usize,
    pub reason: String,
}

/// Output of [`match_directives`].
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    /// Candidates per target element, keyed by `original_index`.
    pub groups: BTreeMap<usize, Vec<MatchCandidate>>,
    /// Directives with neither an EXACT nor an AI hit.
    pub unmatched: Vec<usize>,
    pub skipped: Vec<SkippedMatch>,
    pub exact_hits: usize,
    pub ai_hits: usize,
}

/// Resolve `directives` against `elements`.
pub fn match_directives(
    directives: &[FixedDirective],
    elements: &[DocumentElement],
    mut semantic: Option<&mut SemanticMatcher>,
    settings: &Settings,
) -> MatchOutcome {
    let normalized: Vec<NormalizedText> = elements.iter().map(|e| NormalizedText::new(&e.text)).collect();
    let mut outcome = MatchOutcome::default();

    for directive in directives {
        let exact = exact_matches(directive, elements, &normalized);

        if !exact.is_empty() {
            debug!(
                directive_index = directive.directive_index,
                elements = exact.len(),
                "exact match"
            );
            outcome.exact_hits += exact.len();
            for candidate in exact {
                outcome
                    .groups
                    .entry(candidate.element.original_index)
                    .or_default()
                    .push(candidate);
            }
            continue;
        }

        let ai = semantic
            .as_deref_mut()
            .and_then(|matcher| ai_match(directive, elements, matcher, settings));

        match ai {
            Some(candidate) => {
                info!(
                    directive_index = directive.directive_index,
                    para_index = candidate.element.original_index,
                    similarity = candidate.similarity,
                    "semantic match"
                );
                outcome.ai_hits += 1;
                outcome
                    .groups
                    .entry(candidate.element.original_index)
                    .or_default()
                    .push(candidate);
            }
            None => {
                debug!(directive_index = directive.directive_index, "no match");
                outcome.unmatched.push(directive.directive_index);
            }
        }
    }

    for (para_index, group) in &mut outcome.groups {
        order_group(*para_index, group, &mut outcome.skipped);
    }

    outcome
}

fn exact_matches(
    directive: &FixedDirective,
    elements: &[DocumentElement],
    normalized: &[NormalizedText],
) -> Vec<MatchCandidate> {
    // Empty for punctuation-only fragments, which then match literally only.
    let needle = normalize(&directive.fragment);

    elements
        .iter()
        .zip(normalized)
        .filter_map(|(element, norm)| {
            let position = element
                .text
                .find(directive.fragment.as_str())
                .or_else(|| norm.find_all(&needle).first().map(|r| r.start))?;
            Some(MatchCandidate {
                element: element.clone(),
                similarity: 1.0,
                match_type: MatchType::Exact,
                directive_index: directive.directive_index,
                fragment: directive.fragment.clone(),
                replace_with: directive.replace_with.clone(),
                position,
                chunk: None,
            })
        })
        .collect()
}

fn ai_match(
    directive: &FixedDirective,
    elements: &[DocumentElement],
    matcher: &mut SemanticMatcher,
    settings: &Settings,
) -> Option<MatchCandidate> {
    let candidates = matcher.rank_candidates(
        &directive.fragment,
        elements,
        settings.max_candidates,
        settings.ai_threshold,
    );
    if candidates.is_empty() {
        debug!(directive_index = directive.directive_index, "no semantic candidates");
        return None;
    }

    let texts: Vec<String> = candidates.iter().map(|c| c.chunk.clone()).collect();
    let picked = candidates.get(matcher.resolve(&directive.fragment, &texts)?)?;
    let element = elements
        .iter()
        .find(|e| e.original_index == picked.element_index)?;
    let position = element.text.find(picked.chunk.as_str())?;

    Some(MatchCandidate {
        element: element.clone(),
        similarity: picked.score,
        match_type: MatchType::Ai,
        directive_index: directive.directive_index,
        fragment: directive.fragment.clone(),
        replace_with: directive.replace_with.clone(),
        position,
        chunk: Some(picked.chunk.clone()),
    })
}

/// EXACT by position (then directive order), then a single AI candidate.
fn order_group(para_index: usize, group: &mut Vec<MatchCandidate>, skipped: &mut Vec<SkippedMatch>) {
    group.sort_by(|a, b| {
        (a.match_type == MatchType::Ai)
            .cmp(&(b.match_type == MatchType::Ai))
            .then(a.position.cmp(&b.position))
            .then(a.directive_index.cmp(&b.directive_index))
    });

    let mut seen_ai = false;
    group.retain(|candidate| {
        if candidate.match_type != MatchType::Ai {
            return true;
        }
        if seen_ai {
            skipped.push(SkippedMatch {
                directive_index: candidate.directive_index,
                para_index,
                reason: "another semantic rewrite already targets this element".to_owned(),
            });
            return false;
        }
        seen_ai = true;
        true
    });
}
