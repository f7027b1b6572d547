//! Fragment fixer: staged repairs of directive search fragments.
//!
//! A directive whose normalized fragment already occurs in some element is
//! passed through untouched. Otherwise the repair chain runs cumulatively,
//! and after each stage the repaired fragment is checked for a literal hit in
//! the raw element text. The first stage that produces a hit wins; if none
//! does, the original fragment is kept and left to the matching engine.
//!
//! Directives with an empty fragment or empty replacement never leave this
//! stage; they are reported in [`FixReport::skipped`].
//!
//! # Stages
//!
//! 1. `dash`: lone hyphen to em dash
//! 2. `quote`: double quotes to guillemets
//! 3. `whitespace`: non-breaking/thin spaces, runs, trim
//! 4. `apostrophe`: apostrophe variants to one form

pub mod repairs;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::DocumentElement;
use crate::normalize::normalize;

/// A single find/replace instruction supplied by the caller.
///
/// Missing fields read as empty, so a malformed directive is reported as
/// skipped instead of failing the whole batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Directive {
    pub fragment: String,
    pub replace_with: String,
}

impl Directive {
    pub fn new(fragment: impl Into<String>, replace_with: impl Into<String>) -> Self {
        Self {
            fragment: fragment.into(),
            replace_with: replace_with.into(),
        }
    }
}

/// A directive after the repair pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedDirective {
    /// Position of the directive in the submitted batch.
    pub directive_index: usize,
    pub fragment: String,
    pub replace_with: String,
    pub original_fragment: String,
    pub was_fixed: bool,
    pub fix_type: Vec<String>,
}

/// A directive excluded from every downstream stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedDirective {
    pub directive_index: usize,
    pub reason: String,
}

/// Output of [`fix`].
#[derive(Debug, Clone, Default)]
pub struct FixReport {
    pub fixed: Vec<FixedDirective>,
    pub skipped: Vec<SkippedDirective>,
}

/// A repair function signature: rewrites a fragment.
type Repair = fn(&str) -> String;

/// The ordered repair chain.
const REPAIR_CHAIN: &[(&str, Repair)] = &[
    ("dash", repairs::dash_repair),
    ("quote", repairs::quote_repair),
    ("whitespace", repairs::whitespace_repair),
    ("apostrophe", repairs::apostrophe_repair),
];

/// Run every directive through the fixer against the current elements.
pub fn fix(directives: &[Directive], elements: &[DocumentElement]) -> FixReport {
    let normalized: Vec<String> = elements.iter().map(|e| normalize(&e.text)).collect();
    let mut report = FixReport::default();

    for (directive_index, directive) in directives.iter().enumerate() {
        if directive.fragment.trim().is_empty() || directive.replace_with.is_empty() {
            let reason = if directive.fragment.trim().is_empty() {
                "empty fragment"
            } else {
                "empty replacement"
            };
            debug!(directive_index, reason, "directive skipped");
            report.skipped.push(SkippedDirective {
                directive_index,
                reason: reason.to_owned(),
            });
            continue;
        }

        report
            .fixed
            .push(fix_one(directive_index, directive, elements, &normalized));
    }

    report
}

fn fix_one(
    directive_index: usize,
    directive: &Directive,
    elements: &[DocumentElement],
    normalized: &[String],
) -> FixedDirective {
    let passthrough = |fragment: String, fix_type: Vec<String>| FixedDirective {
        directive_index,
        was_fixed: !fix_type.is_empty(),
        fragment,
        replace_with: directive.replace_with.clone(),
        original_fragment: directive.fragment.clone(),
        fix_type,
    };

    let needle = normalize(&directive.fragment);
    if !needle.is_empty() && normalized.iter().any(|n| n.contains(&needle)) {
        return passthrough(directive.fragment.clone(), Vec::new());
    }

    let mut current = directive.fragment.clone();
    let mut applied = Vec::new();

    for &(name, repair) in REPAIR_CHAIN {
        let next = repair(&current);
        if next == current {
            continue;
        }
        debug!(directive_index, repair = name, "repair changed fragment");
        current = next;
        applied.push(name.to_owned());

        if elements.iter().any(|e| e.text.contains(current.as_str())) {
            debug!(directive_index, fix_type = ?applied, "fragment fixed");
            return passthrough(current, applied);
        }
    }

    debug!(directive_index, "no repair produced a match");
    passthrough(directive.fragment.clone(), Vec::new())
}
