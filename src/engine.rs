//! Presentation surface: preview, apply, undo and progress.
//!
//! The engine owns the state that outlives one call (operation log,
//! semantic matcher and its cache, progress tracker) and walks the phase
//! machine below. Callers get a result object back for everything except an
//! unreadable document or an operation requested from the wrong phase.
//!
//! ```text
//! Idle ──preview──▶ Previewing ──▶ AwaitingApproval ──apply──▶ Applying ──▶ Applied
//!  ▲                                                                          │
//!  └──────────────────────────── Undoing ◀──────────undo───────────────────────┘
//! ```
//!
//! Undo is also accepted from `Idle` and `AwaitingApproval`, since the backup
//! batch lives in the document's store and survives restarts.

use serde::Serialize;
use tracing::info;

use crate::apply::progress::{Progress, ProgressTracker};
use crate::apply::{self, ApplyReport, UndoReport};
use crate::config::Settings;
use crate::document::DocumentHost;
use crate::edit::diff::inline_diff;
use crate::error::{BulkfixError, BulkfixResult};
use crate::fixer::{self, Directive, SkippedDirective};
use crate::matching::{self, SkippedMatch};
use crate::oplog::{DEFAULT_LOG_CAPACITY, OperationLog};
use crate::semantic::SemanticMatcher;
use crate::store::KvStore;
use crate::suggest::{self, Suggestion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Idle,
    Previewing,
    AwaitingApproval,
    Applying,
    Applied,
    Undoing,
}

impl Phase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Previewing => "previewing",
            Self::AwaitingApproval => "awaiting approval",
            Self::Applying => "applying",
            Self::Applied => "applied",
            Self::Undoing => "undoing",
        }
    }

    const fn in_flight(self) -> bool {
        matches!(self, Self::Previewing | Self::Applying | Self::Undoing)
    }
}

/// A suggestion plus its rendered word diff.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewItem {
    #[serde(flatten)]
    pub suggestion: Suggestion,
    pub diff: String,
}

/// Output of [`Engine::generate_preview`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Preview {
    pub suggestions: Vec<PreviewItem>,
    pub total_directives: usize,
    /// Directive indices that produced no suggestion.
    pub unmatched: Vec<usize>,
    pub skipped_directives: Vec<SkippedDirective>,
    pub skipped_matches: Vec<SkippedMatch>,
    /// Directives rewritten by the fragment fixer.
    pub fixed: usize,
    pub exact_hits: usize,
    pub ai_hits: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
}

impl Preview {
    /// The bare suggestions, in presentation order.
    pub fn into_suggestions(self) -> Vec<Suggestion> {
        self.suggestions.into_iter().map(|i| i.suggestion).collect()
    }
}

/// Output of [`Engine::apply_suggestions`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplySummary {
    #[serde(flatten)]
    pub report: ApplyReport,
    pub summary: String,
    pub log: String,
}

/// Output of [`Engine::undo_last_run`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoSummary {
    #[serde(flatten)]
    pub report: UndoReport,
    pub summary: String,
    pub log: String,
}

#[derive(Debug)]
pub struct Engine {
    phase: Phase,
    log: OperationLog,
    semantic: Option<SemanticMatcher>,
    progress: ProgressTracker,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// An engine with no semantic backend: EXACT matching only.
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            log: OperationLog::new(DEFAULT_LOG_CAPACITY),
            semantic: None,
            progress: ProgressTracker::new(),
        }
    }

    #[must_use]
    pub fn with_semantic(mut self, matcher: SemanticMatcher) -> Self {
        self.semantic = Some(matcher);
        self
    }

    pub const fn phase(&self) -> Phase {
        self.phase
    }

    pub const fn log(&self) -> &OperationLog {
        &self.log
    }

    pub const fn has_semantic(&self) -> bool {
        self.semantic.is_some()
    }

    /// A handle that can be polled from another thread.
    pub fn progress_handle(&self) -> ProgressTracker {
        self.progress.clone()
    }

    pub fn get_progress(&self) -> Progress {
        self.progress.snapshot()
    }

    fn enter(&mut self, requested: &str, allowed: &[Phase], next: Phase) -> BulkfixResult<Phase> {
        if self.phase.in_flight() || !allowed.contains(&self.phase) {
            return Err(BulkfixError::InvalidPhase {
                requested: requested.to_owned(),
                phase: self.phase.as_str().to_owned(),
            });
        }
        let previous = self.phase;
        self.phase = next;
        Ok(previous)
    }

    /// Resolve `directives` against the live document and build suggestions.
    pub fn generate_preview(
        &mut self,
        doc: &dyn DocumentHost,
        directives: &[Directive],
        settings: &Settings,
    ) -> BulkfixResult<Preview> {
        let previous = self.enter(
            "preview",
            &[Phase::Idle, Phase::AwaitingApproval, Phase::Applied],
            Phase::Previewing,
        )?;
        let mark = self.log.mark();

        let elements = match doc.leaf_elements() {
            Ok(elements) => elements,
            Err(e) => {
                self.phase = previous;
                self.log.warn(format!("preview aborted: {e}"));
                return Err(e.into());
            }
        };
        self.log.info(format!(
            "preview: {} directive(s) over {} element(s)",
            directives.len(),
            elements.len()
        ));

        let fixes = fixer::fix(directives, &elements);
        for skipped in &fixes.skipped {
            self.log
                .warn(format!("directive {} skipped: {}", skipped.directive_index, skipped.reason));
        }
        for fixed in fixes.fixed.iter().filter(|f| f.was_fixed) {
            self.log.info(format!(
                "directive {} fixed ({}): {:?} -> {:?}",
                fixed.directive_index,
                fixed.fix_type.join(", "),
                fixed.original_fragment,
                fixed.fragment
            ));
        }

        let outcome = matching::match_directives(&fixes.fixed, &elements, self.semantic.as_mut(), settings);
        let built = suggest::build(&outcome);

        let mut skipped_matches = outcome.skipped.clone();
        skipped_matches.extend(built.skipped);
        for skipped in &skipped_matches {
            self.log.warn(format!(
                "directive {} on paragraph {} skipped: {}",
                skipped.directive_index, skipped.para_index, skipped.reason
            ));
        }
        for index in &outcome.unmatched {
            self.log.info(format!("directive {index}: no suggestion produced"));
        }

        self.log.info(format!(
            "preview: {} suggestion(s), {} exact hit(s), {} semantic hit(s), {} unmatched",
            built.suggestions.len(),
            outcome.exact_hits,
            outcome.ai_hits,
            outcome.unmatched.len()
        ));

        let preview = Preview {
            suggestions: built
                .suggestions
                .into_iter()
                .map(|s| PreviewItem {
                    diff: inline_diff(&s.old_text, &s.new_text),
                    suggestion: s,
                })
                .collect(),
            total_directives: directives.len(),
            unmatched: outcome.unmatched,
            skipped_directives: fixes.skipped,
            skipped_matches,
            fixed: fixes.fixed.iter().filter(|f| f.was_fixed).count(),
            exact_hits: outcome.exact_hits,
            ai_hits: outcome.ai_hits,
            log: settings.include_log.then(|| self.log.render_since(mark)),
        };

        self.phase = Phase::AwaitingApproval;
        Ok(preview)
    }

    /// Apply approved suggestions. Requires a preview to be awaiting approval.
    pub fn apply_suggestions(
        &mut self,
        doc: &mut dyn DocumentHost,
        store: &mut dyn KvStore,
        suggestions: &[Suggestion],
    ) -> BulkfixResult<ApplySummary> {
        let previous = self.enter("apply", &[Phase::AwaitingApproval], Phase::Applying)?;
        let mark = self.log.mark();

        let report = match apply::apply(doc, store, suggestions, &self.progress, &mut self.log) {
            Ok(report) => report,
            Err(e) => {
                self.phase = previous;
                self.log.warn(format!("apply aborted: {e}"));
                return Err(e);
            }
        };

        let summary = if report.errors.is_empty() {
            format!("Applied {}/{} suggestions.", report.applied, report.total)
        } else {
            format!(
                "Applied {}/{} suggestions, {} error(s).",
                report.applied,
                report.total,
                report.errors.len()
            )
        };
        info!(applied = report.applied, total = report.total, "apply finished");

        self.phase = Phase::Applied;
        Ok(ApplySummary {
            report,
            summary,
            log: self.log.render_since(mark),
        })
    }

    /// Revert the last applied batch of this document.
    pub fn undo_last_run(
        &mut self,
        doc: &mut dyn DocumentHost,
        store: &mut dyn KvStore,
    ) -> BulkfixResult<UndoSummary> {
        let previous = self.enter(
            "undo",
            &[Phase::Idle, Phase::AwaitingApproval, Phase::Applied],
            Phase::Undoing,
        )?;
        let mark = self.log.mark();

        let report = match apply::undo(doc, store, &mut self.log) {
            Ok(report) => report,
            Err(e) => {
                self.phase = previous;
                self.log.warn(format!("undo aborted: {e}"));
                return Err(e);
            }
        };

        let summary = if report.nothing_to_undo {
            "Nothing to undo.".to_owned()
        } else if report.errors.is_empty() {
            format!("Undid {}/{} changes.", report.undone, report.total)
        } else {
            format!(
                "Undid {}/{} changes, {} error(s).",
                report.undone,
                report.total,
                report.errors.len()
            )
        };
        info!(undone = report.undone, total = report.total, "undo finished");

        // A missing batch leaves a pending preview pending.
        self.phase = if report.nothing_to_undo { previous } else { Phase::Idle };
        Ok(UndoSummary {
            report,
            summary,
            log: self.log.render_since(mark),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, Node, NodeKind};
    use crate::store::MemoryStore;

    #[test]
    fn test_phase_walk() {
        let mut engine = Engine::new();
        let mut doc = Document::from_paragraphs(["old words"]);
        let mut store = MemoryStore::new();

        let preview = engine
            .generate_preview(&doc, &[Directive::new("old", "new")], &Settings::default())
            .expect("preview");
        assert_eq!(engine.phase(), Phase::AwaitingApproval);
        assert!(preview.log.is_none());
        assert_eq!(preview.suggestions[0].diff, "[-old-]{+new+} words");

        let poller = engine.progress_handle();
        let summary = engine
            .apply_suggestions(&mut doc, &mut store, &preview.into_suggestions())
            .expect("apply");
        assert_eq!(summary.summary, "Applied 1/1 suggestions.");
        assert_eq!(engine.phase(), Phase::Applied);
        assert!(!engine.log().is_empty());
        assert_eq!(
            poller.snapshot(),
            Progress {
                applied: 1,
                total: 1,
                done: true
            }
        );

        let undo = engine.undo_last_run(&mut doc, &mut store).expect("undo");
        assert_eq!(undo.summary, "Undid 1/1 changes.");
        assert_eq!(engine.phase(), Phase::Idle);
    }

    #[test]
    fn test_apply_requires_preview() {
        let mut engine = Engine::new();
        let mut doc = Document::from_paragraphs(["x"]);
        let err = engine
            .apply_suggestions(&mut doc, &mut MemoryStore::new(), &[])
            .expect_err("apply from idle");
        assert!(matches!(err, BulkfixError::InvalidPhase { .. }));
        assert_eq!(engine.phase(), Phase::Idle);
    }

    #[test]
    fn test_apply_twice_rejected() {
        let mut engine = Engine::new();
        let mut doc = Document::from_paragraphs(["x"]);
        let mut store = MemoryStore::new();
        let s = engine
            .generate_preview(&doc, &[Directive::new("x", "y")], &Settings::default())
            .expect("preview")
            .into_suggestions();
        engine.apply_suggestions(&mut doc, &mut store, &s).expect("apply");
        assert!(engine.apply_suggestions(&mut doc, &mut store, &s).is_err());
    }

    #[test]
    fn test_unreadable_document_is_fatal() {
        let mut engine = Engine::new();
        let doc = Document::new(Node {
            kind: NodeKind::Unsupported,
            text: None,
            children: Vec::new(),
        });
        let err = engine
            .generate_preview(&doc, &[Directive::new("a", "b")], &Settings::default())
            .expect_err("missing root");
        assert!(matches!(err, BulkfixError::DocumentUnavailable(_)));
        assert_eq!(engine.phase(), Phase::Idle);
    }

    #[test]
    fn test_preview_log_on_request() {
        let mut engine = Engine::new();
        let doc = Document::from_paragraphs(["alpha"]);
        let settings = Settings {
            include_log: true,
            ..Settings::default()
        };
        let preview = engine
            .generate_preview(
                &doc,
                &[Directive::new("", "x"), Directive::new("zeta", "z")],
                &settings,
            )
            .expect("preview");
        let log = preview.log.expect("log");
        assert!(log.contains("WARN: directive 0 skipped: empty fragment"));
        assert!(log.contains("directive 1: no suggestion produced"));
        assert_eq!(preview.unmatched, vec![1]);
        assert_eq!(preview.skipped_directives.len(), 1);
    }

    #[test]
    fn test_undo_without_backup_keeps_pending_preview() {
        let mut engine = Engine::new();
        let mut doc = Document::from_paragraphs(["x"]);
        engine
            .generate_preview(&doc, &[Directive::new("x", "y")], &Settings::default())
            .expect("preview");
        let undo = engine
            .undo_last_run(&mut doc, &mut MemoryStore::new())
            .expect("undo");
        assert_eq!(undo.summary, "Nothing to undo.");
        assert_eq!(engine.phase(), Phase::AwaitingApproval);
    }
}
