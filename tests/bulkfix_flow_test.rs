//! End-to-end preview → apply → undo over in-memory documents.

use std::cell::Cell;
use std::rc::Rc;

use oa_bulkfix::config::{SemanticConfig, Settings};
use oa_bulkfix::document::{Document, DocumentHost, ElementType};
use oa_bulkfix::engine::Engine;
use oa_bulkfix::error::RankError;
use oa_bulkfix::fixer::Directive;
use oa_bulkfix::matching::MatchType;
use oa_bulkfix::normalize::normalize;
use oa_bulkfix::semantic::retry::RetryPolicy;
use oa_bulkfix::semantic::{RankReply, Ranker, SemanticMatcher};
use oa_bulkfix::store::MemoryStore;
use oa_bulkfix::suggest::Suggestion;

const BUDGET_PARAGRAPH: &str = "The committee approved the annual budget yesterday after a long debate in the council chamber. \
Members then discussed parking rules for the rest of the evening.";

struct Scripted {
    reply: Result<RankReply, RankError>,
    calls: Rc<Cell<u32>>,
}

impl Ranker for Scripted {
    fn rank(&self, _fragment: &str, _candidates: &[String]) -> Result<RankReply, RankError> {
        self.calls.set(self.calls.get() + 1);
        self.reply.clone()
    }
}

fn semantic_engine(reply: Result<RankReply, RankError>) -> (Engine, Rc<Cell<u32>>) {
    let calls = Rc::new(Cell::new(0));
    let matcher = SemanticMatcher::new(
        Box::new(Scripted {
            reply,
            calls: Rc::clone(&calls),
        }),
        SemanticConfig {
            retry: RetryPolicy::immediate(3),
            ..SemanticConfig::default()
        },
    );
    (Engine::new().with_semantic(matcher), calls)
}

fn texts(doc: &Document) -> Vec<String> {
    doc.leaf_elements()
        .expect("elements")
        .into_iter()
        .map(|e| e.text)
        .collect()
}

fn preview(engine: &mut Engine, doc: &Document, directives: &[Directive]) -> Vec<Suggestion> {
    engine
        .generate_preview(doc, directives, &Settings::default())
        .expect("preview")
        .into_suggestions()
}

#[test]
fn test_normalize_collapses_whitespace_and_is_idempotent() {
    assert_eq!(normalize("a   b"), normalize("a b"));
    let once = normalize("  It\u{2019}s  a \u{2013} Test!  ");
    assert_eq!(normalize(&once), once);
}

#[test]
fn test_verbatim_fragment_yields_exact_suggestion() {
    let doc = Document::from_paragraphs(["Intro", "Revenue grew in Q3.", "Revenue is up."]);
    let mut engine = Engine::new();
    let suggestions = preview(&mut engine, &doc, &[Directive::new("Revenue", "Income")]);

    assert_eq!(suggestions.len(), 2);
    for s in &suggestions {
        assert_eq!(s.match_type, MatchType::Exact);
        assert!((s.similarity - 1.0).abs() < f64::EPSILON);
    }
    assert_eq!(suggestions[0].para_index, 1);
    assert_eq!(suggestions[1].para_index, 2);
}

#[test]
fn test_two_hits_in_one_element_fold_and_apply_together() {
    let mut doc = Document::from_paragraphs(["The quick brown fox"]);
    let mut engine = Engine::new();
    let mut store = MemoryStore::new();
    let suggestions = preview(
        &mut engine,
        &doc,
        &[Directive::new("quick", "slow"), Directive::new("brown", "red")],
    );

    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].replacement_count, 2);
    assert_eq!(suggestions[0].fragment.split(" + ").count(), 2);
    assert_eq!(suggestions[0].replace_with.split(" + ").count(), 2);

    engine
        .apply_suggestions(&mut doc, &mut store, &suggestions)
        .expect("apply");
    assert_eq!(texts(&doc), vec!["The slow red fox"]);
}

#[test]
fn test_apply_then_undo_restores_bytes() {
    let original = [
        "  Leading spaces stay.",
        "Caf\u{e9} \u{2014} na\u{ef}ve r\u{e9}sum\u{e9}",
        "It\u{2019}s done.",
    ];
    let mut doc = Document::from_paragraphs(original);
    let mut engine = Engine::new();
    let mut store = MemoryStore::new();
    let suggestions = preview(
        &mut engine,
        &doc,
        &[
            Directive::new("Leading", "Trailing"),
            Directive::new("naïve", "naive"),
            Directive::new("It's", "It is"),
        ],
    );
    assert_eq!(suggestions.len(), 3);

    let applied = engine
        .apply_suggestions(&mut doc, &mut store, &suggestions)
        .expect("apply");
    assert_eq!(applied.report.applied, 3);
    assert_eq!(texts(&doc)[2], "It is done.");

    engine.undo_last_run(&mut doc, &mut store).expect("undo");
    assert_eq!(texts(&doc), original.map(str::to_owned).to_vec());
}

#[test]
fn test_punctuation_only_fragments_are_exact() {
    let mut doc = Document::from_paragraphs(["Wait... what?!"]);
    let mut engine = Engine::new();
    let mut store = MemoryStore::new();
    let preview = engine
        .generate_preview(
            &doc,
            &[Directive::new("...", "\u{2026}"), Directive::new("?!", "?")],
            &Settings::default(),
        )
        .expect("preview");
    assert!(preview.unmatched.is_empty());
    let suggestions = preview.into_suggestions();
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].replacement_count, 2);
    assert_eq!(suggestions[0].new_text, "Wait\u{2026} what?");

    engine
        .apply_suggestions(&mut doc, &mut store, &suggestions)
        .expect("apply");
    assert_eq!(texts(&doc), vec!["Wait\u{2026} what?"]);
    engine.undo_last_run(&mut doc, &mut store).expect("undo");
    assert_eq!(texts(&doc), vec!["Wait... what?!"]);
}

#[test]
fn test_composed_fragment_matches_decomposed_text() {
    let mut doc = Document::from_paragraphs(["Meet at the cafe\u{301} today"]);
    let mut engine = Engine::new();
    let mut store = MemoryStore::new();
    let suggestions = preview(&mut engine, &doc, &[Directive::new("caf\u{e9}", "bistro")]);
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].match_type, MatchType::Exact);
    assert_eq!(suggestions[0].new_text, "Meet at the bistro today");

    engine
        .apply_suggestions(&mut doc, &mut store, &suggestions)
        .expect("apply");
    engine.undo_last_run(&mut doc, &mut store).expect("undo");
    assert_eq!(texts(&doc), vec!["Meet at the cafe\u{301} today"]);
}

#[test]
fn test_hyphen_fragment_matches_em_dash_without_backend() {
    let mut doc = Document::from_paragraphs(["A well \u{2014} known problem"]);
    let mut engine = Engine::new();
    let mut store = MemoryStore::new();
    let suggestions = preview(&mut engine, &doc, &[Directive::new("well - known", "famous")]);

    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].match_type, MatchType::Exact);
    engine
        .apply_suggestions(&mut doc, &mut store, &suggestions)
        .expect("apply");
    assert_eq!(texts(&doc), vec!["A famous problem"]);
}

#[test]
fn test_second_undo_reports_nothing() {
    let mut doc = Document::from_paragraphs(["alpha"]);
    let mut engine = Engine::new();
    let mut store = MemoryStore::new();
    let suggestions = preview(&mut engine, &doc, &[Directive::new("alpha", "beta")]);
    engine
        .apply_suggestions(&mut doc, &mut store, &suggestions)
        .expect("apply");

    let first = engine.undo_last_run(&mut doc, &mut store).expect("undo");
    assert_eq!(first.report.undone, 1);

    let second = engine.undo_last_run(&mut doc, &mut store).expect("undo");
    assert!(second.report.nothing_to_undo);
    assert_eq!(second.summary, "Nothing to undo.");
    assert_eq!(texts(&doc), vec!["alpha"]);
}

#[test]
fn test_compatible_drift_still_applies() {
    let mut doc = Document::from_paragraphs(["X"]);
    let mut engine = Engine::new();
    let mut store = MemoryStore::new();
    let suggestions = preview(&mut engine, &doc, &[Directive::new("X", "Z")]);

    doc.set_element_text(0, "X-modified").expect("edit");
    let summary = engine
        .apply_suggestions(&mut doc, &mut store, &suggestions)
        .expect("apply");
    assert_eq!(summary.report.applied, 1);
    assert!(summary.report.errors.is_empty());
    assert_eq!(texts(&doc), vec!["Z-modified"]);
}

#[test]
fn test_case_insensitive_match_replaces_original_span() {
    let mut doc = Document::from_paragraphs(["Teh Quick Brown Fox"]);
    let mut engine = Engine::new();
    let mut store = MemoryStore::new();
    let suggestions = preview(&mut engine, &doc, &[Directive::new("teh quick", "the quick")]);

    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].new_text, "the quick Brown Fox");
    engine
        .apply_suggestions(&mut doc, &mut store, &suggestions)
        .expect("apply");
    assert_eq!(texts(&doc), vec!["the quick Brown Fox"]);
}

#[test]
fn test_no_matches_without_backend() {
    let doc = Document::from_paragraphs(["alpha", "beta"]);
    let mut engine = Engine::new();
    let directives = [
        Directive::new("gamma", "g"),
        Directive::new("delta", "d"),
        Directive::new("epsilon", "e"),
    ];
    let preview = engine
        .generate_preview(&doc, &directives, &Settings::default())
        .expect("preview");

    assert!(preview.suggestions.is_empty());
    assert_eq!(preview.unmatched.len(), directives.len());
    assert_eq!(preview.total_directives, 3);
}

#[test]
fn test_semantic_fallback_rewrites_one_chunk() {
    let mut doc = Document::from_paragraphs([BUDGET_PARAGRAPH, "Weather report."]);
    let (mut engine, calls) = semantic_engine(Ok(RankReply::Index(0)));
    let mut store = MemoryStore::new();

    let suggestions = preview(
        &mut engine,
        &doc,
        &[Directive::new(
            "committee approved annual budget plan",
            "The budget passed.",
        )],
    );
    assert_eq!(calls.get(), 1);
    assert_eq!(suggestions.len(), 1);
    let s = &suggestions[0];
    assert_eq!(s.match_type, MatchType::Ai);
    assert_eq!(s.para_index, 0);
    assert!(s.similarity > 0.0 && s.similarity < 1.0);
    assert!(s.new_text.starts_with("The budget passed."));
    assert!(s.new_text.ends_with("for the rest of the evening."));

    engine
        .apply_suggestions(&mut doc, &mut store, &suggestions)
        .expect("apply");
    assert!(texts(&doc)[0].starts_with("The budget passed."));
    engine.undo_last_run(&mut doc, &mut store).expect("undo");
    assert_eq!(texts(&doc)[0], BUDGET_PARAGRAPH);
}

#[test]
fn test_semantic_not_consulted_when_exact_hits() {
    let doc = Document::from_paragraphs([BUDGET_PARAGRAPH]);
    let (mut engine, calls) = semantic_engine(Ok(RankReply::Index(0)));
    let suggestions = preview(&mut engine, &doc, &[Directive::new("annual budget", "yearly budget")]);
    assert_eq!(calls.get(), 0);
    assert_eq!(suggestions[0].match_type, MatchType::Exact);
}

#[test]
fn test_backend_auth_failure_degrades_to_unmatched() {
    let doc = Document::from_paragraphs([BUDGET_PARAGRAPH]);
    let (mut engine, calls) = semantic_engine(Err(RankError::Status {
        status: 401,
        message: "bad key".to_owned(),
    }));
    let preview = engine
        .generate_preview(
            &doc,
            &[Directive::new("committee approved annual budget plan", "x")],
            &Settings::default(),
        )
        .expect("preview");
    assert_eq!(calls.get(), 1);
    assert!(preview.suggestions.is_empty());
    assert_eq!(preview.unmatched, vec![0]);
}

#[test]
fn test_backend_rate_limit_is_retried() {
    let doc = Document::from_paragraphs([BUDGET_PARAGRAPH]);
    let (mut engine, calls) = semantic_engine(Err(RankError::Status {
        status: 429,
        message: "slow down".to_owned(),
    }));
    let preview = engine
        .generate_preview(
            &doc,
            &[Directive::new("committee approved annual budget plan", "x")],
            &Settings::default(),
        )
        .expect("preview");
    assert_eq!(calls.get(), 3);
    assert_eq!(preview.unmatched, vec![0]);
}

#[test]
fn test_table_cells_are_separate_elements() {
    let json = r#"{"kind":"body","children":[
        {"kind":"heading","children":[{"kind":"text","text":"Totals"}]},
        {"kind":"table","children":[
            {"kind":"table_row","children":[
                {"kind":"table_cell","children":[{"kind":"paragraph","children":[{"kind":"text","text":"Q1 totl"}]}]},
                {"kind":"table_cell","children":[{"kind":"paragraph","children":[{"kind":"text","text":"Q2 totl"}]}]}
            ]}
        ]},
        {"kind":"unsupported"}
    ]}"#;
    let mut doc = Document::from_json(json).expect("parse");
    let mut engine = Engine::new();
    let mut store = MemoryStore::new();

    let suggestions = preview(&mut engine, &doc, &[Directive::new("totl", "total")]);
    assert_eq!(suggestions.len(), 2);
    assert!(suggestions.iter().all(|s| s.element_type == ElementType::TableCell));

    engine
        .apply_suggestions(&mut doc, &mut store, &suggestions)
        .expect("apply");
    assert_eq!(texts(&doc), vec!["Totals", "Q1 total", "Q2 total"]);

    let restored = engine.undo_last_run(&mut doc, &mut store).expect("undo");
    assert_eq!(restored.report.undone, 2);
    assert_eq!(texts(&doc), vec!["Totals", "Q1 totl", "Q2 totl"]);
}
