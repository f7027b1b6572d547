//! Semantic matcher adapter.
//!
//! Used only when a directive has no literal or normalized hit anywhere.
//! Candidate search space is narrowed in two stages before the paid call:
//!
//! 1. Every element is scored with the composite similarity; the top
//!    `stage_one_limit` above the floor survive.
//! 2. Survivors are split into sentence chunks, each re-scored, and the
//!    global top-N chunks by blended score (30% element, 70% chunk) are kept.
//!
//! The surviving chunk texts go to a [`Ranker`] through the retry policy and
//! the bounded cache. Every failure degrades to "not found".

pub mod cache;
pub mod candidates;
#[cfg(feature = "http")]
pub mod http;
pub mod retry;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::SemanticConfig;
use crate::document::DocumentElement;
use crate::error::RankError;

use self::cache::MatchCache;

/// Answer of a ranking backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RankReply {
    Index(usize),
    NotFound,
}

/// The semantic ranking collaborator.
pub trait Ranker {
    /// Pick the candidate that expresses `fragment`, or report none does.
    fn rank(&self, fragment: &str, candidates: &[String]) -> Result<RankReply, RankError>;
}

/// One chunk offered to the ranking backend.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticCandidate {
    /// `original_index` of the element the chunk came from.
    pub element_index: usize,
    /// Verbatim slice of the element text.
    pub chunk: String,
    pub element_score: f64,
    pub chunk_score: f64,
    /// Blended score used for ordering.
    pub score: f64,
}

/// Candidate narrowing plus a cached, retrying ranking call.
pub struct SemanticMatcher {
    ranker: Box<dyn Ranker>,
    config: SemanticConfig,
    cache: MatchCache,
}

impl std::fmt::Debug for SemanticMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticMatcher")
            .field("config", &self.config)
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl SemanticMatcher {
    pub fn new(ranker: Box<dyn Ranker>, config: SemanticConfig) -> Self {
        let cache = MatchCache::new(config.cache_capacity);
        Self {
            ranker,
            config,
            cache,
        }
    }

    pub const fn config(&self) -> &SemanticConfig {
        &self.config
    }

    pub const fn cache(&self) -> &MatchCache {
        &self.cache
    }

    /// Narrow `elements` to at most `max_candidates` chunks worth ranking.
    /// `floor` is the minimum whole-element score to enter stage 2.
    pub fn rank_candidates(
        &self,
        fragment: &str,
        elements: &[DocumentElement],
        max_candidates: usize,
        floor: f64,
    ) -> Vec<SemanticCandidate> {
        let mut stage_one: Vec<(f64, &DocumentElement)> = elements
            .iter()
            .map(|e| (candidates::similarity(fragment, &e.text), e))
            .filter(|(score, _)| *score >= floor)
            .collect();
        stage_one.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then(a.1.original_index.cmp(&b.1.original_index))
        });
        stage_one.truncate(self.config.stage_one_limit);

        let element_weight = self.config.element_weight;
        let mut stage_two: Vec<SemanticCandidate> = stage_one
            .iter()
            .flat_map(|(element_score, element)| {
                candidates::chunk_text(&element.text, self.config.chunk_chars)
                    .into_iter()
                    .map(move |chunk| {
                        let chunk_score = candidates::similarity(fragment, chunk);
                        SemanticCandidate {
                            element_index: element.original_index,
                            chunk: chunk.to_owned(),
                            element_score: *element_score,
                            chunk_score,
                            score: element_weight.mul_add(
                                *element_score,
                                (1.0 - element_weight) * chunk_score,
                            ),
                        }
                    })
            })
            .collect();
        // Stable sort keeps traversal and chunk order among equal scores.
        stage_two.sort_by(|a, b| b.score.total_cmp(&a.score));
        stage_two.truncate(max_candidates);

        debug!(
            survivors = stage_one.len(),
            candidates = stage_two.len(),
            "semantic candidates narrowed"
        );
        stage_two
    }

    /// Ask the backend which candidate matches `fragment`.
    ///
    /// Returns the candidate position, or `None` for "not found", an
    /// out-of-range answer, or any backend failure.
    pub fn resolve(&mut self, fragment: &str, candidate_texts: &[String]) -> Option<usize> {
        if candidate_texts.is_empty() {
            return None;
        }

        let presented = self.fit_budget(fragment, candidate_texts);
        let key = MatchCache::key(fragment, &presented);

        let reply = if let Some(hit) = self.cache.get(&key) {
            debug!("semantic cache hit");
            hit
        } else {
            let ranker = &self.ranker;
            match self
                .config
                .retry
                .run(|attempt| {
                    debug!(attempt, candidates = presented.len(), "calling ranking backend");
                    ranker.rank(fragment, &presented)
                }) {
                Ok(reply) => {
                    self.cache.insert(key, reply);
                    reply
                }
                Err(e) => {
                    warn!(error = %e, "semantic ranking failed, treating as not found");
                    return None;
                }
            }
        };

        match reply {
            RankReply::Index(i) if i < presented.len() => Some(i),
            RankReply::Index(i) => {
                warn!(index = i, candidates = presented.len(), "ranking index out of range");
                None
            }
            RankReply::NotFound => None,
        }
    }

    /// Truncate candidate texts so the estimated request stays in budget.
    fn fit_budget(&self, fragment: &str, texts: &[String]) -> Vec<String> {
        let per_token = self.config.chars_per_token.max(1);
        let total: usize = fragment.chars().count()
            + texts.iter().map(|t| t.chars().count()).sum::<usize>();
        if total / per_token <= self.config.token_budget {
            return texts.to_vec();
        }

        let budget_chars = self.config.token_budget * per_token;
        let per_candidate = budget_chars
            .saturating_sub(fragment.chars().count())
            .checked_div(texts.len())
            .unwrap_or(0)
            .max(1);
        debug!(per_candidate, "truncating semantic candidates to fit budget");
        texts
            .iter()
            .map(|t| t.chars().take(per_candidate).collect())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;
    use crate::document::ElementType;
    use crate::semantic::retry::RetryPolicy;

    /// Replays scripted replies and records what it was shown.
    struct Scripted {
        replies: RefCell<Vec<Result<RankReply, RankError>>>,
        calls: Rc<Cell<usize>>,
        seen: Rc<RefCell<Vec<Vec<String>>>>,
    }

    impl Ranker for Scripted {
        fn rank(&self, _fragment: &str, candidates: &[String]) -> Result<RankReply, RankError> {
            self.calls.set(self.calls.get() + 1);
            self.seen.borrow_mut().push(candidates.to_vec());
            let mut replies = self.replies.borrow_mut();
            if replies.is_empty() {
                Ok(RankReply::NotFound)
            } else {
                replies.remove(0)
            }
        }
    }

    fn matcher(
        replies: Vec<Result<RankReply, RankError>>,
    ) -> (SemanticMatcher, Rc<Cell<usize>>, Rc<RefCell<Vec<Vec<String>>>>) {
        let calls = Rc::new(Cell::new(0));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let ranker = Scripted {
            replies: RefCell::new(replies),
            calls: Rc::clone(&calls),
            seen: Rc::clone(&seen),
        };
        let config = SemanticConfig {
            retry: RetryPolicy::immediate(3),
            ..SemanticConfig::default()
        };
        (SemanticMatcher::new(Box::new(ranker), config), calls, seen)
    }

    fn els(texts: &[&str]) -> Vec<DocumentElement> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| DocumentElement::new(ElementType::Paragraph, i, (*t).to_owned()))
            .collect()
    }

    #[test]
    fn test_rank_candidates_prefers_related_chunks() {
        let (m, _, _) = matcher(Vec::new());
        let elements = els(&[
            "Completely unrelated prose about gardening and tomatoes.",
            "Revenue increased sharply in the third quarter. Costs were flat across every region, \
             business unit and product line for the entire fiscal year.",
        ]);
        let cands = m.rank_candidates("revenue rose sharply in quarter three", &elements, 3, 0.15);
        assert!(!cands.is_empty());
        assert_eq!(cands[0].element_index, 1);
        assert_eq!(cands[0].chunk, "Revenue increased sharply in the third quarter.");
        assert!(cands.iter().all(|c| c.element_index == 1));
    }

    #[test]
    fn test_rank_candidates_respects_limit() {
        let (m, _, _) = matcher(Vec::new());
        let elements = els(&["alpha beta. alpha gamma. alpha delta. alpha epsilon."; 1]);
        let cands = m.rank_candidates("alpha", &elements, 2, 0.0);
        assert_eq!(cands.len(), 1);
        let cands = m.rank_candidates("alpha", &els(&["alpha one.", "alpha two.", "alpha three."]), 2, 0.0);
        assert_eq!(cands.len(), 2);
    }

    #[test]
    fn test_resolve_accepts_in_range_and_caches() {
        let (mut m, calls, _) = matcher(vec![Ok(RankReply::Index(1))]);
        let texts = vec!["a".to_owned(), "b".to_owned()];
        assert_eq!(m.resolve("frag", &texts), Some(1));
        assert_eq!(m.resolve("frag", &texts), Some(1));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_resolve_rejects_out_of_range() {
        let (mut m, _, _) = matcher(vec![Ok(RankReply::Index(5))]);
        assert_eq!(m.resolve("frag", &["a".to_owned()]), None);
    }

    #[test]
    fn test_resolve_retries_rate_limit() {
        let (mut m, calls, _) = matcher(vec![
            Err(RankError::Status {
                status: 429,
                message: "slow down".to_owned(),
            }),
            Ok(RankReply::Index(0)),
        ]);
        assert_eq!(m.resolve("frag", &["a".to_owned()]), Some(0));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_resolve_auth_failure_is_not_found_without_retry() {
        let (mut m, calls, _) = matcher(vec![Err(RankError::Status {
            status: 401,
            message: "bad key".to_owned(),
        })]);
        assert_eq!(m.resolve("frag", &["a".to_owned()]), None);
        assert_eq!(calls.get(), 1);
        assert!(m.cache().is_empty());
    }

    #[test]
    fn test_resolve_truncates_to_budget() {
        let (mut m, _, seen) = matcher(vec![Ok(RankReply::NotFound)]);
        m.config.token_budget = 10;
        let long = "x".repeat(200);
        assert_eq!(m.resolve("frag", &[long.clone(), long]), None);
        let shown = &seen.borrow()[0];
        assert!(shown.iter().all(|t| t.chars().count() <= 18));
    }
}
