//! Configuration: per-preview settings, semantic matcher tuning, and the
//! environment-driven ranking backend config.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::semantic::retry::RetryPolicy;

/// Settings supplied with each preview request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Minimum composite similarity for an element to reach semantic ranking.
    pub ai_threshold: f64,
    /// Number of chunks presented to the ranking backend.
    pub max_candidates: usize,
    /// Attach the operation log to summaries.
    pub include_log: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ai_threshold: 0.15,
            max_candidates: 3,
            include_log: false,
        }
    }
}

/// Tuning of the semantic matcher adapter.
#[derive(Debug, Clone)]
pub struct SemanticConfig {
    /// Elements kept after whole-element scoring.
    pub stage_one_limit: usize,
    /// Target chunk length in characters.
    pub chunk_chars: usize,
    /// Weight of the element score in the blended chunk score.
    pub element_weight: f64,
    /// Estimated token budget for one ranking request.
    pub token_budget: usize,
    /// Characters per token used for estimates.
    pub chars_per_token: usize,
    /// Maximum cached ranking results.
    pub cache_capacity: usize,
    pub retry: RetryPolicy,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            stage_one_limit: 20,
            chunk_chars: 100,
            element_weight: 0.3,
            token_budget: 3000,
            chars_per_token: 4,
            cache_capacity: 100,
            retry: RetryPolicy::default(),
        }
    }
}

/// Ranking backend endpoint, read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankerConfig {
    /// OpenAI-compatible chat completions URL.
    pub url: String,
    pub model: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl RankerConfig {
    pub const DEFAULT_URL: &'static str = "https://api.openai.com/v1/chat/completions";
    pub const DEFAULT_MODEL: &'static str = "gpt-4o-mini";

    /// Build from `OA_BULKFIX_*` variables. `None` when no API key is set,
    /// which means no semantic backend is configured.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let api_key = lookup("OA_BULKFIX_API_KEY").filter(|k| !k.trim().is_empty())?;
        Some(Self {
            url: lookup("OA_BULKFIX_RANKER_URL").unwrap_or_else(|| Self::DEFAULT_URL.to_owned()),
            model: lookup("OA_BULKFIX_RANKER_MODEL")
                .unwrap_or_else(|| Self::DEFAULT_MODEL.to_owned()),
            api_key,
            timeout: Duration::from_secs(30),
        })
    }
}
