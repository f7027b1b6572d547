//! HTTP ranking backend (OpenAI-compatible chat completions).
//!
//! Sends the fragment and numbered candidates in one request and asks for a
//! bare index or `NOT_FOUND`, capped at a few output tokens. Retries are the
//! caller's business (see [`super::retry`]); this transport maps every
//! failure onto [`RankError`] and returns immediately.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{RankReply, Ranker};
use crate::config::RankerConfig;
use crate::error::RankError;

/// Sentinel the model is asked to emit when no candidate matches.
pub const NOT_FOUND_TOKEN: &str = "NOT_FOUND";

const MAX_OUTPUT_TOKENS: u32 = 8;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Blocking HTTP ranker.
#[derive(Debug)]
pub struct HttpRanker {
    client: reqwest::blocking::Client,
    config: RankerConfig,
}

impl HttpRanker {
    pub fn new(config: RankerConfig) -> Result<Self, RankError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RankError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }
}

/// Build the user prompt for one ranking request.
pub fn build_prompt(fragment: &str, candidates: &[String]) -> String {
    let mut prompt = format!(
        "Find the candidate passage that the fragment refers to, even if wording differs.\n\n\
         Fragment:\n{fragment}\n\nCandidates:\n"
    );
    for (i, candidate) in candidates.iter().enumerate() {
        prompt.push_str(&format!("[{i}] {candidate}\n"));
    }
    prompt.push_str(&format!(
        "\nAnswer with only the candidate number, or {NOT_FOUND_TOKEN} if none matches."
    ));
    prompt
}

/// Interpret the model's answer.
pub fn parse_reply(content: &str) -> Result<RankReply, RankError> {
    let answer = content.trim().trim_matches(|c: char| c == '[' || c == ']' || c == '.');
    if answer.eq_ignore_ascii_case(NOT_FOUND_TOKEN) {
        return Ok(RankReply::NotFound);
    }
    let digits: String = answer.chars().take_while(char::is_ascii_digit).collect();
    digits
        .parse::<usize>()
        .map(RankReply::Index)
        .map_err(|_| RankError::Malformed(format!("unexpected answer: {content:?}")))
}

impl Ranker for HttpRanker {
    fn rank(&self, fragment: &str, candidates: &[String]) -> Result<RankReply, RankError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user".to_owned(),
                content: build_prompt(fragment, candidates),
            }],
            max_tokens: MAX_OUTPUT_TOKENS,
            temperature: 0.0,
        };

        let response = self
            .client
            .post(&self.config.url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .map_err(|e| RankError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(RankError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| RankError::Malformed(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| RankError::Malformed("no choices in reply".to_owned()))?;
        debug!(answer = content, "ranking backend answered");
        parse_reply(&content)
    }
}
