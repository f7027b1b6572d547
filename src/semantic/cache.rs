//! Bounded cache of ranking results, oldest entry evicted first.

use std::collections::{HashMap, VecDeque};

use super::RankReply;

/// Ranking results keyed by fragment plus presented candidate texts.
#[derive(Debug, Clone)]
pub struct MatchCache {
    capacity: usize,
    entries: HashMap<String, RankReply>,
    order: VecDeque<String>,
}

impl MatchCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Cache key for one ranking request.
    pub fn key(fragment: &str, candidates: &[String]) -> String {
        let mut key = String::with_capacity(
            fragment.len() + candidates.iter().map(|c| c.len() + 1).sum::<usize>() + 1,
        );
        key.push_str(fragment);
        key.push('\u{1F}');
        for candidate in candidates {
            key.push_str(candidate);
            key.push('\u{1E}');
        }
        key
    }

    pub fn get(&self, key: &str) -> Option<RankReply> {
        self.entries.get(key).copied()
    }

    pub fn insert(&mut self, key: String, reply: RankReply) {
        if self.entries.insert(key.clone(), reply).is_some() {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
