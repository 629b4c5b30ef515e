use serde::{Deserialize, Serialize};

/// How a retrieval input is matched against an index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetrievalMethod {
    Default,             // Terms: AND of all tokens. Numbers: equality
    Phrase,              // Terms: ordered, at the query's relative offsets. Numbers: equality
    Proximity,           // Terms: any order inside a window
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalOptions {
    pub method: RetrievalMethod,
    pub distance: u32,       // Extra token slack for phrase / proximity
    pub max_results: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        RetrievalOptions {
            method: RetrievalMethod::Default,
            distance: 0,
            max_results: usize::MAX,
        }
    }
}

impl RetrievalOptions {
    pub fn new(method: RetrievalMethod) -> Self {
        RetrievalOptions {
            method,
            ..RetrievalOptions::default()
        }
    }

    pub fn phrase(distance: u32) -> Self {
        RetrievalOptions {
            method: RetrievalMethod::Phrase,
            distance,
            ..RetrievalOptions::default()
        }
    }

    pub fn proximity(distance: u32) -> Self {
        RetrievalOptions {
            method: RetrievalMethod::Proximity,
            distance,
            ..RetrievalOptions::default()
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn is_range(&self) -> bool {
        matches!(
            self.method,
            RetrievalMethod::GreaterThan
                | RetrievalMethod::GreaterThanOrEqual
                | RetrievalMethod::LessThan
                | RetrievalMethod::LessThanOrEqual
        )
    }
}
