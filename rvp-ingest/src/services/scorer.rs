//! Text scorer
//!
//! Scores are in `[0, 1]`: 0 is negative, 1 is positive. Scaling to the
//! `[0, 5]` record scale happens in the pipeline.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Only the last this-many known words of a text are considered
pub const MAX_TOKENS: usize = 1000;

/// Score given to text without a single known word
pub const NEUTRAL_SCORE: f64 = 0.5;

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("failed to load lexicon: {0}")]
    Lexicon(String),

    #[error("scoring failed: {0}")]
    Failed(String),
}

/// Maps one free-text field to a score in `[0, 1]`
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, text: &str) -> Result<f64, ScoreError>;

    /// Whether the scorer has finished loading and can take requests
    fn is_ready(&self) -> bool {
        true
    }
}

#[derive(Deserialize)]
struct LexiconFile {
    words: HashMap<String, f64>,
}

/// Word-weight scorer
///
/// Each known word carries a weight in `[-1, 1]`; a text scores the mean
/// weight of its known words mapped onto `[0, 1]`.
#[derive(Debug, Clone)]
pub struct LexiconScorer {
    weights: HashMap<String, f64>,
}

const BUILTIN_LEXICON: &[(&str, f64)] = &[
    ("amazing", 1.0),
    ("awesome", 0.9),
    ("excellent", 1.0),
    ("great", 0.8),
    ("good", 0.6),
    ("nice", 0.5),
    ("friendly", 0.6),
    ("supportive", 0.7),
    ("flexible", 0.6),
    ("love", 0.9),
    ("best", 0.9),
    ("fun", 0.6),
    ("smart", 0.5),
    ("helpful", 0.6),
    ("growth", 0.4),
    ("balance", 0.3),
    ("benefits", 0.4),
    ("stable", 0.4),
    ("happy", 0.7),
    ("fair", 0.3),
    ("bad", -0.6),
    ("poor", -0.6),
    ("terrible", -1.0),
    ("awful", -1.0),
    ("worst", -1.0),
    ("toxic", -0.9),
    ("slow", -0.3),
    ("stress", -0.5),
    ("stressful", -0.6),
    ("long", -0.2),
    ("low", -0.4),
    ("micromanagement", -0.7),
    ("layoffs", -0.8),
    ("chaotic", -0.6),
    ("unfair", -0.6),
    ("boring", -0.5),
    ("overworked", -0.7),
    ("politics", -0.5),
    ("hate", -0.9),
    ("none", 0.0),
];

impl LexiconScorer {
    pub fn builtin() -> Self {
        Self::from_weights(
            BUILTIN_LEXICON
                .iter()
                .map(|(word, weight)| (word.to_string(), *weight)),
        )
    }

    /// Build from arbitrary word weights; weights are clamped to `[-1, 1]`
    pub fn from_weights(weights: impl IntoIterator<Item = (String, f64)>) -> Self {
        let weights = weights
            .into_iter()
            .filter(|(_, weight)| weight.is_finite())
            .map(|(word, weight)| (word.to_lowercase(), weight.clamp(-1.0, 1.0)))
            .collect();
        Self { weights }
    }

    /// Load a TOML lexicon with a `[words]` table
    pub fn from_path(path: &Path) -> Result<Self, ScoreError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ScoreError::Lexicon(format!("{}: {}", path.display(), e)))?;
        let file: LexiconFile = toml::from_str(&content)
            .map_err(|e| ScoreError::Lexicon(format!("{}: {}", path.display(), e)))?;

        info!(path = %path.display(), words = file.words.len(), "Loaded scoring lexicon");
        Ok(Self::from_weights(file.words))
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Trim, lowercase, strip `.` `,` `!`, split on spaces
    pub fn tokenize(text: &str) -> Vec<String> {
        text.trim()
            .to_lowercase()
            .replace(['.', ',', '!'], "")
            .split(' ')
            .filter(|word| !word.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn score_text(&self, text: &str) -> f64 {
        let known: Vec<f64> = Self::tokenize(text)
            .iter()
            .filter_map(|word| self.weights.get(word).copied())
            .collect();

        let considered = &known[known.len().saturating_sub(MAX_TOKENS)..];
        if considered.is_empty() {
            return NEUTRAL_SCORE;
        }

        let mean = considered.iter().sum::<f64>() / considered.len() as f64;
        ((mean + 1.0) / 2.0).clamp(0.0, 1.0)
    }
}

impl Default for LexiconScorer {
    fn default() -> Self {
        Self::builtin()
    }
}

#[async_trait]
impl Scorer for LexiconScorer {
    async fn score(&self, text: &str) -> Result<f64, ScoreError> {
        Ok(self.score_text(text))
    }
}
