//! External collaborators of the pipeline
//!
//! Each collaborator is a trait with one default implementation:
//! - [`Extractor`] / [`HttpExtractor`]: fetches one page of raw records
//! - [`Scorer`] / [`LexiconScorer`]: maps free text to a score in `[0, 1]`
//! - [`Renderer`] / [`SvgRenderer`]: draws the accumulated results

pub mod extractor;
pub mod renderer;
pub mod scorer;

pub use extractor::{Extractor, ExtractorError, HttpExtractor};
pub use renderer::{Renderer, SvgRenderer};
pub use scorer::{LexiconScorer, ScoreError, Scorer};
