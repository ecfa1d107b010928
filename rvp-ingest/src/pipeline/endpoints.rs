//! Remote sides of the fetch and scoring bridges

use super::bridge::{BridgeHandler, TransportBridge};
use crate::models::{FetchOutcome, FetchParams, PageId};
use crate::services::{Extractor, Scorer};
use async_trait::async_trait;
use std::sync::Arc;

/// Fetch request: the page plus the run's fetch parameters
pub type FetchRequest = (PageId, FetchParams);

pub type FetchBridge = TransportBridge<PageId, FetchRequest, FetchOutcome>;

/// Text pairs of one page, in page order
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringRequest {
    pub texts: Vec<(String, String)>,
}

/// Unit scores per text pair, or the scorer's error message
pub type ScoringResponse = Result<Vec<(f64, f64)>, String>;

pub type ScoringBridge = TransportBridge<PageId, ScoringRequest, ScoringResponse>;

/// Serves fetch envelopes with an [`Extractor`]
pub struct FetchEndpoint {
    extractor: Arc<dyn Extractor>,
}

impl FetchEndpoint {
    pub fn new(extractor: Arc<dyn Extractor>) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl BridgeHandler<FetchRequest, FetchOutcome> for FetchEndpoint {
    async fn handle(&self, (page, params): FetchRequest) -> FetchOutcome {
        self.extractor.fetch_page(page, params).await
    }
}

/// Serves scoring envelopes with a [`Scorer`], one call per text field
pub struct ScoringEndpoint {
    scorer: Arc<dyn Scorer>,
}

impl ScoringEndpoint {
    pub fn new(scorer: Arc<dyn Scorer>) -> Self {
        Self { scorer }
    }
}

#[async_trait]
impl BridgeHandler<ScoringRequest, ScoringResponse> for ScoringEndpoint {
    async fn handle(&self, request: ScoringRequest) -> ScoringResponse {
        let mut scores = Vec::with_capacity(request.texts.len());
        for (text_a, text_b) in &request.texts {
            let a = self.scorer.score(text_a).await.map_err(|e| e.to_string())?;
            let b = self.scorer.score(text_b).await.map_err(|e| e.to_string())?;
            scores.push((a, b));
        }
        Ok(scores)
    }
}
