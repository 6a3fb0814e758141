//! Batch orchestration: analyzes every file of a batch concurrently and
//! returns exactly one result per file, in input order.
//!
//! Flow per file: extract (spawn_blocking) → normalize → rate limiter →
//! assess → assemble. Each file runs in its own task so a panic in one file
//! becomes a fallback result instead of aborting its siblings.
//!
//! # Concurrency
//! At most `max_concurrency` files are in flight. `buffered` only polls
//! (and therefore spawns) the next file once a slot frees up, and yields
//! results in submission order regardless of completion order.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, error, info};

use crate::analysis::assembler::{self, assemble};
use crate::analysis::assessor::assess;
use crate::analysis::normalize::{normalize, NormalizerConfig};
use crate::analysis::throttle::RateLimiter;
use crate::analysis::AnalysisError;
use crate::extraction::extract_text;
use crate::llm_client::LlmClient;
use crate::models::analysis::{AnalysisResult, Assessment, SourceFile};

pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Everything a single file's analysis needs. Shared read-only across tasks.
pub struct AnalysisPipeline {
    llm: LlmClient,
    limiter: Arc<dyn RateLimiter>,
    normalizer: NormalizerConfig,
    max_concurrency: usize,
}

impl AnalysisPipeline {
    pub fn new(
        llm: LlmClient,
        limiter: Arc<dyn RateLimiter>,
        normalizer: NormalizerConfig,
        max_concurrency: usize,
    ) -> Self {
        Self {
            llm,
            limiter,
            normalizer,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Analyzes one file. Never fails: every error becomes a fallback result.
    pub async fn analyze_file(&self, file: SourceFile) -> AnalysisResult {
        let filename = file.name.clone();
        let outcome = self.assess_file(file).await;
        assemble(&filename, outcome)
    }

    async fn assess_file(&self, file: SourceFile) -> Result<Assessment, AnalysisError> {
        let filename = file.name.clone();
        let size = file.size();

        let text = tokio::task::spawn_blocking(move || extract_text(&file))
            .await
            .map_err(|e| AnalysisError::TaskFailure(format!("extraction task failed: {e}")))?;

        let content = normalize(&text, &self.normalizer);
        if content.is_empty() {
            return Err(AnalysisError::ExtractionEmpty);
        }
        debug!(
            "Normalized {filename} ({size} bytes) to {} lines, {} chars",
            content.line_count(),
            content.as_str().len()
        );

        self.limiter.acquire().await;
        assess(&self.llm, &content).await
    }
}

/// Analyzes `files` with bounded concurrency. The output has the same length
/// and order as the input; an empty batch yields an empty result list.
pub async fn analyze_batch(
    pipeline: &Arc<AnalysisPipeline>,
    files: Vec<SourceFile>,
) -> Vec<AnalysisResult> {
    if files.is_empty() {
        return Vec::new();
    }

    let total = files.len();
    info!(
        "Analyzing batch of {total} files (model={}, concurrency={})",
        pipeline.llm.model(),
        pipeline.max_concurrency
    );

    let results: Vec<AnalysisResult> = stream::iter(files.into_iter().map(|file| {
        let pipeline = Arc::clone(pipeline);
        let filename = file.name.clone();
        async move {
            match tokio::spawn(async move { pipeline.analyze_file(file).await }).await {
                Ok(result) => result,
                Err(e) => {
                    error!("Analysis task for {filename} did not complete: {e}");
                    assembler::fallback(&filename, &AnalysisError::TaskFailure(e.to_string()))
                }
            }
        }
    }))
    .buffered(pipeline.max_concurrency)
    .collect()
    .await;

    let fallbacks = results.iter().filter(|r| r.is_fallback()).count();
    info!("Batch complete: {total} files, {fallbacks} fallback results");
    results
}
