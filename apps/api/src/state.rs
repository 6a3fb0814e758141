use std::sync::Arc;

use crate::analysis::AnalysisPipeline;
use crate::config::Config;
use crate::sessions::archive::UploadArchive;
use crate::sessions::store::AnalysisStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AnalysisStore>,
    pub archive: Arc<dyn UploadArchive>,
    /// Model client, rate limiter and normalizer settings, built once in `main`.
    pub pipeline: Arc<AnalysisPipeline>,
    pub config: Config,
}
