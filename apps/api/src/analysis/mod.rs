// Assessment pipeline: extraction → normalization → model assessment → assembly.
// All LLM calls go through llm_client; no direct provider calls here.

pub mod assembler;
pub mod assessor;
pub mod handlers;
pub mod normalize;
pub mod orchestrator;
pub mod prompts;
pub mod schema;
pub mod throttle;

use thiserror::Error;

use crate::analysis::schema::SchemaViolation;
use crate::llm_client::LlmError;

pub use orchestrator::{analyze_batch, AnalysisPipeline};

/// Why a single file could not be assessed. Every variant becomes a
/// fallback result; none aborts a batch.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no text could be extracted from the file")]
    ExtractionEmpty,

    #[error("model unavailable after {attempts} rate-limited attempts")]
    ModelUnavailable { attempts: u32 },

    #[error("schema violation: {0}")]
    SchemaViolation(#[from] SchemaViolation),

    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("could not parse model response: {0}")]
    ParseFailure(String),

    #[error("analysis task failed: {0}")]
    TaskFailure(String),
}

impl From<LlmError> for AnalysisError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::ModelUnavailable { attempts } => AnalysisError::ModelUnavailable { attempts },
            LlmError::Parse(e) => AnalysisError::ParseFailure(e.to_string()),
            LlmError::EmptyContent => AnalysisError::ParseFailure(err.to_string()),
            LlmError::Http(_) | LlmError::Api { .. } | LlmError::RateLimited { .. } => {
                AnalysisError::TransportFailure(err.to_string())
            }
        }
    }
}
