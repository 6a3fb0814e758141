//! Result assembly: turns an assessment outcome into the per-file record.
//!
//! Lenient where the assessor is strict: a validated payload is copied as-is
//! with scores clamped, and any failure becomes a fallback record so every
//! file in a batch yields exactly one result.

use tracing::warn;

use crate::analysis::AnalysisError;
use crate::models::analysis::{
    AnalysisResult, Assessment, LessonRecommendation, ERROR_LESSON_NAME,
};

const RETRY_HINT: &str = "Try again later";
const CHECK_FILE_HINT: &str = "Check file format and content";

/// Maps an assessment outcome to the record for `filename`.
pub fn assemble(filename: &str, outcome: Result<Assessment, AnalysisError>) -> AnalysisResult {
    match outcome {
        Ok(assessment) => from_assessment(filename, assessment),
        Err(err) => {
            warn!("Analysis of {filename} failed, using fallback result: {err}");
            fallback(filename, &err)
        }
    }
}

/// Tags a validated assessment with its file name.
pub fn from_assessment(filename: &str, assessment: Assessment) -> AnalysisResult {
    let missed_questions = assessment
        .missed_questions
        .into_iter()
        .map(|mut q| {
            q.percentage_missed = clamp_percent(q.percentage_missed);
            q
        })
        .collect();

    AnalysisResult {
        filename: filename.to_string(),
        overall_score: clamp_percent(assessment.overall_score),
        missed_questions,
        lesson_recommendations: assessment.lesson_recommendations,
    }
}

/// The stand-in record for a file whose analysis failed.
pub fn fallback(filename: &str, err: &AnalysisError) -> AnalysisResult {
    let (current_content, hint) = match err {
        AnalysisError::ExtractionEmpty => ("Could not extract content from file", CHECK_FILE_HINT),
        AnalysisError::ModelUnavailable { .. } => (
            "Analysis service is unavailable due to rate limits",
            RETRY_HINT,
        ),
        AnalysisError::SchemaViolation(_) => (
            "Analysis results did not match the expected format",
            RETRY_HINT,
        ),
        AnalysisError::ParseFailure(_) => ("Could not parse analysis results", RETRY_HINT),
        AnalysisError::TransportFailure(_) | AnalysisError::TaskFailure(_) => {
            ("Analysis failed", RETRY_HINT)
        }
    };

    AnalysisResult {
        filename: filename.to_string(),
        overall_score: 0.0,
        missed_questions: Vec::new(),
        lesson_recommendations: vec![LessonRecommendation {
            lesson_name: ERROR_LESSON_NAME.to_string(),
            current_content: current_content.to_string(),
            suggested_improvements: vec![hint.to_string()],
            additional_resources: Vec::new(),
        }],
    }
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}
