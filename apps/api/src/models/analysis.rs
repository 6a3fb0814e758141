use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// MIME type of an OOXML slide deck.
pub const PPTX_MEDIA_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";

/// Lesson name carried by the single recommendation of a fallback result.
pub const ERROR_LESSON_NAME: &str = "Error";

/// An uploaded file as accepted into a batch. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub content: Bytes,
    pub media_type: String,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, content: Bytes) -> Self {
        Self {
            name: name.into(),
            content,
            media_type: media_type.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.content.len()
    }
}

/// Returns true for the media types the pipeline accepts: any `text/*`,
/// JSON, and slide decks.
pub fn is_supported_media_type(media_type: &str) -> bool {
    let essence = media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence.starts_with("text/") || essence == "application/json" || essence == PPTX_MEDIA_TYPE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissedQuestion {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub percentage_missed: f64,
    #[serde(default)]
    pub related_lessons: Vec<String>,
    #[serde(default)]
    pub improvement_suggestions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonRecommendation {
    #[serde(default)]
    pub lesson_name: String,
    #[serde(default)]
    pub current_content: String,
    #[serde(default)]
    pub suggested_improvements: Vec<String>,
    #[serde(default)]
    pub additional_resources: Vec<String>,
}

/// The model's assessment of one document, as returned by the LLM.
/// Every field defaults so a validated payload always deserializes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    #[serde(default)]
    pub overall_score: f64,
    #[serde(default)]
    pub missed_questions: Vec<MissedQuestion>,
    #[serde(default)]
    pub lesson_recommendations: Vec<LessonRecommendation>,
}

/// The canonical per-file record produced by an analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub filename: String,
    pub overall_score: f64,
    pub missed_questions: Vec<MissedQuestion>,
    pub lesson_recommendations: Vec<LessonRecommendation>,
}

impl AnalysisResult {
    /// True when this record stands in for a failed file.
    pub fn is_fallback(&self) -> bool {
        self.overall_score == 0.0
            && self.missed_questions.is_empty()
            && self.lesson_recommendations.len() == 1
            && self.lesson_recommendations[0].lesson_name == ERROR_LESSON_NAME
    }
}
