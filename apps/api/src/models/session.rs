use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "PENDING",
            SessionStatus::Processing => "PROCESSING",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AnalysisSessionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FileMetadataRow {
    pub id: Uuid,
    pub session_id: Uuid,
    pub original_name: String,
    pub storage_path: String,
    pub file_type: String,
    pub size: i64,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AnalysisResultRow {
    pub id: Uuid,
    pub file_id: Uuid,
    pub session_id: Uuid,
    pub filename: String,
    pub overall_score: f64,
    pub missed_questions: Value,
    pub lesson_recommendations: Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
impl AnalysisResultRow {
    /// Rebuilds the typed result from the stored JSON columns.
    pub fn to_result(&self) -> crate::models::analysis::AnalysisResult {
        crate::models::analysis::AnalysisResult {
            filename: self.filename.clone(),
            overall_score: self.overall_score,
            missed_questions: serde_json::from_value(self.missed_questions.clone())
                .unwrap_or_default(),
            lesson_recommendations: serde_json::from_value(self.lesson_recommendations.clone())
                .unwrap_or_default(),
        }
    }
}

/// A session together with its files and stored results.
#[derive(Debug, Clone, Serialize)]
pub struct SessionDetail {
    pub session: AnalysisSessionRow,
    pub files: Vec<FileMetadataRow>,
    pub results: Vec<AnalysisResultRow>,
}
