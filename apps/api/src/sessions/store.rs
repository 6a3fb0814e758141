//! Persistence for analysis sessions, their files, and per-file results.
//!
//! `PgAnalysisStore` is the production implementation. Handlers and the
//! session service only see `Arc<dyn AnalysisStore>`.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::analysis::AnalysisResult;
use crate::models::session::{
    AnalysisResultRow, AnalysisSessionRow, FileMetadataRow, SessionDetail, SessionStatus,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("could not serialize result: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("session {0} does not exist")]
    SessionNotFound(Uuid),
}

/// Metadata for an uploaded file that has already been archived.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub id: Uuid,
    pub session_id: Uuid,
    pub original_name: String,
    pub storage_path: String,
    pub file_type: String,
    pub size: i64,
}

#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn create_session(&self, user_id: Uuid) -> Result<AnalysisSessionRow, StoreError>;

    /// Sets the status; `completed_at` is stamped when moving to COMPLETED.
    async fn update_session_status(
        &self,
        session_id: Uuid,
        status: SessionStatus,
    ) -> Result<(), StoreError>;

    async fn add_file(&self, file: NewFile) -> Result<FileMetadataRow, StoreError>;

    async fn create_result(
        &self,
        file_id: Uuid,
        session_id: Uuid,
        result: &AnalysisResult,
    ) -> Result<AnalysisResultRow, StoreError>;

    async fn get_session(&self, session_id: Uuid) -> Result<Option<SessionDetail>, StoreError>;

    /// The user's sessions, newest first.
    async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<SessionDetail>, StoreError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Postgres
// ────────────────────────────────────────────────────────────────────────────

pub struct PgAnalysisStore {
    db: PgPool,
}

impl PgAnalysisStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AnalysisStore for PgAnalysisStore {
    async fn create_session(&self, user_id: Uuid) -> Result<AnalysisSessionRow, StoreError> {
        let row: AnalysisSessionRow = sqlx::query_as(
            r#"
            INSERT INTO analysis_sessions (id, user_id, status, created_at)
            VALUES ($1, $2, $3, NOW())
            RETURNING id, user_id, status, created_at, completed_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(SessionStatus::Pending.as_str())
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn update_session_status(
        &self,
        session_id: Uuid,
        status: SessionStatus,
    ) -> Result<(), StoreError> {
        let completed_at = (status == SessionStatus::Completed).then(Utc::now);
        let updated = sqlx::query(
            r#"
            UPDATE analysis_sessions
            SET status = $2, completed_at = COALESCE($3, completed_at)
            WHERE id = $1
            "#,
        )
        .bind(session_id)
        .bind(status.as_str())
        .bind(completed_at)
        .execute(&self.db)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::SessionNotFound(session_id));
        }
        Ok(())
    }

    async fn add_file(&self, file: NewFile) -> Result<FileMetadataRow, StoreError> {
        let row: FileMetadataRow = sqlx::query_as(
            r#"
            INSERT INTO file_metadata
                (id, session_id, original_name, storage_path, file_type, size, uploaded_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            RETURNING id, session_id, original_name, storage_path, file_type, size, uploaded_at
            "#,
        )
        .bind(file.id)
        .bind(file.session_id)
        .bind(&file.original_name)
        .bind(&file.storage_path)
        .bind(&file.file_type)
        .bind(file.size)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn create_result(
        &self,
        file_id: Uuid,
        session_id: Uuid,
        result: &AnalysisResult,
    ) -> Result<AnalysisResultRow, StoreError> {
        let row: AnalysisResultRow = sqlx::query_as(
            r#"
            INSERT INTO analysis_results
                (id, file_id, session_id, filename, overall_score,
                 missed_questions, lesson_recommendations, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            RETURNING id, file_id, session_id, filename, overall_score,
                      missed_questions, lesson_recommendations, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(file_id)
        .bind(session_id)
        .bind(&result.filename)
        .bind(result.overall_score)
        .bind(serde_json::to_value(&result.missed_questions)?)
        .bind(serde_json::to_value(&result.lesson_recommendations)?)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Option<SessionDetail>, StoreError> {
        let session: Option<AnalysisSessionRow> = sqlx::query_as(
            "SELECT id, user_id, status, created_at, completed_at FROM analysis_sessions WHERE id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.db)
        .await?;

        let Some(session) = session else {
            return Ok(None);
        };
        let mut details = self.attach_children(vec![session]).await?;
        Ok(details.pop())
    }

    async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<SessionDetail>, StoreError> {
        let sessions: Vec<AnalysisSessionRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, status, created_at, completed_at
            FROM analysis_sessions
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        self.attach_children(sessions).await
    }
}

impl PgAnalysisStore {
    /// Loads files and results for `sessions` in two queries and groups them.
    async fn attach_children(
        &self,
        sessions: Vec<AnalysisSessionRow>,
    ) -> Result<Vec<SessionDetail>, StoreError> {
        if sessions.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = sessions.iter().map(|s| s.id).collect();

        let files: Vec<FileMetadataRow> = sqlx::query_as(
            r#"
            SELECT id, session_id, original_name, storage_path, file_type, size, uploaded_at
            FROM file_metadata
            WHERE session_id = ANY($1)
            ORDER BY uploaded_at, original_name
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.db)
        .await?;

        let results: Vec<AnalysisResultRow> = sqlx::query_as(
            r#"
            SELECT id, file_id, session_id, filename, overall_score,
                   missed_questions, lesson_recommendations, created_at
            FROM analysis_results
            WHERE session_id = ANY($1)
            ORDER BY created_at, filename
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.db)
        .await?;

        Ok(group_children(sessions, files, results))
    }
}

fn group_children(
    sessions: Vec<AnalysisSessionRow>,
    files: Vec<FileMetadataRow>,
    results: Vec<AnalysisResultRow>,
) -> Vec<SessionDetail> {
    sessions
        .into_iter()
        .map(|session| {
            let id = session.id;
            SessionDetail {
                session,
                files: files.iter().filter(|f| f.session_id == id).cloned().collect(),
                results: results.iter().filter(|r| r.session_id == id).cloned().collect(),
            }
        })
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory store for service and router tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod memory {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Tables {
        sessions: Vec<AnalysisSessionRow>,
        files: Vec<FileMetadataRow>,
        results: Vec<AnalysisResultRow>,
    }

    #[derive(Default)]
    pub(crate) struct InMemoryStore {
        tables: Mutex<Tables>,
        /// When set, `create_result` fails with a database error.
        fail_results: bool,
    }

    impl InMemoryStore {
        pub(crate) fn failing_results() -> Self {
            Self {
                fail_results: true,
                ..Self::default()
            }
        }

        pub(crate) fn status_of(&self, session_id: Uuid) -> Option<String> {
            let tables = self.tables.lock().unwrap();
            tables
                .sessions
                .iter()
                .find(|s| s.id == session_id)
                .map(|s| s.status.clone())
        }

        pub(crate) fn only_session(&self) -> AnalysisSessionRow {
            let tables = self.tables.lock().unwrap();
            assert_eq!(tables.sessions.len(), 1);
            tables.sessions[0].clone()
        }
    }

    #[async_trait]
    impl AnalysisStore for InMemoryStore {
        async fn create_session(&self, user_id: Uuid) -> Result<AnalysisSessionRow, StoreError> {
            let row = AnalysisSessionRow {
                id: Uuid::new_v4(),
                user_id,
                status: SessionStatus::Pending.as_str().to_string(),
                created_at: Utc::now(),
                completed_at: None,
            };
            self.tables.lock().unwrap().sessions.push(row.clone());
            Ok(row)
        }

        async fn update_session_status(
            &self,
            session_id: Uuid,
            status: SessionStatus,
        ) -> Result<(), StoreError> {
            let mut tables = self.tables.lock().unwrap();
            let session = tables
                .sessions
                .iter_mut()
                .find(|s| s.id == session_id)
                .ok_or(StoreError::SessionNotFound(session_id))?;
            session.status = status.as_str().to_string();
            if status == SessionStatus::Completed {
                session.completed_at = Some(Utc::now());
            }
            Ok(())
        }

        async fn add_file(&self, file: NewFile) -> Result<FileMetadataRow, StoreError> {
            let row = FileMetadataRow {
                id: file.id,
                session_id: file.session_id,
                original_name: file.original_name,
                storage_path: file.storage_path,
                file_type: file.file_type,
                size: file.size,
                uploaded_at: Utc::now(),
            };
            self.tables.lock().unwrap().files.push(row.clone());
            Ok(row)
        }

        async fn create_result(
            &self,
            file_id: Uuid,
            session_id: Uuid,
            result: &AnalysisResult,
        ) -> Result<AnalysisResultRow, StoreError> {
            if self.fail_results {
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }
            let row = AnalysisResultRow {
                id: Uuid::new_v4(),
                file_id,
                session_id,
                filename: result.filename.clone(),
                overall_score: result.overall_score,
                missed_questions: serde_json::to_value(&result.missed_questions)?,
                lesson_recommendations: serde_json::to_value(&result.lesson_recommendations)?,
                created_at: Utc::now(),
            };
            self.tables.lock().unwrap().results.push(row.clone());
            Ok(row)
        }

        async fn get_session(&self, session_id: Uuid) -> Result<Option<SessionDetail>, StoreError> {
            let tables = self.tables.lock().unwrap();
            let session = tables.sessions.iter().find(|s| s.id == session_id).cloned();
            Ok(session.and_then(|s| {
                group_children(vec![s], tables.files.clone(), tables.results.clone()).pop()
            }))
        }

        async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<SessionDetail>, StoreError> {
            let tables = self.tables.lock().unwrap();
            let mut sessions: Vec<AnalysisSessionRow> = tables
                .sessions
                .iter()
                .filter(|s| s.user_id == user_id)
                .cloned()
                .collect();
            sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(group_children(
                sessions,
                tables.files.clone(),
                tables.results.clone(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn session(user_id: Uuid, minutes_ago: i64) -> AnalysisSessionRow {
        AnalysisSessionRow {
            id: Uuid::new_v4(),
            user_id,
            status: SessionStatus::Completed.as_str().to_string(),
            created_at: Utc::now() - Duration::minutes(minutes_ago),
            completed_at: Some(Utc::now()),
        }
    }

    fn file(session_id: Uuid, name: &str) -> FileMetadataRow {
        FileMetadataRow {
            id: Uuid::new_v4(),
            session_id,
            original_name: name.to_string(),
            storage_path: format!("sessions/{session_id}/x/{name}"),
            file_type: "text/plain".to_string(),
            size: 10,
            uploaded_at: Utc::now(),
        }
    }

    #[test]
    fn test_group_children_assigns_rows_to_their_session() {
        let user = Uuid::new_v4();
        let a = session(user, 5);
        let b = session(user, 1);
        let files = vec![file(a.id, "a1.txt"), file(b.id, "b1.txt"), file(a.id, "a2.txt")];

        let grouped = group_children(vec![a.clone(), b.clone()], files, Vec::new());
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].session.id, a.id);
        let names: Vec<&str> = grouped[0]
            .files
            .iter()
            .map(|f| f.original_name.as_str())
            .collect();
        assert_eq!(names, vec!["a1.txt", "a2.txt"]);
        assert_eq!(grouped[1].files.len(), 1);
    }

    #[tokio::test]
    async fn test_in_memory_status_flow_sets_completed_at() {
        let store = memory::InMemoryStore::default();
        let row = store.create_session(Uuid::new_v4()).await.unwrap();
        assert_eq!(row.status, "PENDING");
        assert!(row.completed_at.is_none());

        store
            .update_session_status(row.id, SessionStatus::Completed)
            .await
            .unwrap();
        let detail = store.get_session(row.id).await.unwrap().unwrap();
        assert_eq!(detail.session.status, "COMPLETED");
        assert!(detail.session.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_update_unknown_session_is_not_found() {
        let store = memory::InMemoryStore::default();
        let err = store
            .update_session_status(Uuid::new_v4(), SessionStatus::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::SessionNotFound(_)));
    }
}
