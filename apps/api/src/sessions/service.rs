//! Persisted analysis runs.
//!
//! Flow: create session (PENDING) → archive + record each file →
//!       PROCESSING → analyze batch → store one result per file →
//!       COMPLETED. Any failure after the session exists marks it FAILED.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::analysis::{analyze_batch, AnalysisPipeline};
use crate::errors::AppError;
use crate::models::analysis::{AnalysisResult, SourceFile};
use crate::models::session::SessionStatus;
use crate::sessions::archive::{archive_key, UploadArchive};
use crate::sessions::store::{AnalysisStore, NewFile};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRun {
    pub session_id: Uuid,
    pub results: Vec<AnalysisResult>,
}

pub async fn run_session_analysis(
    store: &Arc<dyn AnalysisStore>,
    archive: &Arc<dyn UploadArchive>,
    pipeline: &Arc<AnalysisPipeline>,
    user_id: Uuid,
    files: Vec<SourceFile>,
) -> Result<SessionRun, AppError> {
    let session = store.create_session(user_id).await?;
    info!(
        "Session {} created for user {user_id} with {} files",
        session.id,
        files.len()
    );

    match process(store, archive, pipeline, session.id, files).await {
        Ok(results) => Ok(SessionRun {
            session_id: session.id,
            results,
        }),
        Err(e) => {
            error!("Session {} failed: {e}", session.id);
            if let Err(mark_err) = store
                .update_session_status(session.id, SessionStatus::Failed)
                .await
            {
                error!("Could not mark session {} as FAILED: {mark_err}", session.id);
            }
            Err(e)
        }
    }
}

async fn process(
    store: &Arc<dyn AnalysisStore>,
    archive: &Arc<dyn UploadArchive>,
    pipeline: &Arc<AnalysisPipeline>,
    session_id: Uuid,
    files: Vec<SourceFile>,
) -> Result<Vec<AnalysisResult>, AppError> {
    let mut file_ids = Vec::with_capacity(files.len());
    for file in &files {
        let file_id = Uuid::new_v4();
        let key = archive_key(session_id, file_id, &file.name);
        archive.put(&key, file).await?;
        store
            .add_file(NewFile {
                id: file_id,
                session_id,
                original_name: file.name.clone(),
                storage_path: key,
                file_type: file.media_type.clone(),
                size: i64::try_from(file.size()).unwrap_or(i64::MAX),
            })
            .await?;
        file_ids.push(file_id);
    }

    store
        .update_session_status(session_id, SessionStatus::Processing)
        .await?;

    let results = analyze_batch(pipeline, files).await;

    for (file_id, result) in file_ids.iter().zip(&results) {
        store.create_result(*file_id, session_id, result).await?;
    }

    store
        .update_session_status(session_id, SessionStatus::Completed)
        .await?;
    info!("Session {session_id} completed with {} results", results.len());
    Ok(results)
}
