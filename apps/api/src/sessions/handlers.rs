use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::analysis::handlers::read_upload;
use crate::errors::AppError;
use crate::models::session::SessionDetail;
use crate::sessions::service::{run_session_analysis, SessionRun};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

/// POST /api/v1/analysis
pub async fn handle_start_session(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<SessionRun>, AppError> {
    let upload = read_upload(multipart).await?;
    let user_id = upload
        .user_id
        .ok_or_else(|| AppError::Validation("user_id is required".to_string()))?;

    let run = run_session_analysis(
        &state.store,
        &state.archive,
        &state.pipeline,
        user_id,
        upload.files,
    )
    .await?;
    Ok(Json(run))
}

/// GET /api/v1/analysis
pub async fn handle_list_sessions(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Vec<SessionDetail>>, AppError> {
    let sessions = state.store.list_sessions(params.user_id).await?;
    Ok(Json(sessions))
}

/// GET /api/v1/analysis/:session_id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<SessionDetail>, AppError> {
    let detail = state
        .store
        .get_session(session_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Session {session_id} not found")))?;

    if detail.session.user_id != params.user_id {
        return Err(AppError::Forbidden);
    }
    Ok(Json(detail))
}
