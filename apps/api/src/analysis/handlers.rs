use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::analysis::analyze_batch;
use crate::errors::AppError;
use crate::models::analysis::{is_supported_media_type, AnalysisResult, SourceFile, PPTX_MEDIA_TYPE};
use crate::state::AppState;

const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub conversation_id: Uuid,
    pub results: Vec<AnalysisResult>,
}

/// A parsed multipart upload: the files plus an optional `user_id` field.
#[derive(Debug, Default)]
pub struct Upload {
    pub user_id: Option<Uuid>,
    pub files: Vec<SourceFile>,
}

/// POST /api/v1/analyze
/// Stateless run: nothing is archived or persisted.
pub async fn handle_analyze(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let upload = read_upload(multipart).await?;
    let conversation_id = Uuid::new_v4();
    info!(
        "Stateless analysis {conversation_id}: {} files",
        upload.files.len()
    );

    let results = analyze_batch(&state.pipeline, upload.files).await;
    Ok(Json(AnalyzeResponse {
        conversation_id,
        results,
    }))
}

/// Reads every `files`/`files[]` part and the optional `user_id` part.
/// Rejects the batch if it is empty or any file has an unsupported type.
pub async fn read_upload(mut multipart: Multipart) -> Result<Upload, AppError> {
    let mut upload = Upload::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "user_id" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Unreadable user_id: {e}")))?;
                let user_id = raw
                    .trim()
                    .parse::<Uuid>()
                    .map_err(|_| AppError::Validation(format!("Invalid user_id '{raw}'")))?;
                upload.user_id = Some(user_id);
            }
            "files" | "files[]" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("upload-{}", upload.files.len() + 1));
                let declared = field.content_type().map(str::to_string);
                let content = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Could not read {filename}: {e}")))?;

                let media_type = resolve_media_type(&filename, declared.as_deref());
                if !is_supported_media_type(&media_type) {
                    return Err(AppError::Validation(format!(
                        "Unsupported file type '{media_type}' for {filename}"
                    )));
                }
                upload.files.push(SourceFile::new(filename, media_type, content));
            }
            _ => {}
        }
    }

    if upload.files.is_empty() {
        return Err(AppError::Validation("No files uploaded".to_string()));
    }
    Ok(upload)
}

/// The declared media type, or a guess from the extension when the client
/// sent none or a generic binary type.
fn resolve_media_type(filename: &str, declared: Option<&str>) -> String {
    match declared {
        Some(media_type) if !media_type.is_empty() && media_type != OCTET_STREAM => {
            media_type.to_string()
        }
        _ => guess_media_type(filename).to_string(),
    }
}

fn guess_media_type(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "pptx" => PPTX_MEDIA_TYPE,
        "txt" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        _ => OCTET_STREAM,
    }
}
