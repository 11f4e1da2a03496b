//! HTTP handlers for the ClauseLens API

use axum::{
    extract::{Multipart, Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use clauselens_core::{
    chat, mime_for_filename, mime_supported, Analysis, AnalysisStatus, ChatContext, ChatReply,
    Document, Profile, ProfileUpdate, SignedUrl, DEFAULT_URL_TTL,
};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Uploads above this are rejected by the body limit layer.
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

// ── Request/response types ────────────────────────────────────────────────

/// Analysis poll response; `analysis` stays null until the document is
/// complete.
#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub document_id: String,
    pub analysis_status: AnalysisStatus,
    pub analysis_progress: i32,
    pub analysis: Option<Analysis>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(flatten)]
    pub context: ChatContext,
}

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub expires: i64,
    pub sig: String,
}

// ── Handlers ──────────────────────────────────────────────────────────────

/// Health check endpoint
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "clauselens-api" }))
}

/// Bootstrap the caller's profile from their verified token claims.
/// Idempotent: an existing profile is returned unchanged.
pub async fn signup(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Profile>, ApiError> {
    let profile = state
        .profiles
        .create(
            &user.sub,
            user.name.as_deref().unwrap_or(""),
            user.email.as_deref().unwrap_or(""),
        )
        .await?;

    tracing::info!("Profile ready for {}", user.sub);
    Ok(Json(profile))
}

/// Upload a contract and kick off its staged analysis.
///
/// Multipart: required `file` part (PDF/DOC/DOCX), optional `name` field.
/// The response returns the pending document immediately; analysis runs on
/// a detached task.
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    mut multipart: Multipart,
) -> Result<Json<Document>, ApiError> {
    let mut file: Option<(String, String, Vec<u8>)> = None;
    let mut display_name: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("Invalid multipart body: {e}")))?
    {
        match field.name() {
            Some("file") => {
                let filename = field
                    .file_name()
                    .unwrap_or("document")
                    .to_string();
                let mime = field.content_type().unwrap_or("").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Validation(format!("Invalid file part: {e}")))?;
                file = Some((filename, mime, bytes.to_vec()));
            }
            Some("name") => {
                display_name = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::Validation(format!("Invalid name field: {e}")))?,
                );
            }
            _ => {}
        }
    }

    let (filename, mime, bytes) =
        file.ok_or_else(|| ApiError::Validation("No file provided".to_string()))?;

    if !mime_supported(&mime) {
        return Err(ApiError::Validation(format!(
            "Unsupported file type '{mime}': upload a PDF or Word document"
        )));
    }

    let name = display_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| filename.clone());
    let safe_filename: String = filename
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    let storage_path = format!("{}/{}/{}", user.sub, Uuid::new_v4(), safe_filename);

    state
        .objects
        .put(&storage_path, &bytes)
        .await
        .map_err(ApiError::Dependency)?;

    let document = match state
        .documents
        .create(&user.sub, &name, &storage_path, &mime, bytes.len() as i64)
        .await
    {
        Ok(document) => document,
        Err(e) => {
            // The record is the source of truth; don't leave the object behind
            if let Err(cleanup) = state.objects.delete(&storage_path).await {
                tracing::warn!("orphaned object cleanup failed for {storage_path}: {cleanup}");
            }
            return Err(e.into());
        }
    };

    state.runner.spawn(document.id.clone(), user.sub.clone());

    tracing::info!(
        "Uploaded document {} ({} bytes) for {}",
        document.id,
        document.size_bytes,
        user.sub
    );
    Ok(Json(document))
}

/// List the caller's documents, newest first.
pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<Document>>, ApiError> {
    let documents = state.documents.list_by_owner(&user.sub).await?;
    Ok(Json(documents))
}

/// Poll a document's analysis. 404 unless the caller owns the document.
pub async fn get_document_analysis(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let document = state
        .documents
        .get(&user.sub, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Document not found: {id}")))?;

    let analysis = state.analyses.get(&user.sub, &id).await?;

    Ok(Json(AnalysisResponse {
        document_id: document.id,
        analysis_status: document.analysis_status,
        analysis_progress: document.analysis_progress,
        analysis,
    }))
}

/// Mint a one-hour signed download URL for the stored file.
pub async fn get_document_file(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<SignedUrl>, ApiError> {
    let document = state
        .documents
        .get(&user.sub, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Document not found: {id}")))?;

    Ok(Json(state.signer.sign(&document.storage_path, DEFAULT_URL_TTL)))
}

/// Deliver a stored file. The URL signature is the credential; no bearer.
pub async fn serve_file(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    Query(query): Query<FileQuery>,
) -> Result<Response, ApiError> {
    if !state.signer.verify(&path, query.expires, &query.sig) {
        return Err(ApiError::Auth);
    }

    let bytes = state
        .objects
        .read(&path)
        .await
        .map_err(|_| ApiError::NotFound(format!("File not found: {path}")))?;

    let filename = path.rsplit('/').next().unwrap_or("download");
    Ok((
        [
            (header::CONTENT_TYPE, mime_for_filename(filename).to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// Fetch the caller's profile.
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Profile>, ApiError> {
    let profile = state
        .profiles
        .get(&user.sub)
        .await?
        .ok_or_else(|| ApiError::NotFound("Profile not found".to_string()))?;
    Ok(Json(profile))
}

/// Partial profile update; absent fields are left untouched.
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<Profile>, ApiError> {
    let profile = state
        .profiles
        .apply_update(&user.sub, update)
        .await?
        .ok_or_else(|| ApiError::NotFound("Profile not found".to_string()))?;

    tracing::info!("Updated profile for {}", user.sub);
    Ok(Json(profile))
}

/// Canned legal-assistant chat.
pub async fn post_chat(
    State(state): State<Arc<AppState>>,
    AuthUser(_user): AuthUser,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    if request.message.trim().is_empty() {
        return Err(ApiError::Validation("Message must not be empty".to_string()));
    }

    let reply = {
        let mut rng = state
            .chat_rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        chat::respond(&mut *rng, &request.message, &request.context)
    };

    Ok(Json(reply))
}
