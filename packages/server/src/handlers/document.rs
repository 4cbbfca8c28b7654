use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio_util::io::ReaderStream;
use tracing::instrument;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::documents::DocumentUpload;
use crate::error::{AppError, ErrorBody};
use crate::extractors::json::AppJson;
use crate::models::document::{DocumentResponse, DocumentUploadForm, PatchDocumentRequest};
use crate::state::AppState;
use crate::utils::filename::upload_filename;

/// Room for multipart framing and the title field on top of the file itself.
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

pub fn upload_body_limit(max_blob_size: u64) -> DefaultBodyLimit {
    let limit = max_blob_size.saturating_add(MULTIPART_OVERHEAD);
    DefaultBodyLimit::max(usize::try_from(limit).unwrap_or(usize::MAX))
}

#[utoipa::path(
    post,
    path = "/",
    tag = "Documents",
    operation_id = "createDocument",
    summary = "Upload a new document",
    description = "Stores the `file` part and creates a metadata record titled `title`. \
        Both multipart fields are required and must be non-empty.",
    request_body(content_type = "multipart/form-data", content = DocumentUploadForm),
    responses(
        (status = 201, description = "Document created", body = DocumentResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, headers, multipart))]
pub async fn create_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let upload = read_upload(multipart, state.config.storage.max_blob_size).await?;
    let document = state.documents.create(upload).await?;

    let base = base_url(&state.config.server, &headers);
    Ok((
        StatusCode::CREATED,
        Json(DocumentResponse::new(&document, &base)),
    ))
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Documents",
    operation_id = "listDocuments",
    summary = "List documents",
    description = "Returns every document, oldest upload first.",
    responses(
        (status = 200, description = "Document list", body = Vec<DocumentResponse>),
    ),
)]
#[instrument(skip(state, headers))]
pub async fn list_documents(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<DocumentResponse>>, AppError> {
    let documents = state.documents.list().await?;
    let base = base_url(&state.config.server, &headers);
    Ok(Json(
        documents
            .iter()
            .map(|doc| DocumentResponse::new(doc, &base))
            .collect(),
    ))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Documents",
    operation_id = "getDocument",
    summary = "Get a document by ID",
    params(("id" = String, Path, description = "Document ID (UUID)")),
    responses(
        (status = 200, description = "Document", body = DocumentResponse),
        (status = 400, description = "Malformed ID (VALIDATION_ERROR)", body = ErrorBody),
        (status = 404, description = "Document not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, headers), fields(id))]
pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<DocumentResponse>, AppError> {
    let id = parse_document_id(&id)?;
    let document = state.documents.get(id).await?;
    let base = base_url(&state.config.server, &headers);
    Ok(Json(DocumentResponse::new(&document, &base)))
}

#[utoipa::path(
    put,
    path = "/{id}",
    tag = "Documents",
    operation_id = "replaceDocument",
    summary = "Replace a document",
    description = "Replaces both the title and the file. The previous content is discarded \
        only after the new content is stored; on failure the document is left unchanged. \
        The original upload time is kept.",
    params(("id" = String, Path, description = "Document ID (UUID)")),
    request_body(content_type = "multipart/form-data", content = DocumentUploadForm),
    responses(
        (status = 200, description = "Document replaced", body = DocumentResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 404, description = "Document not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, headers, multipart), fields(id))]
pub async fn replace_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<DocumentResponse>, AppError> {
    let id = parse_document_id(&id)?;
    let upload = read_upload(multipart, state.config.storage.max_blob_size).await?;
    let document = state.documents.replace(id, upload).await?;
    let base = base_url(&state.config.server, &headers);
    Ok(Json(DocumentResponse::new(&document, &base)))
}

#[utoipa::path(
    patch,
    path = "/{id}",
    tag = "Documents",
    operation_id = "updateDocument",
    summary = "Partially update a document",
    description = "Updates metadata only. `title` is the only supported field; the stored file \
        is not touched. An empty body returns the document unchanged.",
    params(("id" = String, Path, description = "Document ID (UUID)")),
    request_body = PatchDocumentRequest,
    responses(
        (status = 200, description = "Document updated", body = DocumentResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 404, description = "Document not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, headers, payload), fields(id))]
pub async fn update_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    AppJson(payload): AppJson<PatchDocumentRequest>,
) -> Result<Json<DocumentResponse>, AppError> {
    let id = parse_document_id(&id)?;
    let document = state.documents.update(id, payload.into()).await?;
    let base = base_url(&state.config.server, &headers);
    Ok(Json(DocumentResponse::new(&document, &base)))
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Documents",
    operation_id = "deleteDocument",
    summary = "Delete a document",
    description = "Removes the document and its stored file.",
    params(("id" = String, Path, description = "Document ID (UUID)")),
    responses(
        (status = 204, description = "Document deleted"),
        (status = 400, description = "Malformed ID (VALIDATION_ERROR)", body = ErrorBody),
        (status = 404, description = "Document not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state), fields(id))]
pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_document_id(&id)?;
    state.documents.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/{id}/file",
    tag = "Documents",
    operation_id = "downloadDocument",
    summary = "Download a document's content",
    description = "Streams the current file. Supports ETag-based caching via If-None-Match.",
    params(("id" = String, Path, description = "Document ID (UUID)")),
    responses(
        (status = 200, description = "Document content"),
        (status = 304, description = "Not Modified (ETag match)"),
        (status = 404, description = "Document not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, headers), fields(id))]
pub async fn download_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let id = parse_document_id(&id)?;
    let document = state.documents.get(id).await?;

    let etag_value = format!("\"{}\"", document.file.content_hash);
    if let Some(if_none_match) = headers.get(header::IF_NONE_MATCH)
        && let Ok(val) = if_none_match.to_str()
        && (val == etag_value || val == "*")
    {
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }

    // Re-resolve through `open` so a concurrent replace is followed.
    let (document, reader) = state.documents.open(id).await?;
    let etag_value = format!("\"{}\"", document.file.content_hash);
    let body = Body::from_stream(ReaderStream::new(reader));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, &document.file.content_type)
        .header(header::CONTENT_LENGTH, document.file.size.to_string())
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_value(&document.file.filename),
        )
        .header(header::ETAG, &etag_value)
        .header(header::CACHE_CONTROL, "private, no-cache")
        .body(body)
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))
}

fn parse_document_id(raw: &str) -> Result<Uuid, AppError> {
    let id = Uuid::parse_str(raw)
        .map_err(|_| AppError::Validation("Invalid document ID".into()))?;
    tracing::Span::current().record("id", tracing::field::display(id));
    Ok(id)
}

/// Base URL for file links: configured public URL, else the request's Host.
fn base_url(server: &ServerConfig, headers: &HeaderMap) -> String {
    if let Some(public) = &server.public_url {
        return public.trim_end_matches('/').to_string();
    }
    match headers.get(header::HOST).and_then(|h| h.to_str().ok()) {
        Some(host) => format!("http://{host}"),
        None => format!("http://{}:{}", server.host, server.port),
    }
}

/// Collect the `title` and `file` parts of a create/replace request.
async fn read_upload(mut multipart: Multipart, max_size: u64) -> Result<DocumentUpload, AppError> {
    let mut title: Option<String> = None;
    let mut file: Option<DocumentUpload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        match field.name() {
            Some("title") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read title: {e}")))?;
                title = Some(text);
            }
            Some("file") => {
                let filename = field.file_name().and_then(upload_filename);
                let content_type = field.content_type().map(str::to_string);
                let content = read_field(field, max_size).await?;

                let mut upload = DocumentUpload::new(String::new(), content);
                upload.filename = filename;
                upload.content_type = content_type;
                file = Some(upload);
            }
            _ => {} // Ignore unknown fields.
        }
    }

    let title = title.ok_or_else(|| AppError::Validation("Missing 'title' field".into()))?;
    let mut upload = file.ok_or_else(|| AppError::Validation("Missing 'file' field".into()))?;
    upload.title = title;
    Ok(upload)
}

async fn read_field(
    mut field: axum::extract::multipart::Field<'_>,
    max_size: u64,
) -> Result<Vec<u8>, AppError> {
    let mut content = Vec::new();

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| AppError::Validation(format!("Upload read error: {e}")))?
    {
        if (content.len() + chunk.len()) as u64 > max_size {
            return Err(AppError::Validation(format!(
                "File exceeds maximum size of {max_size} bytes"
            )));
        }
        content.extend_from_slice(&chunk);
    }

    Ok(content)
}

/// Build a safe `Content-Disposition` header value.
fn content_disposition_value(filename: &str) -> String {
    let ascii_safe: String = filename
        .chars()
        .filter(|c| c.is_ascii_graphic() && !matches!(c, '"' | ';' | '\\'))
        .collect();
    let ascii_name = if ascii_safe.is_empty() {
        "download".to_string()
    } else {
        ascii_safe
    };

    // RFC 5987 percent-encoding for filename*.
    let encoded: String = filename
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'!'
            | b'#'
            | b'$'
            | b'&'
            | b'+'
            | b'-'
            | b'.'
            | b'^'
            | b'_'
            | b'`'
            | b'|'
            | b'~' => String::from(b as char),
            _ => format!("%{b:02X}"),
        })
        .collect();

    format!("inline; filename=\"{ascii_name}\"; filename*=UTF-8''{encoded}")
}
