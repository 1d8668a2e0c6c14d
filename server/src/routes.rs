//! HTTP routes.
//!
//! Handlers stay thin: they validate the request shape, check credentials
//! and run the synchronous library call on the blocking pool.

use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use coascan::{BlobStore, DrainSummary, Flag, LookupResult, ParsedFields, SubmissionParser};

use crate::error::ApiError;
use crate::state::AppState;

pub const WORKER_SECRET_HEADER: &str = "x-worker-secret";

/// Largest accepted direct upload.
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/coa/upload", post(register_upload))
        .route("/api/coa/submit", post(submit))
        .route("/api/coa/results/:token", get(result))
        .route(
            "/api/workers/drain-queue",
            get(drain_queue).post(drain_queue),
        )
        .route("/api/workers/parse-coa", post(parse_coa))
        .route(
            "/storage/v1/object/:bucket/*key",
            put(put_object).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .with_state(state)
}

async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

fn secrets_match(presented: &str, expected: &SecretString) -> bool {
    let expected = expected.expose_secret();
    !expected.is_empty() && bool::from(presented.as_bytes().ct_eq(expected.as_bytes()))
}

fn authorize_worker(headers: &HeaderMap, secret: &SecretString) -> Result<(), ApiError> {
    let presented = headers
        .get(WORKER_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if secrets_match(presented, secret) {
        Ok(())
    } else {
        tracing::warn!("Rejected worker call with a bad secret");
        Err(ApiError::Unauthorized)
    }
}

fn authorize_upload(headers: &HeaderMap, key: &SecretString) -> Result<(), ApiError> {
    let presented = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default();
    if secrets_match(presented.trim(), key) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

fn required(value: Option<String>, message: &str) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest(message.to_string()))
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadRequest {
    filename: Option<String>,
    #[serde(alias = "type")]
    mime_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    submission_id: String,
    public_token: String,
    upload_url: String,
    upload_headers: BTreeMap<String, String>,
}

/// `POST /api/coa/upload`
async fn register_upload(
    State(state): State<AppState>,
    body: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let request = body.map(|Json(r)| r).ok();
    let (filename, mime_type) = match request {
        Some(r) => (r.filename, r.mime_type),
        None => (None, None),
    };
    let filename = required(filename, "filename required")?;

    let intake = state.intake.clone();
    let registration =
        blocking(move || Ok(intake.register(&filename, mime_type.as_deref())?)).await?;

    Ok(Json(UploadResponse {
        submission_id: registration.submission_id,
        public_token: registration.public_token,
        upload_url: registration.upload_url,
        upload_headers: registration.upload_headers,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmissionRequest {
    submission_id: Option<String>,
}

fn submission_id(body: Result<Json<SubmissionRequest>, JsonRejection>) -> Result<String, ApiError> {
    let id = body.ok().and_then(|Json(r)| r.submission_id);
    required(id, "submissionId required")
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    ok: bool,
    public_token: String,
}

/// `POST /api/coa/submit`
async fn submit(
    State(state): State<AppState>,
    body: Result<Json<SubmissionRequest>, JsonRejection>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let id = submission_id(body)?;
    let intake = state.intake.clone();
    let public_token = blocking(move || Ok(intake.submit(&id)?)).await?;
    Ok(Json(SubmitResponse {
        ok: true,
        public_token,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DrainQuery {
    batch_size: Option<u32>,
}

#[derive(Debug, Serialize)]
struct DrainResponse {
    ok: bool,
    #[serde(flatten)]
    summary: DrainSummary,
}

/// `GET|POST /api/workers/drain-queue`
async fn drain_queue(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<DrainQuery>, QueryRejection>,
) -> Result<Json<DrainResponse>, ApiError> {
    authorize_worker(&headers, &state.worker_secret)?;
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let dispatcher = state.dispatcher.clone();
    let summary = blocking(move || Ok(dispatcher.drain(query.batch_size)?)).await?;
    Ok(Json(DrainResponse { ok: true, summary }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ParseResponse {
    ok: bool,
    trust_score: u8,
}

/// `POST /api/workers/parse-coa`: parses one submission directly, outside
/// the queue.
async fn parse_coa(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<SubmissionRequest>, JsonRejection>,
) -> Result<Json<ParseResponse>, ApiError> {
    authorize_worker(&headers, &state.worker_secret)?;
    let id = submission_id(body)?;

    let parser = state.parser.clone();
    let outcome = blocking(move || {
        parser
            .parse(&id)
            .map_err(|e| ApiError::ParseFailed(e.to_string()))
    })
    .await?;
    Ok(Json(ParseResponse {
        ok: true,
        trust_score: outcome.trust_score,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResultResponse {
    status: &'static str,
    #[serde(flatten)]
    fields: ParsedFields,
    trust_score: Option<u8>,
    flags: Vec<Flag>,
}

/// `GET /api/coa/results/:token`
async fn result(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<ResultResponse>, ApiError> {
    let lookup = state.lookup.clone();
    let found = blocking(move || Ok(lookup.by_token(&token)?)).await?;

    let response = match found {
        LookupResult::NotFound => return Err(ApiError::NotFound),
        LookupResult::Pending { status } => ResultResponse {
            status: status.as_str(),
            fields: ParsedFields::default(),
            trust_score: None,
            flags: Vec::new(),
        },
        LookupResult::Failed => ResultResponse {
            status: "failed",
            fields: ParsedFields::default(),
            trust_score: None,
            flags: Vec::new(),
        },
        LookupResult::Done {
            fields,
            flags,
            trust_score,
        } => ResultResponse {
            status: "done",
            fields,
            trust_score: Some(trust_score),
            flags,
        },
    };
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PutObjectResponse {
    key: String,
}

/// `PUT /storage/v1/object/:bucket/*key`: direct upload target.
async fn put_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PutObjectResponse>, ApiError> {
    authorize_upload(&headers, &state.upload_key)?;
    if bucket != state.store.bucket() {
        return Err(ApiError::NotFound);
    }
    let key = key.trim_start_matches('/').to_string();

    let store = state.store.clone();
    let stored_key = key.clone();
    let size = body.len();
    blocking(move || Ok(store.put(&stored_key, &body)?)).await?;

    tracing::info!(
        file = %coascan::sanitize::redact_key(&key),
        bytes = size,
        "Object stored"
    );
    Ok(Json(PutObjectResponse {
        key: format!("{}/{}", bucket, key),
    }))
}
