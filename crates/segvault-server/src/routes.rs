//! HTTP routes for session setup and key delivery.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::json;

use segvault::core::{Scheme, SessionId, VideoId, X25519PublicKey};
use segvault::request::{
    decode_b64, encode_b64, BatchKeyResponse, KeyResponse, PaymentStatusResponse,
    SealApprovalResponse, SessionRequest, SessionResponse,
};
use segvault::{BatchKeyRequest, DeliveryMode, KeyService, PrefetchRequest, ServiceError};

use crate::identity::Identity;
use crate::response::ApiResult;

/// Response header carrying a segment's IV, base64.
pub const SEGMENT_IV_HEADER: &str = "x-segment-iv";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<KeyService>,
}

impl AppState {
    pub fn new(service: Arc<KeyService>) -> Self {
        Self { service }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:session_id", delete(end_session))
        .route(
            "/api/videos/:video_id/keys/:rendition/:seg_idx",
            get(get_key),
        )
        .route("/api/videos/:video_id/keys/batch", post(get_keys_batch))
        .route("/api/videos/:video_id/keys/prefetch", post(prefetch))
        .route("/api/videos/:video_id/payment", get(payment_status))
        .route("/api/videos/:video_id/scheme", get(playback_scheme))
        .route(
            "/api/videos/:video_id/segments/:scheme/:rendition/:seg_idx",
            get(get_segment),
        )
        .route("/api/videos/:video_id/seal/approval", post(seal_approval))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct ModeQuery {
    pub mode: Option<String>,
}

impl ModeQuery {
    fn delivery_mode(&self) -> segvault::Result<DeliveryMode> {
        match &self.mode {
            Some(mode) => mode.parse(),
            None => Ok(DeliveryMode::default()),
        }
    }
}

fn video_id(raw: &str) -> segvault::Result<VideoId> {
    Ok(VideoId::new(raw)?)
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> segvault::Result<T> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ServiceError::InvalidRequest(rejection.body_text()))
}

async fn health(State(state): State<AppState>) -> Response {
    Json(json!({
        "status": "ok",
        "sessions": state.service.sessions().len(),
    }))
    .into_response()
}

// ─────────────────────────────────────────────────────────────────────────────
// Sessions
// ─────────────────────────────────────────────────────────────────────────────

async fn create_session(
    State(state): State<AppState>,
    body: Result<Json<SessionRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let request = json_body(body)?;
    let video_id = video_id(&request.video_id)?;
    let client_key = decode_b64("clientPublicKey", &request.client_public_key)?;
    let client_public = X25519PublicKey::from_slice(&client_key).map_err(ServiceError::from)?;

    let hello = state.service.start_session(&video_id, client_public).await?;
    Ok((StatusCode::CREATED, Json(SessionResponse::from(&hello))).into_response())
}

async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<StatusCode> {
    let session_id = SessionId::from_hex(&session_id).map_err(ServiceError::from)?;
    if state.service.end_session(&session_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServiceError::NotFound(format!("session {session_id}")).into())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Keys
// ─────────────────────────────────────────────────────────────────────────────

async fn get_key(
    State(state): State<AppState>,
    Path((video, rendition, seg_idx)): Path<(String, String, i64)>,
    Query(query): Query<ModeQuery>,
    Identity(identity): Identity,
) -> ApiResult<Json<KeyResponse>> {
    let key = state
        .service
        .get_key(
            &video_id(&video)?,
            &rendition,
            seg_idx,
            &identity,
            query.delivery_mode()?,
        )
        .await?;
    Ok(Json(KeyResponse::from(&key)))
}

async fn get_keys_batch(
    State(state): State<AppState>,
    Path(video): Path<String>,
    Query(query): Query<ModeQuery>,
    Identity(identity): Identity,
    body: Result<Json<BatchKeyRequest>, JsonRejection>,
) -> ApiResult<Json<BatchKeyResponse>> {
    let request = json_body(body)?;
    let items = state
        .service
        .get_keys_batch(&video_id(&video)?, request, &identity, query.delivery_mode()?)
        .await?;
    Ok(Json(BatchKeyResponse::from_items(&items)))
}

async fn prefetch(
    State(state): State<AppState>,
    Path(video): Path<String>,
    Query(query): Query<ModeQuery>,
    Identity(identity): Identity,
    body: Result<Json<PrefetchRequest>, JsonRejection>,
) -> ApiResult<Json<BatchKeyResponse>> {
    let request = json_body(body)?;
    let items = state
        .service
        .prefetch(&video_id(&video)?, request, &identity, query.delivery_mode()?)
        .await?;
    Ok(Json(BatchKeyResponse::from_items(&items)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Payment and scheme
// ─────────────────────────────────────────────────────────────────────────────

async fn payment_status(
    State(state): State<AppState>,
    Path(video): Path<String>,
    Identity(identity): Identity,
) -> ApiResult<Json<PaymentStatusResponse>> {
    let status = state
        .service
        .check_payment(&video_id(&video)?, &identity)
        .await?;
    Ok(Json(PaymentStatusResponse::from(status)))
}

async fn playback_scheme(
    State(state): State<AppState>,
    Path(video): Path<String>,
    Identity(identity): Identity,
) -> ApiResult<Response> {
    let scheme = state
        .service
        .playback_scheme(&video_id(&video)?, &identity)
        .await?;
    Ok(Json(json!({ "scheme": scheme })).into_response())
}

// ─────────────────────────────────────────────────────────────────────────────
// Segments and the threshold path
// ─────────────────────────────────────────────────────────────────────────────

async fn get_segment(
    State(state): State<AppState>,
    Path((video, scheme, rendition, seg_idx)): Path<(String, String, String, i64)>,
) -> ApiResult<Response> {
    let scheme: Scheme = scheme.parse().map_err(ServiceError::from)?;
    let payload = state
        .service
        .fetch_segment(&video_id(&video)?, scheme, &rendition, seg_idx)
        .await?;

    let mut response = payload.bytes.into_response();
    if let Some(iv) = payload.iv {
        let value = HeaderValue::from_str(&encode_b64(iv.as_bytes()))
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        response.headers_mut().insert(SEGMENT_IV_HEADER, value);
    }
    Ok(response)
}

async fn seal_approval(
    State(state): State<AppState>,
    Path(video): Path<String>,
    Identity(identity): Identity,
) -> ApiResult<Json<SealApprovalResponse>> {
    let approval = state
        .service
        .seal_approval(&video_id(&video)?, &identity)
        .await?;
    Ok(Json(SealApprovalResponse::from_approval(&approval)?))
}
