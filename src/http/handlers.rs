use super::state::AppState;
use crate::call::{CallId, CallKind, CallRecord, DeviceSessionId, GroupId, MemberId};
use crate::error::{CallError, ErrorKind, StoreError};
use crate::lifecycle::RespondAction;
use crate::recording::{CaptureMode, PcmFormat, RawCapture};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCallRequest {
    pub group_id: GroupId,
    pub initiator_id: MemberId,
    pub invitee_ids: Vec<MemberId>,
    pub kind: CallKind,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondRequest {
    pub participant_id: MemberId,
    pub action: RespondAction,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRequest {
    pub participant_id: MemberId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorRequest {
    pub actor_id: MemberId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingRequest {
    pub requester_id: MemberId,
    pub device_session_id: DeviceSessionId,
}

/// Query of a client segment upload; the body is the captured file
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSegmentQuery {
    pub requester_id: MemberId,
    pub device_session_id: DeviceSessionId,
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: u64,
    pub mode: Option<CaptureMode>,
    /// Set for headerless PCM bodies
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    /// Container extension of encoded bodies (wav, webm, ...)
    pub format: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl IntoResponse for CallError {
    fn into_response(self) -> Response {
        let status = match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Authorization => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::StateConflict => StatusCode::CONFLICT,
            ErrorKind::Capture => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Storage => match &self {
                CallError::Store(StoreError::VersionConflict { .. }) => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        };

        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
                code: self.code(),
            }),
        )
            .into_response()
    }
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
            code: "BAD_REQUEST",
        }),
    )
        .into_response()
}

fn parse_call_id(raw: &str) -> Result<CallId, Response> {
    raw.parse()
        .map_err(|_| bad_request(format!("Invalid call id: {}", raw)))
}

/// Unwraps a handler result into a response
fn respond_with<T: Serialize>(result: Result<T, CallError>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => e.into_response(),
    }
}

// ============================================================================
// Call lifecycle
// ============================================================================

/// POST /calls
pub async fn create_call(
    State(state): State<AppState>,
    Json(req): Json<CreateCallRequest>,
) -> Response {
    info!(
        "Create call in group {} by {} ({} invitees)",
        req.group_id,
        req.initiator_id,
        req.invitee_ids.len()
    );

    match state
        .service
        .create_call(req.group_id, req.initiator_id, req.invitee_ids, req.kind)
        .await
    {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /calls/:call_id
pub async fn get_call(State(state): State<AppState>, Path(call_id): Path<String>) -> Response {
    let call_id = match parse_call_id(&call_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond_with(state.service.get_call(&call_id).await)
}

/// GET /groups/:group_id/calls
/// Open calls of the group plus recently terminated ones
pub async fn poll_group(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
) -> Response {
    let group_id = GroupId::from(group_id);
    let calls: Result<Vec<CallRecord>, CallError> = state.service.poll_group(&group_id).await;
    respond_with(calls)
}

/// POST /calls/:call_id/respond
pub async fn respond(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    Json(req): Json<RespondRequest>,
) -> Response {
    let call_id = match parse_call_id(&call_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond_with(
        state
            .service
            .respond(&call_id, &req.participant_id, req.action)
            .await,
    )
}

/// POST /calls/:call_id/connect
/// Media transport reports a participant connected
pub async fn connect(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    Json(req): Json<ParticipantRequest>,
) -> Response {
    let call_id = match parse_call_id(&call_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond_with(state.service.connect(&call_id, &req.participant_id).await)
}

/// POST /calls/:call_id/leave
pub async fn leave(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    Json(req): Json<ParticipantRequest>,
) -> Response {
    let call_id = match parse_call_id(&call_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond_with(state.service.leave(&call_id, &req.participant_id).await)
}

/// POST /calls/:call_id/end
pub async fn end_call(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    Json(req): Json<ActorRequest>,
) -> Response {
    let call_id = match parse_call_id(&call_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond_with(state.service.end(&call_id, &req.actor_id).await)
}

// ============================================================================
// Recording
// ============================================================================

/// POST /calls/:call_id/recording/start
pub async fn start_recording(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    Json(req): Json<RecordingRequest>,
) -> Response {
    let call_id = match parse_call_id(&call_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond_with(
        state
            .service
            .start_recording(&call_id, &req.requester_id, &req.device_session_id)
            .await,
    )
}

/// POST /calls/:call_id/recording/stop
pub async fn stop_recording(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    Json(req): Json<RecordingRequest>,
) -> Response {
    let call_id = match parse_call_id(&call_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond_with(
        state
            .service
            .stop_recording(&call_id, &req.requester_id, &req.device_session_id)
            .await,
    )
}

/// POST /calls/:call_id/recording/hide
pub async fn hide_recording(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    Json(req): Json<ActorRequest>,
) -> Response {
    let call_id = match parse_call_id(&call_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond_with(state.service.set_hidden(&call_id, &req.actor_id, true).await)
}

/// POST /calls/:call_id/recording/unhide
pub async fn unhide_recording(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    Json(req): Json<ActorRequest>,
) -> Response {
    let call_id = match parse_call_id(&call_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond_with(state.service.set_hidden(&call_id, &req.actor_id, false).await)
}

/// POST /calls/:call_id/recording/disable
pub async fn disable_recording(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    Json(req): Json<ActorRequest>,
) -> Response {
    let call_id = match parse_call_id(&call_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond_with(state.service.disable_recording(&call_id, &req.actor_id).await)
}

/// GET /calls/:call_id/recording/segments
/// Segments ordered by chunk index
pub async fn list_segments(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> Response {
    let call_id = match parse_call_id(&call_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond_with(state.service.segments(&call_id).await)
}

/// POST /calls/:call_id/recording/segments
/// Segment captured on the owner device
pub async fn upload_segment(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    Query(query): Query<UploadSegmentQuery>,
    body: Bytes,
) -> Response {
    let call_id = match parse_call_id(&call_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    if body.is_empty() {
        return bad_request("Empty segment body");
    }

    let (extension, pcm) = match (query.sample_rate, query.channels, query.format.as_deref()) {
        (Some(0), Some(_), _) | (Some(_), Some(0), _) => {
            return bad_request("sampleRate and channels must be positive")
        }
        (Some(_), Some(channels), _) if body.len() % (2 * channels as usize) != 0 => {
            return bad_request("PCM body is not a whole number of 16-bit frames")
        }
        (Some(sample_rate), Some(channels), _) => (
            "pcm".to_string(),
            Some(PcmFormat {
                sample_rate,
                channels,
            }),
        ),
        (None, None, Some(format)) if is_plain_extension(format) => {
            (format.to_ascii_lowercase(), None)
        }
        _ => return bad_request("Expected sampleRate and channels, or a format"),
    };

    if let Err(e) = tokio::fs::create_dir_all(&state.staging_dir).await {
        error!("Failed to create staging directory: {}", e);
        return CallError::Upload(e.to_string()).into_response();
    }
    let path = state
        .staging_dir
        .join(format!("{}-{}.{}", call_id, uuid::Uuid::new_v4(), extension));
    if let Err(e) = tokio::fs::write(&path, &body).await {
        error!("Failed to stage uploaded segment {:?}: {}", path, e);
        return CallError::Upload(e.to_string()).into_response();
    }

    info!(
        "Call {} segment upload from session {} ({} bytes)",
        call_id,
        query.device_session_id,
        body.len()
    );

    let raw = RawCapture {
        path: path.clone(),
        started_at: query.started_at.unwrap_or_else(Utc::now),
        duration_ms: query.duration_ms,
        mode: query.mode.unwrap_or(CaptureMode::AudioOnly),
        pcm,
    };

    let result = state
        .service
        .append_client_segment(
            &call_id,
            &query.requester_id,
            &query.device_session_id,
            raw,
        )
        .await;

    if let Err(e) = &result {
        // Rejected uploads are never retried from the staged copy
        if e.kind() != ErrorKind::Capture {
            if let Err(io) = tokio::fs::remove_file(&path).await {
                warn!("Failed to remove rejected upload {:?}: {}", path, io);
            }
        }
    }

    match result {
        Ok(segment) => (StatusCode::CREATED, Json(segment)).into_response(),
        Err(e) => e.into_response(),
    }
}

fn is_plain_extension(format: &str) -> bool {
    !format.is_empty() && format.len() <= 8 && format.chars().all(|c| c.is_ascii_alphanumeric())
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
