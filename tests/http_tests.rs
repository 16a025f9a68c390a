// Integration tests for the HTTP API
//
// Requests go through the full router with `tower::ServiceExt::oneshot`.

mod common;

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use callvault::call::{CallRecord, CallStatus, RecordingStatus, Segment};
use callvault::{create_router, AppState};
use common::{Harness, ALICE, BOB, GROUP};
use serde_json::{json, Value};
use tower::ServiceExt;

fn router(h: &Harness) -> Router {
    create_router(AppState::new(
        h.service.clone(),
        h.dir.path().join("staging"),
        h.dir.path().join("media"),
    ))
}

async fn send(app: &Router, request: Request<Body>) -> Result<(StatusCode, Vec<u8>)> {
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, body.to_vec()))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("request")
}

#[tokio::test]
async fn test_health_check() -> Result<()> {
    let h = Harness::new();
    let app = router(&h);

    let (status, body) = send(&app, get("/health")).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
    Ok(())
}

#[tokio::test]
async fn test_call_flow_over_http() -> Result<()> {
    let h = Harness::new();
    let app = router(&h);

    let (status, body) = send(
        &app,
        post_json(
            "/calls",
            json!({
                "groupId": GROUP,
                "initiatorId": ALICE,
                "inviteeIds": [BOB],
                "kind": "video"
            }),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let call: CallRecord = serde_json::from_slice(&body)?;
    assert_eq!(call.status, CallStatus::Ringing);
    let id = call.call_id;

    let (status, _) = send(
        &app,
        post_json(
            &format!("/calls/{}/respond", id),
            json!({ "participantId": BOB, "action": "accept" }),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        post_json(&format!("/calls/{}/connect", id), json!({ "participantId": BOB })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let active: CallRecord = serde_json::from_slice(&body)?;
    assert_eq!(active.status, CallStatus::Active);

    let (status, body) = send(
        &app,
        post_json(
            &format!("/calls/{}/recording/start", id),
            json!({ "requesterId": ALICE, "deviceSessionId": "phone" }),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let recording: Value = serde_json::from_slice(&body)?;
    assert_eq!(recording["status"], "recording");

    let (status, body) = send(&app, get(&format!("/groups/{}/calls", GROUP))).await?;
    assert_eq!(status, StatusCode::OK);
    let polled: Vec<CallRecord> = serde_json::from_slice(&body)?;
    assert_eq!(polled.len(), 1);
    assert_eq!(polled[0].recording.status, RecordingStatus::Recording);

    let (status, body) = send(
        &app,
        post_json(&format!("/calls/{}/end", id), json!({ "actorId": BOB })),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let error: Value = serde_json::from_slice(&body)?;
    assert_eq!(error["code"], "NOT_INITIATOR");

    let (status, body) = send(
        &app,
        post_json(&format!("/calls/{}/end", id), json!({ "actorId": ALICE })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let ended: CallRecord = serde_json::from_slice(&body)?;
    assert_eq!(ended.status, CallStatus::Ended);
    assert_eq!(ended.recording.status, RecordingStatus::Completed);
    assert_eq!(ended.recording.segments.len(), 1);

    // The flushed segment is served from the media root
    let (status, body) = send(&app, get(&ended.recording.segments[0].file_url)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..4], b"RIFF");
    Ok(())
}

#[tokio::test]
async fn test_upload_segment_from_owner_device() -> Result<()> {
    let h = Harness::new();
    h.transport.set_available(false);
    let app = router(&h);
    let call = h.active_call().await?;
    let id = call.call_id;

    let (status, _) = send(
        &app,
        post_json(
            &format!("/calls/{}/recording/start", id),
            json!({ "requesterId": ALICE, "deviceSessionId": "phone" }),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let pcm: Vec<u8> = (0..3200i16).flat_map(|s| s.to_le_bytes()).collect();
    let upload = |device: &str| {
        Request::post(format!(
            "/calls/{}/recording/segments?requesterId={}&deviceSessionId={}&durationMs=200&sampleRate=16000&channels=1",
            id, ALICE, device
        ))
        .body(Body::from(pcm.clone()))
        .expect("request")
    };

    let (status, body) = send(&app, upload("phone")).await?;
    assert_eq!(status, StatusCode::CREATED);
    let segment: Segment = serde_json::from_slice(&body)?;
    assert_eq!(segment.chunk_index, 0);
    assert_eq!(segment.duration_ms, 200);

    let (status, body) = send(&app, upload("laptop")).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let error: Value = serde_json::from_slice(&body)?;
    assert_eq!(error["code"], "STALE_SESSION");

    let (status, body) = send(&app, get(&format!("/calls/{}/recording/segments", id))).await?;
    assert_eq!(status, StatusCode::OK);
    let segments: Vec<Segment> = serde_json::from_slice(&body)?;
    assert_eq!(segments.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_upload_without_format_is_bad_request() -> Result<()> {
    let h = Harness::new();
    let app = router(&h);
    let call = h.active_call().await?;

    let request = Request::post(format!(
        "/calls/{}/recording/segments?requesterId={}&deviceSessionId=phone",
        call.call_id, ALICE
    ))
    .body(Body::from(vec![0u8; 64]))?;
    let (status, _) = send(&app, request).await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_upload_with_bad_pcm_layout_is_bad_request() -> Result<()> {
    let h = Harness::new();
    h.transport.set_available(false);
    let app = router(&h);
    let call = h.active_call().await?;
    let id = call.call_id;

    let (status, _) = send(
        &app,
        post_json(
            &format!("/calls/{}/recording/start", id),
            json!({ "requesterId": ALICE, "deviceSessionId": "phone" }),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let upload = |layout: &str, body: Vec<u8>| {
        Request::post(format!(
            "/calls/{}/recording/segments?requesterId={}&deviceSessionId=phone&{}",
            id, ALICE, layout
        ))
        .body(Body::from(body))
        .expect("request")
    };

    for layout in ["sampleRate=0&channels=1", "sampleRate=16000&channels=0"] {
        let (status, _) = send(&app, upload(layout, vec![0u8; 64])).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", layout);
    }
    let (status, _) = send(&app, upload("sampleRate=16000&channels=1", vec![0u8; 63])).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Nothing was appended
    let (_, body) = send(&app, get(&format!("/calls/{}/recording/segments", id))).await?;
    let segments: Vec<Segment> = serde_json::from_slice(&body)?;
    assert!(segments.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_error_statuses() -> Result<()> {
    let h = Harness::new();
    let app = router(&h);

    let (status, _) = send(&app, get("/calls/not-a-uuid")).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let missing = callvault::call::CallId::new();
    let (status, body) = send(&app, get(&format!("/calls/{}", missing))).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let error: Value = serde_json::from_slice(&body)?;
    assert_eq!(error["code"], "CALL_NOT_FOUND");

    let (status, _) = send(
        &app,
        post_json(
            "/calls",
            json!({
                "groupId": GROUP,
                "initiatorId": ALICE,
                "inviteeIds": [],
                "kind": "phone"
            }),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let ringing = h.ringing_call().await?;
    let (status, body) = send(
        &app,
        post_json(
            &format!("/calls/{}/recording/start", ringing.call_id),
            json!({ "requesterId": ALICE, "deviceSessionId": "phone" }),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    let error: Value = serde_json::from_slice(&body)?;
    assert_eq!(error["code"], "CALL_NOT_ACTIVE");
    Ok(())
}
