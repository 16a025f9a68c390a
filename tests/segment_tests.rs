// Integration tests for the segment uploader
//
// These tests verify that chunk indexes stay dense and unique no matter how
// appends interleave.

mod common;

use anyhow::Result;
use callvault::call::{DeviceSessionId, MemberId, RecordingStatus};
use callvault::recording::CaptureMode;
use common::{write_pcm, Harness, ALICE};
use futures::future::join_all;
use std::collections::HashSet;

#[tokio::test]
async fn test_concurrent_appends_get_dense_unique_indexes() -> Result<()> {
    let h = Harness::new();
    let call = h.active_call().await?;
    let id = call.call_id;
    h.service
        .start_recording(&id, &MemberId::from(ALICE), &DeviceSessionId::from("phone"))
        .await?;

    let captures = (0..12)
        .map(|_| write_pcm(&h.capture_dir(), CaptureMode::AudioOnly))
        .collect::<Result<Vec<_>>>()?;
    let results = join_all(
        captures
            .into_iter()
            .map(|raw| h.service.append_segment(&id, raw)),
    )
    .await;

    let mut indexes = Vec::new();
    for result in results {
        indexes.push(result?.chunk_index);
    }
    indexes.sort_unstable();
    assert_eq!(indexes, (0..12).collect::<Vec<u32>>());

    let stored = h.service.segments(&id).await?;
    let chunk_ids: HashSet<_> = stored.iter().map(|s| s.chunk_id).collect();
    assert_eq!(chunk_ids.len(), 12);
    Ok(())
}

#[tokio::test]
async fn test_appends_racing_with_start_and_end_stay_dense() -> Result<()> {
    let h = Harness::new();
    let call = h.active_call().await?;
    let id = call.call_id;
    let alice = MemberId::from(ALICE);
    let (phone, tablet) = (DeviceSessionId::from("phone"), DeviceSessionId::from("tablet"));

    h.service.start_recording(&id, &alice, &phone).await?;

    let captures = (0..6)
        .map(|_| write_pcm(&h.capture_dir(), CaptureMode::AudioOnly))
        .collect::<Result<Vec<_>>>()?;
    let appends = join_all(
        captures
            .into_iter()
            .map(|raw| h.service.append_segment(&id, raw)),
    );
    let second_start = h.service.start_recording(&id, &alice, &tablet);

    let (appended, restart) = tokio::join!(appends, second_start);
    assert!(restart.is_err());
    assert!(appended.iter().all(|r| r.is_ok()));

    let ended = h.service.end(&id, &alice).await?;
    assert_eq!(ended.recording.status, RecordingStatus::Completed);

    let mut indexes: Vec<u32> = ended
        .recording
        .segments
        .iter()
        .map(|s| s.chunk_index)
        .collect();
    indexes.sort_unstable();
    // Six appends plus the segment flushed at the end
    assert_eq!(indexes, (0..7).collect::<Vec<u32>>());
    Ok(())
}

#[tokio::test]
async fn test_segments_are_listed_in_index_order() -> Result<()> {
    let h = Harness::new();
    let call = h.active_call().await?;
    let id = call.call_id;
    h.service
        .start_recording(&id, &MemberId::from(ALICE), &DeviceSessionId::from("phone"))
        .await?;

    for _ in 0..3 {
        let raw = write_pcm(&h.capture_dir(), CaptureMode::AudioOnly)?;
        h.service.append_segment(&id, raw).await?;
    }

    let segments = h.service.segments(&id).await?;
    let indexes: Vec<u32> = segments.iter().map(|s| s.chunk_index).collect();
    assert_eq!(indexes, vec![0, 1, 2]);
    assert!(segments.iter().all(|s| s.duration_ms == 100));
    Ok(())
}

#[tokio::test]
async fn test_staging_files_removed_after_append() -> Result<()> {
    let h = Harness::new();
    let call = h.active_call().await?;
    let id = call.call_id;
    h.service
        .start_recording(&id, &MemberId::from(ALICE), &DeviceSessionId::from("phone"))
        .await?;

    let raw = write_pcm(&h.capture_dir(), CaptureMode::AudioOnly)?;
    let staged = raw.path.clone();
    h.service.append_segment(&id, raw).await?;

    assert!(!staged.exists());
    assert!(!staged.with_extension("wav").exists());
    Ok(())
}
