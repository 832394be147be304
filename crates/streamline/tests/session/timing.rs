use streamline::{SessionOrchestrator, SessionPhase};

use crate::common::*;

#[tokio::test(start_paused = true)]
async fn test_resolved_offset_reaches_both_tracks() {
    let clock = FakeClock::offset(120_000);
    let host = RecordingHost::new();
    let manifest = manifest(true, Some(xsdate_timing()), vec![video_set(false), audio_set()]);

    let mut handle = SessionOrchestrator::new(
        manifest_uri(),
        collaborators(ScriptedTransport::ok(), manifest, clock.clone()),
        host.clone(),
        config(),
    )
    .spawn();

    assert_eq!(handle.settled().await, SessionPhase::Ready);
    assert_eq!(clock.call_count(), 1);
    assert_eq!(handle.state().elapsed_realtime_offset_ms, 120_000);

    let sources = host.take_sources().unwrap();
    assert_eq!(sources.video.chunk_source().elapsed_realtime_offset_ms(), 120_000);
    assert_eq!(sources.audio.chunk_source().elapsed_realtime_offset_ms(), 120_000);
    assert_eq!(sources.video.chunk_source().live_edge_latency_ms(), 30_000);
}

#[tokio::test(start_paused = true)]
async fn test_clock_failure_builds_with_zero_offset() {
    let clock = FakeClock::failing();
    let host = RecordingHost::new();
    let manifest = manifest(true, Some(xsdate_timing()), vec![video_set(false), audio_set()]);

    let mut handle = SessionOrchestrator::new(
        manifest_uri(),
        collaborators(ScriptedTransport::ok(), manifest, clock.clone()),
        host.clone(),
        config(),
    )
    .spawn();

    assert_eq!(handle.settled().await, SessionPhase::Ready);
    assert_eq!(clock.call_count(), 1);
    assert_eq!(handle.state().elapsed_realtime_offset_ms, 0);
    assert_eq!(host.ready_count(), 1);
    assert!(host.errors().is_empty());

    let sources = host.take_sources().unwrap();
    assert_eq!(sources.video.chunk_source().elapsed_realtime_offset_ms(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_phases_in_order() {
    let manifest = manifest(true, Some(xsdate_timing()), vec![video_set(false), audio_set()]);
    let session = SessionOrchestrator::new(
        manifest_uri(),
        collaborators(ScriptedTransport::failing(1), manifest, FakeClock::offset(5)),
        RecordingHost::new(),
        config(),
    );
    let mut state = session.subscribe();
    let _handle = session.spawn();

    let mut phases = vec![state.borrow_and_update().phase];
    while state.changed().await.is_ok() {
        let phase = state.borrow_and_update().phase;
        if phases.last() != Some(&phase) {
            phases.push(phase);
        }
        if phase.is_settled() {
            break;
        }
    }

    // watch only keeps the latest value, so intermediate phases may be skipped
    assert_eq!(phases.first(), Some(&SessionPhase::Idle));
    assert_eq!(phases.last(), Some(&SessionPhase::Ready));
    let position = |phase| phases.iter().position(|p| *p == phase);
    if let (Some(timing), Some(building)) = (
        position(SessionPhase::AwaitingTiming),
        position(SessionPhase::BuildingSources),
    ) {
        assert!(timing < building);
    }
}
