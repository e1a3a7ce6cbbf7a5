//! Integration tests for the playback clock
//!
//! These tests validate real-time replay:
//! - Hold-last-frame index mapping
//! - Pause/resume without duplicate renders
//! - Single active loop under repeated play()
//! - Seek and stop semantics

mod common;

use common::builders::RecordingBuilder;
use common::mock_helpers::CollectingRenderer;
use common::{test_timeout, wait_until};
use proptest::prelude::*;
use serial_test::serial;
use std::time::{Duration, Instant};
use syncrec_rs::config::PlaybackConfig;
use syncrec_rs::session::{hold_last_index, PlaybackClock, PlaybackState};

fn ms(values: &[u64]) -> Vec<Duration> {
    values.iter().map(|&v| Duration::from_millis(v)).collect()
}

#[test]
fn test_index_mapping_at_fractional_media_time() {
    let timestamps: Vec<Duration> = (0..4).map(Duration::from_secs).collect();
    let clock = PlaybackClock::new(
        timestamps,
        &PlaybackConfig::default(),
        CollectingRenderer::new().boxed(),
    )
    .unwrap();

    assert_eq!(clock.index_after(Duration::from_millis(1500)), 1);
    assert_eq!(clock.index_after(Duration::from_millis(3500)), 3);
}

#[test]
#[serial]
fn test_loop_terminates_at_last_index() {
    let renderer = CollectingRenderer::new();
    let clock = PlaybackClock::new(
        ms(&[0, 100, 200, 300]),
        &PlaybackConfig::default(),
        renderer.boxed(),
    )
    .unwrap();

    let started = Instant::now();
    clock.play().unwrap();
    assert!(wait_until(test_timeout(), || !clock.is_playing()));
    let elapsed = started.elapsed();

    // Real-time: the 300 ms timeline is neither rushed nor badly delayed
    assert!(elapsed >= Duration::from_millis(290), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(600), "{elapsed:?}");
    assert_eq!(clock.current_index(), 3);
    assert_eq!(clock.state(), PlaybackState::Stopped);
    assert_eq!(renderer.finished_count(), 1);
    assert_eq!(renderer.frames().last(), Some(&3));
    assert!(renderer.tick_count() >= renderer.frames().len());
}

#[test]
#[serial]
fn test_pause_then_resume_has_no_duplicate_render() {
    let renderer = CollectingRenderer::new();
    let clock = PlaybackClock::new(
        ms(&[0, 60, 120, 180, 240, 300]),
        &PlaybackConfig::default(),
        renderer.boxed(),
    )
    .unwrap();

    clock.play().unwrap();
    assert!(wait_until(test_timeout(), || clock.current_index() >= 2));
    clock.pause();
    let paused_at = clock.current_index();
    assert_eq!(clock.state(), PlaybackState::Paused);

    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(clock.current_index(), paused_at, "index moved while paused");
    let frames_while_paused = renderer.frames();

    clock.resume().unwrap();
    assert!(wait_until(test_timeout(), || !clock.is_playing()));

    let frames = renderer.frames();
    assert_eq!(&frames[..frames_while_paused.len()], &frames_while_paused[..]);
    assert_eq!(frames.iter().filter(|&&i| i == paused_at).count(), 1);
    assert!(frames.windows(2).all(|w| w[0] < w[1]), "{frames:?}");
    assert_eq!(frames.last(), Some(&5));
}

#[test]
#[serial]
fn test_resume_reanchors_at_paused_timestamp() {
    let clock = PlaybackClock::new(
        ms(&[0, 100, 200, 300, 400]),
        &PlaybackConfig::default(),
        CollectingRenderer::new().boxed(),
    )
    .unwrap();

    clock.play().unwrap();
    assert!(wait_until(test_timeout(), || clock.current_index() >= 1));
    clock.pause();
    let paused_at = clock.current_index();
    std::thread::sleep(Duration::from_millis(250));

    clock.resume().unwrap();
    let media = clock.media_time();
    // Time spent paused is not counted as playback
    assert!(media < clock.timestamps()[paused_at] + Duration::from_millis(100));
    clock.stop();
}

#[test]
#[serial]
fn test_repeated_play_keeps_one_loop() {
    let renderer = CollectingRenderer::new();
    let clock = PlaybackClock::new(
        ms(&[0, 50, 100, 150, 200]),
        &PlaybackConfig::default(),
        renderer.boxed(),
    )
    .unwrap();

    for _ in 0..5 {
        clock.play().unwrap();
    }
    assert!(clock.active_loops() <= 1);
    assert!(wait_until(test_timeout(), || !clock.is_playing()));

    // One loop means each index is rendered at most once
    let frames = renderer.frames();
    assert!(frames.windows(2).all(|w| w[0] < w[1]), "{frames:?}");
    assert_eq!(renderer.finished_count(), 1);
    assert!(wait_until(test_timeout(), || clock.active_loops() == 0));
}

#[test]
#[serial]
fn test_concurrent_play_from_threads() {
    let clock = std::sync::Arc::new(
        PlaybackClock::new(
            ms(&[0, 500, 1000]),
            &PlaybackConfig::default(),
            CollectingRenderer::new().boxed(),
        )
        .unwrap(),
    );

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let clock = std::sync::Arc::clone(&clock);
            std::thread::spawn(move || clock.play().unwrap())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(wait_until(test_timeout(), || clock.active_loops() == 1));
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(clock.active_loops(), 1);
    clock.stop();
    assert_eq!(clock.active_loops(), 0);
}

#[test]
#[serial]
fn test_seek_while_playing_jumps_and_continues() {
    let renderer = CollectingRenderer::new();
    let clock = PlaybackClock::new(
        ms(&[0, 1000, 2000, 2050, 2100]),
        &PlaybackConfig::default(),
        renderer.boxed(),
    )
    .unwrap();

    clock.play().unwrap();
    assert!(wait_until(test_timeout(), || renderer.frames() == vec![0]));
    clock.seek(2);
    assert!(wait_until(test_timeout(), || !clock.is_playing()));

    let frames = renderer.frames();
    assert_eq!(frames[..2], [0, 2]);
    assert_eq!(frames.last(), Some(&4));
}

#[test]
#[serial]
fn test_stop_resets_to_start() {
    let clock = PlaybackClock::new(
        ms(&[0, 50, 100, 5000]),
        &PlaybackConfig::default(),
        CollectingRenderer::new().boxed(),
    )
    .unwrap();

    clock.play().unwrap();
    assert!(wait_until(test_timeout(), || clock.current_index() >= 2));
    clock.stop();

    assert_eq!(clock.state(), PlaybackState::Stopped);
    assert_eq!(clock.current_index(), 0);
    assert_eq!(clock.active_loops(), 0);
    assert_eq!(clock.media_time(), Duration::ZERO);
}

#[test]
#[serial]
fn test_slow_display_rate_still_meets_frame_boundaries() {
    // A 2 Hz display tick must not delay frames due every 40 ms
    let renderer = CollectingRenderer::new();
    let recording = RecordingBuilder::new()
        .frame_times_ms(&[0, 40, 80, 120, 160])
        .build();
    let clock = PlaybackClock::for_stream(
        &recording.video,
        &PlaybackConfig { display_hz: 2.0 },
        renderer.boxed(),
    )
    .unwrap();

    let started = Instant::now();
    clock.play().unwrap();
    assert!(wait_until(test_timeout(), || !clock.is_playing()));
    assert!(started.elapsed() < Duration::from_millis(400));
    assert_eq!(renderer.frames().last(), Some(&4));
}

#[test]
#[serial]
fn test_display_ticks_keep_their_rate_between_frames() {
    // 50 Hz display over 30 ms frames: 30 fixed ticks in 600 ms, plus the
    // frame boundaries that fall between them
    let renderer = CollectingRenderer::new();
    let timestamps: Vec<u64> = (0..=20).map(|i| i * 30).collect();
    let clock = PlaybackClock::new(
        ms(&timestamps),
        &PlaybackConfig { display_hz: 50.0 },
        renderer.boxed(),
    )
    .unwrap();

    clock.play().unwrap();
    assert!(wait_until(test_timeout(), || !clock.is_playing()));

    let ticks = renderer.tick_count();
    assert!(ticks >= 34, "only {ticks} wakes; fixed ticks were dropped");
    assert!(ticks <= 45, "{ticks} wakes; ticks were replayed in a burst");
    assert_eq!(renderer.frames().last(), Some(&20));
}

proptest! {
    #[test]
    fn hold_last_never_runs_ahead(
        mut raw in prop::collection::vec(0u64..10_000, 1..64),
        query in 0u64..12_000
    ) {
        raw.sort_unstable();
        let timestamps = ms(&raw);
        let media = Duration::from_millis(query);
        let index = hold_last_index(&timestamps, media).unwrap();

        prop_assert!(index < timestamps.len());
        if media >= timestamps[0] {
            prop_assert!(timestamps[index] <= media);
        } else {
            prop_assert_eq!(index, 0);
        }
        if let Some(next) = timestamps.get(index + 1) {
            prop_assert!(*next > media || media < timestamps[0]);
        }
    }

    #[test]
    fn hold_last_is_monotonic_in_media_time(
        mut raw in prop::collection::vec(0u64..10_000, 1..64),
        a in 0u64..12_000,
        b in 0u64..12_000
    ) {
        raw.sort_unstable();
        let timestamps = ms(&raw);
        let (lo, hi) = (a.min(b), a.max(b));
        let i_lo = hold_last_index(&timestamps, Duration::from_millis(lo)).unwrap();
        let i_hi = hold_last_index(&timestamps, Duration::from_millis(hi)).unwrap();
        prop_assert!(i_lo <= i_hi);
    }
}
