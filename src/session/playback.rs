//! Real-time playback of a recorded timeline
//!
//! [`PlaybackClock`] reproduces a stream with non-uniform timestamps at its
//! original speed, independent of how fast the renderer redraws.
//!
//! # Mapping
//!
//! While playing, the clock holds an anchor `(wall_start, media_start)`:
//!
//! ```text
//! media_time = media_start + (now - wall_start)
//! index      = max { i : t[i] <= media_time }   clamped to [0, n-1]
//! ```
//!
//! Frames are held until the next one is due; nothing is interpolated and the
//! index never runs ahead of the media time actually reached.
//!
//! # Loop
//!
//! One background thread wakes at `min(next fixed tick, next frame boundary)`.
//! When it falls behind, the fixed tick is resynchronized to "now" instead of
//! firing a burst of catch-up ticks. Between wakes it waits on a condition
//! variable, so `pause()`, `seek()` and `stop()` take effect immediately.
//!
//! Every loop carries the generation it was started with. Any state change
//! bumps the generation under the clock's mutex, which retires the old loop,
//! and `play()` joins the previous loop before spawning a new one.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::stream::Stream;
use crate::config::PlaybackConfig;
use crate::error::{Result, SyncRecError};
use crate::types::Timestamped;

/// Hold-last-frame lookup: the last index whose timestamp is `<= media_time`
///
/// Media times before the first timestamp clamp to 0. Returns `None` only
/// for an empty timeline.
pub fn hold_last_index(timestamps: &[Duration], media_time: Duration) -> Option<usize> {
    if timestamps.is_empty() {
        return None;
    }
    Some(
        timestamps
            .partition_point(|t| *t <= media_time)
            .saturating_sub(1),
    )
}

/// State of the playback clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// Not playing; index reset or at the end
    #[default]
    Stopped,
    /// The loop is advancing the index
    Playing,
    /// Frozen at the current index
    Paused,
}

impl PlaybackState {
    /// Display name for the state
    pub fn display_name(&self) -> &'static str {
        match self {
            PlaybackState::Stopped => "Stopped",
            PlaybackState::Playing => "Playing",
            PlaybackState::Paused => "Paused",
        }
    }
}

/// Receives playback events on the loop thread
///
/// Callbacks run without the clock's state lock held. A callback may call
/// `pause`, `seek` or `stop` on a clock handle it shares; the loop notices the
/// change on its next iteration and exits without joining itself.
pub trait PlaybackRenderer: Send {
    /// The displayed index changed
    fn on_frame(&mut self, index: usize);

    /// The loop woke up; called at the fixed tick or at a frame boundary
    fn on_tick(&mut self, _media_time: Duration) {}

    /// The last timestamp was reached and playback stopped
    fn on_finished(&mut self) {}
}

/// Wall/media reference for the current play segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackAnchor {
    pub wall_start: Instant,
    pub media_start: Duration,
}

impl PlaybackAnchor {
    /// Media time reached at wall instant `now`
    pub fn media_at(&self, now: Instant) -> Duration {
        self.media_start + now.saturating_duration_since(self.wall_start)
    }

    /// Wall instant at which `media` is reached
    pub fn wall_at(&self, media: Duration) -> Instant {
        self.wall_start + media.saturating_sub(self.media_start)
    }
}

/// Fixed-tick wake planner with lag resynchronization
#[derive(Debug, Clone)]
pub struct TickScheduler {
    tick: Duration,
    next_tick: Instant,
    resyncs: u64,
}

impl TickScheduler {
    /// Start ticking from `now`
    pub fn new(tick: Duration, now: Instant) -> Self {
        Self {
            tick,
            next_tick: now,
            resyncs: 0,
        }
    }

    /// Plan the next wake after an iteration that finished at `now`
    ///
    /// Returns `None` when the wake is already due. The fixed tick only
    /// advances once it has been reached, so frame wakes in between leave it
    /// in place. A tick missed by more than one period moves to `now` instead
    /// of being replayed.
    pub fn next_wake(&mut self, now: Instant, next_frame: Option<Instant>) -> Option<Instant> {
        if self.next_tick <= now {
            self.next_tick += self.tick;
            if self.next_tick <= now {
                self.next_tick = now;
                self.resyncs += 1;
            }
        }
        let wake_at = match next_frame {
            Some(frame) => frame.min(self.next_tick),
            None => self.next_tick,
        };
        (wake_at > now).then_some(wake_at)
    }

    /// How many times the tick was resynchronized
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }
}

#[derive(Debug, Default)]
struct ClockInner {
    state: PlaybackState,
    index: usize,
    /// Index last passed to `on_frame`
    last_rendered: Option<usize>,
    anchor: Option<PlaybackAnchor>,
    /// Bumped on play/pause/stop; a loop exits when it no longer matches
    generation: u64,
    /// Bumped on seek so a sleeping loop re-plans
    epoch: u64,
    /// Reached the final timestamp; the next `play()` rewinds
    at_end: bool,
    handle: Option<JoinHandle<()>>,
}

struct ClockShared {
    timestamps: Vec<Duration>,
    tick: Duration,
    inner: Mutex<ClockInner>,
    wake: Condvar,
    renderer: Mutex<Box<dyn PlaybackRenderer>>,
    active_loops: AtomicUsize,
}

impl ClockShared {
    fn lock(&self) -> MutexGuard<'_, ClockInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reproduces a recorded timeline in real time
pub struct PlaybackClock {
    shared: Arc<ClockShared>,
}

impl PlaybackClock {
    /// Create a stopped clock over `timestamps`
    ///
    /// Fails with [`SyncRecError::EmptyStream`] for an empty timeline.
    pub fn new(
        timestamps: Vec<Duration>,
        config: &PlaybackConfig,
        renderer: Box<dyn PlaybackRenderer>,
    ) -> Result<Self> {
        if timestamps.is_empty() {
            return Err(SyncRecError::EmptyStream);
        }
        if timestamps.windows(2).any(|w| w[1] < w[0]) {
            return Err(SyncRecError::InvalidState(
                "playback timestamps must be non-decreasing".to_string(),
            ));
        }
        Ok(Self {
            shared: Arc::new(ClockShared {
                timestamps,
                tick: config.tick_interval(),
                inner: Mutex::new(ClockInner::default()),
                wake: Condvar::new(),
                renderer: Mutex::new(renderer),
                active_loops: AtomicUsize::new(0),
            }),
        })
    }

    /// Create a clock over the timestamps of a recorded stream
    pub fn for_stream<T: Timestamped>(
        stream: &Stream<T>,
        config: &PlaybackConfig,
        renderer: Box<dyn PlaybackRenderer>,
    ) -> Result<Self> {
        Self::new(stream.timestamps(), config, renderer)
    }

    /// Number of entries on the timeline
    pub fn len(&self) -> usize {
        self.shared.timestamps.len()
    }

    /// Always false; an empty timeline is rejected at construction
    pub fn is_empty(&self) -> bool {
        self.shared.timestamps.is_empty()
    }

    /// Timestamps being played
    pub fn timestamps(&self) -> &[Duration] {
        &self.shared.timestamps
    }

    /// Current state
    pub fn state(&self) -> PlaybackState {
        self.shared.lock().state
    }

    /// Check if the loop is running
    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    /// Index currently on screen
    pub fn current_index(&self) -> usize {
        self.shared.lock().index
    }

    /// Media time of the playhead
    pub fn media_time(&self) -> Duration {
        let inner = self.shared.lock();
        let last = self.shared.timestamps[self.shared.timestamps.len() - 1];
        match inner.anchor {
            Some(anchor) if inner.state == PlaybackState::Playing => {
                anchor.media_at(Instant::now()).min(last)
            }
            _ => self.shared.timestamps[inner.index],
        }
    }

    /// Index shown after `elapsed` of wall time from the current position
    pub fn index_after(&self, elapsed: Duration) -> usize {
        let start = self.shared.timestamps[self.current_index()];
        hold_last_index(&self.shared.timestamps, start + elapsed).unwrap_or(0)
    }

    /// Number of playback loop threads currently alive
    pub fn active_loops(&self) -> usize {
        self.shared.active_loops.load(Ordering::SeqCst)
    }

    /// Start playing from the current index
    ///
    /// No-op while already playing. After the timeline has ended, playback
    /// restarts from index 0.
    pub fn play(&self) -> Result<()> {
        self.start_loop(|state| state != PlaybackState::Playing, true)
    }

    /// Freeze at the current index
    pub fn pause(&self) {
        let previous = {
            let mut inner = self.shared.lock();
            if inner.state != PlaybackState::Playing {
                return;
            }
            inner.state = PlaybackState::Paused;
            inner.anchor = None;
            inner.generation += 1;
            tracing::debug!("Playback paused at index {}", inner.index);
            inner.handle.take()
        };
        self.shared.wake.notify_all();
        join_loop(previous);
    }

    /// Continue from the paused index
    pub fn resume(&self) -> Result<()> {
        self.start_loop(|state| state == PlaybackState::Paused, false)
    }

    /// Jump to `index` (clamped) and re-anchor
    pub fn seek(&self, index: usize) {
        let mut inner = self.shared.lock();
        let index = index.min(self.shared.timestamps.len() - 1);
        inner.index = index;
        inner.at_end = false;
        if inner.state == PlaybackState::Playing {
            inner.anchor = Some(PlaybackAnchor {
                wall_start: Instant::now(),
                media_start: self.shared.timestamps[index],
            });
            inner.epoch += 1;
        }
        tracing::debug!("Seek to index {}", index);
        drop(inner);
        self.shared.wake.notify_all();
    }

    /// End playback and reset to index 0
    pub fn stop(&self) {
        let previous = {
            let mut inner = self.shared.lock();
            inner.state = PlaybackState::Stopped;
            inner.anchor = None;
            inner.index = 0;
            inner.last_rendered = None;
            inner.at_end = false;
            inner.generation += 1;
            inner.handle.take()
        };
        self.shared.wake.notify_all();
        join_loop(previous);
    }

    fn start_loop<F>(&self, allowed: F, rewind_at_end: bool) -> Result<()>
    where
        F: Fn(PlaybackState) -> bool,
    {
        let previous = {
            let mut inner = self.shared.lock();
            if !allowed(inner.state) {
                return Ok(());
            }
            inner.handle.take()
        };
        join_loop(previous);

        let mut inner = self.shared.lock();
        // Another caller may have started a loop while we were joining
        if !allowed(inner.state) {
            return Ok(());
        }
        if rewind_at_end && inner.at_end {
            inner.index = 0;
            inner.last_rendered = None;
        }
        inner.at_end = false;
        inner.generation += 1;
        let generation = inner.generation;
        let previous_state = inner.state;
        inner.anchor = Some(PlaybackAnchor {
            wall_start: Instant::now(),
            media_start: self.shared.timestamps[inner.index],
        });
        inner.state = PlaybackState::Playing;

        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name("syncrec-playback".to_string())
            .spawn(move || run_loop(shared, generation));
        match spawned {
            Ok(handle) => {
                tracing::debug!("Playback started at index {}", inner.index);
                inner.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                inner.state = previous_state;
                inner.anchor = None;
                Err(e.into())
            }
        }
    }
}

impl Drop for PlaybackClock {
    fn drop(&mut self) {
        self.stop();
    }
}

fn join_loop(handle: Option<JoinHandle<()>>) {
    let Some(handle) = handle else {
        return;
    };
    // A renderer callback may drive the clock from the loop thread itself
    if handle.thread().id() == std::thread::current().id() {
        return;
    }
    if handle.join().is_err() {
        tracing::error!("Playback loop panicked");
    }
}

fn run_loop(shared: Arc<ClockShared>, generation: u64) {
    shared.active_loops.fetch_add(1, Ordering::SeqCst);
    let resyncs = playback_loop(&shared, generation);
    shared.active_loops.fetch_sub(1, Ordering::SeqCst);
    tracing::debug!("Playback loop {} exited ({} resyncs)", generation, resyncs);
}

/// What the loop decided under the guard in one iteration
struct Step {
    media: Duration,
    render: Option<usize>,
    finished: bool,
    next_frame: Option<Instant>,
    epoch: u64,
}

fn playback_loop(shared: &ClockShared, generation: u64) -> u64 {
    let timestamps = &shared.timestamps;
    let last_index = timestamps.len() - 1;
    let mut scheduler = TickScheduler::new(shared.tick, Instant::now());

    loop {
        let step = {
            let mut inner = shared.lock();
            if inner.state != PlaybackState::Playing || inner.generation != generation {
                return scheduler.resyncs();
            }
            let Some(anchor) = inner.anchor else {
                return scheduler.resyncs();
            };

            let media = anchor.media_at(Instant::now());
            let index = hold_last_index(timestamps, media).unwrap_or(0);
            inner.index = index;
            let render = (inner.last_rendered != Some(index)).then_some(index);
            if render.is_some() {
                inner.last_rendered = Some(index);
            }

            let finished = media >= timestamps[last_index];
            if finished {
                inner.index = last_index;
                inner.state = PlaybackState::Stopped;
                inner.anchor = None;
                inner.at_end = true;
            }

            Step {
                media,
                render,
                finished,
                next_frame: timestamps.get(index + 1).map(|t| anchor.wall_at(*t)),
                epoch: inner.epoch,
            }
        };

        {
            let mut renderer = shared.renderer.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(index) = step.render {
                renderer.on_frame(index);
            }
            renderer.on_tick(step.media);
            if step.finished {
                renderer.on_finished();
            }
        }
        if step.finished {
            tracing::debug!("Playback reached the end at index {}", last_index);
            return scheduler.resyncs();
        }

        let Some(wake_at) = scheduler.next_wake(Instant::now(), step.next_frame) else {
            continue;
        };

        let mut inner = shared.lock();
        loop {
            let now = Instant::now();
            if now >= wake_at
                || inner.state != PlaybackState::Playing
                || inner.generation != generation
                || inner.epoch != step.epoch
            {
                break;
            }
            inner = shared
                .wake
                .wait_timeout(inner, wake_at - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
    }
}
