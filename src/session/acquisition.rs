//! Acquisition session: two paced producers feeding one collector
//!
//! # Threads
//!
//! A running session owns three threads:
//!
//! - `syncrec-imu` and `syncrec-camera` each drive a [`TimedProducer`] at the
//!   stream's target rate. A producer reads its device without holding any
//!   lock and hands the result to the collector with `try_send`, so a slow
//!   read on one stream never delays the other.
//! - `syncrec-collector` is the only owner of the two [`Stream`] buffers. It
//!   appends whatever arrives and drains the channel on shutdown.
//!
//! # State
//!
//! The session state lives in one [`SessionState`] value behind the session
//! mutex. Producers poll it once per iteration; `stop()`, `status()` and
//! `is_recording()` read and write it under the same guard.
//!
//! ```text
//! Idle -> Initializing -> Recording -> Stopping -> Idle
//!              \-> Idle (device failed to open)
//! ```
//!
//! # Stopping
//!
//! `stop()` waits for both producers to report, bounded by
//! [`AcquisitionConfig::join_timeout`]. A producer that misses the bound is
//! detached and reported as [`SyncRecError::JoinTimeout`]; its device may not
//! have been released. Streams that failed during the run are reported as
//! [`SyncRecError::PartialFailure`]. In both cases the best-effort recording is
//! still available from [`AcquisitionSession::take_recording`].

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::stream::Stream;
use super::types::{Recording, RecordingMetadata, SessionState, SessionStatus, StreamSummary};
use crate::backend::{
    DeviceProvider, DeviceStats, FrameSource, ImuSource, ProducerFailure, ProducerReport, Tick,
    TimedProducer,
};
use crate::config::AcquisitionConfig;
use crate::error::{Result, StreamFailure, SyncRecError};
use crate::types::{Frame, FrameGeometry, Sample, StreamKind, IMU_FIELD_LABELS};

/// How often `wait_for_completion` logs progress
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// Poll period of `wait_for_completion`
const COMPLETION_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// An entry on its way from a producer to the collector
enum Captured {
    Imu(Sample),
    Frame(Frame),
}

/// Final message of a producer thread
struct ProducerExit {
    stream: StreamKind,
    outcome: std::result::Result<ProducerReport, ProducerFailure>,
    device_stats: DeviceStats,
}

/// Handles of a running recording
struct ActiveRun {
    config: AcquisitionConfig,
    started_at: Instant,
    duration: Duration,
    recorded_at: chrono::DateTime<chrono::Utc>,
    imu_fields: usize,
    geometry: FrameGeometry,
    producers: Vec<(StreamKind, JoinHandle<()>)>,
    exit_rx: Receiver<ProducerExit>,
    shutdown_tx: Sender<()>,
    collector: JoinHandle<(Stream<Sample>, Stream<Frame>)>,
}

#[derive(Default)]
struct SessionInner {
    state: SessionState,
    /// Incremented per run so late threads of an abandoned run are ignored
    run_id: u64,
    started_at: Option<Instant>,
    duration: Duration,
    imu_samples: usize,
    frames: usize,
    producers_running: usize,
    run: Option<ActiveRun>,
    finished: Option<Recording>,
}

impl SessionInner {
    fn remaining(&self) -> Duration {
        match self.started_at {
            Some(started) => self.duration.saturating_sub(started.elapsed()),
            None => Duration::ZERO,
        }
    }
}

fn lock_inner(shared: &Mutex<SessionInner>) -> MutexGuard<'_, SessionInner> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Records an IMU stream and a camera stream side by side
pub struct AcquisitionSession {
    provider: Box<dyn DeviceProvider>,
    shared: Arc<Mutex<SessionInner>>,
    task_name: String,
}

impl AcquisitionSession {
    /// Create an idle session that opens devices through `provider`
    pub fn new(provider: Box<dyn DeviceProvider>) -> Self {
        Self {
            provider,
            shared: Arc::new(Mutex::new(SessionInner::default())),
            task_name: "recording".to_string(),
        }
    }

    /// Name stored in the metadata of recordings made by this session
    pub fn with_task_name(mut self, name: impl Into<String>) -> Self {
        self.task_name = name.into();
        self
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        lock_inner(&self.shared)
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Check if producers are running
    pub fn is_recording(&self) -> bool {
        self.lock().state.is_recording()
    }

    /// Consistent snapshot of progress
    pub fn status(&self) -> SessionStatus {
        let inner = self.lock();
        let (elapsed, remaining) = match inner.started_at {
            Some(started) if inner.state.is_busy() => (started.elapsed(), inner.remaining()),
            _ => (Duration::ZERO, Duration::ZERO),
        };
        SessionStatus {
            state: inner.state,
            elapsed,
            remaining,
            imu_samples: inner.imu_samples,
            frames: inner.frames,
        }
    }

    /// Take the recording produced by the last `stop()`
    pub fn take_recording(&self) -> Option<Recording> {
        self.lock().finished.take()
    }

    /// Open both devices and start recording for at most `duration`
    pub fn start(&self, duration: Duration, config: &AcquisitionConfig) -> Result<()> {
        config.validate()?;

        {
            let mut inner = self.lock();
            if inner.state != SessionState::Idle {
                return Err(SyncRecError::InvalidState(format!(
                    "cannot start a recording while {}",
                    inner.state
                )));
            }
            inner.state = SessionState::Initializing;
            inner.finished = None;
            inner.imu_samples = 0;
            inner.frames = 0;
        }

        tracing::info!(
            "Initializing devices (serial {}, camera {})",
            config.devices.serial_port,
            config.devices.camera_index
        );

        let (imu, camera) = match self.open_devices(config) {
            Ok(devices) => devices,
            Err(e) => {
                self.lock().state = SessionState::Idle;
                tracing::error!("Session start aborted: {}", e);
                return Err(e);
            }
        };

        let mut inner = self.lock();
        // Producers block on this guard until the run is fully registered
        match self.launch(&mut inner, imu, camera, duration, config) {
            Ok(run) => {
                inner.run = Some(run);
                tracing::info!(
                    "Recording started: IMU {} Hz, camera {} Hz, for {:?}",
                    config.imu_frequency_hz,
                    config.camera_frequency_hz,
                    duration
                );
                Ok(())
            }
            Err(e) => {
                inner.state = SessionState::Idle;
                inner.producers_running = 0;
                tracing::error!("Failed to spawn session threads: {}", e);
                Err(e)
            }
        }
    }

    /// Open the IMU then the camera; release the IMU if the camera fails
    fn open_devices(
        &self,
        config: &AcquisitionConfig,
    ) -> Result<(Box<dyn ImuSource>, Box<dyn FrameSource>)> {
        let mut imu = self.provider.open_imu(&config.devices)?;
        match self.provider.open_camera(&config.devices) {
            Ok(camera) => Ok((imu, camera)),
            Err(e) => {
                imu.release();
                Err(e)
            }
        }
    }

    fn launch(
        &self,
        inner: &mut SessionInner,
        imu: Box<dyn ImuSource>,
        camera: Box<dyn FrameSource>,
        duration: Duration,
        config: &AcquisitionConfig,
    ) -> Result<ActiveRun> {
        let imu_fields = imu.field_count();
        if imu_fields != config.devices.imu_fields {
            tracing::warn!(
                "IMU reports {} fields, configuration expects {}",
                imu_fields,
                config.devices.imu_fields
            );
        }
        let geometry = camera.geometry();
        if geometry != config.devices.frame_geometry() {
            tracing::warn!(
                "Camera delivers {}, configuration expects {}",
                geometry,
                config.devices.frame_geometry()
            );
        }

        let started_at = Instant::now();
        inner.run_id += 1;
        inner.state = SessionState::Recording;
        inner.started_at = Some(started_at);
        inner.duration = duration;
        inner.producers_running = 2;

        let (sample_tx, sample_rx) = bounded(config.channel_capacity);
        let (exit_tx, exit_rx) = unbounded();
        let (shutdown_tx, shutdown_rx) = bounded(1);

        let collector = spawn_collector(
            Arc::clone(&self.shared),
            inner.run_id,
            sample_rx,
            shutdown_rx,
            Stream::new(StreamKind::Imu, config.imu_frequency_hz, config.chunk_capacity),
            Stream::new(
                StreamKind::Camera,
                config.camera_frequency_hz,
                config.chunk_capacity,
            ),
        )?;

        let plan = |frequency_hz| ProducerPlan {
            run_id: inner.run_id,
            frequency_hz,
            stale_timeout: config.stale_timeout(),
            started_at,
            deadline: started_at.checked_add(duration),
        };

        let imu_handle = spawn_producer(
            ImuDevice {
                source: imu,
                field_count: imu_fields,
            },
            plan(config.imu_frequency_hz),
            Arc::clone(&self.shared),
            sample_tx.clone(),
            exit_tx.clone(),
        )?;
        let camera_handle = spawn_producer(
            CameraDevice {
                source: camera,
                geometry,
            },
            plan(config.camera_frequency_hz),
            Arc::clone(&self.shared),
            sample_tx,
            exit_tx,
        )?;

        Ok(ActiveRun {
            config: config.clone(),
            started_at,
            duration,
            recorded_at: chrono::Utc::now(),
            imu_fields,
            geometry,
            producers: vec![
                (StreamKind::Imu, imu_handle),
                (StreamKind::Camera, camera_handle),
            ],
            exit_rx,
            shutdown_tx,
            collector,
        })
    }

    /// Stop recording and assemble the recording
    ///
    /// Stopping an idle session is a no-op.
    pub fn stop(&self) -> Result<()> {
        let requested_at = Instant::now();
        let run = {
            let mut inner = self.lock();
            match inner.state {
                SessionState::Idle => {
                    tracing::debug!("stop() on an idle session");
                    return Ok(());
                }
                SessionState::Recording => {}
                other => {
                    return Err(SyncRecError::InvalidState(format!(
                        "cannot stop while {}",
                        other
                    )))
                }
            }
            inner.state = SessionState::Stopping;
            inner.run.take()
        };

        let result = match run {
            Some(run) => self.finish_run(run, requested_at),
            None => Err(SyncRecError::InvalidState(
                "recording has no running threads".to_string(),
            )),
        };

        let mut inner = self.lock();
        inner.state = SessionState::Idle;
        inner.producers_running = 0;
        result
    }

    fn finish_run(&self, run: ActiveRun, requested_at: Instant) -> Result<()> {
        tracing::info!("Stopping recording");
        let join_timeout = run.config.join_timeout();
        let wait_until = Instant::now() + join_timeout;

        let mut exits: Vec<ProducerExit> = Vec::with_capacity(run.producers.len());
        while exits.len() < run.producers.len() {
            match run.exit_rx.recv_deadline(wait_until) {
                Ok(exit) => exits.push(exit),
                Err(_) => break,
            }
        }

        let mut failures = Vec::new();
        let mut timed_out = Vec::new();
        for (stream, handle) in run.producers {
            if !exits.iter().any(|e| e.stream == stream) && handle.is_finished() {
                exits.extend(run.exit_rx.try_iter());
            }
            let reported = exits.iter().any(|e| e.stream == stream);
            if reported || handle.is_finished() {
                if handle.join().is_err() || !reported {
                    tracing::error!("{} producer thread panicked", stream);
                    failures.push(StreamFailure {
                        stream,
                        reason: "producer thread panicked".to_string(),
                        last_good_index: None,
                    });
                }
            } else {
                tracing::error!(
                    "{} producer did not stop within {:?}; detaching it",
                    stream,
                    join_timeout
                );
                failures.push(StreamFailure {
                    stream,
                    reason: format!("did not stop within {:?}", join_timeout),
                    last_good_index: None,
                });
                timed_out.push(stream);
            }
        }

        let mut imu_counters = (0, 0);
        let mut camera_counters = (0, 0);
        for exit in &exits {
            let report = match &exit.outcome {
                Ok(report) => report,
                Err(failure) => {
                    failures.push(StreamFailure {
                        stream: exit.stream,
                        reason: failure.error.to_string(),
                        last_good_index: failure.report.last_good_index(),
                    });
                    &failure.report
                }
            };
            let counters = (report.skipped, report.late);
            match exit.stream {
                StreamKind::Imu => imu_counters = counters,
                StreamKind::Camera => camera_counters = counters,
            }
            tracing::debug!(
                "{} device: {:.1}% reads ok, avg {:.0} us, jitter {} us",
                exit.stream,
                exit.device_stats.success_rate(),
                exit.device_stats.avg_read_time_us(),
                exit.device_stats.jitter_us()
            );
        }

        // The collector drains what is already queued; a detached producer's
        // later sends fail once it is gone.
        let _ = run.shutdown_tx.send(());
        let (imu, video) = run
            .collector
            .join()
            .map_err(|_| SyncRecError::Channel("collector thread panicked".to_string()))?;

        // Streams that never reported take their last good index from what was stored
        for failure in failures.iter_mut().filter(|f| f.last_good_index.is_none()) {
            let stored = match failure.stream {
                StreamKind::Imu => imu.len(),
                StreamKind::Camera => video.len(),
            };
            failure.last_good_index = stored.checked_sub(1);
        }

        let recorded_for = requested_at
            .saturating_duration_since(run.started_at)
            .min(run.duration);
        let tolerance = run.config.jitter_tolerance;
        let imu_summary = StreamSummary::new(
            StreamKind::Imu,
            run.config.imu_frequency_hz,
            imu.len(),
            recorded_for,
            tolerance,
        )
        .with_counters(imu_counters.0, imu_counters.1);
        let camera_summary = StreamSummary::new(
            StreamKind::Camera,
            run.config.camera_frequency_hz,
            video.len(),
            recorded_for,
            tolerance,
        )
        .with_counters(camera_counters.0, camera_counters.1);

        for summary in [&imu_summary, &camera_summary] {
            let level_ok = summary.within_tolerance;
            if level_ok {
                tracing::info!(
                    "{}: {} entries (expected {}), {:.1} Hz",
                    summary.kind,
                    summary.count,
                    summary.expected_count,
                    summary.achieved_frequency
                );
            } else {
                tracing::warn!(
                    "{}: {} entries, expected {} within {:.0}%, {:.1} Hz",
                    summary.kind,
                    summary.count,
                    summary.expected_count,
                    tolerance * 100.0,
                    summary.achieved_frequency
                );
            }
        }

        let recording = Recording {
            metadata: RecordingMetadata {
                name: self.task_name.clone(),
                recorded_at: run.recorded_at,
                duration: recorded_for,
                imu: imu_summary,
                camera: camera_summary,
                imu_fields: run.imu_fields,
                field_labels: field_labels(run.imu_fields),
                frame_geometry: run.geometry,
                failures: failures.clone(),
            },
            imu,
            video,
        };
        self.lock().finished = Some(recording);

        if let Some(&stream) = timed_out.first() {
            return Err(SyncRecError::JoinTimeout {
                stream,
                waited: join_timeout,
            });
        }
        if !failures.is_empty() {
            return Err(SyncRecError::PartialFailure { failures });
        }
        Ok(())
    }

    /// Block until the duration bound elapses (or both producers end), then stop
    pub fn wait_for_completion(&self) -> Result<()> {
        let mut last_progress = Instant::now();
        loop {
            let (state, remaining, running) = {
                let inner = self.lock();
                (inner.state, inner.remaining(), inner.producers_running)
            };
            if !state.is_recording() || remaining.is_zero() || running == 0 {
                break;
            }
            if last_progress.elapsed() >= PROGRESS_LOG_INTERVAL {
                let status = self.status();
                tracing::info!(
                    "Recording: {:.1}s elapsed, {:.1}s left, {} samples, {} frames",
                    status.elapsed.as_secs_f64(),
                    status.remaining.as_secs_f64(),
                    status.imu_samples,
                    status.frames
                );
                last_progress = Instant::now();
            }
            std::thread::sleep(remaining.min(COMPLETION_POLL_INTERVAL));
        }
        self.stop()
    }
}

impl Drop for AcquisitionSession {
    fn drop(&mut self) {
        if self.is_recording() {
            tracing::warn!("Session dropped while recording; stopping");
            if let Err(e) = self.stop() {
                tracing::warn!("Stop on drop: {}", e);
            }
        }
    }
}

fn field_labels(count: usize) -> Vec<String> {
    if count == IMU_FIELD_LABELS.len() {
        IMU_FIELD_LABELS.iter().map(|s| s.to_string()).collect()
    } else {
        (0..count).map(|i| format!("f{}", i)).collect()
    }
}

// ==================== Producer Threads ====================

/// Timing parameters shared by both producers of a run
#[derive(Clone, Copy)]
struct ProducerPlan {
    run_id: u64,
    frequency_hz: f64,
    stale_timeout: Option<Duration>,
    started_at: Instant,
    deadline: Option<Instant>,
}

/// A device as seen by a producer thread
trait PacedDevice: Send + 'static {
    const KIND: StreamKind;

    /// Read once; `Ok(None)` when nothing is available this period
    fn sample(&mut self, session_start: Instant) -> Result<Option<Captured>>;

    fn release(&mut self);

    fn stats(&self) -> DeviceStats;
}

struct ImuDevice {
    source: Box<dyn ImuSource>,
    field_count: usize,
}

impl PacedDevice for ImuDevice {
    const KIND: StreamKind = StreamKind::Imu;

    fn sample(&mut self, session_start: Instant) -> Result<Option<Captured>> {
        let Some(values) = self.source.read_record()? else {
            return Ok(None);
        };
        if values.len() != self.field_count {
            return Err(SyncRecError::TransientRead {
                stream: StreamKind::Imu,
                reason: format!("expected {} fields, got {}", self.field_count, values.len()),
            });
        }
        Ok(Some(Captured::Imu(Sample::new(
            session_start.elapsed(),
            values,
        ))))
    }

    fn release(&mut self) {
        self.source.release();
    }

    fn stats(&self) -> DeviceStats {
        self.source.stats().clone()
    }
}

struct CameraDevice {
    source: Box<dyn FrameSource>,
    geometry: FrameGeometry,
}

impl PacedDevice for CameraDevice {
    const KIND: StreamKind = StreamKind::Camera;

    fn sample(&mut self, session_start: Instant) -> Result<Option<Captured>> {
        let data = self.source.grab()?;
        if data.len() != self.geometry.byte_len() {
            return Err(SyncRecError::TransientRead {
                stream: StreamKind::Camera,
                reason: format!(
                    "frame has {} bytes, expected {} for {}",
                    data.len(),
                    self.geometry.byte_len(),
                    self.geometry
                ),
            });
        }
        Ok(Some(Captured::Frame(Frame::new(
            session_start.elapsed(),
            self.geometry,
            data,
        ))))
    }

    fn release(&mut self) {
        self.source.release();
    }

    fn stats(&self) -> DeviceStats {
        self.source.stats().clone()
    }
}

fn spawn_producer<D: PacedDevice>(
    mut device: D,
    plan: ProducerPlan,
    shared: Arc<Mutex<SessionInner>>,
    sample_tx: Sender<Captured>,
    exit_tx: Sender<ProducerExit>,
) -> Result<JoinHandle<()>> {
    let handle = std::thread::Builder::new()
        .name(format!("syncrec-{}", D::KIND))
        .spawn(move || {
            let mut producer = TimedProducer::from_frequency(D::KIND, plan.frequency_hz);
            if let Some(timeout) = plan.stale_timeout {
                producer = producer.with_stale_timeout(timeout);
            }

            let outcome = producer.run(
                |_| match device.sample(plan.started_at)? {
                    Some(captured) => {
                        hand_off(&sample_tx, D::KIND, captured)?;
                        Ok(Tick::Sampled)
                    }
                    None => Ok(Tick::Idle),
                },
                || keep_running(&shared, plan.run_id, plan.deadline),
            );

            device.release();
            drop(sample_tx);

            {
                let mut inner = lock_inner(&shared);
                if inner.run_id == plan.run_id {
                    inner.producers_running = inner.producers_running.saturating_sub(1);
                }
            }

            let exit = ProducerExit {
                stream: D::KIND,
                outcome,
                device_stats: device.stats(),
            };
            if exit_tx.send(exit).is_err() {
                tracing::warn!("{} producer finished after its session gave up", D::KIND);
            }
        })?;
    Ok(handle)
}

/// Pass an entry to the collector without blocking
fn hand_off(tx: &Sender<Captured>, stream: StreamKind, captured: Captured) -> Result<()> {
    match tx.try_send(captured) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(_)) => Err(SyncRecError::TransientRead {
            stream,
            reason: "collector backlog full, entry dropped".to_string(),
        }),
        Err(TrySendError::Disconnected(_)) => Err(SyncRecError::Channel(format!(
            "{} collector is gone",
            stream
        ))),
    }
}

fn keep_running(shared: &Mutex<SessionInner>, run_id: u64, deadline: Option<Instant>) -> bool {
    if deadline.is_some_and(|d| Instant::now() >= d) {
        return false;
    }
    let inner = lock_inner(shared);
    inner.run_id == run_id && inner.state.is_recording()
}

// ==================== Collector Thread ====================

fn spawn_collector(
    shared: Arc<Mutex<SessionInner>>,
    run_id: u64,
    sample_rx: Receiver<Captured>,
    shutdown_rx: Receiver<()>,
    mut imu: Stream<Sample>,
    mut video: Stream<Frame>,
) -> Result<JoinHandle<(Stream<Sample>, Stream<Frame>)>> {
    let handle = std::thread::Builder::new()
        .name("syncrec-collector".to_string())
        .spawn(move || {
            loop {
                select! {
                    recv(sample_rx) -> msg => match msg {
                        Ok(captured) => store(&shared, run_id, &mut imu, &mut video, captured),
                        // Both producers are gone and the queue is empty
                        Err(_) => break,
                    },
                    recv(shutdown_rx) -> _signal => {
                        for captured in sample_rx.try_iter() {
                            store(&shared, run_id, &mut imu, &mut video, captured);
                        }
                        break;
                    }
                }
            }
            tracing::debug!(
                "Collector finished: {} samples, {} frames",
                imu.len(),
                video.len()
            );
            (imu, video)
        })?;
    Ok(handle)
}

fn store(
    shared: &Mutex<SessionInner>,
    run_id: u64,
    imu: &mut Stream<Sample>,
    video: &mut Stream<Frame>,
    captured: Captured,
) {
    let result = match captured {
        Captured::Imu(sample) => imu.push(sample),
        Captured::Frame(frame) => video.push(frame),
    };
    if let Err(e) = result {
        tracing::warn!("Dropped entry: {}", e);
        return;
    }

    let mut inner = lock_inner(shared);
    if inner.run_id == run_id {
        inner.imu_samples = imu.len();
        inner.frames = video.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockDeviceProvider, MockFailure};
    use crate::config::DeviceConfig;
    use mockall::mock;

    mock! {
        Provider {}
        impl DeviceProvider for Provider {
            fn open_imu(&self, config: &DeviceConfig) -> Result<Box<dyn ImuSource>>;
            fn open_camera(&self, config: &DeviceConfig) -> Result<Box<dyn FrameSource>>;
        }
    }

    mock! {
        Imu {}
        impl ImuSource for Imu {
            fn read_record(&mut self) -> Result<Option<Vec<f64>>>;
            fn field_count(&self) -> usize;
            fn release(&mut self);
            fn stats(&self) -> &DeviceStats;
        }
    }

    fn small_config() -> AcquisitionConfig {
        let mut config = AcquisitionConfig::default();
        config.devices.frame_width = 8;
        config.devices.frame_height = 6;
        config
    }

    #[test]
    fn test_start_then_immediate_stop_is_ok() {
        let session = AcquisitionSession::new(Box::new(MockDeviceProvider::new()));
        session
            .start(Duration::from_secs(5), &small_config())
            .unwrap();
        assert!(session.is_recording());
        session.stop().unwrap();

        assert_eq!(session.state(), SessionState::Idle);
        let recording = session.take_recording().unwrap();
        assert!(recording.imu.check_ordering().is_ok());
        assert!(recording.video.iter().all(|f| f.is_well_formed()));
        assert!(recording.metadata.failures.is_empty());
        assert!(session.take_recording().is_none());
    }

    #[test]
    fn test_zero_duration_gives_empty_streams() {
        let session = AcquisitionSession::new(Box::new(MockDeviceProvider::new()));
        session.start(Duration::ZERO, &small_config()).unwrap();
        session.wait_for_completion().unwrap();

        let recording = session.take_recording().unwrap();
        assert!(recording.is_empty());
        assert_eq!(recording.metadata.duration, Duration::ZERO);
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let session = AcquisitionSession::new(Box::new(MockDeviceProvider::new()));
        session
            .start(Duration::from_secs(5), &small_config())
            .unwrap();
        let err = session
            .start(Duration::from_secs(5), &small_config())
            .unwrap_err();
        assert!(matches!(err, SyncRecError::InvalidState(_)));
        session.stop().unwrap();
    }

    #[test]
    fn test_stop_when_idle_is_noop() {
        let session = AcquisitionSession::new(Box::new(MockDeviceProvider::new()));
        assert!(session.stop().is_ok());
        assert!(session.take_recording().is_none());
    }

    #[test]
    fn test_invalid_config_leaves_session_idle() {
        let session = AcquisitionSession::new(Box::new(MockDeviceProvider::new()));
        let mut config = small_config();
        config.camera_frequency_hz = -1.0;
        assert!(matches!(
            session.start(Duration::from_secs(1), &config),
            Err(SyncRecError::Config(_))
        ));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_camera_unavailable_releases_imu() {
        let provider = MockDeviceProvider::new().with_camera_unavailable();
        let tracker = provider.tracker();
        let session = AcquisitionSession::new(Box::new(provider));

        let err = session
            .start(Duration::from_secs(1), &small_config())
            .unwrap_err();
        assert!(matches!(
            err,
            SyncRecError::DeviceUnavailable {
                stream: StreamKind::Camera,
                ..
            }
        ));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(tracker.opened(), 1);
        assert_eq!(tracker.outstanding(), 0);
    }

    #[test]
    fn test_partial_init_calls_release_exactly_once() {
        let mut provider = MockProvider::new();
        provider.expect_open_imu().times(1).returning(|_| {
            let mut imu = MockImu::new();
            imu.expect_release().times(1).return_const(());
            Ok(Box::new(imu) as Box<dyn ImuSource>)
        });
        provider.expect_open_camera().times(1).returning(|_| {
            Err(SyncRecError::DeviceUnavailable {
                stream: StreamKind::Camera,
                reason: "index 0 not found".to_string(),
            })
        });

        let session = AcquisitionSession::new(Box::new(provider));
        assert!(session
            .start(Duration::from_secs(1), &small_config())
            .is_err());
        assert!(!session.is_recording());
    }

    #[test]
    fn test_imu_unavailable_does_not_open_camera() {
        let mut provider = MockProvider::new();
        provider.expect_open_imu().times(1).returning(|_| {
            Err(SyncRecError::DeviceUnavailable {
                stream: StreamKind::Imu,
                reason: "no such port".to_string(),
            })
        });
        provider.expect_open_camera().never();

        let session = AcquisitionSession::new(Box::new(provider));
        let err = session
            .start(Duration::from_secs(1), &small_config())
            .unwrap_err();
        assert_eq!(err.stream(), Some(StreamKind::Imu));
    }

    #[test]
    fn test_lost_imu_reports_partial_failure() {
        let provider = MockDeviceProvider::new().with_imu_failure(MockFailure::LoseAfter(5));
        let session = AcquisitionSession::new(Box::new(provider));
        session
            .start(Duration::from_millis(200), &small_config())
            .unwrap();

        let err = session.wait_for_completion().unwrap_err();
        let SyncRecError::PartialFailure { failures } = err else {
            panic!("expected partial failure, got {err}");
        };
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].stream, StreamKind::Imu);
        assert_eq!(failures[0].last_good_index, Some(4));

        let recording = session.take_recording().unwrap();
        assert_eq!(recording.imu.len(), 5);
        assert!(!recording.video.is_empty());
    }

    #[test]
    fn test_field_labels() {
        assert_eq!(field_labels(9)[0], "ax");
        assert_eq!(field_labels(2), vec!["f0", "f1"]);
    }
}
