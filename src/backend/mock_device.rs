//! Mock Devices for Testing and Demos
//!
//! This module provides simulated IMU and camera sources so the acquisition
//! engine can run without hardware. Both sources generate deterministic,
//! pattern-based data and can inject the failure modes the engine has to
//! survive.
//!
//! # Features
//!
//! - **Pattern-based IMU data**: every field follows a [`MockDataPattern`],
//!   phase-shifted per field so the axes are distinguishable
//! - **Synthetic frames**: frames of the configured geometry whose fill value
//!   encodes the frame counter
//! - **Latency simulation**: a fixed delay per read models a slow bus or a
//!   blocking frame grab
//! - **Failure injection**: periodic transient errors, stalls, device loss,
//!   and open failures via [`MockFailure`]
//! - **Release tracking**: [`ReleaseTracker`] counts opened and released
//!   handles so tests can check that nothing leaks
//!
//! # Example
//!
//! ```ignore
//! use syncrec_rs::backend::mock_device::{MockDeviceProvider, MockFailure};
//!
//! let provider = MockDeviceProvider::new()
//!     .with_camera_failure(MockFailure::TransientEvery(10));
//! let session = AcquisitionSession::new(Box::new(provider));
//! ```

use crate::config::DeviceConfig;
use crate::error::{Result, SyncRecError};
use crate::types::{FrameGeometry, StreamKind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::device::{DeviceProvider, DeviceStats, FrameSource, ImuSource};

/// Pattern for generating mock data
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockDataPattern {
    /// Constant value
    Constant(f64),
    /// Sine wave with frequency and amplitude
    Sine {
        frequency: f64,
        amplitude: f64,
        offset: f64,
    },
    /// Random values within range
    Random { min: f64, max: f64 },
    /// Sawtooth wave
    Sawtooth { period: f64, amplitude: f64 },
    /// Square wave
    Square { period: f64, amplitude: f64 },
}

impl Default for MockDataPattern {
    fn default() -> Self {
        MockDataPattern::Sine {
            frequency: 1.0,
            amplitude: 1.0,
            offset: 0.0,
        }
    }
}

impl MockDataPattern {
    /// Generate a value at `t` seconds
    pub fn value_at(&self, t: f64) -> f64 {
        match *self {
            MockDataPattern::Constant(v) => v,
            MockDataPattern::Sine {
                frequency,
                amplitude,
                offset,
            } => offset + amplitude * (2.0 * std::f64::consts::PI * frequency * t).sin(),
            MockDataPattern::Random { min, max } => min + rand_simple() * (max - min),
            MockDataPattern::Sawtooth { period, amplitude } => {
                let t = t % period;
                amplitude * (t / period)
            }
            MockDataPattern::Square { period, amplitude } => {
                if t % period < period / 2.0 {
                    amplitude
                } else {
                    -amplitude
                }
            }
        }
    }
}

/// Simple pseudo-random number generator (no external dependency)
fn rand_simple() -> f64 {
    use std::cell::Cell;
    thread_local! {
        static SEED: Cell<u64> = const { Cell::new(12345) };
    }
    SEED.with(|seed| {
        let mut s = seed.get();
        s ^= s << 13;
        s ^= s >> 7;
        s ^= s << 17;
        seed.set(s);
        (s as f64) / (u64::MAX as f64)
    })
}

/// Failure behaviour of a mock source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockFailure {
    /// Always succeed
    #[default]
    None,
    /// Every n-th read fails with a transient error
    TransientEvery(u64),
    /// After n successful reads, stop producing data (IMU: no record, camera: failed grab)
    StallAfter(u64),
    /// After n successful reads, the device disappears
    LoseAfter(u64),
}

/// Counts opened and released mock handles
#[derive(Debug, Clone, Default)]
pub struct ReleaseTracker {
    opened: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl ReleaseTracker {
    /// Handles opened so far
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Handles released so far
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Handles opened but not yet released
    pub fn outstanding(&self) -> usize {
        self.opened().saturating_sub(self.released())
    }

    fn open(&self) {
        self.opened.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Decides whether read number `n` (1-based, counting successes) fails
#[derive(Debug)]
struct FailureState {
    mode: MockFailure,
    attempts: u64,
    successes: u64,
}

enum ReadOutcome {
    Ok,
    Transient,
    Stalled,
    Lost,
}

impl FailureState {
    fn new(mode: MockFailure) -> Self {
        Self {
            mode,
            attempts: 0,
            successes: 0,
        }
    }

    fn next(&mut self) -> ReadOutcome {
        self.attempts += 1;
        let outcome = match self.mode {
            MockFailure::None => ReadOutcome::Ok,
            MockFailure::TransientEvery(n) if n > 0 && self.attempts % n == 0 => {
                ReadOutcome::Transient
            }
            MockFailure::TransientEvery(_) => ReadOutcome::Ok,
            MockFailure::StallAfter(n) if self.successes >= n => ReadOutcome::Stalled,
            MockFailure::LoseAfter(n) if self.successes >= n => ReadOutcome::Lost,
            MockFailure::StallAfter(_) | MockFailure::LoseAfter(_) => ReadOutcome::Ok,
        };
        if matches!(outcome, ReadOutcome::Ok) {
            self.successes += 1;
        }
        outcome
    }
}

/// Simulated inertial sensor
pub struct MockImu {
    field_count: usize,
    pattern: MockDataPattern,
    read_delay: Duration,
    failure: FailureState,
    start_time: Instant,
    released: bool,
    tracker: ReleaseTracker,
    stats: DeviceStats,
}

impl MockImu {
    /// Create a mock IMU with `field_count` fields
    pub fn new(field_count: usize) -> Self {
        let tracker = ReleaseTracker::default();
        tracker.open();
        Self::with_tracker(field_count, tracker)
    }

    fn with_tracker(field_count: usize, tracker: ReleaseTracker) -> Self {
        Self {
            field_count,
            pattern: MockDataPattern::default(),
            read_delay: Duration::ZERO,
            failure: FailureState::new(MockFailure::None),
            start_time: Instant::now(),
            released: false,
            tracker,
            stats: DeviceStats::default(),
        }
    }

    /// Set the data pattern
    pub fn with_pattern(mut self, pattern: MockDataPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Set the simulated read delay
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Set the failure behaviour
    pub fn with_failure(mut self, failure: MockFailure) -> Self {
        self.failure = FailureState::new(failure);
        self
    }
}

impl ImuSource for MockImu {
    fn read_record(&mut self) -> Result<Option<Vec<f64>>> {
        if self.released {
            return Err(SyncRecError::DeviceLost {
                stream: StreamKind::Imu,
                reason: "mock IMU released".to_string(),
            });
        }

        let started = Instant::now();
        if !self.read_delay.is_zero() {
            std::thread::sleep(self.read_delay);
        }

        match self.failure.next() {
            ReadOutcome::Ok => {
                let t = self.start_time.elapsed().as_secs_f64();
                let values = (0..self.field_count)
                    .map(|i| self.pattern.value_at(t + i as f64 * 0.1))
                    .collect();
                self.stats.record_success(started.elapsed());
                Ok(Some(values))
            }
            ReadOutcome::Transient => {
                self.stats.record_failure();
                Err(SyncRecError::TransientRead {
                    stream: StreamKind::Imu,
                    reason: "mock checksum mismatch".to_string(),
                })
            }
            ReadOutcome::Stalled => Ok(None),
            ReadOutcome::Lost => Err(SyncRecError::DeviceLost {
                stream: StreamKind::Imu,
                reason: "mock serial line dropped".to_string(),
            }),
        }
    }

    fn field_count(&self) -> usize {
        self.field_count
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.tracker.release();
            tracing::info!("Mock IMU released");
        }
    }

    fn stats(&self) -> &DeviceStats {
        &self.stats
    }
}

impl Drop for MockImu {
    fn drop(&mut self) {
        self.release();
    }
}

/// Simulated camera
pub struct MockCamera {
    geometry: FrameGeometry,
    grab_delay: Duration,
    failure: FailureState,
    frame_counter: u64,
    released: bool,
    tracker: ReleaseTracker,
    stats: DeviceStats,
}

impl MockCamera {
    /// Create a mock camera producing frames of `geometry`
    pub fn new(geometry: FrameGeometry) -> Self {
        let tracker = ReleaseTracker::default();
        tracker.open();
        Self::with_tracker(geometry, tracker)
    }

    fn with_tracker(geometry: FrameGeometry, tracker: ReleaseTracker) -> Self {
        Self {
            geometry,
            grab_delay: Duration::ZERO,
            failure: FailureState::new(MockFailure::None),
            frame_counter: 0,
            released: false,
            tracker,
            stats: DeviceStats::default(),
        }
    }

    /// Set the simulated grab delay
    pub fn with_grab_delay(mut self, delay: Duration) -> Self {
        self.grab_delay = delay;
        self
    }

    /// Set the failure behaviour
    pub fn with_failure(mut self, failure: MockFailure) -> Self {
        self.failure = FailureState::new(failure);
        self
    }
}

impl FrameSource for MockCamera {
    fn grab(&mut self) -> Result<Vec<u8>> {
        if self.released {
            return Err(SyncRecError::DeviceLost {
                stream: StreamKind::Camera,
                reason: "mock camera released".to_string(),
            });
        }

        let started = Instant::now();
        if !self.grab_delay.is_zero() {
            std::thread::sleep(self.grab_delay);
        }

        match self.failure.next() {
            ReadOutcome::Ok => {
                self.frame_counter += 1;
                let fill = (self.frame_counter % 256) as u8;
                self.stats.record_success(started.elapsed());
                Ok(vec![fill; self.geometry.byte_len()])
            }
            ReadOutcome::Transient | ReadOutcome::Stalled => {
                self.stats.record_failure();
                Err(SyncRecError::TransientRead {
                    stream: StreamKind::Camera,
                    reason: "failed to read frame".to_string(),
                })
            }
            ReadOutcome::Lost => Err(SyncRecError::DeviceLost {
                stream: StreamKind::Camera,
                reason: "mock camera unplugged".to_string(),
            }),
        }
    }

    fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.tracker.release();
            tracing::info!("Mock camera released");
        }
    }

    fn stats(&self) -> &DeviceStats {
        &self.stats
    }
}

impl Drop for MockCamera {
    fn drop(&mut self) {
        self.release();
    }
}

/// Device provider handing out mock sources
#[derive(Debug, Clone, Default)]
pub struct MockDeviceProvider {
    imu_pattern: MockDataPattern,
    imu_delay: Duration,
    imu_failure: MockFailure,
    camera_delay: Duration,
    camera_failure: MockFailure,
    imu_unavailable: bool,
    camera_unavailable: bool,
    tracker: ReleaseTracker,
}

impl MockDeviceProvider {
    /// Create a provider whose devices always work
    pub fn new() -> Self {
        Self::default()
    }

    /// Pattern for IMU fields
    pub fn with_imu_pattern(mut self, pattern: MockDataPattern) -> Self {
        self.imu_pattern = pattern;
        self
    }

    /// Simulated IMU read delay
    pub fn with_imu_delay(mut self, delay: Duration) -> Self {
        self.imu_delay = delay;
        self
    }

    /// IMU failure behaviour
    pub fn with_imu_failure(mut self, failure: MockFailure) -> Self {
        self.imu_failure = failure;
        self
    }

    /// Simulated camera grab delay
    pub fn with_camera_delay(mut self, delay: Duration) -> Self {
        self.camera_delay = delay;
        self
    }

    /// Camera failure behaviour
    pub fn with_camera_failure(mut self, failure: MockFailure) -> Self {
        self.camera_failure = failure;
        self
    }

    /// Make opening the IMU fail
    pub fn with_imu_unavailable(mut self) -> Self {
        self.imu_unavailable = true;
        self
    }

    /// Make opening the camera fail
    pub fn with_camera_unavailable(mut self) -> Self {
        self.camera_unavailable = true;
        self
    }

    /// Shared open/release counters of every handle this provider creates
    pub fn tracker(&self) -> ReleaseTracker {
        self.tracker.clone()
    }
}

impl DeviceProvider for MockDeviceProvider {
    fn open_imu(&self, config: &DeviceConfig) -> Result<Box<dyn ImuSource>> {
        if self.imu_unavailable {
            return Err(SyncRecError::DeviceUnavailable {
                stream: StreamKind::Imu,
                reason: format!("could not open {}", config.serial_port),
            });
        }
        self.tracker.open();
        tracing::info!(
            "Mock IMU opened on {} @ {} baud",
            config.serial_port,
            config.baud_rate
        );
        Ok(Box::new(
            MockImu::with_tracker(config.imu_fields, self.tracker.clone())
                .with_pattern(self.imu_pattern)
                .with_read_delay(self.imu_delay)
                .with_failure(self.imu_failure),
        ))
    }

    fn open_camera(&self, config: &DeviceConfig) -> Result<Box<dyn FrameSource>> {
        if self.camera_unavailable {
            return Err(SyncRecError::DeviceUnavailable {
                stream: StreamKind::Camera,
                reason: format!("could not open camera {}", config.camera_index),
            });
        }
        self.tracker.open();
        tracing::info!(
            "Mock camera {} opened at {}",
            config.camera_index,
            config.frame_geometry()
        );
        Ok(Box::new(
            MockCamera::with_tracker(config.frame_geometry(), self.tracker.clone())
                .with_grab_delay(self.camera_delay)
                .with_failure(self.camera_failure),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns() {
        assert_eq!(MockDataPattern::Constant(4.2).value_at(10.0), 4.2);

        let square = MockDataPattern::Square {
            period: 1.0,
            amplitude: 2.0,
        };
        assert_eq!(square.value_at(0.25), 2.0);
        assert_eq!(square.value_at(0.75), -2.0);

        let random = MockDataPattern::Random { min: 1.0, max: 2.0 };
        for _ in 0..100 {
            let v = random.value_at(0.0);
            assert!((1.0..=2.0).contains(&v));
        }
    }

    #[test]
    fn test_imu_field_count() {
        let mut imu = MockImu::new(9);
        let record = imu.read_record().unwrap().unwrap();
        assert_eq!(record.len(), 9);
        assert_eq!(imu.stats().successful_reads, 1);
    }

    #[test]
    fn test_transient_every() {
        let mut imu = MockImu::new(3).with_failure(MockFailure::TransientEvery(3));
        assert!(imu.read_record().is_ok());
        assert!(imu.read_record().is_ok());
        assert!(imu.read_record().unwrap_err().is_recoverable());
        assert!(imu.read_record().is_ok());
    }

    #[test]
    fn test_stall_and_loss() {
        let mut imu = MockImu::new(3).with_failure(MockFailure::StallAfter(2));
        assert!(imu.read_record().unwrap().is_some());
        assert!(imu.read_record().unwrap().is_some());
        assert_eq!(imu.read_record().unwrap(), None);

        let mut camera =
            MockCamera::new(FrameGeometry::new(2, 2, 3)).with_failure(MockFailure::LoseAfter(1));
        assert_eq!(camera.grab().unwrap().len(), 12);
        assert!(matches!(
            camera.grab(),
            Err(SyncRecError::DeviceLost { .. })
        ));
    }

    #[test]
    fn test_camera_frames_encode_counter() {
        let mut camera = MockCamera::new(FrameGeometry::new(1, 1, 3));
        assert_eq!(camera.grab().unwrap(), vec![1, 1, 1]);
        assert_eq!(camera.grab().unwrap(), vec![2, 2, 2]);
    }

    #[test]
    fn test_provider_tracks_release() {
        let provider = MockDeviceProvider::new();
        let tracker = provider.tracker();
        let config = DeviceConfig::default();

        let mut imu = provider.open_imu(&config).unwrap();
        let camera = provider.open_camera(&config).unwrap();
        assert_eq!(tracker.outstanding(), 2);

        imu.release();
        imu.release();
        assert_eq!(tracker.outstanding(), 1);

        drop(camera);
        drop(imu);
        assert_eq!(tracker.outstanding(), 0);
        assert_eq!(tracker.released(), 2);
    }

    #[test]
    fn test_provider_open_failures() {
        let config = DeviceConfig::default();
        let provider = MockDeviceProvider::new().with_camera_unavailable();
        assert!(provider.open_imu(&config).is_ok());
        assert!(matches!(
            provider.open_camera(&config),
            Err(SyncRecError::DeviceUnavailable {
                stream: StreamKind::Camera,
                ..
            })
        ));
    }
}
