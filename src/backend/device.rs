//! Device traits for the two sensor sources
//!
//! This module defines the seams between the acquisition engine and the
//! hardware collaborators. Real drivers (serial line, camera capture) live
//! outside this crate; the engine only needs a record reader, a frame source
//! and a provider that opens both.
//!
//! Implementations must be `Send`: every source is moved into the producer
//! thread that paces it, so a device is only ever touched by one thread.

use crate::config::DeviceConfig;
use crate::error::Result;
use crate::types::FrameGeometry;
use std::collections::VecDeque;
use std::time::Duration;

/// Size of the rolling window for recent read times
const RECENT_WINDOW_SIZE: usize = 100;

/// Statistics for device reads
///
/// Tracks success rates and latency so a recording can report how the
/// hardware behaved, not just how many samples arrived.
#[derive(Debug, Clone)]
pub struct DeviceStats {
    /// Total number of successful reads
    pub successful_reads: u64,
    /// Total number of failed reads
    pub failed_reads: u64,
    /// Total read time in microseconds
    pub total_read_time_us: u64,
    /// Minimum read time observed (microseconds)
    pub min_read_time_us: u64,
    /// Maximum read time observed (microseconds)
    pub max_read_time_us: u64,
    /// Rolling window of recent read times for jitter calculation
    pub recent_read_times: VecDeque<u64>,
}

impl Default for DeviceStats {
    fn default() -> Self {
        Self {
            successful_reads: 0,
            failed_reads: 0,
            total_read_time_us: 0,
            min_read_time_us: u64::MAX,
            max_read_time_us: 0,
            recent_read_times: VecDeque::with_capacity(RECENT_WINDOW_SIZE),
        }
    }
}

impl DeviceStats {
    /// Calculate average read time in microseconds
    pub fn avg_read_time_us(&self) -> f64 {
        if self.successful_reads == 0 {
            0.0
        } else {
            self.total_read_time_us as f64 / self.successful_reads as f64
        }
    }

    /// Calculate success rate as percentage
    pub fn success_rate(&self) -> f64 {
        let total = self.successful_reads + self.failed_reads;
        if total == 0 {
            100.0
        } else {
            (self.successful_reads as f64 / total as f64) * 100.0
        }
    }

    /// Record a successful read with its latency
    pub fn record_success(&mut self, elapsed: Duration) {
        let time_us = elapsed.as_micros() as u64;
        self.successful_reads += 1;
        self.total_read_time_us += time_us;
        self.min_read_time_us = self.min_read_time_us.min(time_us);
        self.max_read_time_us = self.max_read_time_us.max(time_us);

        self.recent_read_times.push_back(time_us);
        if self.recent_read_times.len() > RECENT_WINDOW_SIZE {
            self.recent_read_times.pop_front();
        }
    }

    /// Record a failed read
    pub fn record_failure(&mut self) {
        self.failed_reads += 1;
    }

    /// Calculate jitter (max - min) over recent window in microseconds
    pub fn jitter_us(&self) -> u64 {
        let min = self.recent_read_times.iter().min().copied().unwrap_or(0);
        let max = self.recent_read_times.iter().max().copied().unwrap_or(0);
        max.saturating_sub(min)
    }
}

/// Line-oriented numeric record reader (the inertial sensor)
pub trait ImuSource: Send {
    /// Read the next record
    ///
    /// Returns `Ok(None)` when no complete record is available yet. Malformed
    /// records are reported as [`SyncRecError::TransientRead`]; a vanished
    /// device as [`SyncRecError::DeviceLost`]. A single call must return
    /// within the configured read timeout.
    ///
    /// [`SyncRecError::TransientRead`]: crate::error::SyncRecError::TransientRead
    /// [`SyncRecError::DeviceLost`]: crate::error::SyncRecError::DeviceLost
    fn read_record(&mut self) -> Result<Option<Vec<f64>>>;

    /// Number of fields in every record
    fn field_count(&self) -> usize;

    /// Release the underlying handle; further reads fail
    fn release(&mut self);

    /// Read statistics
    fn stats(&self) -> &DeviceStats;
}

/// Fixed-resolution frame source (the camera)
pub trait FrameSource: Send {
    /// Block until the next frame is available and return its pixels
    ///
    /// A failed grab is reported as [`SyncRecError::TransientRead`].
    ///
    /// [`SyncRecError::TransientRead`]: crate::error::SyncRecError::TransientRead
    fn grab(&mut self) -> Result<Vec<u8>>;

    /// Dimensions of every frame this source produces
    fn geometry(&self) -> FrameGeometry;

    /// Release the underlying handle; further grabs fail
    fn release(&mut self);

    /// Read statistics
    fn stats(&self) -> &DeviceStats;
}

/// Opens the two hardware handles for a session
///
/// Errors from either method should be [`SyncRecError::DeviceUnavailable`].
///
/// [`SyncRecError::DeviceUnavailable`]: crate::error::SyncRecError::DeviceUnavailable
pub trait DeviceProvider: Send + Sync {
    /// Open the inertial sensor
    fn open_imu(&self, config: &DeviceConfig) -> Result<Box<dyn ImuSource>>;

    /// Open the camera
    fn open_camera(&self, config: &DeviceConfig) -> Result<Box<dyn FrameSource>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_latency_tracking() {
        let mut stats = DeviceStats::default();
        stats.record_success(Duration::from_micros(100));
        stats.record_success(Duration::from_micros(300));
        stats.record_failure();

        assert_eq!(stats.successful_reads, 2);
        assert_eq!(stats.min_read_time_us, 100);
        assert_eq!(stats.max_read_time_us, 300);
        assert_eq!(stats.jitter_us(), 200);
        assert_eq!(stats.avg_read_time_us(), 200.0);
        assert!((stats.success_rate() - 66.666).abs() < 0.01);
    }

    #[test]
    fn test_stats_window_is_bounded() {
        let mut stats = DeviceStats::default();
        for i in 0..(RECENT_WINDOW_SIZE as u64 + 20) {
            stats.record_success(Duration::from_micros(i));
        }
        assert_eq!(stats.recent_read_times.len(), RECENT_WINDOW_SIZE);
        assert_eq!(stats.recent_read_times.front().copied(), Some(20));
    }
}
