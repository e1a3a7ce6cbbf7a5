//! Session data types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::stream::Stream;
use crate::error::{Result, ResultExt, StreamFailure, SyncRecError};
use crate::types::{Frame, FrameGeometry, Sample, StreamKind};

/// State of an acquisition session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No active session
    #[default]
    Idle,
    /// Opening devices
    Initializing,
    /// Producers are running
    Recording,
    /// Waiting for producers to finish
    Stopping,
}

impl SessionState {
    /// Check if currently recording
    pub fn is_recording(&self) -> bool {
        matches!(self, SessionState::Recording)
    }

    /// Check if a session is in flight (anything but idle)
    pub fn is_busy(&self) -> bool {
        !matches!(self, SessionState::Idle)
    }

    /// Display name for the state
    pub fn display_name(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Initializing => "Initializing",
            SessionState::Recording => "Recording",
            SessionState::Stopping => "Stopping",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Consistent snapshot of a running session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Time since recording started
    pub elapsed: Duration,
    /// Time left until the duration bound
    pub remaining: Duration,
    /// Samples stored so far
    pub imu_samples: usize,
    /// Frames stored so far
    pub frames: usize,
}

/// How one stream performed against its target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSummary {
    pub kind: StreamKind,
    /// Requested rate in Hz
    pub target_frequency: f64,
    /// Entries actually stored
    pub count: usize,
    /// `floor(target_frequency * duration)`
    pub expected_count: usize,
    /// Entries per second over the recorded duration
    pub achieved_frequency: f64,
    /// Recoverable errors skipped by the producer
    pub skipped: u64,
    /// Iterations that overran their deadline
    pub late: u64,
    /// Whether `count` is within the configured tolerance of `expected_count`
    pub within_tolerance: bool,
}

impl StreamSummary {
    /// Summarize a stream recorded for `duration`
    pub fn new(
        kind: StreamKind,
        target_frequency: f64,
        count: usize,
        duration: Duration,
        tolerance: f64,
    ) -> Self {
        let expected_count = (target_frequency * duration.as_secs_f64()).floor() as usize;
        let secs = duration.as_secs_f64();
        let achieved_frequency = if secs > 0.0 { count as f64 / secs } else { 0.0 };
        Self {
            kind,
            target_frequency,
            count,
            expected_count,
            achieved_frequency,
            skipped: 0,
            late: 0,
            within_tolerance: within_tolerance(count, expected_count, tolerance),
        }
    }

    /// Attach producer counters
    pub fn with_counters(mut self, skipped: u64, late: u64) -> Self {
        self.skipped = skipped;
        self.late = late;
        self
    }
}

/// Whether `count` deviates from `expected` by no more than `tolerance` (relative)
///
/// One sample of slack is always allowed so very short recordings are not
/// judged by rounding.
pub fn within_tolerance(count: usize, expected: usize, tolerance: f64) -> bool {
    let allowed = (expected as f64 * tolerance).max(1.0);
    (count as f64 - expected as f64).abs() <= allowed
}

/// Metadata for a finished recording
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingMetadata {
    /// Task name the recording was made for
    pub name: String,
    /// When the recording started
    pub recorded_at: chrono::DateTime<chrono::Utc>,
    /// Length of the recording window
    pub duration: Duration,
    /// Inertial stream summary
    pub imu: StreamSummary,
    /// Camera stream summary
    pub camera: StreamSummary,
    /// Number of values per IMU sample
    pub imu_fields: usize,
    /// Label of each IMU field
    pub field_labels: Vec<String>,
    /// Frame dimensions
    pub frame_geometry: FrameGeometry,
    /// Streams that stopped early
    #[serde(default)]
    pub failures: Vec<StreamFailure>,
}

impl RecordingMetadata {
    /// Number of IMU samples
    pub fn sample_count(&self) -> usize {
        self.imu.count
    }

    /// Number of camera frames
    pub fn frame_count(&self) -> usize {
        self.camera.count
    }
}

/// A complete recording, handed from the session to persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    pub metadata: RecordingMetadata,
    pub imu: Stream<Sample>,
    pub video: Stream<Frame>,
}

impl Recording {
    /// Check if both streams are empty
    pub fn is_empty(&self) -> bool {
        self.imu.is_empty() && self.video.is_empty()
    }

    /// Timestamps of the video stream (the playback timeline)
    pub fn frame_timestamps(&self) -> Vec<Duration> {
        self.video.timestamps()
    }

    /// IMU sample on screen at `media_time` (hold-last)
    pub fn imu_index_at(&self, media_time: Duration) -> Option<usize> {
        self.imu.index_at(media_time)
    }

    /// Video frame on screen at `media_time` (hold-last)
    pub fn frame_index_at(&self, media_time: Duration) -> Option<usize> {
        self.video.index_at(media_time)
    }

    /// Save recording to a file (JSON format)
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(SyncRecError::from)
                    .with_context(|| format!("Failed to create {:?}", parent))?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .map_err(SyncRecError::from)
            .with_context(|| format!("Failed to write recording {:?}", path))?;
        tracing::info!(
            "Saved recording to {:?} ({} samples, {} frames)",
            path,
            self.imu.len(),
            self.video.len()
        );
        Ok(())
    }

    /// Load recording from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let recording: Recording = serde_json::from_str(&json)?;
        recording.imu.check_ordering()?;
        recording.video.check_ordering()?;
        if let Some(bad) = recording.video.iter().position(|f| !f.is_well_formed()) {
            return Err(SyncRecError::Serialization(format!(
                "frame {} does not match its geometry",
                bad
            )));
        }
        Ok(recording)
    }
}

/// Default file path for a new recording: `<dir>/<task>_<YYYYmmdd_HHMMSS>.json`
pub fn default_recording_path(dir: &Path, task: &str) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("{}_{}.json", task, stamp))
}
