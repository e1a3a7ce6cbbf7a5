//! Core data types for syncrec-rs
//!
//! This module contains the fundamental data structures shared by the
//! producers, the acquisition session and the playback clock.
//!
//! # Main Types
//!
//! - [`StreamKind`] - Identifies one of the two recorded streams
//! - [`Sample`] - One inertial record (timestamp + fixed-size value vector)
//! - [`Frame`] - One camera image (timestamp + fixed-size pixel buffer)
//! - [`Timestamped`] - Common access to the media time of a stream entry
//!
//! All timestamps are monotonic offsets from the start of the recording
//! session, so samples and frames of the same session share one timeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Field labels of the reference 9-axis IMU record
pub const IMU_FIELD_LABELS: [&str; 9] = ["ax", "ay", "az", "gx", "gy", "gz", "mx", "my", "mz"];

/// Identifies one of the two recorded streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// High-frequency inertial stream
    Imu,
    /// Lower-frequency camera stream
    Camera,
}

impl StreamKind {
    /// Both streams, in the order they are initialized
    pub const ALL: [StreamKind; 2] = [StreamKind::Imu, StreamKind::Camera];

    /// Short name used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            StreamKind::Imu => "imu",
            StreamKind::Camera => "camera",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Anything that sits on the recorded timeline
pub trait Timestamped {
    /// Media time of this entry (offset from session start)
    fn timestamp(&self) -> Duration;
}

/// A single inertial record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Time offset from start of recording
    pub timestamp: Duration,
    /// Field values, one per configured field
    pub values: Vec<f64>,
}

impl Sample {
    /// Create a new sample
    pub fn new(timestamp: Duration, values: Vec<f64>) -> Self {
        Self { timestamp, values }
    }
}

impl Timestamped for Sample {
    fn timestamp(&self) -> Duration {
        self.timestamp
    }
}

/// Fixed dimensions of every frame in a camera stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    /// Bytes per pixel (3 for BGR8)
    pub channels: u8,
}

impl FrameGeometry {
    /// Create a new geometry
    pub const fn new(width: u32, height: u32, channels: u8) -> Self {
        Self {
            width,
            height,
            channels,
        }
    }

    /// Number of bytes in one frame with this geometry
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }
}

impl Default for FrameGeometry {
    fn default() -> Self {
        Self::new(640, 480, 3)
    }
}

impl fmt::Display for FrameGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.channels)
    }
}

/// A single camera image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Time offset from start of recording
    pub timestamp: Duration,
    /// Dimensions of `data`
    pub geometry: FrameGeometry,
    /// Interleaved BGR8 pixels, row-major
    pub data: Vec<u8>,
}

impl Frame {
    /// Create a new frame
    pub fn new(timestamp: Duration, geometry: FrameGeometry, data: Vec<u8>) -> Self {
        Self {
            timestamp,
            geometry,
            data,
        }
    }

    /// Check that the pixel buffer matches the declared geometry
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == self.geometry.byte_len()
    }
}

impl Timestamped for Frame {
    fn timestamp(&self) -> Duration {
        self.timestamp
    }
}
