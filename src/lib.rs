//! # SyncRec-RS: Synchronized IMU + Camera Recorder
//!
//! Records a high-frequency inertial stream and a lower-frequency camera
//! stream side by side without either blocking the other, and plays the
//! result back at its original speed regardless of display refresh rate.
//!
//! ## Architecture
//!
//! - **Backend**: Device traits and the deadline-scheduled [`TimedProducer`]
//! - **Session**: [`AcquisitionSession`] (two producers, one collector) and
//!   [`PlaybackClock`] (hold-last-frame real-time replay)
//! - **Communication**: Crossbeam channels from producers to the collector
//!
//! ## Configuration
//!
//! Configuration and recordings are stored in the platform-appropriate data
//! directory under `dev.hxyulin.syncrec-rs`:
//!
//! - **Linux**: `~/.local/share/dev.hxyulin.syncrec-rs/`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.syncrec-rs/`
//! - **Windows**: `%APPDATA%\dev.hxyulin.syncrec-rs\`
//!
//! ## Example
//!
//! ```ignore
//! use std::time::Duration;
//! use syncrec_rs::{AcquisitionSession, AppConfig, MockDeviceProvider};
//!
//! let config = AppConfig::default();
//! let session = AcquisitionSession::new(Box::new(MockDeviceProvider::new()));
//! session.start(Duration::from_secs(2), &config.acquisition)?;
//! session.wait_for_completion()?;
//!
//! let recording = session.take_recording().expect("recording after stop");
//! println!("{} samples, {} frames", recording.imu.len(), recording.video.len());
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod session;
pub mod types;

// Re-export commonly used types
pub use backend::{DeviceProvider, MockDeviceProvider, ProducerReport, Tick, TimedProducer};
pub use config::AppConfig;
pub use error::{Result, SyncRecError};
pub use session::{
    AcquisitionSession, PlaybackClock, PlaybackRenderer, PlaybackState, Recording, SessionState,
};
pub use types::{Frame, FrameGeometry, Sample, StreamKind};
