//! Session recording and playback module
//!
//! This module records the two sensor streams of a session and plays a
//! recorded timeline back at its original speed.
//!
//! # Features
//!
//! - Record IMU samples and camera frames concurrently at independent rates
//! - Chunked, append-only stream storage with ordered timestamps
//! - Save recordings to disk and load them again
//! - Replay with hold-last-frame semantics, pause/resume and seek

pub mod acquisition;
pub mod playback;
pub mod stream;
pub mod types;

pub use acquisition::AcquisitionSession;
pub use playback::{
    hold_last_index, PlaybackAnchor, PlaybackClock, PlaybackRenderer, PlaybackState,
    TickScheduler,
};
pub use stream::{ChunkedBuffer, Stream, DEFAULT_CHUNK_CAPACITY};
pub use types::{
    default_recording_path, within_tolerance, Recording, RecordingMetadata, SessionState,
    SessionStatus, StreamSummary,
};
