//! Backend module: device seams and the fixed-rate producer
//!
//! Everything in here runs on producer threads. The acquisition session
//! moves one device into each producer thread, so devices never need to be
//! shared between threads.
//!
//! # Components
//!
//! - [`TimedProducer`] - Deadline-scheduled sampling loop
//! - [`ImuSource`] / [`FrameSource`] / [`DeviceProvider`] - Hardware collaborators
//! - [`LineRecordSource`] - [`ImuSource`] over any line-oriented reader
//! - [`MockDeviceProvider`] - Simulated devices for demos and tests
//!
//! # Example
//!
//! ```ignore
//! use syncrec_rs::backend::{Tick, TimedProducer};
//! use syncrec_rs::types::StreamKind;
//!
//! let producer = TimedProducer::from_frequency(StreamKind::Imu, 200.0);
//! let deadline = std::time::Instant::now() + std::time::Duration::from_secs(1);
//! let report = producer.run(|_| Ok(Tick::Sampled), || std::time::Instant::now() < deadline);
//! ```

pub mod device;
pub mod line_source;
pub mod mock_device;
pub mod producer;

pub use device::{DeviceProvider, DeviceStats, FrameSource, ImuSource};
pub use line_source::{parse_record, LineRecordSource};
pub use mock_device::{
    MockCamera, MockDataPattern, MockDeviceProvider, MockFailure, MockImu, ReleaseTracker,
};
pub use producer::{ProducerFailure, ProducerReport, Tick, TimedProducer};
