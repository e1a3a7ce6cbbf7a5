//! Test data builders for creating test objects

use std::time::Duration;
use syncrec_rs::config::AcquisitionConfig;
use syncrec_rs::session::{Recording, RecordingMetadata, Stream, StreamSummary};
use syncrec_rs::types::{Frame, FrameGeometry, Sample, StreamKind};

/// Acquisition config with tiny frames and relaxed tolerance for CI hosts
pub fn fast_config() -> AcquisitionConfig {
    let mut config = AcquisitionConfig::default();
    config.devices.frame_width = 16;
    config.devices.frame_height = 12;
    config.jitter_tolerance = 0.25;
    config
}

/// Builder for synthetic recordings
pub struct RecordingBuilder {
    frame_times_ms: Vec<u64>,
    imu_rate_hz: f64,
    geometry: FrameGeometry,
}

impl RecordingBuilder {
    pub fn new() -> Self {
        Self {
            frame_times_ms: vec![0, 33, 66, 100],
            imu_rate_hz: 200.0,
            geometry: FrameGeometry::new(4, 3, 3),
        }
    }

    pub fn frame_times_ms(mut self, times: &[u64]) -> Self {
        self.frame_times_ms = times.to_vec();
        self
    }

    pub fn imu_rate_hz(mut self, hz: f64) -> Self {
        self.imu_rate_hz = hz;
        self
    }

    pub fn build(self) -> Recording {
        let end_ms = self.frame_times_ms.last().copied().unwrap_or(0);
        let duration = Duration::from_millis(end_ms);
        let step = Duration::from_secs_f64(1.0 / self.imu_rate_hz);
        let sample_count = (duration.as_secs_f64() * self.imu_rate_hz).floor() as usize;

        let samples = (0..sample_count)
            .map(|i| Sample::new(step * i as u32, vec![i as f64, 0.0, 9.81]))
            .collect();
        let frames = self
            .frame_times_ms
            .iter()
            .enumerate()
            .map(|(i, &ms)| {
                Frame::new(
                    Duration::from_millis(ms),
                    self.geometry,
                    vec![i as u8; self.geometry.byte_len()],
                )
            })
            .collect::<Vec<_>>();
        let frame_count = frames.len();
        let camera_rate = if end_ms > 0 {
            frame_count as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Recording {
            metadata: RecordingMetadata {
                name: "synthetic".to_string(),
                recorded_at: chrono::Utc::now(),
                duration,
                imu: StreamSummary::new(
                    StreamKind::Imu,
                    self.imu_rate_hz,
                    sample_count,
                    duration,
                    0.1,
                ),
                camera: StreamSummary::new(
                    StreamKind::Camera,
                    camera_rate,
                    frame_count,
                    duration,
                    0.1,
                ),
                imu_fields: 3,
                field_labels: vec!["ax".into(), "ay".into(), "az".into()],
                frame_geometry: self.geometry,
                failures: Vec::new(),
            },
            imu: Stream::from_entries(StreamKind::Imu, self.imu_rate_hz, samples)
                .expect("samples are ordered"),
            video: Stream::from_entries(StreamKind::Camera, camera_rate, frames)
                .expect("frames are ordered"),
        }
    }
}

impl Default for RecordingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_builder() {
        let recording = RecordingBuilder::new()
            .frame_times_ms(&[0, 500, 1000])
            .imu_rate_hz(100.0)
            .build();

        assert_eq!(recording.video.len(), 3);
        assert_eq!(recording.imu.len(), 100);
        assert_eq!(recording.metadata.frame_count(), 3);
    }
}
