//! Fixed-rate producer loop
//!
//! [`TimedProducer`] drives a sampling function at a target interval on the
//! calling thread. It is the pacing primitive behind both acquisition
//! streams.
//!
//! # Deadline Scheduling
//!
//! The loop keeps an absolute deadline and advances it by exactly one interval
//! per iteration (`next_deadline += interval`). Sleeping until that deadline,
//! instead of sleeping `interval` after each sample, means a slow iteration
//! only delays itself: later iterations are still aligned to the original
//! grid, so timing error does not accumulate.
//!
//! When an iteration finishes after its deadline the wait is clamped to zero,
//! the next iteration starts immediately and the `late` counter is bumped.
//!
//! # Errors
//!
//! - Recoverable errors (see [`SyncRecError::is_recoverable`]) are logged,
//!   counted as `skipped`, and the loop moves on to the next deadline.
//! - Any other error ends the loop immediately. The caller receives the error
//!   together with the report accumulated so far.
//! - An optional watchdog turns "no successful sample for too long" into a
//!   fatal [`SyncRecError::StaleData`].
//!
//! # Cancellation
//!
//! `should_continue` is checked once at the top of every iteration. A running
//! iteration is never interrupted.

use std::time::{Duration, Instant};

use crate::error::SyncRecError;
use crate::types::StreamKind;

/// Outcome of a single successful sampling call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// A sample was produced and handed off
    Sampled,
    /// Nothing was available this period (not an error)
    Idle,
}

/// Counters returned when a producer loop exits
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProducerReport {
    /// Successful samples
    pub samples: u64,
    /// Recoverable errors that were skipped
    pub skipped: u64,
    /// Periods where the source had nothing to offer
    pub idle: u64,
    /// Iterations that finished after their deadline
    pub late: u64,
    /// Total loop iterations
    pub iterations: u64,
    /// Wall time spent in the loop
    pub elapsed: Duration,
}

impl ProducerReport {
    /// Successful samples per second of wall time
    pub fn achieved_rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            0.0
        } else {
            self.samples as f64 / secs
        }
    }

    /// Index of the last successful sample, if any
    pub fn last_good_index(&self) -> Option<usize> {
        (self.samples as usize).checked_sub(1)
    }
}

/// A fatal error together with the work done before it
#[derive(Debug)]
pub struct ProducerFailure {
    pub error: SyncRecError,
    pub report: ProducerReport,
}

/// Drives a sampling function at a fixed interval without cumulative drift
#[derive(Debug, Clone)]
pub struct TimedProducer {
    stream: StreamKind,
    interval: Duration,
    stale_timeout: Option<Duration>,
}

impl TimedProducer {
    /// Create a producer with an explicit interval
    pub fn new(stream: StreamKind, interval: Duration) -> Self {
        Self {
            stream,
            interval,
            stale_timeout: None,
        }
    }

    /// Create a producer from a target frequency in Hz
    ///
    /// Non-positive frequencies are clamped to 1 Hz.
    pub fn from_frequency(stream: StreamKind, frequency_hz: f64) -> Self {
        let hz = if frequency_hz > 0.0 { frequency_hz } else { 1.0 };
        Self::new(stream, Duration::from_secs_f64(1.0 / hz))
    }

    /// Abort with [`SyncRecError::StaleData`] when no sample succeeds for `timeout`
    pub fn with_stale_timeout(mut self, timeout: Duration) -> Self {
        self.stale_timeout = Some(timeout);
        self
    }

    /// The sampling interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// The stream this producer paces
    pub fn stream(&self) -> StreamKind {
        self.stream
    }

    /// Run the loop until `should_continue` returns false or a fatal error occurs
    ///
    /// `sample_fn` receives the instant the iteration started.
    pub fn run<F, C>(
        &self,
        mut sample_fn: F,
        mut should_continue: C,
    ) -> std::result::Result<ProducerReport, ProducerFailure>
    where
        F: FnMut(Instant) -> crate::error::Result<Tick>,
        C: FnMut() -> bool,
    {
        let started = Instant::now();
        let mut report = ProducerReport::default();
        let mut next_deadline = started;
        let mut last_success = started;

        tracing::debug!(
            "{} producer started (interval {:?})",
            self.stream,
            self.interval
        );

        while should_continue() {
            let invoked_at = Instant::now();
            report.iterations += 1;

            match sample_fn(invoked_at) {
                Ok(Tick::Sampled) => {
                    report.samples += 1;
                    last_success = Instant::now();
                }
                Ok(Tick::Idle) => report.idle += 1,
                Err(e) if e.is_recoverable() => {
                    report.skipped += 1;
                    tracing::debug!("{} sample skipped: {}", self.stream, e);
                }
                Err(error) => {
                    report.elapsed = started.elapsed();
                    tracing::error!("{} producer aborted: {}", self.stream, error);
                    return Err(ProducerFailure { error, report });
                }
            }

            if let Some(timeout) = self.stale_timeout {
                if last_success.elapsed() > timeout {
                    report.elapsed = started.elapsed();
                    let error = SyncRecError::StaleData {
                        stream: self.stream,
                        timeout,
                    };
                    tracing::error!("{} producer aborted: {}", self.stream, error);
                    return Err(ProducerFailure { error, report });
                }
            }

            next_deadline += self.interval;
            let now = Instant::now();
            if next_deadline > now {
                std::thread::sleep(next_deadline - now);
            } else {
                report.late += 1;
            }
        }

        report.elapsed = started.elapsed();
        tracing::debug!(
            "{} producer finished: {} samples, {} skipped, {} late, {:.1} Hz",
            self.stream,
            report.samples,
            report.skipped,
            report.late,
            report.achieved_rate()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_for(producer: &TimedProducer, window: Duration) -> (ProducerReport, Vec<Instant>) {
        let mut invocations = Vec::new();
        let deadline = Instant::now() + window;
        let report = producer
            .run(
                |at| {
                    invocations.push(at);
                    Ok(Tick::Sampled)
                },
                || Instant::now() < deadline,
            )
            .expect("producer should not fail");
        (report, invocations)
    }

    #[test]
    fn test_from_frequency() {
        let producer = TimedProducer::from_frequency(StreamKind::Imu, 200.0);
        assert_eq!(producer.interval(), Duration::from_millis(5));

        let clamped = TimedProducer::from_frequency(StreamKind::Imu, 0.0);
        assert_eq!(clamped.interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_sample_count_within_tolerance() {
        let producer = TimedProducer::from_frequency(StreamKind::Imu, 100.0);
        let (report, invocations) = run_for(&producer, Duration::from_millis(500));

        // floor(100 Hz * 0.5 s) = 50; allow scheduler jitter on loaded CI hosts
        assert!(
            (40..=52).contains(&report.samples),
            "got {} samples",
            report.samples
        );
        assert_eq!(report.samples as usize, invocations.len());
        assert!(invocations.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_no_cumulative_drift_after_slow_iteration() {
        let producer = TimedProducer::new(StreamKind::Camera, Duration::from_millis(10));
        let mut calls = 0u32;
        let deadline = Instant::now() + Duration::from_millis(300);
        let report = producer
            .run(
                |_| {
                    calls += 1;
                    if calls == 3 {
                        // One iteration overruns by several intervals
                        std::thread::sleep(Duration::from_millis(45));
                    }
                    Ok(Tick::Sampled)
                },
                || Instant::now() < deadline,
            )
            .unwrap();

        // A relative-sleep loop would lose ~4 samples; deadline accumulation catches up
        assert!(report.samples >= 25, "got {} samples", report.samples);
        assert!(report.late >= 1);
    }

    #[test]
    fn test_recoverable_errors_are_skipped() {
        let producer = TimedProducer::new(StreamKind::Imu, Duration::from_millis(1));
        let calls = std::cell::Cell::new(0u32);
        let report = producer
            .run(
                |_| {
                    calls.set(calls.get() + 1);
                    if calls.get() % 2 == 0 {
                        Err(SyncRecError::TransientRead {
                            stream: StreamKind::Imu,
                            reason: "malformed".to_string(),
                        })
                    } else {
                        Ok(Tick::Sampled)
                    }
                },
                || calls.get() < 10,
            )
            .unwrap();

        assert_eq!(report.iterations, 10);
        assert_eq!(report.samples, 5);
        assert_eq!(report.skipped, 5);
    }

    #[test]
    fn test_fatal_error_stops_immediately() {
        let producer = TimedProducer::new(StreamKind::Imu, Duration::from_millis(1));
        let mut calls = 0u32;
        let failure = producer
            .run(
                |_| {
                    calls += 1;
                    if calls == 4 {
                        Err(SyncRecError::DeviceLost {
                            stream: StreamKind::Imu,
                            reason: "unplugged".to_string(),
                        })
                    } else {
                        Ok(Tick::Sampled)
                    }
                },
                || true,
            )
            .unwrap_err();

        assert_eq!(calls, 4);
        assert_eq!(failure.report.samples, 3);
        assert_eq!(failure.report.last_good_index(), Some(2));
        assert!(matches!(failure.error, SyncRecError::DeviceLost { .. }));
    }

    #[test]
    fn test_stale_timeout() {
        let producer = TimedProducer::new(StreamKind::Camera, Duration::from_millis(5))
            .with_stale_timeout(Duration::from_millis(50));
        let failure = producer.run(|_| Ok(Tick::Idle), || true).unwrap_err();

        assert!(matches!(failure.error, SyncRecError::StaleData { .. }));
        assert_eq!(failure.report.samples, 0);
        assert_eq!(failure.report.last_good_index(), None);
        assert!(failure.report.elapsed >= Duration::from_millis(50));
    }

    #[test]
    fn test_should_continue_checked_before_first_iteration() {
        let producer = TimedProducer::new(StreamKind::Imu, Duration::from_millis(5));
        let report = producer
            .run(
                |_| -> crate::error::Result<Tick> { unreachable!("must not sample") },
                || false,
            )
            .unwrap();
        assert_eq!(report.iterations, 0);
        assert_eq!(report.achieved_rate(), 0.0);
    }
}
