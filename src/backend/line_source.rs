//! Line-oriented IMU record parsing
//!
//! The inertial sensor streams one comma-separated record per line, e.g.
//! `0.01,-0.02,9.81,0.001,0.0,-0.003,21.5,-4.2,40.1`. Lines with the wrong
//! field count or unparsable numbers are dropped as transient errors; blank
//! lines mean nothing arrived yet.

use std::io::{BufRead, ErrorKind};
use std::time::Instant;

use super::device::{DeviceStats, ImuSource};
use crate::error::{Result, SyncRecError};
use crate::types::StreamKind;

/// Parse one record line into exactly `field_count` values
///
/// Returns `Ok(None)` for a blank line.
pub fn parse_record(line: &str, field_count: usize) -> Result<Option<Vec<f64>>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let values = line
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| SyncRecError::TransientRead {
            stream: StreamKind::Imu,
            reason: format!("unparsable field in {:?}: {}", line, e),
        })?;

    if values.len() != field_count {
        return Err(SyncRecError::TransientRead {
            stream: StreamKind::Imu,
            reason: format!("expected {} fields, got {}", field_count, values.len()),
        });
    }

    Ok(Some(values))
}

/// [`ImuSource`] over any buffered reader (serial port, pipe, file)
///
/// Read timeouts of the underlying reader are treated as "no record yet";
/// end of input means the device is gone.
pub struct LineRecordSource<R: BufRead + Send> {
    reader: Option<R>,
    field_count: usize,
    line: String,
    stats: DeviceStats,
}

impl<R: BufRead + Send> LineRecordSource<R> {
    /// Wrap a reader producing records with `field_count` fields
    pub fn new(reader: R, field_count: usize) -> Self {
        Self {
            reader: Some(reader),
            field_count,
            line: String::new(),
            stats: DeviceStats::default(),
        }
    }
}

impl<R: BufRead + Send> ImuSource for LineRecordSource<R> {
    fn read_record(&mut self) -> Result<Option<Vec<f64>>> {
        let Some(reader) = self.reader.as_mut() else {
            return Err(SyncRecError::DeviceLost {
                stream: StreamKind::Imu,
                reason: "source released".to_string(),
            });
        };

        let started = Instant::now();
        self.line.clear();
        match reader.read_line(&mut self.line) {
            Ok(0) => Err(SyncRecError::DeviceLost {
                stream: StreamKind::Imu,
                reason: "end of input".to_string(),
            }),
            Ok(_) => match parse_record(&self.line, self.field_count) {
                Ok(record) => {
                    if record.is_some() {
                        self.stats.record_success(started.elapsed());
                    }
                    Ok(record)
                }
                Err(e) => {
                    self.stats.record_failure();
                    Err(e)
                }
            },
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(None),
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                self.stats.record_failure();
                Err(SyncRecError::TransientRead {
                    stream: StreamKind::Imu,
                    reason: format!("invalid bytes on line: {}", e),
                })
            }
            Err(e) => Err(SyncRecError::DeviceLost {
                stream: StreamKind::Imu,
                reason: e.to_string(),
            }),
        }
    }

    fn field_count(&self) -> usize {
        self.field_count
    }

    fn release(&mut self) {
        if self.reader.take().is_some() {
            tracing::info!("IMU line source released");
        }
    }

    fn stats(&self) -> &DeviceStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_valid_record() {
        let values = parse_record("1,2,3.5\r\n", 3).unwrap().unwrap();
        assert_eq!(values, vec![1.0, 2.0, 3.5]);
    }

    #[test]
    fn test_parse_blank_line() {
        assert_eq!(parse_record("  \n", 9).unwrap(), None);
    }

    #[test]
    fn test_parse_wrong_field_count_is_transient() {
        let err = parse_record("1,2", 3).unwrap_err();
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("expected 3 fields"));
    }

    #[test]
    fn test_parse_garbage_is_transient() {
        let err = parse_record("1,abc,3", 3).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_line_source_sequence() {
        let input = "1,2,3\n\nbad\n4,5,6\n";
        let mut source = LineRecordSource::new(Cursor::new(input), 3);

        assert_eq!(source.read_record().unwrap(), Some(vec![1.0, 2.0, 3.0]));
        assert_eq!(source.read_record().unwrap(), None);
        assert!(source.read_record().unwrap_err().is_recoverable());
        assert_eq!(source.read_record().unwrap(), Some(vec![4.0, 5.0, 6.0]));

        let eof = source.read_record().unwrap_err();
        assert!(matches!(eof, SyncRecError::DeviceLost { .. }));

        assert_eq!(source.stats().successful_reads, 2);
        assert_eq!(source.stats().failed_reads, 1);
    }

    #[test]
    fn test_released_source_fails() {
        let mut source = LineRecordSource::new(Cursor::new("1\n"), 1);
        source.release();
        assert!(matches!(
            source.read_record(),
            Err(SyncRecError::DeviceLost { .. })
        ));
    }
}
