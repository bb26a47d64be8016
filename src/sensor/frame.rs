//! Raw sensor frames and line parsing.

use std::io;
use thiserror::Error;

/// Number of distance sensors on the reference rig.
pub const DEFAULT_SENSOR_COUNT: usize = 10;

/// Framing errors raised while turning the byte stream into frames.
#[derive(Error, Debug)]
pub enum FramingError {
    #[error("Sensor stream closed")]
    StreamClosed,
    #[error("Expected {expected} readings, found {found}")]
    WrongTokenCount { expected: usize, found: usize },
    #[error("Invalid reading {token:?} at position {index}")]
    InvalidToken { index: usize, token: String },
    #[error("Line is not valid UTF-8")]
    InvalidEncoding,
    #[error("Sensor stream I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FramingError {
    /// Whether the stream itself is gone, as opposed to a single bad line.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StreamClosed | Self::Io(_))
    }
}

/// One synchronized batch of distance readings, in physical sensor order.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    readings: Vec<f64>,
}

impl RawFrame {
    /// Build a frame, checking it holds exactly `sensor_count` finite readings.
    pub fn new(readings: Vec<f64>, sensor_count: usize) -> Result<Self, FramingError> {
        if readings.len() != sensor_count {
            return Err(FramingError::WrongTokenCount {
                expected: sensor_count,
                found: readings.len(),
            });
        }
        if let Some(index) = readings.iter().position(|v| !v.is_finite()) {
            return Err(FramingError::InvalidToken {
                index,
                token: readings[index].to_string(),
            });
        }
        Ok(Self { readings })
    }

    /// Parse a comma-separated line such as `"12.0,40,63.5,..."`.
    ///
    /// Surrounding whitespace (including the line terminator) is ignored.
    /// Tokens must parse as finite floats; `nan` and `inf` are rejected.
    pub fn parse_line(line: &str, sensor_count: usize) -> Result<Self, FramingError> {
        let line = line.trim();
        let tokens: Vec<&str> = if line.is_empty() {
            Vec::new()
        } else {
            line.split(',').collect()
        };

        if tokens.len() != sensor_count {
            return Err(FramingError::WrongTokenCount {
                expected: sensor_count,
                found: tokens.len(),
            });
        }

        let mut readings = Vec::with_capacity(sensor_count);
        for (index, token) in tokens.iter().enumerate() {
            let token = token.trim();
            match token.parse::<f64>() {
                Ok(value) if value.is_finite() => readings.push(value),
                _ => {
                    return Err(FramingError::InvalidToken {
                        index,
                        token: token.to_string(),
                    })
                }
            }
        }

        Ok(Self { readings })
    }

    pub fn readings(&self) -> &[f64] {
        &self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_line() {
        let frame = RawFrame::parse_line("60,60,60,60,60,60,60,60,60,4\r\n", 10).unwrap();
        assert_eq!(frame.len(), 10);
        assert_eq!(frame.readings()[9], 4.0);
    }

    #[test]
    fn test_parse_float_tokens_with_spaces() {
        let frame = RawFrame::parse_line(" 1.5, 2.25 ,3\n", 3).unwrap();
        assert_eq!(frame.readings(), &[1.5, 2.25, 3.0]);
    }

    #[test]
    fn test_parse_rejects_non_numeric() {
        let err = RawFrame::parse_line("1,2,abc,4", 4).unwrap_err();
        match err {
            FramingError::InvalidToken { index, token } => {
                assert_eq!(index, 2);
                assert_eq!(token, "abc");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!RawFrame::parse_line("1,2,abc,4", 4).unwrap_err().is_fatal());
    }

    #[test]
    fn test_parse_rejects_wrong_count() {
        let err = RawFrame::parse_line("1,2,abc,4", 10).unwrap_err();
        assert!(matches!(
            err,
            FramingError::WrongTokenCount {
                expected: 10,
                found: 4
            }
        ));
    }

    #[test]
    fn test_parse_rejects_empty_line() {
        let err = RawFrame::parse_line("\n", 10).unwrap_err();
        assert!(matches!(err, FramingError::WrongTokenCount { found: 0, .. }));
    }

    #[test]
    fn test_parse_rejects_non_finite() {
        assert!(RawFrame::parse_line("1,nan,3", 3).is_err());
        assert!(RawFrame::parse_line("1,inf,3", 3).is_err());
    }

    #[test]
    fn test_new_checks_length() {
        assert!(RawFrame::new(vec![1.0; 9], 10).is_err());
        assert!(RawFrame::new(vec![1.0; 10], 10).is_ok());
        assert!(RawFrame::new(vec![1.0, f64::NAN], 2).is_err());
    }

    #[test]
    fn test_stream_closed_is_fatal() {
        assert!(FramingError::StreamClosed.is_fatal());
        assert!(!FramingError::InvalidEncoding.is_fatal());
    }
}
