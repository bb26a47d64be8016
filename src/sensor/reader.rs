//! Frame reader: line framing, warm-up discard and backlog draining.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::frame::{FramingError, RawFrame};
use super::link::LineSource;

/// Lines skipped right after attaching, since the first ones may be truncated.
pub const DEFAULT_WARMUP_LINES: usize = 10;

/// Pulls frames of `sensor_count` readings from a [`LineSource`].
///
/// Whenever a read leaves more than one byte of backlog behind, the reader
/// keeps going and hands out only the newest line, so processing never
/// falls behind the device.
pub struct SensorFrameReader<S> {
    source: S,
    sensor_count: usize,
    line: String,
    cancel: Arc<AtomicBool>,
    skipped: u64,
}

impl<S: LineSource> SensorFrameReader<S> {
    /// Wrap a source without discarding anything.
    pub fn new(source: S, sensor_count: usize) -> Self {
        Self {
            source,
            sensor_count,
            line: String::new(),
            cancel: Arc::new(AtomicBool::new(false)),
            skipped: 0,
        }
    }

    /// Read and drop `count` lines, whatever they contain.
    pub fn discard_lines(&mut self, count: usize) -> Result<(), FramingError> {
        for _ in 0..count {
            self.next_line()?;
        }
        tracing::debug!("Discarded {} warm-up lines", count);
        Ok(())
    }

    /// Share a cancel flag; once set, pending and future reads fail with
    /// [`FramingError::StreamClosed`] at the next link timeout.
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn sensor_count(&self) -> usize {
        self.sensor_count
    }

    /// Number of obsolete lines skipped while draining backlog.
    pub fn skipped_lines(&self) -> u64 {
        self.skipped
    }

    /// Block until the most recent complete line is available and parse it.
    ///
    /// Undecodable lines met while draining are skipped like any other
    /// stale line; only the last one read can fail the call.
    pub fn read_frame(&mut self) -> Result<RawFrame, FramingError> {
        let mut latest = self.next_line();
        while self.source.backlog() > 1 {
            if let Err(e) = latest {
                if e.is_fatal() {
                    return Err(e);
                }
            }
            latest = self.next_line();
            self.skipped += 1;
        }
        latest?;
        RawFrame::parse_line(&self.line, self.sensor_count)
    }

    fn next_line(&mut self) -> Result<(), FramingError> {
        self.line.clear();
        loop {
            if self.cancel.load(Ordering::SeqCst) {
                return Err(FramingError::StreamClosed);
            }

            match self.source.read_line(&mut self.line) {
                // EOF; a partial line without terminator is still handed out
                Ok(0) if self.line.is_empty() => return Err(FramingError::StreamClosed),
                Ok(0) => return Ok(()),
                Ok(_) if self.line.ends_with('\n') => return Ok(()),
                Ok(_) => continue,
                Err(e) => match e.kind() {
                    io::ErrorKind::TimedOut
                    | io::ErrorKind::WouldBlock
                    | io::ErrorKind::Interrupted => continue,
                    io::ErrorKind::InvalidData => {
                        self.line.clear();
                        return Err(FramingError::InvalidEncoding);
                    }
                    io::ErrorKind::UnexpectedEof | io::ErrorKind::BrokenPipe => {
                        return Err(FramingError::StreamClosed)
                    }
                    _ => return Err(FramingError::Io(e)),
                },
            }
        }
    }

    /// Give back the underlying source.
    pub fn into_inner(self) -> S {
        self.source
    }
}
