//! Calibration of the knee range from a short sampling session.
//!
//! The calibrator lets the EMA filter settle over a warm-up run, then
//! averages a batch of estimates while the user holds the knee at rest. The
//! per-axis bounds are derived from those centers with explicit margins,
//! since different applications want different travel around the center.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::estimation::PositionEstimate;
use crate::sensor::SensorError;

/// Estimates discarded while the filter settles.
pub const DEFAULT_WARMUP_COUNT: usize = 30;

/// Estimates averaged into the calibration center.
pub const DEFAULT_SAMPLE_COUNT: usize = 20;

/// Rejected estimates tolerated before giving up.
pub const DEFAULT_MAX_REJECTED: usize = 100;

/// Calibration errors.
#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("Calibration aborted after {collected} samples: {source}")]
    Sensor {
        collected: usize,
        #[source]
        source: SensorError,
    },
    #[error("Calibration gave up after {0} rejected samples")]
    TooManyRejected(usize),
    #[error("Calibration needs at least one sample")]
    NoSamples,
}

/// Anything that can produce a fresh position estimate on demand.
pub trait PositionSource {
    fn next_position(&mut self) -> Result<PositionEstimate, SensorError>;
}

impl<F> PositionSource for F
where
    F: FnMut() -> Result<PositionEstimate, SensorError>,
{
    fn next_position(&mut self) -> Result<PositionEstimate, SensorError> {
        self()
    }
}

/// Travel allowed around the calibrated center, per axis and direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationMargins {
    pub x_below: f64,
    pub x_above: f64,
    pub y_below: f64,
    pub y_above: f64,
}

impl CalibrationMargins {
    /// Narrow range used by the step-selection harness.
    pub const STEP_SELECTION: Self = Self {
        x_below: 0.5,
        x_above: 0.5,
        y_below: 1.0,
        y_above: 2.0,
    };

    /// Wider range used by the painting tool.
    pub const CANVAS: Self = Self {
        x_below: 2.0,
        x_above: 2.0,
        y_below: 2.0,
        y_above: 4.0,
    };

    pub fn new(x_below: f64, x_above: f64, y_below: f64, y_above: f64) -> Self {
        Self {
            x_below,
            x_above,
            y_below,
            y_above,
        }
    }

    /// Look up a preset by name ("step" or "canvas").
    pub fn preset(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "step" | "step-selection" => Some(Self::STEP_SELECTION),
            "canvas" | "paint" => Some(Self::CANVAS),
            _ => None,
        }
    }
}

impl Default for CalibrationMargins {
    fn default() -> Self {
        Self::STEP_SELECTION
    }
}

/// Per-axis bounds of the user's knee travel. Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub x_min: f64,
    pub x_center: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_center: f64,
    pub y_max: f64,
}

impl Default for Calibration {
    /// Bounds of the reference rig before any calibration has run.
    fn default() -> Self {
        Self {
            x_min: 2.0,
            x_center: 4.0,
            x_max: 6.0,
            y_min: 46.0,
            y_center: 48.0,
            y_max: 53.0,
        }
    }
}

impl Calibration {
    /// Derive bounds from measured centers.
    pub fn from_centers(x_center: f64, y_center: f64, margins: CalibrationMargins) -> Self {
        Self {
            x_min: x_center - margins.x_below,
            x_center,
            x_max: x_center + margins.x_above,
            y_min: y_center - margins.y_below,
            y_center,
            y_max: y_center + margins.y_above,
        }
    }
}

/// Configuration for the calibration run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationConfig {
    pub warmup_count: usize,
    pub sample_count: usize,
    pub margins: CalibrationMargins,
    /// Recoverable failures (bad frames, retracted leg) tolerated in total.
    pub max_rejected: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            warmup_count: DEFAULT_WARMUP_COUNT,
            sample_count: DEFAULT_SAMPLE_COUNT,
            margins: CalibrationMargins::default(),
            max_rejected: DEFAULT_MAX_REJECTED,
        }
    }
}

impl CalibrationConfig {
    pub fn with_warmup_count(mut self, count: usize) -> Self {
        self.warmup_count = count;
        self
    }

    pub fn with_sample_count(mut self, count: usize) -> Self {
        self.sample_count = count;
        self
    }

    pub fn with_margins(mut self, margins: CalibrationMargins) -> Self {
        self.margins = margins;
        self
    }

    pub fn with_max_rejected(mut self, max_rejected: usize) -> Self {
        self.max_rejected = max_rejected;
        self
    }
}

/// Runs the blocking warm-up and sampling protocol.
pub struct Calibrator {
    config: CalibrationConfig,
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::new(CalibrationConfig::default())
    }
}

impl Calibrator {
    pub fn new(config: CalibrationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Run the calibration against `source`.
    ///
    /// Blocks for `warmup_count + sample_count` estimates. Malformed frames
    /// and retracted-leg estimates are retaken; a fatal link error aborts.
    pub fn calibrate<P: PositionSource + ?Sized>(
        &self,
        source: &mut P,
    ) -> Result<Calibration, CalibrationError> {
        if self.config.sample_count == 0 {
            return Err(CalibrationError::NoSamples);
        }

        tracing::info!(
            "Calibration: settling filter over {} frames",
            self.config.warmup_count
        );

        let mut rejected = 0;
        let mut settled = 0;
        while settled < self.config.warmup_count {
            match source.next_position() {
                Ok(pos) => {
                    tracing::debug!("Warm-up {}: x={:.3} y={:.3}", settled, pos.x, pos.y);
                    settled += 1;
                }
                Err(e) => self.reject(e, 0, &mut rejected)?,
            }
        }

        tracing::info!("Calibration: sampling {} frames", self.config.sample_count);

        let mut sum_x = 0.0;
        let mut sum_y = 0.0;
        let mut collected = 0;
        while collected < self.config.sample_count {
            match source.next_position() {
                Ok(pos) if pos.is_sentinel() => {
                    tracing::warn!("Calibration sample {} saw no leg, retaking", collected);
                    rejected += 1;
                    if rejected > self.config.max_rejected {
                        return Err(CalibrationError::TooManyRejected(rejected));
                    }
                }
                Ok(pos) => {
                    tracing::debug!("Sample {}: x={:.3} y={:.3}", collected, pos.x, pos.y);
                    sum_x += pos.x;
                    sum_y += pos.y;
                    collected += 1;
                }
                Err(e) => self.reject(e, collected, &mut rejected)?,
            }
        }

        let x_center = sum_x / collected as f64;
        let y_center = sum_y / collected as f64;
        let calibration = Calibration::from_centers(x_center, y_center, self.config.margins);

        tracing::info!(
            "Calibration complete: x={:.3} [{:.3}, {:.3}], y={:.3} [{:.3}, {:.3}]",
            calibration.x_center,
            calibration.x_min,
            calibration.x_max,
            calibration.y_center,
            calibration.y_min,
            calibration.y_max
        );

        Ok(calibration)
    }

    fn reject(
        &self,
        error: SensorError,
        collected: usize,
        rejected: &mut usize,
    ) -> Result<(), CalibrationError> {
        if error.is_fatal() {
            return Err(CalibrationError::Sensor {
                collected,
                source: error,
            });
        }
        tracing::warn!("Calibration discarded frame: {}", error);
        *rejected += 1;
        if *rejected > self.config.max_rejected {
            return Err(CalibrationError::TooManyRejected(*rejected));
        }
        Ok(())
    }
}
