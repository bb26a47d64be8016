//! Knee range calibration and coordinate mapping.

mod calibrator;
mod mapper;

pub use calibrator::{
    Calibration, CalibrationConfig, CalibrationError, CalibrationMargins, Calibrator,
    PositionSource, DEFAULT_MAX_REJECTED, DEFAULT_SAMPLE_COUNT, DEFAULT_WARMUP_COUNT,
};
pub use mapper::{map_value, CoordinateMapper, MappedPosition, TargetRange};
