//! Reader plus estimator: one frame in, one position out.

use crate::calibration::{Calibration, PositionSource};
use crate::estimation::{PositionEstimate, PositionEstimator};
use crate::sensor::{FramingError, LineSource, SensorError, SensorFrameReader};

/// The per-tick processing chain of one sensor rig.
pub struct SensorPipeline<S> {
    reader: SensorFrameReader<S>,
    estimator: PositionEstimator,
}

impl<S: LineSource> SensorPipeline<S> {
    pub fn new(reader: SensorFrameReader<S>, estimator: PositionEstimator) -> Self {
        Self { reader, estimator }
    }

    pub fn reader(&self) -> &SensorFrameReader<S> {
        &self.reader
    }

    pub fn estimator(&self) -> &PositionEstimator {
        &self.estimator
    }

    /// Adopt the retraction threshold of a finished calibration.
    pub fn apply_calibration(&mut self, calibration: &Calibration) {
        self.estimator.apply_calibration(calibration);
    }

    /// Read the freshest frame and estimate the knee position from it.
    pub fn step(&mut self) -> Result<PositionEstimate, FramingError> {
        let frame = self.reader.read_frame()?;
        Ok(self.estimator.estimate(&frame))
    }
}

impl<S: LineSource> PositionSource for SensorPipeline<S> {
    fn next_position(&mut self) -> Result<PositionEstimate, SensorError> {
        self.step().map_err(SensorError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{CalibrationConfig, Calibrator};
    use crate::estimation::EstimatorConfig;
    use crate::sensor::ReplaySource;
    use std::io::Cursor;

    fn pipeline(script: String) -> SensorPipeline<ReplaySource<Cursor<Vec<u8>>>> {
        let source = ReplaySource::new(Cursor::new(script.into_bytes()));
        SensorPipeline::new(
            SensorFrameReader::new(source, 10),
            PositionEstimator::new(EstimatorConfig::default()),
        )
    }

    #[test]
    fn test_step_estimates_each_frame() {
        let mut pipeline = pipeline("30,30,30,30,30,30,30,30,30,30\n".repeat(2));
        let first = pipeline.step().unwrap();
        let second = pipeline.step().unwrap();
        assert!((first.y - 34.0 * 0.7).abs() < 1e-12);
        assert!(second.y > first.y);
        assert!(matches!(pipeline.step(), Err(FramingError::StreamClosed)));
    }

    #[test]
    fn test_pipeline_drives_calibration() {
        let mut pipeline = pipeline("60,60,60,60,16,60,60,60,60,60\n".repeat(60));
        let calibration = Calibrator::new(CalibrationConfig::default())
            .calibrate(&mut pipeline)
            .unwrap();
        assert!((calibration.y_center - 48.0).abs() < 1e-6);
        // sensor 4 weighs 1/2, the other nine 1/46 each
        let expected_x = (4.0 * 0.5 + 41.0 / 46.0) / (0.5 + 9.0 / 46.0);
        assert!((calibration.x_center - expected_x).abs() < 1e-6);

        pipeline.apply_calibration(&calibration);
        assert!((pipeline.estimator().retract_threshold() - 52.0).abs() < 1e-6);
    }

    #[test]
    fn test_bad_frame_maps_to_recoverable_sensor_error() {
        let mut pipeline = pipeline("1,2,3\n".to_string());
        let err = pipeline.next_position().unwrap_err();
        assert!(!err.is_fatal());
    }
}
