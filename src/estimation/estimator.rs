//! Weighted-centroid knee position estimation with EMA smoothing.

use serde::{Deserialize, Serialize};

use crate::calibration::Calibration;
use crate::sensor::{RawFrame, DEFAULT_SENSOR_COUNT};

/// Full-scale reading of the reference distance sensors.
pub const DEFAULT_SENSOR_RANGE: f64 = 64.0;

/// Softening term in the centroid weights.
pub const DEFAULT_CENTROID_EPSILON: f64 = 2.0;

/// EMA factor: each tick moves this fraction of the way to the new reading.
pub const DEFAULT_EMA_ALPHA: f64 = 0.7;

/// Distance above the calibrated y maximum that counts as "leg retracted".
pub const DEFAULT_RETRACT_MARGIN: f64 = 2.0;

/// Reserved y value meaning "no leg detected". Doubles as the mode-switch trigger.
pub const SENTINEL_Y: f64 = 0.0;

/// Whether `y` is the reserved retraction value rather than a position.
pub fn is_sentinel(y: f64) -> bool {
    y == SENTINEL_Y
}

/// What an estimate says about the leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KneeSignal {
    Present,
    Retracted,
}

/// A smoothed knee position.
///
/// `x` is a fractional sensor index in `[0, N-1]`; `y` grows with proximity
/// of the closest sensor, or is [`SENTINEL_Y`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PositionEstimate {
    pub x: f64,
    pub y: f64,
}

impl PositionEstimate {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_sentinel(&self) -> bool {
        is_sentinel(self.y)
    }

    pub fn signal(&self) -> KneeSignal {
        if self.is_sentinel() {
            KneeSignal::Retracted
        } else {
            KneeSignal::Present
        }
    }
}

/// Tuning of the estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatorConfig {
    pub sensor_count: usize,
    /// `K` in `K - raw`, so larger values mean closer.
    pub sensor_range: f64,
    pub centroid_epsilon: f64,
    pub ema_alpha: f64,
    pub retract_margin: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            sensor_count: DEFAULT_SENSOR_COUNT,
            sensor_range: DEFAULT_SENSOR_RANGE,
            centroid_epsilon: DEFAULT_CENTROID_EPSILON,
            ema_alpha: DEFAULT_EMA_ALPHA,
            retract_margin: DEFAULT_RETRACT_MARGIN,
        }
    }
}

impl EstimatorConfig {
    pub fn with_sensor_count(mut self, sensor_count: usize) -> Self {
        self.sensor_count = sensor_count;
        self
    }

    /// Must be positive and finite; the estimator falls back to the default otherwise.
    pub fn with_sensor_range(mut self, sensor_range: f64) -> Self {
        self.sensor_range = sensor_range;
        self
    }

    /// Must be positive; the estimator falls back to the default otherwise.
    pub fn with_centroid_epsilon(mut self, epsilon: f64) -> Self {
        self.centroid_epsilon = epsilon;
        self
    }

    /// Clamped into `(0, 1]` when the estimator is built.
    pub fn with_ema_alpha(mut self, alpha: f64) -> Self {
        self.ema_alpha = alpha;
        self
    }

    pub fn with_retract_margin(mut self, margin: f64) -> Self {
        self.retract_margin = margin;
        self
    }
}

/// Filter memory carried between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EstimatorState {
    pub prev_x: f64,
    pub prev_y: f64,
}

/// Converts raw frames into smoothed positions.
///
/// Each instance owns its own filter state; run one per sensor rig.
#[derive(Debug, Clone)]
pub struct PositionEstimator {
    config: EstimatorConfig,
    state: EstimatorState,
    retract_threshold: f64,
}

impl Default for PositionEstimator {
    fn default() -> Self {
        Self::new(EstimatorConfig::default())
    }
}

impl PositionEstimator {
    pub fn new(mut config: EstimatorConfig) -> Self {
        if !config.sensor_range.is_finite() || config.sensor_range <= 0.0 {
            config.sensor_range = DEFAULT_SENSOR_RANGE;
        }
        if config.centroid_epsilon.is_nan() || config.centroid_epsilon <= 0.0 {
            config.centroid_epsilon = DEFAULT_CENTROID_EPSILON;
        }
        if config.ema_alpha.is_nan() || config.ema_alpha <= 0.0 {
            config.ema_alpha = DEFAULT_EMA_ALPHA;
        }
        config.ema_alpha = config.ema_alpha.min(1.0);

        let retract_threshold = Calibration::default().y_max + config.retract_margin;
        Self {
            config,
            state: EstimatorState::default(),
            retract_threshold,
        }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn state(&self) -> EstimatorState {
        self.state
    }

    /// Smoothed y above this value is reported as the sentinel.
    pub fn retract_threshold(&self) -> f64 {
        self.retract_threshold
    }

    /// Move the retraction threshold to the calibrated range.
    pub fn apply_calibration(&mut self, calibration: &Calibration) {
        self.retract_threshold = calibration.y_max + self.config.retract_margin;
        tracing::debug!("Retract threshold set to {:.3}", self.retract_threshold);
    }

    /// Forget filter history.
    pub fn reset(&mut self) {
        self.state = EstimatorState::default();
    }

    /// Unsmoothed centroid `(x, y)` of one frame.
    ///
    /// Readings outside `[0, sensor_range]` are clamped to it first.
    pub fn centroid(&self, frame: &RawFrame) -> (f64, f64) {
        let range = self.config.sensor_range;
        let inverted: Vec<f64> = frame
            .readings()
            .iter()
            .map(|raw| range - raw.clamp(0.0, range))
            .collect();

        if inverted.is_empty() {
            return (0.0, 0.0);
        }
        let max_val = inverted.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let mut weighted = 0.0;
        let mut total = 0.0;
        for (i, value) in inverted.iter().enumerate() {
            let weight = 1.0 / (max_val - value + self.config.centroid_epsilon);
            weighted += i as f64 * weight;
            total += weight;
        }

        (weighted / total, max_val)
    }

    /// Estimate the knee position for one frame, updating filter state.
    pub fn estimate(&mut self, frame: &RawFrame) -> PositionEstimate {
        let (raw_x, raw_y) = self.centroid(frame);
        let alpha = self.config.ema_alpha;

        let x = (raw_x - self.state.prev_x) * alpha + self.state.prev_x;
        let y = (raw_y - self.state.prev_y) * alpha + self.state.prev_y;
        self.state = EstimatorState {
            prev_x: x,
            prev_y: y,
        };

        if y > self.retract_threshold {
            return PositionEstimate::new(x, SENTINEL_Y);
        }
        PositionEstimate::new(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(values: &[f64]) -> RawFrame {
        RawFrame::new(values.to_vec(), values.len()).unwrap()
    }

    #[test]
    fn test_centroid_close_sensor_dominates() {
        let estimator = PositionEstimator::default();
        let (x, y) =
            estimator.centroid(&frame(&[60.0, 60.0, 60.0, 60.0, 60.0, 60.0, 60.0, 60.0, 60.0, 4.0]));
        assert_eq!(y, 60.0);
        // weights: 9 sensors at 1/58, sensor 9 at 1/2
        let expected = (9.0 * 0.5 + 36.0 / 58.0) / (0.5 + 9.0 / 58.0);
        assert!((x - expected).abs() < 1e-12);
        assert!(x > 7.5);
    }

    #[test]
    fn test_centroid_all_equal_is_middle() {
        let estimator = PositionEstimator::default();
        let (x, y) = estimator.centroid(&frame(&[30.0; 10]));
        assert!((x - 4.5).abs() < 1e-12);
        assert_eq!(y, 34.0);
    }

    #[test]
    fn test_estimate_applies_ema() {
        let mut estimator = PositionEstimator::default();
        let pos = estimator.estimate(&frame(&[30.0; 10]));
        assert!((pos.x - 4.5 * 0.7).abs() < 1e-12);
        assert!((pos.y - 34.0 * 0.7).abs() < 1e-12);
        assert_eq!(estimator.state().prev_x, pos.x);
    }

    #[test]
    fn test_x_stays_in_sensor_range() {
        let frames = [
            [0.0, 64.0, 64.0, 64.0, 64.0, 64.0, 64.0, 64.0, 64.0, 64.0],
            [64.0, 64.0, 64.0, 64.0, 64.0, 64.0, 64.0, 64.0, 64.0, 0.0],
            [5.0, 17.0, 33.0, 2.0, 64.0, 12.0, 40.0, 63.0, 1.0, 20.0],
            [100.0, -20.0, 0.0, 0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            [64.0; 10],
        ];
        let mut estimator = PositionEstimator::default();
        for _ in 0..5 {
            for values in frames.iter() {
                let pos = estimator.estimate(&frame(values));
                assert!(pos.x >= 0.0 && pos.x <= 9.0, "x out of range: {}", pos.x);
                assert!(pos.y.is_finite());
            }
        }
    }

    #[test]
    fn test_ema_converges_geometrically() {
        let mut estimator =
            PositionEstimator::new(EstimatorConfig::default().with_retract_margin(1000.0));
        let target = frame(&[60.0, 60.0, 60.0, 60.0, 60.0, 60.0, 60.0, 60.0, 60.0, 4.0]);
        let (raw_x, raw_y) = estimator.centroid(&target);
        let initial_error = raw_y;

        let mut previous_error = f64::INFINITY;
        for k in 1..=20 {
            let pos = estimator.estimate(&target);
            let error = (raw_y - pos.y).abs();
            assert!(error < previous_error);
            assert!(error <= 0.3f64.powi(k) * initial_error + 1e-9);
            assert!((raw_x - pos.x).abs() <= 0.3f64.powi(k) * raw_x + 1e-9);
            previous_error = error;
        }
    }

    #[test]
    fn test_retracted_leg_reports_sentinel() {
        let mut estimator = PositionEstimator::default();
        // all sensors far away: inverted max = 64 - 0 = 64 > 55
        let far = frame(&[0.0; 10]);
        let mut last = PositionEstimate::default();
        for _ in 0..10 {
            last = estimator.estimate(&far);
        }
        assert!(last.is_sentinel());
        assert_eq!(last.signal(), KneeSignal::Retracted);
        // filter state keeps the unclamped value
        assert!(estimator.state().prev_y > 55.0);
    }

    #[test]
    fn test_apply_calibration_moves_threshold() {
        let mut estimator = PositionEstimator::default();
        assert_eq!(estimator.retract_threshold(), 55.0);
        let calibration = Calibration {
            y_max: 40.0,
            ..Calibration::default()
        };
        estimator.apply_calibration(&calibration);
        assert_eq!(estimator.retract_threshold(), 42.0);
    }

    #[test]
    fn test_independent_estimators_do_not_share_state() {
        let mut a = PositionEstimator::default();
        let mut b = PositionEstimator::default();
        a.estimate(&frame(&[30.0; 10]));
        assert_eq!(b.state(), EstimatorState::default());
        b.estimate(&frame(&[30.0; 10]));
        assert_eq!(a.state(), b.state());
    }

    #[test]
    fn test_invalid_tuning_falls_back() {
        let estimator = PositionEstimator::new(
            EstimatorConfig::default()
                .with_centroid_epsilon(0.0)
                .with_ema_alpha(3.0),
        );
        assert_eq!(estimator.config().centroid_epsilon, DEFAULT_CENTROID_EPSILON);
        assert_eq!(estimator.config().ema_alpha, 1.0);
    }

    #[test]
    fn test_extreme_readings_do_not_poison_state() {
        let mut estimator = PositionEstimator::default();
        let mut spike = vec![64.0; 10];
        spike[0] = -1.7e308;
        estimator.estimate(&frame(&spike));
        estimator.estimate(&frame(&[1.7e308; 10]));
        estimator.estimate(&frame(&[1.7e308; 10]));

        let rest = frame(&[60.0, 60.0, 60.0, 60.0, 16.0, 60.0, 60.0, 60.0, 60.0, 60.0]);
        let mut last = PositionEstimate::default();
        for _ in 0..50 {
            last = estimator.estimate(&rest);
        }
        assert!(last.x.is_finite() && last.y.is_finite());
        assert!((last.y - 48.0).abs() < 1e-6);
        assert!(estimator.state().prev_x.is_finite());
        assert!(estimator.state().prev_y.is_finite());
    }

    #[test]
    fn test_invalid_sensor_range_falls_back() {
        for range in [f64::INFINITY, f64::NAN, 0.0, -5.0] {
            let mut estimator =
                PositionEstimator::new(EstimatorConfig::default().with_sensor_range(range));
            assert_eq!(estimator.config().sensor_range, DEFAULT_SENSOR_RANGE);
            let pos = estimator.estimate(&frame(&[30.0; 10]));
            assert!(pos.x.is_finite() && pos.y.is_finite());
        }
    }

    #[test]
    fn test_is_sentinel() {
        assert!(is_sentinel(0.0));
        assert!(!is_sentinel(0.1));
        assert_eq!(PositionEstimate::new(3.0, 48.0).signal(), KneeSignal::Present);
    }
}
