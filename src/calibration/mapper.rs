//! Mapping of calibrated knee positions into application ranges.

use serde::{Deserialize, Serialize};

use super::calibrator::Calibration;
use crate::estimation::PositionEstimate;

/// Output range `[lower, upper]` of a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetRange {
    pub lower: f64,
    pub upper: f64,
}

impl TargetRange {
    /// Angular position around a circle, in degrees.
    pub const ANGLE: Self = Self::new(1.0, 359.0);
    /// Canvas offset in pixels.
    pub const CANVAS: Self = Self::new(0.0, 200.0);
    /// 8-bit brightness.
    pub const BRIGHTNESS: Self = Self::new(0.0, 255.0);

    pub const fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    /// Output value that the calibrated y center maps to.
    pub fn center(&self) -> f64 {
        (self.upper - self.lower + 1.0) / 2.0 - 1.0
    }

    /// Clamp into the range. Never panics, even for an inverted range.
    /// NaN lands on the midpoint.
    pub fn clamp(&self, value: f64) -> f64 {
        let (lo, hi) = if self.lower <= self.upper {
            (self.lower, self.upper)
        } else {
            (self.upper, self.lower)
        };
        if value.is_nan() {
            (lo + hi) / 2.0
        } else if value > hi {
            hi
        } else if value < lo {
            lo
        } else {
            value
        }
    }
}

/// A position expressed in a [`TargetRange`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MappedPosition {
    pub x: f64,
    pub y: f64,
}

/// Linear rescale of `value` from `[in_min, in_max]` to `[out_min, out_max]`.
///
/// A zero-width input range yields `out_min` below the input point,
/// `out_max` above it, and the output midpoint on it.
pub fn map_value(value: f64, in_min: f64, in_max: f64, out_min: f64, out_max: f64) -> f64 {
    let span = in_max - in_min;
    if span == 0.0 || !span.is_finite() {
        return if value < in_min {
            out_min
        } else if value > in_min {
            out_max
        } else {
            (out_min + out_max) / 2.0
        };
    }
    (value - in_min) * (out_max - out_min) / span + out_min
}

/// Maps raw estimates into target ranges using one calibration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    calibration: Calibration,
}

impl CoordinateMapper {
    pub fn new(calibration: Calibration) -> Self {
        Self { calibration }
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Map `pos` into `range`.
    ///
    /// x is linear over `[x_min, x_max]`. y is piecewise: `[y_min, y_center]`
    /// onto `[lower, center]` and `[y_center, y_max]` onto `[center, upper]`,
    /// so the resting position lands on the range center. Both are clamped.
    pub fn map(&self, pos: &PositionEstimate, range: TargetRange) -> MappedPosition {
        MappedPosition {
            x: self.map_x(pos.x, range),
            y: self.map_y(pos.y, range),
        }
    }

    pub fn map_x(&self, x: f64, range: TargetRange) -> f64 {
        let c = &self.calibration;
        range.clamp(map_value(x, c.x_min, c.x_max, range.lower, range.upper))
    }

    pub fn map_y(&self, y: f64, range: TargetRange) -> f64 {
        let c = &self.calibration;
        let center = range.center();
        let mapped = if y < c.y_center {
            map_value(y, c.y_min, c.y_center, range.lower, center)
        } else if y == c.y_center {
            center
        } else {
            map_value(y, c.y_center, c.y_max, center, range.upper)
        };
        range.clamp(mapped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> CoordinateMapper {
        CoordinateMapper::new(Calibration::default())
    }

    #[test]
    fn test_map_value_linear() {
        assert_eq!(map_value(5.0, 0.0, 10.0, 0.0, 100.0), 50.0);
        assert_eq!(map_value(4.0, 2.0, 6.0, 1.0, 359.0), 180.0);
    }

    #[test]
    fn test_map_value_degenerate_range() {
        assert_eq!(map_value(1.0, 2.0, 2.0, 0.0, 10.0), 0.0);
        assert_eq!(map_value(3.0, 2.0, 2.0, 0.0, 10.0), 10.0);
        assert_eq!(map_value(2.0, 2.0, 2.0, 0.0, 10.0), 5.0);
    }

    #[test]
    fn test_range_center() {
        assert_eq!(TargetRange::ANGLE.center(), 178.5);
        assert_eq!(TargetRange::CANVAS.center(), 99.5);
        assert_eq!(TargetRange::BRIGHTNESS.center(), 127.0);
    }

    #[test]
    fn test_y_center_maps_to_range_center() {
        let calibrations = [
            Calibration::default(),
            Calibration {
                x_min: 0.0,
                x_center: 1.0,
                x_max: 2.0,
                y_min: 10.0,
                y_center: 30.0,
                y_max: 31.0,
            },
            Calibration {
                y_min: 48.0,
                y_center: 48.0,
                y_max: 48.0,
                ..Calibration::default()
            },
        ];
        for calibration in calibrations {
            let mapper = CoordinateMapper::new(calibration);
            for range in [TargetRange::ANGLE, TargetRange::CANVAS, TargetRange::BRIGHTNESS] {
                assert_eq!(mapper.map_y(calibration.y_center, range), range.center());
            }
        }
    }

    #[test]
    fn test_asymmetric_y_segments() {
        let mapper = mapper();
        let range = TargetRange::ANGLE;
        assert_eq!(mapper.map_y(46.0, range), 1.0);
        assert_eq!(mapper.map_y(53.0, range), 359.0);
        // halfway up each segment
        assert_eq!(mapper.map_y(47.0, range), (1.0 + 178.5) / 2.0);
        assert_eq!(mapper.map_y(50.5, range), (178.5 + 359.0) / 2.0);
    }

    #[test]
    fn test_output_always_clamped() {
        let mapper = mapper();
        let inputs = [-1e9, -5.0, 0.0, 2.0, 4.0, 46.0, 48.0, 53.0, 60.0, 1e9];
        for range in [TargetRange::ANGLE, TargetRange::CANVAS, TargetRange::new(5.0, 6.0)] {
            for &x in &inputs {
                for &y in &inputs {
                    let mapped = mapper.map(&PositionEstimate::new(x, y), range);
                    assert!(mapped.x >= range.lower && mapped.x <= range.upper);
                    assert!(mapped.y >= range.lower && mapped.y <= range.upper);
                }
            }
        }
    }

    #[test]
    fn test_zero_width_calibration_does_not_nan() {
        let calibration = Calibration::from_centers(4.0, 48.0, Default::default());
        let flat = Calibration {
            x_min: calibration.x_center,
            x_max: calibration.x_center,
            ..calibration
        };
        let mapper = CoordinateMapper::new(flat);
        assert_eq!(mapper.map_x(4.0, TargetRange::CANVAS), 100.0);
        assert_eq!(mapper.map_x(3.0, TargetRange::CANVAS), 0.0);
        assert_eq!(mapper.map_x(9.0, TargetRange::CANVAS), 200.0);
    }

    #[test]
    fn test_nan_estimate_maps_inside_range() {
        let mapper = mapper();
        for range in [TargetRange::ANGLE, TargetRange::CANVAS, TargetRange::new(10.0, 0.0)] {
            let mapped = mapper.map(&PositionEstimate::new(f64::NAN, f64::NAN), range);
            let (lo, hi) = (range.lower.min(range.upper), range.lower.max(range.upper));
            assert!(mapped.x >= lo && mapped.x <= hi);
            assert!(mapped.y >= lo && mapped.y <= hi);
        }
        assert_eq!(TargetRange::CANVAS.clamp(f64::NAN), 100.0);
    }

    #[test]
    fn test_inverted_range_does_not_panic() {
        let range = TargetRange::new(10.0, 0.0);
        let mapped = mapper().map(&PositionEstimate::new(100.0, 100.0), range);
        assert!(mapped.x >= 0.0 && mapped.x <= 10.0);
        assert!(mapped.y >= 0.0 && mapped.y <= 10.0);
    }
}
