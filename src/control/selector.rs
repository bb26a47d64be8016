//! Discrete selection from angular knee positions.

use serde::{Deserialize, Serialize};

use crate::calibration::{CoordinateMapper, TargetRange};
use crate::estimation::PositionEstimate;

/// Index of the equal-width slot of `[0, 360)` that `angle` falls in.
///
/// Always within `[0, count)`; a zero count yields 0.
pub fn layer_for_angle(angle: f64, count: usize) -> usize {
    if count == 0 || !angle.is_finite() || angle <= 0.0 {
        return 0;
    }
    let width = 360.0 / count as f64;
    ((angle / width) as usize).min(count - 1)
}

/// Which knee axis drives the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Orientation {
    /// Sideways knee movement, left to right.
    #[default]
    Horizontal,
    /// Knee height; the highest position selects the first step.
    Vertical,
}

/// Picks one of `steps` targets from a knee position mapped onto
/// [`TargetRange::ANGLE`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepSelector {
    steps: usize,
    orientation: Orientation,
}

impl StepSelector {
    pub fn new(steps: usize, orientation: Orientation) -> Self {
        Self {
            steps: steps.max(1),
            orientation,
        }
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Step for angle-mapped coordinates.
    pub fn select(&self, x_angle: f64, y_angle: f64) -> usize {
        match self.orientation {
            Orientation::Horizontal => layer_for_angle(x_angle, self.steps),
            Orientation::Vertical => self.steps - layer_for_angle(y_angle, self.steps) - 1,
        }
    }

    /// Map a raw estimate and select.
    pub fn step_for(&self, position: &PositionEstimate, mapper: &CoordinateMapper) -> usize {
        let mapped = mapper.map(position, TargetRange::ANGLE);
        self.select(mapped.x, mapped.y)
    }
}
