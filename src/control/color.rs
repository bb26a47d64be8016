//! Pen color picked from the knee position.

use serde::{Deserialize, Serialize};

use crate::calibration::{Calibration, CoordinateMapper, TargetRange};
use crate::estimation::PositionEstimate;

/// A pen color in HSV, 8-bit saturation and value, hue in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvColor {
    pub hue: u16,
    pub saturation: u8,
    pub value: u8,
}

impl HsvColor {
    pub fn new(hue: u16, saturation: u8, value: u8) -> Self {
        Self {
            hue: hue % 360,
            saturation,
            value,
        }
    }

    /// Color picked by the knee: sideways position chooses the hue, height
    /// chooses the brightness, saturation is full.
    pub fn from_knee(position: &PositionEstimate, calibration: &Calibration) -> Self {
        let mapper = CoordinateMapper::new(*calibration);
        let hue = mapper.map_x(position.x, TargetRange::ANGLE);
        let value = mapper.map_y(position.y, TargetRange::BRIGHTNESS);
        Self::new(hue as u16, 255, value as u8)
    }

    /// Convert to 8-bit RGB.
    pub fn to_rgb(&self) -> (u8, u8, u8) {
        let v = self.value as f64 / 255.0;
        let s = self.saturation as f64 / 255.0;
        let chroma = v * s;
        let sector = self.hue as f64 / 60.0;
        let x = chroma * (1.0 - (sector % 2.0 - 1.0).abs());
        let (r, g, b) = match sector as u16 {
            0 => (chroma, x, 0.0),
            1 => (x, chroma, 0.0),
            2 => (0.0, chroma, x),
            3 => (0.0, x, chroma),
            4 => (x, 0.0, chroma),
            _ => (chroma, 0.0, x),
        };
        let m = v - chroma;
        let to_byte = |c: f64| ((c + m) * 255.0).round().clamp(0.0, 255.0) as u8;
        (to_byte(r), to_byte(g), to_byte(b))
    }
}
