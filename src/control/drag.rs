//! Knee-assisted dragging of canvas points.

use serde::Serialize;

use crate::calibration::MappedPosition;

/// Displacement to apply to a dragged point, in screen orientation
/// (knee up moves the point up, i.e. towards smaller y).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PointerOffset {
    pub dx: f64,
    pub dy: f64,
}

impl PointerOffset {
    /// Where a point grabbed at `origin` ends up.
    pub fn apply(&self, origin: (f64, f64)) -> (f64, f64) {
        (origin.0 + self.dx, origin.1 + self.dy)
    }
}

/// Knee-assisted drag: the knee position at press time is the anchor, and
/// later knee movement relative to it nudges the grabbed point.
#[derive(Debug, Clone, Default)]
pub struct KneeDrag {
    current: Option<MappedPosition>,
    anchor: Option<MappedPosition>,
}

impl KneeDrag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest knee position in canvas coordinates.
    pub fn update(&mut self, position: MappedPosition) {
        self.current = Some(position);
    }

    pub fn current(&self) -> Option<MappedPosition> {
        self.current
    }

    /// Start a drag at the current knee position. Returns false if no
    /// position has been seen yet.
    pub fn press(&mut self) -> bool {
        self.anchor = self.current;
        self.anchor.is_some()
    }

    pub fn release(&mut self) {
        self.anchor = None;
    }

    pub fn is_dragging(&self) -> bool {
        self.anchor.is_some()
    }

    /// Offset of the knee since the press, if dragging.
    pub fn offset(&self) -> Option<PointerOffset> {
        let anchor = self.anchor?;
        let current = self.current?;
        Some(PointerOffset {
            dx: current.x - anchor.x,
            dy: -(current.y - anchor.y),
        })
    }
}
