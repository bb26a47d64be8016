//! Gesture-driven operation modes.
//!
//! Pulling the leg fully back produces the sentinel estimate; each fresh
//! occurrence advances the mode once.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::estimation::PositionEstimate;

/// What the knee currently controls in the consuming application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OperationMode {
    #[default]
    None,
    DrawingPoints,
    MovingPoints,
    SwitchLayer,
    ColorPicker,
}

impl OperationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationMode::None => "NONE",
            OperationMode::DrawingPoints => "DRAWING_POINTS",
            OperationMode::MovingPoints => "MOVING_POINTS",
            OperationMode::SwitchLayer => "SWITCH_LAYER",
            OperationMode::ColorPicker => "COLOR_PICKER",
        }
    }

    /// Pointer mode the canvas should be in while the knee is in this mode.
    ///
    /// Layer switching and color picking leave the pointer drawing.
    pub fn canvas_mode(&self) -> OperationMode {
        match self {
            OperationMode::None => OperationMode::None,
            OperationMode::MovingPoints => OperationMode::MovingPoints,
            OperationMode::DrawingPoints
            | OperationMode::SwitchLayer
            | OperationMode::ColorPicker => OperationMode::DrawingPoints,
        }
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transition table applied on each trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModeCycle {
    /// None → Drawing → Moving → SwitchLayer → ColorPicker → Drawing → …
    #[default]
    Paint,
    /// None → Drawing ↔ Moving.
    DrawMove,
}

impl ModeCycle {
    pub fn next(&self, mode: OperationMode) -> OperationMode {
        use OperationMode as M;
        match (self, mode) {
            (_, M::None) => M::DrawingPoints,
            (ModeCycle::Paint, M::DrawingPoints) => M::MovingPoints,
            (ModeCycle::Paint, M::MovingPoints) => M::SwitchLayer,
            (ModeCycle::Paint, M::SwitchLayer) => M::ColorPicker,
            (ModeCycle::Paint, M::ColorPicker) => M::DrawingPoints,
            (ModeCycle::DrawMove, M::DrawingPoints) => M::MovingPoints,
            (ModeCycle::DrawMove, _) => M::DrawingPoints,
        }
    }

    /// Parse "paint" or "draw-move".
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "paint" => Some(ModeCycle::Paint),
            "draw-move" | "drawmove" | "draw_move" => Some(ModeCycle::DrawMove),
            _ => None,
        }
    }
}

/// A mode change caused by one trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeTransition {
    pub from: OperationMode,
    pub to: OperationMode,
}

/// Rising-edge detector over the sentinel signal.
#[derive(Debug, Clone)]
pub struct ModeSwitchDetector {
    mode: OperationMode,
    cycle: ModeCycle,
    switched: bool,
    transitions: u64,
}

impl ModeSwitchDetector {
    pub fn new(initial: OperationMode, cycle: ModeCycle) -> Self {
        Self {
            mode: initial,
            cycle,
            switched: false,
            transitions: 0,
        }
    }

    pub fn mode(&self) -> OperationMode {
        self.mode
    }

    pub fn cycle(&self) -> ModeCycle {
        self.cycle
    }

    /// Total transitions since creation.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Feed one estimate. Returns the transition if this was a rising edge.
    pub fn observe(&mut self, pos: &PositionEstimate) -> Option<ModeTransition> {
        if !pos.is_sentinel() {
            self.switched = false;
            return None;
        }
        if self.switched {
            return None;
        }

        self.switched = true;
        let from = self.mode;
        self.mode = self.cycle.next(from);
        self.transitions += 1;
        tracing::info!("Knee mode switched: {} -> {}", from, self.mode);
        Some(ModeTransition { from, to: self.mode })
    }
}

impl Default for ModeSwitchDetector {
    fn default() -> Self {
        Self::new(OperationMode::DrawingPoints, ModeCycle::Paint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normal() -> PositionEstimate {
        PositionEstimate::new(4.0, 48.0)
    }

    fn sentinel() -> PositionEstimate {
        PositionEstimate::new(4.0, 0.0)
    }

    #[test]
    fn test_one_transition_per_rising_edge() {
        let mut detector = ModeSwitchDetector::default();
        let sequence = [
            normal(),
            normal(),
            sentinel(),
            sentinel(),
            sentinel(),
            normal(),
            sentinel(),
        ];
        let fired = sequence
            .iter()
            .filter_map(|pos| detector.observe(pos))
            .count();
        assert_eq!(fired, 2);
        assert_eq!(detector.transitions(), 2);
        assert_eq!(detector.mode(), OperationMode::SwitchLayer);
    }

    #[test]
    fn test_leading_sentinel_triggers() {
        let mut detector = ModeSwitchDetector::new(OperationMode::None, ModeCycle::Paint);
        let transition = detector.observe(&sentinel()).unwrap();
        assert_eq!(transition.from, OperationMode::None);
        assert_eq!(transition.to, OperationMode::DrawingPoints);
    }

    #[test]
    fn test_paint_cycle_order() {
        let cycle = ModeCycle::Paint;
        let mut mode = OperationMode::None;
        let mut seen = Vec::new();
        for _ in 0..6 {
            mode = cycle.next(mode);
            seen.push(mode);
        }
        assert_eq!(
            seen,
            vec![
                OperationMode::DrawingPoints,
                OperationMode::MovingPoints,
                OperationMode::SwitchLayer,
                OperationMode::ColorPicker,
                OperationMode::DrawingPoints,
                OperationMode::MovingPoints,
            ]
        );
    }

    #[test]
    fn test_draw_move_cycle() {
        let cycle = ModeCycle::DrawMove;
        assert_eq!(cycle.next(OperationMode::DrawingPoints), OperationMode::MovingPoints);
        assert_eq!(cycle.next(OperationMode::MovingPoints), OperationMode::DrawingPoints);
        assert_eq!(cycle.next(OperationMode::None), OperationMode::DrawingPoints);
        assert_eq!(cycle.next(OperationMode::ColorPicker), OperationMode::DrawingPoints);
    }

    #[test]
    fn test_canvas_mode() {
        assert_eq!(OperationMode::SwitchLayer.canvas_mode(), OperationMode::DrawingPoints);
        assert_eq!(OperationMode::ColorPicker.canvas_mode(), OperationMode::DrawingPoints);
        assert_eq!(OperationMode::MovingPoints.canvas_mode(), OperationMode::MovingPoints);
        assert_eq!(OperationMode::None.canvas_mode(), OperationMode::None);
    }

    #[test]
    fn test_cycle_from_name() {
        assert_eq!(ModeCycle::from_name("Paint"), Some(ModeCycle::Paint));
        assert_eq!(ModeCycle::from_name("draw-move"), Some(ModeCycle::DrawMove));
        assert_eq!(ModeCycle::from_name("spin"), None);
        assert_eq!(OperationMode::ColorPicker.to_string(), "COLOR_PICKER");
    }
}
