//! Per-mode interpretation of knee events.

use serde::Serialize;

use super::color::HsvColor;
use super::drag::{KneeDrag, PointerOffset};
use super::selector::layer_for_angle;
use crate::calibration::{Calibration, CoordinateMapper, MappedPosition, TargetRange};
use crate::modes::OperationMode;
use crate::sampling::KneeEvent;

/// What the consuming application should do for one event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum KneeCommand {
    /// Nothing to do.
    Idle,
    /// The knee mode changed; the canvas should switch to `canvas_mode`.
    ModeChanged {
        mode: OperationMode,
        canvas_mode: OperationMode,
    },
    /// Knee position on the canvas while no point is grabbed.
    PointerAt(MappedPosition),
    /// Move the grabbed point by this offset from where it was grabbed.
    MovePoint(PointerOffset),
    SelectLayer(usize),
    PickColor(HsvColor),
}

/// Turns the event stream into [`KneeCommand`]s.
///
/// Mode changes are detected from the switch counter, so a change is
/// reported even if the event that caused it was never observed.
#[derive(Debug, Clone)]
pub struct KneeDispatcher {
    calibration: Calibration,
    mapper: CoordinateMapper,
    layer_count: usize,
    active_layer: Option<usize>,
    seen_switches: u64,
    drag: KneeDrag,
}

impl KneeDispatcher {
    pub fn new(calibration: Calibration, layer_count: usize) -> Self {
        Self {
            calibration,
            mapper: CoordinateMapper::new(calibration),
            layer_count,
            active_layer: None,
            seen_switches: 0,
            drag: KneeDrag::new(),
        }
    }

    /// Layer currently selected in the application.
    pub fn with_active_layer(mut self, layer: usize) -> Self {
        self.active_layer = Some(layer);
        self
    }

    pub fn set_layer_count(&mut self, layer_count: usize) {
        self.layer_count = layer_count;
    }

    pub fn active_layer(&self) -> Option<usize> {
        self.active_layer
    }

    pub fn drag(&self) -> &KneeDrag {
        &self.drag
    }

    /// Grab at the current knee position (mouse pressed).
    pub fn press(&mut self) -> bool {
        self.drag.press()
    }

    /// Drop the grabbed point (mouse released).
    pub fn release(&mut self) {
        self.drag.release();
    }

    pub fn dispatch(&mut self, event: &KneeEvent) -> KneeCommand {
        if event.mode_switches != self.seen_switches {
            self.seen_switches = event.mode_switches;
            self.drag.release();
            return KneeCommand::ModeChanged {
                mode: event.mode,
                canvas_mode: event.mode.canvas_mode(),
            };
        }
        if event.position.is_sentinel() {
            return KneeCommand::Idle;
        }

        let position = &event.position;
        match event.mode {
            OperationMode::None | OperationMode::DrawingPoints => KneeCommand::Idle,
            OperationMode::MovingPoints => {
                self.drag.update(self.mapper.map(position, TargetRange::CANVAS));
                match self.drag.offset() {
                    Some(offset) => KneeCommand::MovePoint(offset),
                    None => self
                        .drag
                        .current()
                        .map_or(KneeCommand::Idle, KneeCommand::PointerAt),
                }
            }
            OperationMode::SwitchLayer => {
                let angle = self.mapper.map_x(position.x, TargetRange::ANGLE);
                let layer = layer_for_angle(angle, self.layer_count);
                if self.layer_count == 0 || self.active_layer == Some(layer) {
                    return KneeCommand::Idle;
                }
                self.active_layer = Some(layer);
                KneeCommand::SelectLayer(layer)
            }
            OperationMode::ColorPicker => {
                KneeCommand::PickColor(HsvColor::from_knee(position, &self.calibration))
            }
        }
    }
}
