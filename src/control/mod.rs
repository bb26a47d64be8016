//! Application-level controls derived from knee events.
//!
//! These adapters reduce the event stream to the inputs the reference
//! applications need: step and layer selection, pen color and
//! knee-assisted dragging.

mod color;
mod dispatcher;
mod drag;
mod selector;

pub use color::HsvColor;
pub use dispatcher::{KneeCommand, KneeDispatcher};
pub use drag::{KneeDrag, PointerOffset};
pub use selector::{layer_for_angle, Orientation, StepSelector};
