//! Operation modes and the mode-switch gesture.

mod detector;

pub use detector::{ModeCycle, ModeSwitchDetector, ModeTransition, OperationMode};
