//! Sensor array transport and frame decoding.

mod frame;
mod link;
mod reader;

pub use frame::{FramingError, RawFrame, DEFAULT_SENSOR_COUNT};
pub use link::{LineSource, PortInfo, ReplaySource, SensorError, SerialLink, DEFAULT_BAUD_RATE};
pub use reader::{SensorFrameReader, DEFAULT_WARMUP_LINES};
