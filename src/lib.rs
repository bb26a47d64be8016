// Copyright 2025 Knee Control contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Knee Control
//!
//! Hands-free input from a knee: a row of distance sensors under the desk
//! streams frames over a serial link, and this library turns them into a
//! smoothed, calibrated knee position plus a gesture-driven operation mode.
//!
//! The pipeline runs on a background thread:
//!
//! 1. [`sensor`] reads newline-terminated frames, always the freshest one.
//! 2. [`estimation`] computes a weighted centroid and smooths it.
//! 3. [`calibration`] finds the user's resting position and maps positions
//!    into application ranges.
//! 4. [`modes`] turns "leg pulled back" into mode switches.
//! 5. [`sampling`] ties it together at a fixed period and publishes the
//!    latest [`KneeEvent`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use knee_control::{KneeDispatcher, SamplingConfig, SamplingLoop, SerialLink, TargetRange};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SamplingConfig::default().with_target_range(TargetRange::CANVAS);
//!     let handle = SamplingLoop::new(config)
//!         .spawn(|| SerialLink::open("/dev/ttyACM0", 460_800, Duration::from_millis(100)))?;
//!
//!     let calibration = handle.wait_live().await?;
//!     let mut dispatcher = KneeDispatcher::new(calibration, 3);
//!     let mut events = handle.subscribe();
//!
//!     while events.changed().await.is_ok() {
//!         let event = *events.borrow_and_update();
//!         if let Some(event) = event {
//!             println!("{:?}", dispatcher.dispatch(&event));
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod calibration;
pub mod control;
pub mod estimation;
pub mod modes;
pub mod sampling;
pub mod sensor;
pub mod settings;

pub use calibration::{
    Calibration, CalibrationConfig, CalibrationError, CalibrationMargins, Calibrator,
    CoordinateMapper, MappedPosition, TargetRange,
};
pub use control::{HsvColor, KneeCommand, KneeDispatcher, KneeDrag, Orientation, StepSelector};
pub use estimation::{EstimatorConfig, KneeSignal, PositionEstimate, PositionEstimator};
pub use modes::{ModeCycle, ModeSwitchDetector, OperationMode};
pub use sampling::{
    KneeEvent, LinkStatus, SamplingConfig, SamplingError, SamplingHandle, SamplingLoop,
    SensorPipeline,
};
pub use sensor::{FramingError, RawFrame, ReplaySource, SensorError, SensorFrameReader, SerialLink};
pub use settings::KneeSettings;
