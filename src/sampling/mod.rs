//! Periodic sampling of the knee position on a background thread.

mod pipeline;
mod sampler;

pub use pipeline::SensorPipeline;
pub use sampler::{
    KneeEvent, LinkStatus, SamplingConfig, SamplingError, SamplingHandle, SamplingLoop,
    DEFAULT_SAMPLE_PERIOD_MS,
};
