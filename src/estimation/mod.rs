//! Knee position estimation from raw sensor frames.

mod estimator;

pub use estimator::{
    is_sentinel, EstimatorConfig, EstimatorState, KneeSignal, PositionEstimate, PositionEstimator,
    DEFAULT_CENTROID_EPSILON, DEFAULT_EMA_ALPHA, DEFAULT_RETRACT_MARGIN, DEFAULT_SENSOR_RANGE,
    SENTINEL_Y,
};
