//! Background sampling loop.
//!
//! The loop owns the sensor link on a dedicated thread: it attaches,
//! calibrates, then publishes one [`KneeEvent`] per tick into a single-slot
//! watch channel. Consumers always see the latest event; older ones are
//! overwritten, never queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;

use super::pipeline::SensorPipeline;
use crate::calibration::{
    Calibration, CalibrationConfig, Calibrator, CoordinateMapper, MappedPosition, TargetRange,
};
use crate::estimation::{EstimatorConfig, PositionEstimate, PositionEstimator};
use crate::modes::{ModeCycle, ModeSwitchDetector, OperationMode};
use crate::sensor::{LineSource, SensorError, SensorFrameReader, DEFAULT_WARMUP_LINES};

/// Target tick period of the reference device.
pub const DEFAULT_SAMPLE_PERIOD_MS: u64 = 10;

/// Configuration for the sampling loop.
#[derive(Debug, Clone)]
pub struct SamplingConfig {
    /// Tick period (milliseconds).
    pub period_ms: u64,
    /// Lines dropped right after the link opens.
    pub warmup_lines: usize,
    pub estimator: EstimatorConfig,
    pub calibration: CalibrationConfig,
    /// Reuse a known calibration instead of running one.
    pub preset_calibration: Option<Calibration>,
    /// Range every event is mapped into, if any.
    pub target_range: Option<TargetRange>,
    pub initial_mode: OperationMode,
    pub mode_cycle: ModeCycle,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            period_ms: DEFAULT_SAMPLE_PERIOD_MS,
            warmup_lines: DEFAULT_WARMUP_LINES,
            estimator: EstimatorConfig::default(),
            calibration: CalibrationConfig::default(),
            preset_calibration: None,
            target_range: None,
            initial_mode: OperationMode::DrawingPoints,
            mode_cycle: ModeCycle::default(),
        }
    }
}

impl SamplingConfig {
    /// Set the tick period.
    pub fn with_period(mut self, ms: u64) -> Self {
        self.period_ms = ms;
        self
    }

    pub fn with_warmup_lines(mut self, lines: usize) -> Self {
        self.warmup_lines = lines;
        self
    }

    pub fn with_estimator(mut self, estimator: EstimatorConfig) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_calibration(mut self, calibration: CalibrationConfig) -> Self {
        self.calibration = calibration;
        self
    }

    /// Skip the calibration run and use these bounds.
    pub fn with_preset_calibration(mut self, calibration: Calibration) -> Self {
        self.preset_calibration = Some(calibration);
        self
    }

    pub fn with_target_range(mut self, range: TargetRange) -> Self {
        self.target_range = Some(range);
        self
    }

    pub fn with_initial_mode(mut self, mode: OperationMode) -> Self {
        self.initial_mode = mode;
        self
    }

    pub fn with_mode_cycle(mut self, cycle: ModeCycle) -> Self {
        self.mode_cycle = cycle;
        self
    }

    fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms.max(1))
    }
}

/// One tick of the sampling loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KneeEvent {
    /// 1-based tick counter since calibration finished.
    pub seq: u64,
    pub position: PositionEstimate,
    /// `position` in the configured target range; absent for the sentinel.
    pub mapped: Option<MappedPosition>,
    /// Mode after this tick was observed.
    pub mode: OperationMode,
    /// Whether this tick caused the mode change.
    pub mode_switched: bool,
    /// Total mode changes so far. Lets a consumer that skipped events
    /// notice switches it never saw.
    pub mode_switches: u64,
}

/// Lifecycle of the sensor link as seen by consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkStatus {
    Connecting,
    Calibrating,
    Live(Calibration),
    /// The link failed; the reason is kept for display.
    Disabled(String),
    Stopped,
}

impl LinkStatus {
    /// Whether the loop has ended and no further events will arrive.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LinkStatus::Disabled(_) | LinkStatus::Stopped)
    }
}

/// Sampling errors.
#[derive(Error, Debug)]
pub enum SamplingError {
    #[error("Sensor link disabled: {0}")]
    Disabled(String),
    #[error("Sampling stopped")]
    Stopped,
    #[error("Failed to start sampling thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Sampling thread panicked")]
    Panicked,
}

/// Handle for observing and controlling a running [`SamplingLoop`].
///
/// Dropping the handle stops the loop without waiting for it.
pub struct SamplingHandle {
    events: watch::Receiver<Option<KneeEvent>>,
    status: watch::Receiver<LinkStatus>,
    /// Stop request, shared with the frame reader.
    cancel: Arc<AtomicBool>,
    /// Running flag.
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SamplingHandle {
    /// A new receiver of the latest event.
    pub fn subscribe(&self) -> watch::Receiver<Option<KneeEvent>> {
        self.events.clone()
    }

    /// A new receiver of link status changes.
    pub fn status_receiver(&self) -> watch::Receiver<LinkStatus> {
        self.status.clone()
    }

    pub fn status(&self) -> LinkStatus {
        self.status.borrow().clone()
    }

    /// Most recent event, if any tick has happened yet.
    pub fn latest(&self) -> Option<KneeEvent> {
        *self.events.borrow()
    }

    /// Wait until calibration finishes.
    ///
    /// Fails if the link is disabled or the loop stops first.
    pub async fn wait_live(&self) -> Result<Calibration, SamplingError> {
        let mut status = self.status.clone();
        loop {
            let current = status.borrow_and_update().clone();
            match current {
                LinkStatus::Live(calibration) => return Ok(calibration),
                LinkStatus::Disabled(reason) => return Err(SamplingError::Disabled(reason)),
                LinkStatus::Stopped => return Err(SamplingError::Stopped),
                LinkStatus::Connecting | LinkStatus::Calibrating => {}
            }
            if status.changed().await.is_err() {
                return Err(SamplingError::Stopped);
            }
        }
    }

    /// Wait until the loop ends and return its final status.
    pub async fn finished(&self) -> LinkStatus {
        let mut status = self.status.clone();
        loop {
            let current = status.borrow_and_update().clone();
            if current.is_terminal() {
                return current;
            }
            if status.changed().await.is_err() {
                return status.borrow().clone();
            }
        }
    }

    /// Ask the loop to stop. Takes effect within one link read timeout.
    pub fn stop(&self) {
        tracing::info!("Sampling loop stopping...");
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Check if the loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the loop and wait for its thread to exit.
    pub fn join(mut self) -> Result<(), SamplingError> {
        self.stop();
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| SamplingError::Panicked),
            None => Ok(()),
        }
    }
}

impl Drop for SamplingHandle {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
    }
}

/// Runs attach, calibration and the periodic sampling on its own thread.
///
/// # Example
/// ```rust,no_run
/// use std::time::Duration;
/// use knee_control::sampling::{SamplingConfig, SamplingLoop};
/// use knee_control::sensor::SerialLink;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let handle = SamplingLoop::new(SamplingConfig::default())
///     .spawn(|| SerialLink::open("/dev/ttyACM0", 460_800, Duration::from_millis(100)))?;
/// let calibration = handle.wait_live().await?;
/// println!("calibrated: {:?}", calibration);
/// let mut events = handle.subscribe();
/// while events.changed().await.is_ok() {
///     if let Some(event) = *events.borrow() {
///         println!("{:?}", event);
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct SamplingLoop {
    config: SamplingConfig,
}

impl SamplingLoop {
    pub fn new(config: SamplingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SamplingConfig {
        &self.config
    }

    /// Start the loop. `open` runs on the sampling thread; its failure
    /// leaves the loop in [`LinkStatus::Disabled`] instead of erroring here.
    pub fn spawn<S, F>(self, open: F) -> Result<SamplingHandle, SamplingError>
    where
        S: LineSource + 'static,
        F: FnOnce() -> Result<S, SensorError> + Send + 'static,
    {
        let (event_tx, events) = watch::channel(None);
        let (status_tx, status) = watch::channel(LinkStatus::Connecting);
        let cancel = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));

        let worker = Worker {
            config: self.config,
            cancel: cancel.clone(),
            event_tx,
            status_tx,
        };
        let thread_running = running.clone();
        let thread = thread::Builder::new()
            .name("knee-sampler".to_string())
            .spawn(move || {
                worker.run(open);
                thread_running.store(false, Ordering::SeqCst);
            })?;

        Ok(SamplingHandle {
            events,
            status,
            cancel,
            running,
            thread: Some(thread),
        })
    }
}

struct Worker {
    config: SamplingConfig,
    cancel: Arc<AtomicBool>,
    event_tx: watch::Sender<Option<KneeEvent>>,
    status_tx: watch::Sender<LinkStatus>,
}

impl Worker {
    fn run<S, F>(self, open: F)
    where
        S: LineSource,
        F: FnOnce() -> Result<S, SensorError>,
    {
        let final_status = match self.attach_and_sample(open) {
            Ok(()) => LinkStatus::Stopped,
            Err(_) if self.cancelled() => LinkStatus::Stopped,
            Err(reason) => {
                tracing::error!("Sensor link disabled: {}", reason);
                LinkStatus::Disabled(reason)
            }
        };
        self.status_tx.send_replace(final_status);
        tracing::info!("Sampling loop stopped");
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn attach_and_sample<S, F>(&self, open: F) -> Result<(), String>
    where
        S: LineSource,
        F: FnOnce() -> Result<S, SensorError>,
    {
        let source = open().map_err(|e| e.to_string())?;
        let mut reader = SensorFrameReader::new(source, self.config.estimator.sensor_count)
            .with_cancel(self.cancel.clone());
        reader
            .discard_lines(self.config.warmup_lines)
            .map_err(|e| e.to_string())?;

        let mut pipeline =
            SensorPipeline::new(reader, PositionEstimator::new(self.config.estimator));

        let calibration = match self.config.preset_calibration {
            Some(calibration) => {
                tracing::info!("Using stored calibration");
                calibration
            }
            None => {
                self.status_tx.send_replace(LinkStatus::Calibrating);
                Calibrator::new(self.config.calibration)
                    .calibrate(&mut pipeline)
                    .map_err(|e| e.to_string())?
            }
        };
        pipeline.apply_calibration(&calibration);
        self.status_tx.send_replace(LinkStatus::Live(calibration));

        self.sample(&mut pipeline, CoordinateMapper::new(calibration))
    }

    fn sample<S: LineSource>(
        &self,
        pipeline: &mut SensorPipeline<S>,
        mapper: CoordinateMapper,
    ) -> Result<(), String> {
        let period = self.config.period();
        let mut detector = ModeSwitchDetector::new(self.config.initial_mode, self.config.mode_cycle);
        let mut seq = 0u64;
        let mut next_tick = Instant::now();

        tracing::info!("Sampling every {:?}", period);

        while !self.cancelled() {
            match pipeline.step() {
                Ok(position) => {
                    seq += 1;
                    let transition = detector.observe(&position);
                    let mapped = match self.config.target_range {
                        Some(range) if !position.is_sentinel() => {
                            Some(mapper.map(&position, range))
                        }
                        _ => None,
                    };
                    self.event_tx.send_replace(Some(KneeEvent {
                        seq,
                        position,
                        mapped,
                        mode: detector.mode(),
                        mode_switched: transition.is_some(),
                        mode_switches: detector.transitions(),
                    }));
                }
                Err(e) if !e.is_fatal() => {
                    tracing::warn!("Dropped frame: {}", e);
                }
                Err(e) => return Err(e.to_string()),
            }

            next_tick += period;
            let now = Instant::now();
            if next_tick > now {
                thread::sleep(next_tick - now);
            } else {
                // running late; don't try to catch up
                next_tick = now;
            }
        }

        Ok(())
    }
}
