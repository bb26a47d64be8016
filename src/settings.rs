//! Persisted settings for the knee controller.
//! Stored in the platform-specific config directory via `directories::ProjectDirs`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::calibration::{Calibration, CalibrationConfig, CalibrationMargins};
use crate::estimation::EstimatorConfig;
use crate::modes::ModeCycle;
use crate::sampling::SamplingConfig;

/// Settings that can be saved and loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KneeSettings {
    /// Serial port of the sensor controller
    pub port: String,
    /// Serial baud rate
    pub baud_rate: u32,
    /// Serial read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Sensors per frame
    pub sensor_count: usize,
    /// Full-scale sensor reading
    pub sensor_range: f64,
    /// Lines discarded after opening the port
    pub warmup_lines: usize,
    /// Centroid softening term
    pub centroid_epsilon: f64,
    /// EMA smoothing factor
    pub ema_alpha: f64,
    /// Distance above calibrated y_max that means "retracted"
    pub retract_margin: f64,
    /// Estimates discarded before calibration sampling
    pub calibration_warmup: usize,
    /// Estimates averaged during calibration
    pub calibration_samples: usize,
    /// Calibration margins ("step", "canvas" or "custom")
    pub margin_preset: String,
    /// Custom margins, used when `margin_preset` is "custom"
    pub margin_x_below: f64,
    pub margin_x_above: f64,
    pub margin_y_below: f64,
    pub margin_y_above: f64,
    /// Sampling period in milliseconds
    pub sample_period_ms: u64,
    /// Mode transition table ("paint" or "draw-move")
    pub mode_cycle: String,
    /// Last saved calibration
    pub calibration: Option<Calibration>,
}

impl Default for KneeSettings {
    fn default() -> Self {
        let estimator = EstimatorConfig::default();
        let calibration = CalibrationConfig::default();
        let margins = CalibrationMargins::default();
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: crate::sensor::DEFAULT_BAUD_RATE,
            read_timeout_ms: 100,
            sensor_count: estimator.sensor_count,
            sensor_range: estimator.sensor_range,
            warmup_lines: crate::sensor::DEFAULT_WARMUP_LINES,
            centroid_epsilon: estimator.centroid_epsilon,
            ema_alpha: estimator.ema_alpha,
            retract_margin: estimator.retract_margin,
            calibration_warmup: calibration.warmup_count,
            calibration_samples: calibration.sample_count,
            margin_preset: "step".to_string(),
            margin_x_below: margins.x_below,
            margin_x_above: margins.x_above,
            margin_y_below: margins.y_below,
            margin_y_above: margins.y_above,
            sample_period_ms: crate::sampling::DEFAULT_SAMPLE_PERIOD_MS,
            mode_cycle: "paint".to_string(),
            calibration: None,
        }
    }
}

impl KneeSettings {
    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "kneecontrol", "knee-control")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the settings file path.
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("settings.json"))
    }

    /// Load settings from the config file, falling back to defaults.
    pub fn load() -> Self {
        Self::settings_path()
            .and_then(|path| fs::read_to_string(&path).ok())
            .map(|content| Self::from_json(&content))
            .unwrap_or_default()
    }

    /// Parse settings, backfilling fields an older file left zeroed.
    pub fn from_json(content: &str) -> Self {
        let defaults = Self::default();

        let mut loaded: Self = match serde_json::from_str(content) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Ignoring unreadable settings file: {}", e);
                return defaults;
            }
        };

        if loaded.port.is_empty() {
            loaded.port = defaults.port;
        }
        if loaded.baud_rate == 0 {
            loaded.baud_rate = defaults.baud_rate;
        }
        if loaded.read_timeout_ms == 0 {
            loaded.read_timeout_ms = defaults.read_timeout_ms;
        }
        if loaded.sensor_count == 0 {
            loaded.sensor_count = defaults.sensor_count;
        }
        if loaded.sensor_range <= 0.0 {
            loaded.sensor_range = defaults.sensor_range;
        }
        if loaded.calibration_samples == 0 {
            loaded.calibration_samples = defaults.calibration_samples;
        }
        if loaded.sample_period_ms == 0 {
            loaded.sample_period_ms = defaults.sample_period_ms;
        }
        if loaded.margin_preset.is_empty() {
            loaded.margin_preset = defaults.margin_preset;
        }
        if loaded.mode_cycle.is_empty() {
            loaded.mode_cycle = defaults.mode_cycle;
        }

        loaded
    }

    /// Save settings to the config file.
    pub fn save(&self) -> Result<PathBuf, String> {
        let dir = Self::config_dir().ok_or("Cannot determine config directory")?;

        fs::create_dir_all(&dir)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;

        let path = dir.join("settings.json");
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;

        fs::write(&path, content)
            .map_err(|e| format!("Failed to write settings file: {}", e))?;

        Ok(path)
    }

    /// Apply `KNEE_*` overrides. `lookup` is usually `std::env::var(..).ok()`.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("KNEE_PORT") {
            self.port = port;
        }
        if let Some(baud) = lookup("KNEE_BAUD") {
            match baud.parse() {
                Ok(baud) => self.baud_rate = baud,
                Err(_) => tracing::warn!("Ignoring KNEE_BAUD={}", baud),
            }
        }
        if let Some(period) = lookup("KNEE_SAMPLE_PERIOD_MS") {
            match period.parse() {
                Ok(period) => self.sample_period_ms = period,
                Err(_) => tracing::warn!("Ignoring KNEE_SAMPLE_PERIOD_MS={}", period),
            }
        }
        if let Some(preset) = lookup("KNEE_MARGINS") {
            self.margin_preset = preset;
        }
        if let Some(cycle) = lookup("KNEE_MODE_CYCLE") {
            self.mode_cycle = cycle;
        }
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Resolve the margin preset; unknown names fall back to step selection.
    pub fn margins(&self) -> CalibrationMargins {
        if self.margin_preset.eq_ignore_ascii_case("custom") {
            return CalibrationMargins::new(
                self.margin_x_below,
                self.margin_x_above,
                self.margin_y_below,
                self.margin_y_above,
            );
        }
        CalibrationMargins::preset(&self.margin_preset).unwrap_or_else(|| {
            tracing::warn!("Unknown margin preset '{}', using step", self.margin_preset);
            CalibrationMargins::STEP_SELECTION
        })
    }

    pub fn cycle(&self) -> ModeCycle {
        ModeCycle::from_name(&self.mode_cycle).unwrap_or_else(|| {
            tracing::warn!("Unknown mode cycle '{}', using paint", self.mode_cycle);
            ModeCycle::Paint
        })
    }

    pub fn estimator_config(&self) -> EstimatorConfig {
        EstimatorConfig::default()
            .with_sensor_count(self.sensor_count)
            .with_sensor_range(self.sensor_range)
            .with_centroid_epsilon(self.centroid_epsilon)
            .with_ema_alpha(self.ema_alpha)
            .with_retract_margin(self.retract_margin)
    }

    pub fn calibration_config(&self) -> CalibrationConfig {
        CalibrationConfig::default()
            .with_warmup_count(self.calibration_warmup)
            .with_sample_count(self.calibration_samples)
            .with_margins(self.margins())
    }

    pub fn sampling_config(&self) -> SamplingConfig {
        SamplingConfig::default()
            .with_period(self.sample_period_ms)
            .with_warmup_lines(self.warmup_lines)
            .with_estimator(self.estimator_config())
            .with_calibration(self.calibration_config())
            .with_mode_cycle(self.cycle())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_reference_rig() {
        let settings = KneeSettings::default();
        assert_eq!(settings.baud_rate, 460_800);
        assert_eq!(settings.sensor_count, 10);
        assert_eq!(settings.sample_period_ms, 10);
        assert_eq!(settings.margins(), CalibrationMargins::STEP_SELECTION);
        assert_eq!(settings.cycle(), ModeCycle::Paint);
    }

    #[test]
    fn test_from_json_backfills_missing_and_zeroed_fields() {
        let settings = KneeSettings::from_json(r#"{"port": "COM3", "baud_rate": 0}"#);
        assert_eq!(settings.port, "COM3");
        assert_eq!(settings.baud_rate, 460_800);
        assert_eq!(settings.ema_alpha, 0.7);
    }

    #[test]
    fn test_from_json_garbage_gives_defaults() {
        assert_eq!(KneeSettings::from_json("not json"), KneeSettings::default());
    }

    #[test]
    fn test_round_trip_keeps_calibration() {
        let settings = KneeSettings {
            calibration: Some(Calibration::default()),
            ..KneeSettings::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert_eq!(KneeSettings::from_json(&json), settings);
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("KNEE_PORT", "/dev/ttyUSB1"),
            ("KNEE_BAUD", "fast"),
            ("KNEE_SAMPLE_PERIOD_MS", "20"),
            ("KNEE_MARGINS", "canvas"),
            ("KNEE_MODE_CYCLE", "draw-move"),
        ]
        .into_iter()
        .collect();

        let mut settings = KneeSettings::default();
        settings.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.port, "/dev/ttyUSB1");
        assert_eq!(settings.baud_rate, 460_800);
        assert_eq!(settings.sample_period_ms, 20);
        assert_eq!(settings.margins(), CalibrationMargins::CANVAS);
        assert_eq!(settings.cycle(), ModeCycle::DrawMove);
    }

    #[test]
    fn test_custom_margins() {
        let settings = KneeSettings {
            margin_preset: "custom".to_string(),
            margin_x_below: 1.0,
            margin_x_above: 1.5,
            margin_y_below: 3.0,
            margin_y_above: 6.0,
            ..KneeSettings::default()
        };
        assert_eq!(settings.margins(), CalibrationMargins::new(1.0, 1.5, 3.0, 6.0));
    }

    #[test]
    fn test_sampling_config_from_settings() {
        let settings = KneeSettings {
            sample_period_ms: 25,
            calibration_samples: 5,
            margin_preset: "canvas".to_string(),
            ..KneeSettings::default()
        };
        let config = settings.sampling_config();
        assert_eq!(config.period_ms, 25);
        assert_eq!(config.calibration.sample_count, 5);
        assert_eq!(config.calibration.margins, CalibrationMargins::CANVAS);
        assert_eq!(config.estimator.sensor_count, 10);
    }
}
