// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Pipeline configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! micro_batch_size = 4
//! devices = ["gpu:0", "gpu:1", "cpu"]
//! output_device = "cpu"
//! schedule = "overlapped"
//! max_in_flight = 8
//! enable_profiling = true
//! ```

use crate::{PipelineError, Schedule};
use std::path::Path;
use tensor_core::Device;

/// Configuration for a [`crate::PipelineParallel`] instance.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PipelineConfig {
    /// Rows per micro-batch. Must divide every full batch exactly.
    pub micro_batch_size: usize,
    /// One device per stage, in stage order (e.g. `"gpu:0"`, `"cpu"`).
    pub devices: Vec<String>,
    /// Device the full-batch forward output is collected on.
    #[serde(default = "default_output_device")]
    pub output_device: String,
    /// Conveyor schedule: `"overlapped"` or `"sequential"`.
    #[serde(default = "default_schedule")]
    pub schedule: String,
    /// Upper bound on pending forward records per stage.
    pub max_in_flight: Option<usize>,
    /// Whether to collect per-stage timing metrics.
    #[serde(default = "default_true")]
    pub enable_profiling: bool,
}

fn default_output_device() -> String {
    "cpu".to_string()
}

fn default_schedule() -> String {
    "overlapped".to_string()
}

fn default_true() -> bool {
    true
}

impl PipelineConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::ConfigError(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, PipelineError> {
        toml::from_str(toml_str)
            .map_err(|e| PipelineError::ConfigError(format!("TOML parse error: {e}")))
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, PipelineError> {
        toml::to_string_pretty(self)
            .map_err(|e| PipelineError::ConfigError(format!("TOML serialise error: {e}")))
    }

    /// Parses the per-stage device list.
    pub fn parse_devices(&self) -> Result<Vec<Device>, PipelineError> {
        self.devices.iter().map(|d| parse_device(d)).collect()
    }

    /// Parses the output device.
    pub fn parse_output_device(&self) -> Result<Device, PipelineError> {
        parse_device(&self.output_device)
    }

    /// Parses the schedule name.
    pub fn parse_schedule(&self) -> Result<Schedule, PipelineError> {
        match self.schedule.to_lowercase().as_str() {
            "sequential" => Ok(Schedule::Sequential),
            "overlapped" | "wavefront" => Ok(Schedule::Overlapped),
            other => Err(PipelineError::ConfigError(format!(
                "unknown schedule '{other}'; expected 'sequential' or 'overlapped'"
            ))),
        }
    }

    /// Checks every field without building anything.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.micro_batch_size == 0 {
            return Err(PipelineError::ConfigError(
                "micro_batch_size must be positive".into(),
            ));
        }
        if self.devices.is_empty() {
            return Err(PipelineError::ConfigError(
                "at least one device is required".into(),
            ));
        }
        if self.max_in_flight == Some(0) {
            return Err(PipelineError::ConfigError(
                "max_in_flight must be positive".into(),
            ));
        }
        self.parse_devices()?;
        self.parse_output_device()?;
        self.parse_schedule()?;
        Ok(())
    }
}

fn parse_device(s: &str) -> Result<Device, PipelineError> {
    s.parse::<Device>()
        .map_err(|e| PipelineError::ConfigError(format!("invalid device: {e}")))
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            micro_batch_size: 4,
            devices: vec!["cpu".to_string()],
            output_device: default_output_device(),
            schedule: default_schedule(),
            max_in_flight: None,
            enable_profiling: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let c = PipelineConfig::default();
        assert_eq!(c.micro_batch_size, 4);
        assert_eq!(c.parse_schedule().unwrap(), Schedule::Overlapped);
        assert!(c.enable_profiling);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let toml = r#"
micro_batch_size = 2
devices = ["gpu:0", "GPU:1", "cpu"]
output_device = "cpu"
schedule = "sequential"
max_in_flight = 8
enable_profiling = false
"#;
        let c = PipelineConfig::from_toml(toml).unwrap();
        assert_eq!(c.micro_batch_size, 2);
        assert_eq!(
            c.parse_devices().unwrap(),
            vec![Device::Gpu(0), Device::Gpu(1), Device::Cpu]
        );
        assert_eq!(c.parse_schedule().unwrap(), Schedule::Sequential);
        assert_eq!(c.max_in_flight, Some(8));
        assert!(!c.enable_profiling);
    }

    #[test]
    fn test_defaults_applied() {
        let c = PipelineConfig::from_toml("micro_batch_size = 1\ndevices = [\"cpu\"]\n").unwrap();
        assert_eq!(c.output_device, "cpu");
        assert_eq!(c.schedule, "overlapped");
        assert_eq!(c.max_in_flight, None);
        assert!(c.enable_profiling);
    }

    #[test]
    fn test_to_toml_roundtrip() {
        let c = PipelineConfig {
            devices: vec!["gpu:0".into(), "gpu:1".into()],
            max_in_flight: Some(4),
            ..Default::default()
        };
        let back = PipelineConfig::from_toml(&c.to_toml().unwrap()).unwrap();
        assert_eq!(back.devices, c.devices);
        assert_eq!(back.max_in_flight, Some(4));
    }

    #[test]
    fn test_invalid_values() {
        let bad_device = PipelineConfig {
            devices: vec!["tpu:0".into()],
            ..Default::default()
        };
        assert!(matches!(
            bad_device.validate(),
            Err(PipelineError::ConfigError(_))
        ));

        let zero_mb = PipelineConfig {
            micro_batch_size: 0,
            ..Default::default()
        };
        assert!(zero_mb.validate().is_err());

        let no_devices = PipelineConfig {
            devices: vec![],
            ..Default::default()
        };
        assert!(no_devices.validate().is_err());

        let bad_schedule = PipelineConfig {
            schedule: "round-robin".into(),
            ..Default::default()
        };
        assert!(bad_schedule.parse_schedule().is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = PipelineConfig::from_file(Path::new("/nonexistent/pipeline.toml")).unwrap_err();
        assert!(err.to_string().contains("cannot read config"));
    }
}
