// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Device placement identifiers.

use crate::TensorError;
use std::fmt;
use std::str::FromStr;

/// Identifies the execution device a tensor is placed on.
///
/// Serialised as its string form (`"cpu"`, `"gpu:1"`) so it reads naturally
/// in configuration files.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub enum Device {
    /// Host memory.
    #[default]
    Cpu,
    /// An accelerator, identified by ordinal.
    Gpu(u32),
}

impl Device {
    /// Returns `true` for [`Device::Cpu`].
    pub fn is_cpu(self) -> bool {
        matches!(self, Device::Cpu)
    }

    /// Returns the accelerator ordinal, or `None` for the host.
    pub fn ordinal(self) -> Option<u32> {
        match self {
            Device::Cpu => None,
            Device::Gpu(n) => Some(n),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Gpu(n) => write!(f, "gpu:{n}"),
        }
    }
}

impl FromStr for Device {
    type Err = TensorError;

    /// Accepts `cpu`, `gpu:N` and the alias `cuda:N` (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        if lower == "cpu" {
            return Ok(Device::Cpu);
        }
        let ordinal = lower
            .strip_prefix("gpu:")
            .or_else(|| lower.strip_prefix("cuda:"))
            .and_then(|n| n.parse::<u32>().ok());
        ordinal
            .map(Device::Gpu)
            .ok_or_else(|| TensorError::InvalidDevice(s.to_string()))
    }
}

impl TryFrom<String> for Device {
    type Error = TensorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Device> for String {
    fn from(device: Device) -> Self {
        device.to_string()
    }
}
