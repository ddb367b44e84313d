//! Receiver capability descriptor consulted by the planner.
//!
//! Descriptors are plain data. They can be built in code, taken from
//! [`DeviceCapability::default`], or loaded from a TOML file:
//!
//! ```toml
//! full_bw = 125e6
//! usable_bw = 100e6
//! min_tunable = 50e6
//! max_tunable = 20e9
//! min_decimation = 4
//! max_decimation = 1024
//! decimated_usable = 0.8
//! dc_offset_bw = 240e3
//! tuning_resolution = 100e3
//! max_capture_size = 32768
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, SweepError};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceCapability {
    /// Full width of the IF filter in Hz.
    pub full_bw: f64,
    /// Portion of the filter free of roll-off distortion in Hz.
    pub usable_bw: f64,
    /// Lowest centre frequency available for arbitrary tuning.
    pub min_tunable: f64,
    /// Highest centre frequency available for arbitrary tuning.
    pub max_tunable: f64,
    /// Lowest decimation above 1. No decimation is always available.
    pub min_decimation: u32,
    /// Highest decimation; only powers of two up to it are used.
    pub max_decimation: u32,
    /// Fraction of decimated output containing usable data.
    pub decimated_usable: f64,
    /// Band around the centre frequency spoiled by DC offset.
    pub dc_offset_bw: f64,
    /// Smallest tuning increment for centre frequency and step.
    pub tuning_resolution: f64,
    /// Largest number of samples a single capture may request.
    pub max_capture_size: u32,
}

impl Default for DeviceCapability {
    fn default() -> Self {
        Self {
            full_bw: 125e6,
            usable_bw: 100e6,
            min_tunable: 50e6,
            max_tunable: 20e9,
            min_decimation: 4,
            max_decimation: 1024,
            decimated_usable: 0.8,
            dc_offset_bw: 240e3,
            tuning_resolution: 100e3,
            max_capture_size: 32 * 1024,
        }
    }
}

impl DeviceCapability {
    /// Parse and validate a descriptor from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let capability: Self = toml::from_str(text)?;
        capability.validate()?;
        Ok(capability)
    }

    /// Read, parse and validate a descriptor file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Reject descriptors the planner cannot work with.
    pub fn validate(&self) -> Result<()> {
        let finite = [
            self.full_bw,
            self.usable_bw,
            self.min_tunable,
            self.max_tunable,
            self.decimated_usable,
            self.dc_offset_bw,
            self.tuning_resolution,
        ];
        if finite.iter().any(|v| !v.is_finite()) {
            return Err(SweepError::configuration(
                "capability values must be finite",
            ));
        }
        if self.full_bw <= 0.0 || self.usable_bw <= 0.0 {
            return Err(SweepError::configuration("bandwidths must be positive"));
        }
        if self.usable_bw > self.full_bw {
            return Err(SweepError::configuration(format!(
                "usable bandwidth {} exceeds filter bandwidth {}",
                self.usable_bw, self.full_bw
            )));
        }
        if self.dc_offset_bw < 0.0 || self.dc_offset_bw >= self.usable_bw {
            return Err(SweepError::configuration(format!(
                "DC offset width {} must lie in [0, usable bandwidth)",
                self.dc_offset_bw
            )));
        }
        if self.min_tunable >= self.max_tunable {
            return Err(SweepError::configuration(format!(
                "tunable range [{}, {}] is empty",
                self.min_tunable, self.max_tunable
            )));
        }
        if self.min_decimation == 0 || self.max_decimation < self.min_decimation {
            return Err(SweepError::configuration(format!(
                "decimation bounds [{}, {}] are invalid",
                self.min_decimation, self.max_decimation
            )));
        }
        if !(self.decimated_usable > 0.0 && self.decimated_usable <= 1.0) {
            return Err(SweepError::configuration(
                "decimated usable fraction must lie in (0, 1]",
            ));
        }
        if self.tuning_resolution <= 0.0 {
            return Err(SweepError::configuration(
                "tuning resolution must be positive",
            ));
        }
        if self.max_capture_size == 0 {
            return Err(SweepError::configuration(
                "maximum capture size must be positive",
            ));
        }
        Ok(())
    }

    /// Largest power of two not above `max_decimation`.
    pub fn max_decimation_pow2(&self) -> u32 {
        match self.max_decimation {
            0 => 1,
            d => 1 << (u32::BITS - 1 - d.leading_zeros()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const DESCRIPTOR: &str = r#"
        full_bw = 125e6
        usable_bw = 100e6
        min_tunable = 50e6
        max_tunable = 20e9
        min_decimation = 1
        max_decimation = 4
        decimated_usable = 0.5
        dc_offset_bw = 0.0
        tuning_resolution = 100e3
        max_capture_size = 32768
    "#;

    #[test]
    fn test_default_is_valid() {
        assert!(DeviceCapability::default().validate().is_ok());
    }

    #[test]
    fn test_parse_descriptor() {
        let capability = DeviceCapability::from_toml_str(DESCRIPTOR).unwrap();
        assert_eq!(capability.full_bw, 125e6);
        assert_eq!(capability.max_decimation, 4);
        assert_eq!(capability.dc_offset_bw, 0.0);
    }

    #[test]
    fn test_shipped_descriptor_matches_default() {
        let shipped = include_str!("../../sweepiq/devices/default.toml");
        let capability = DeviceCapability::from_toml_str(shipped).unwrap();
        assert_eq!(capability, DeviceCapability::default());
    }

    #[test]
    fn test_load_descriptor_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(DESCRIPTOR.as_bytes()).unwrap();
        file.flush().unwrap();

        let capability = DeviceCapability::load(file.path()).unwrap();
        assert_eq!(capability.tuning_resolution, 100e3);
    }

    #[test]
    fn test_load_missing_file() {
        let result = DeviceCapability::load("/nonexistent/device.toml");
        assert!(matches!(result, Err(SweepError::Io(_))));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let text = format!("{DESCRIPTOR}\nbogus = 1\n");
        let result = DeviceCapability::from_toml_str(&text);
        assert!(matches!(result, Err(SweepError::Capability(_))));
    }

    #[test]
    fn test_inconsistent_descriptor_rejected() {
        let capability = DeviceCapability {
            usable_bw: 150e6,
            ..DeviceCapability::default()
        };
        assert!(matches!(
            capability.validate(),
            Err(SweepError::Configuration(_))
        ));

        let capability = DeviceCapability {
            min_decimation: 8,
            max_decimation: 4,
            ..DeviceCapability::default()
        };
        assert!(capability.validate().is_err());
    }

    #[test]
    fn test_max_decimation_pow2() {
        let mut capability = DeviceCapability::default();
        assert_eq!(capability.max_decimation_pow2(), 1024);
        capability.max_decimation = 1000;
        assert_eq!(capability.max_decimation_pow2(), 512);
        capability.max_decimation = 1;
        assert_eq!(capability.max_decimation_pow2(), 1);
    }
}
