//! TOML calibration configuration
//!
//! All sections and keys are optional:
//!
//! ```toml
//! [model]
//! supply_voltage = 3.3
//! divider = 2.0
//! charge = { k = 47558, offset = 520 }
//! discharge = { k = 49019, offset = -2050 }
//!
//! [sweep]
//! poll_timeout_ms = 5000
//! sense_count = 20
//!
//! [supply]
//! address = "dp832:5555"
//! channel = 3
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::RcModel;
use crate::sweep::SweepConfig;

/// Bench power supply connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupplyConfig {
    /// `host:port` of the SCPI socket
    pub address: String,
    /// Output channel driving the sense input
    pub channel: u8,
}

impl Default for SupplyConfig {
    fn default() -> Self {
        Self {
            address: "dp832:5555".into(),
            channel: 3,
        }
    }
}

/// Complete calibration configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CalibConfig {
    /// RC model constants
    pub model: RcModel,
    /// Sweep and polling parameters
    pub sweep: SweepConfig,
    /// Bench supply
    pub supply: SupplyConfig,
}

impl CalibConfig {
    /// Parse a configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load a configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Load `path` if given, defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                log::debug!("Loading configuration from {}", path.display());
                Self::from_toml_file(path)
            }
            None => Ok(Self::default()),
        }
    }
}
