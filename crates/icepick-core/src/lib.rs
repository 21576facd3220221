//! icepick-core - Core library for iCEpick bench calibration
//!
//! This crate holds everything that does not touch USB directly:
//!
//! - [`frame`] - synchronisation and decoding of the multiplexed
//!   charge/discharge sample stream
//! - [`model`] - RC charging model mapping counter values to voltages
//! - [`channel`] - the sense multiplexer inputs
//! - [`probe`] - the [`CalibProbe`](probe::CalibProbe) trait implemented by
//!   the USB driver and the dummy probe, plus wire-format helpers
//! - [`sweep`] - calibration procedures generic over a probe
//! - [`analysis`] - per-channel statistics and fit residuals
//! - [`config`] - TOML calibration configuration
//!
//! # Example
//!
//! ```
//! use icepick_core::frame;
//!
//! let capture = [0u8; 16];
//! // Not enough data for a sync window
//! assert_eq!(frame::find_sync(&capture), None);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod analysis;
pub mod channel;
pub mod config;
pub mod error;
pub mod fixed;
pub mod frame;
pub mod model;
pub mod probe;
pub mod sweep;

pub use error::{Error, Result};
