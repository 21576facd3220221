//! CLI command implementations
//!
//! Calibration sweeps and GPIO access run against any `CalibProbe`, so they
//! work with the simulated probe as well as with hardware. `flash-sr` talks
//! to the bootloader and needs USB support.

pub mod calib;
pub mod capture;
pub mod decode;
#[cfg(feature = "usb")]
pub mod flash_sr;
pub mod gpio;
mod list;

pub use list::list_probes;
