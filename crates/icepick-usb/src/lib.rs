//! icepick-usb - USB driver for the iCEpick FPGA probe
//!
//! Two USB personalities are supported:
//!
//! - [`Icepick`]: the calibration firmware (VID:1D50 PID:6149). All
//!   operations are vendor control requests addressed to the device; it
//!   implements [`CalibProbe`](icepick_core::probe::CalibProbe) so every sweep
//!   in `icepick_core::sweep` can run against real hardware.
//! - [`IcepickDfu`]: the DFU bootloader (VID:1D50 PID:6148), whose vendor
//!   interface passes SPI transfers through to the configuration flash.
//!
//! # Example
//!
//! ```no_run
//! use icepick_core::channel::{SenseChannel, SenseChannels};
//! use icepick_core::probe::CalibProbe;
//! use icepick_core::sweep::{sense_collect, SweepConfig};
//! use icepick_usb::Icepick;
//!
//! let mut probe = Icepick::open()?;
//! let results = sense_collect(&mut probe, SenseChannels::V3V3, 20, &SweepConfig::default())?;
//! println!("3V3 mean: {:?}", results.mean(SenseChannel::V3v3));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod device;
mod dfu;
mod error;
mod protocol;

pub use device::{parse_options, Icepick, IcepickConfig, IcepickDeviceInfo};
pub use dfu::IcepickDfu;
pub use error::{IcepickError, Result};
pub use protocol::{ICEPICK_DFU_PID, ICEPICK_PID, ICEPICK_VID};
