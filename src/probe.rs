//! Probe selection
//!
//! Opens either the USB probe or the simulated one depending on `--probe`,
//! and hands the commands a `dyn CalibProbe`.

use icepick_core::probe::CalibProbe;
use icepick_dummy::{DummyProbe, DummySupply};

use crate::cli::ProbeKind;

/// An opened probe
pub enum ProbeHandle {
    /// USB hardware
    #[cfg(feature = "usb")]
    Usb(icepick_usb::Icepick),
    /// Simulated probe
    Dummy(DummyProbe),
}

impl ProbeHandle {
    /// Borrow the probe as a trait object
    pub fn as_probe_mut(&mut self) -> &mut dyn CalibProbe {
        match self {
            #[cfg(feature = "usb")]
            ProbeHandle::Usb(p) => p,
            ProbeHandle::Dummy(p) => p,
        }
    }

    /// Bench supply wired to the simulated sense input, if simulated
    pub fn dummy_supply(&self) -> Option<DummySupply> {
        match self {
            ProbeHandle::Dummy(p) => Some(p.supply()),
            #[cfg(feature = "usb")]
            _ => None,
        }
    }

    /// Serial number used to name result files
    pub fn serial(&self) -> String {
        let serial = match self {
            #[cfg(feature = "usb")]
            ProbeHandle::Usb(p) => p.serial(),
            ProbeHandle::Dummy(p) => p.serial(),
        };
        serial.unwrap_or_else(|| "unknown".to_string())
    }
}

/// Open the probe selected on the command line
pub fn open_probe(
    kind: ProbeKind,
    serial: Option<&str>,
) -> Result<ProbeHandle, Box<dyn std::error::Error>> {
    match kind {
        ProbeKind::Dummy => {
            log::info!("Using simulated iCEpick");
            Ok(ProbeHandle::Dummy(DummyProbe::new_default()))
        }
        #[cfg(feature = "usb")]
        ProbeKind::Usb => {
            let config = icepick_usb::IcepickConfig {
                serial: serial.map(str::to_string),
                index: None,
            };
            let probe = icepick_usb::Icepick::open_with_config(&config).map_err(|e| {
                format!(
                    "Failed to open iCEpick: {}\nMake sure the calibration firmware is running and you have permissions.",
                    e
                )
            })?;
            Ok(ProbeHandle::Usb(probe))
        }
        #[cfg(not(feature = "usb"))]
        ProbeKind::Usb => {
            let _ = serial;
            Err("USB support not compiled in, use --probe dummy".into())
        }
    }
}
