//! iCEpick calibration firmware device implementation
//!
//! This module provides the `Icepick` struct that drives the calibration
//! firmware through vendor control requests and implements `CalibProbe`.

use nusb::transfer::{ControlIn, ControlOut, ControlType, Recipient};
use nusb::{Interface, MaybeFuture};

use icepick_core::channel::SenseChannels;
use icepick_core::error::Result as CoreResult;
use icepick_core::probe::{
    check_sense_request, split_clock_duration, CalibProbe, ClockResults, SenseResults, GPIO_MASK,
    MAX_VIO_PDM,
};

use crate::error::{IcepickError, Result};
use crate::protocol::*;

/// Configuration options for opening an iCEpick
#[derive(Debug, Clone, Default)]
pub struct IcepickConfig {
    /// USB serial number to match (None = any)
    pub serial: Option<String>,
    /// Index among the matching devices
    pub index: Option<usize>,
}

/// Parse options from key=value pairs
///
/// Supported options:
/// - `serial=<serial>` - USB serial number to match
/// - `index=<n>` or `device=<n>` - pick the n-th matching device
pub fn parse_options(options: &[(&str, &str)]) -> Result<IcepickConfig> {
    let mut config = IcepickConfig::default();

    for (key, value) in options {
        match *key {
            "serial" => {
                config.serial = Some(value.to_string());
            }
            "index" | "device" => {
                config.index = Some(
                    value
                        .parse()
                        .map_err(|_| IcepickError::InvalidParameter(format!("index: {}", value)))?,
                );
            }
            _ => {
                return Err(IcepickError::InvalidParameter(format!(
                    "unknown option: {}",
                    key
                )));
            }
        }
    }

    Ok(config)
}

/// Information about a connected iCEpick
#[derive(Debug, Clone)]
pub struct IcepickDeviceInfo {
    /// nusb device info
    pub(crate) info: nusb::DeviceInfo,
    /// USB bus number
    pub bus: u8,
    /// USB device address
    pub address: u8,
    /// USB product ID (calibration firmware or bootloader)
    pub product_id: u16,
    /// Device serial number (if available)
    pub serial: Option<String>,
}

impl std::fmt::Display for IcepickDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = if self.product_id == ICEPICK_DFU_PID {
            "bootloader"
        } else {
            "calibration"
        };
        write!(
            f,
            "iCEpick ({}) at bus {} address {}",
            mode, self.bus, self.address
        )?;
        if let Some(ref serial) = self.serial {
            write!(f, " serial={}", serial)?;
        }
        Ok(())
    }
}

/// Enumerate devices with the given product ID, filtered by serial number
pub(crate) fn find_devices(product_id: u16, serial: Option<&str>) -> Result<Vec<IcepickDeviceInfo>> {
    let devices = nusb::list_devices()
        .wait()
        .map_err(|e| IcepickError::OpenFailed(e.to_string()))?
        .filter(|d| d.vendor_id() == ICEPICK_VID && d.product_id() == product_id)
        .filter(|d| match serial {
            Some(filter) => d.serial_number().is_some_and(|s| s.contains(filter)),
            None => true,
        })
        .map(|d| IcepickDeviceInfo {
            bus: d.busnum(),
            address: d.device_address(),
            product_id: d.product_id(),
            serial: d.serial_number().map(|s| s.to_string()),
            info: d,
        })
        .collect();

    Ok(devices)
}

/// Pick one device out of the matches according to `config`
pub(crate) fn select_device(
    mut devices: Vec<IcepickDeviceInfo>,
    config: &IcepickConfig,
    product_id: u16,
) -> Result<IcepickDeviceInfo> {
    if devices.is_empty() {
        return Err(IcepickError::DeviceNotFound(product_id));
    }

    match config.index {
        Some(index) if index < devices.len() => Ok(devices.swap_remove(index)),
        Some(_) => Err(IcepickError::DeviceNotFound(product_id)),
        None if devices.len() > 1 && config.serial.is_none() => {
            Err(IcepickError::MultipleDevicesFound(devices.len()))
        }
        None => Ok(devices.swap_remove(0)),
    }
}

/// Open a device and claim interface 0
pub(crate) fn open_interface(info: &IcepickDeviceInfo) -> Result<Interface> {
    log::info!(
        "Opening iCEpick at bus {} address {}",
        info.bus,
        info.address
    );

    let device = info
        .info
        .open()
        .wait()
        .map_err(|e| IcepickError::OpenFailed(e.to_string()))?;

    device
        .claim_interface(0)
        .wait()
        .map_err(|e| IcepickError::ClaimFailed(e.to_string()))
}

/// iCEpick running the calibration firmware
pub struct Icepick {
    /// USB interface
    interface: Interface,
    /// Device serial number
    serial: Option<String>,
    /// Channels of the last sense request, needed to attribute results
    sense_channels: SenseChannels,
}

impl Icepick {
    /// Open the only connected iCEpick
    pub fn open() -> Result<Self> {
        Self::open_with_config(&IcepickConfig::default())
    }

    /// Open an iCEpick with the specified configuration
    pub fn open_with_config(config: &IcepickConfig) -> Result<Self> {
        let devices = find_devices(ICEPICK_PID, config.serial.as_deref())?;
        let info = select_device(devices, config, ICEPICK_PID)?;
        let interface = open_interface(&info)?;

        if let Some(ref serial) = info.serial {
            log::info!("iCEpick serial {}", serial);
        }

        Ok(Self {
            interface,
            serial: info.serial,
            sense_channels: SenseChannels::empty(),
        })
    }

    /// List all connected iCEpicks, in calibration or bootloader mode
    pub fn list_devices() -> Result<Vec<IcepickDeviceInfo>> {
        let mut devices = find_devices(ICEPICK_PID, None)?;
        devices.extend(find_devices(ICEPICK_DFU_PID, None)?);
        Ok(devices)
    }

    /// Send a vendor OUT request without data stage
    fn control_out(&self, request: Request, value: u16, index: u16) -> Result<()> {
        log::trace!(
            "control out: req={:?} value=0x{:04X} index=0x{:04X}",
            request,
            value,
            index
        );

        self.interface
            .control_out(
                ControlOut {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request: request as u8,
                    value,
                    index,
                    data: &[],
                },
                USB_TIMEOUT,
            )
            .wait()
            .map_err(|e| IcepickError::TransferFailed(e.to_string()))
    }

    /// Send a vendor IN request
    fn control_in(&self, request: Request, length: u16) -> Result<Vec<u8>> {
        let data = self
            .interface
            .control_in(
                ControlIn {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request: request as u8,
                    value: 0,
                    index: 0,
                    length,
                },
                USB_TIMEOUT,
            )
            .wait()
            .map_err(|e| IcepickError::TransferFailed(e.to_string()))?;

        log::trace!("control in: req={:?} got {} bytes", request, data.len());
        Ok(data)
    }

    fn write_gpio(&self, request: Request, mask: u16) -> Result<()> {
        if mask & !GPIO_MASK != 0 {
            return Err(IcepickError::InvalidParameter(format!(
                "GPIO mask 0x{:04X} exceeds 0x{:03X}",
                mask, GPIO_MASK
            )));
        }
        self.control_out(request, mask, 0)
    }
}

impl CalibProbe for Icepick {
    fn serial(&self) -> Option<String> {
        self.serial.clone()
    }

    fn set_vio(&mut self, pdm: u16) -> CoreResult<()> {
        if pdm > MAX_VIO_PDM {
            return Err(IcepickError::InvalidParameter(format!("Vio PDM {}", pdm)).into());
        }
        log::debug!("Set Vio PDM {}", pdm);
        Ok(self.control_out(Request::SetVio, pdm, 0)?)
    }

    fn set_hf_trim(&mut self, trim: u16) -> CoreResult<()> {
        log::debug!("Set HF trim {}", trim);
        Ok(self.control_out(Request::SetHfTrim, trim, 0)?)
    }

    fn sense_start(&mut self, channels: SenseChannels, count: u16) -> CoreResult<()> {
        check_sense_request(channels, count)?;
        log::debug!(
            "Sense start: mask=0x{:04X} count={}",
            channels.bits(),
            count
        );
        self.control_out(Request::Sense, channels.bits(), count)?;
        self.sense_channels = channels;
        Ok(())
    }

    fn sense_results(&mut self) -> CoreResult<SenseResults> {
        let raw = self.control_in(Request::Sense, SENSE_READ_LEN)?;
        Ok(SenseResults::parse(&raw, self.sense_channels))
    }

    fn clock_start(&mut self, duration: u32) -> CoreResult<()> {
        let (value, index) = split_clock_duration(duration)?;
        log::debug!("Clock start: duration {}", duration);
        Ok(self.control_out(Request::Clock, value, index)?)
    }

    fn clock_results(&mut self) -> CoreResult<Option<ClockResults>> {
        let raw = self.control_in(Request::Clock, CLOCK_READ_LEN)?;
        if raw.len() < CLOCK_READ_LEN as usize {
            return Err(IcepickError::InvalidResponse(format!(
                "clock results: {} bytes",
                raw.len()
            ))
            .into());
        }
        Ok(ClockResults::parse(&raw))
    }

    fn gpio_read(&mut self) -> CoreResult<u16> {
        let raw = self.control_in(Request::GpioData, GPIO_READ_LEN)?;
        le_u16(&raw).ok_or_else(|| {
            IcepickError::InvalidResponse(format!("GPIO data: {} bytes", raw.len())).into()
        })
    }

    fn gpio_write(&mut self, data: u16) -> CoreResult<()> {
        Ok(self.write_gpio(Request::GpioData, data)?)
    }

    fn gpio_output_enable(&mut self, mask: u16) -> CoreResult<()> {
        Ok(self.write_gpio(Request::GpioOutputEnable, mask)?)
    }

    fn gpio_pull_dir(&mut self, mask: u16) -> CoreResult<()> {
        Ok(self.write_gpio(Request::GpioPullDir, mask)?)
    }

    fn gpio_pull_enable(&mut self, mask: u16) -> CoreResult<()> {
        Ok(self.write_gpio(Request::GpioPullEnable, mask)?)
    }
}
