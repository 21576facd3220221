//! DFU bootloader SPI passthrough
//!
//! The bootloader exposes a vendor interface that shifts arbitrary bytes
//! out to the configuration flash and latches what came back. This is
//! enough to inspect and change the flash status registers without
//! leaving DFU mode.

use nusb::transfer::{ControlIn, ControlOut, ControlType, Recipient};
use nusb::{Interface, MaybeFuture};

use crate::device::{find_devices, open_interface, select_device, IcepickConfig};
use crate::error::{IcepickError, Result};
use crate::protocol::*;

/// iCEpick running the DFU bootloader
pub struct IcepickDfu {
    interface: Interface,
}

impl IcepickDfu {
    /// Open the only connected bootloader
    pub fn open() -> Result<Self> {
        Self::open_with_config(&IcepickConfig::default())
    }

    /// Open a bootloader with the specified configuration
    pub fn open_with_config(config: &IcepickConfig) -> Result<Self> {
        let devices = find_devices(ICEPICK_DFU_PID, config.serial.as_deref())?;
        let info = select_device(devices, config, ICEPICK_DFU_PID)?;
        let interface = open_interface(&info)?;

        let dfu = Self { interface };
        let version = dfu.version()?;
        log::info!("iCEpick bootloader version {}.{}", version >> 8, version & 0xFF);

        Ok(dfu)
    }

    /// Read the bootloader version
    pub fn version(&self) -> Result<u16> {
        let data = self.control_in(DfuRequest::Version, DFU_VERSION_LEN)?;
        le_u16(&data).ok_or_else(|| {
            IcepickError::InvalidResponse(format!("version: {} bytes", data.len()))
        })
    }

    /// Full-duplex SPI transfer of `tx`, returning as many bytes as were sent
    pub fn spi_xfer(&self, tx: &[u8]) -> Result<Vec<u8>> {
        let len = u16::try_from(tx.len())
            .map_err(|_| IcepickError::InvalidParameter(format!("SPI transfer of {} bytes", tx.len())))?;

        self.interface
            .control_out(
                ControlOut {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Interface,
                    request: DfuRequest::SpiWrite as u8,
                    value: 0,
                    index: 0,
                    data: tx,
                },
                USB_TIMEOUT,
            )
            .wait()?;

        let rx = self.control_in(DfuRequest::SpiRead, len)?;
        if rx.len() != tx.len() {
            return Err(IcepickError::InvalidResponse(format!(
                "SPI read returned {} of {} bytes",
                rx.len(),
                tx.len()
            )));
        }
        log::trace!("spi: {:02X?} -> {:02X?}", tx, rx);
        Ok(rx)
    }

    /// Read both status registers as `SR2 << 8 | SR1`
    pub fn read_status(&self) -> Result<u16> {
        let sr1 = self.spi_xfer(&[opcodes::RDSR, 0])?;
        let sr2 = self.spi_xfer(&[opcodes::RDSR2, 0])?;
        Ok(combine_status(sr1[1], sr2[1]))
    }

    /// Set the write enable latch
    pub fn write_enable(&self) -> Result<()> {
        self.spi_xfer(&[opcodes::WREN])?;
        Ok(())
    }

    /// Enable a write to the volatile copy of the status registers
    pub fn write_enable_volatile(&self) -> Result<()> {
        self.spi_xfer(&[opcodes::EWSR])?;
        Ok(())
    }

    /// Write both status registers
    ///
    /// One of the write enables must precede this.
    pub fn write_status(&self, sr: u16) -> Result<()> {
        self.spi_xfer(&write_status_command(sr))?;
        log::debug!("Wrote status 0x{:04X}", sr);
        Ok(())
    }

    fn control_in(&self, request: DfuRequest, length: u16) -> Result<Vec<u8>> {
        Ok(self
            .interface
            .control_in(
                ControlIn {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Interface,
                    request: request as u8,
                    value: 0,
                    index: 0,
                    length,
                },
                USB_TIMEOUT,
            )
            .wait()?)
    }
}
