//! iCEpick USB protocol constants
//!
//! Both firmware images use vendor control requests on endpoint 0 only.
//! The calibration firmware addresses requests to the device, the DFU
//! bootloader addresses them to its vendor interface.

use std::time::Duration;

// ===========================================================================
// USB Device Identifiers
// ===========================================================================

/// OpenMoko vendor ID (shared by 1BitSquared / iCEBreaker projects)
pub const ICEPICK_VID: u16 = 0x1D50;

/// Product ID of the calibration firmware
pub const ICEPICK_PID: u16 = 0x6149;

/// Product ID of the DFU bootloader
pub const ICEPICK_DFU_PID: u16 = 0x6148;

// ===========================================================================
// Transfer parameters
// ===========================================================================

/// Timeout for control transfers
pub const USB_TIMEOUT: Duration = Duration::from_secs(5);

/// Sense result read size (128 slots of 8 bytes)
pub const SENSE_READ_LEN: u16 = 1024;

/// Clock result read size
pub const CLOCK_READ_LEN: u16 = 12;

/// GPIO input read size
pub const GPIO_READ_LEN: u16 = 2;

/// Bootloader version read size
pub const DFU_VERSION_LEN: u16 = 2;

// ===========================================================================
// Calibration firmware requests
// ===========================================================================

/// Vendor requests of the calibration firmware
///
/// Sense, clock and GPIO data share a request number between the OUT
/// (start / write) and IN (result / read) directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Request {
    /// OUT: wValue = Vio PDM code
    SetVio = 0,
    /// OUT: wValue = HF oscillator trim
    SetHfTrim = 1,
    /// OUT: wValue = channel mask, wIndex = count. IN: results
    Sense = 2,
    /// OUT: wValue = duration[15:0], wIndex = duration[23:16]. IN: results
    Clock = 3,
    /// OUT: wValue = output levels. IN: input levels
    GpioData = 4,
    /// OUT: wValue = output enables
    GpioOutputEnable = 5,
    /// OUT: wValue = pull directions
    GpioPullDir = 6,
    /// OUT: wValue = pull enables
    GpioPullEnable = 7,
}

// ===========================================================================
// DFU bootloader requests
// ===========================================================================

/// Vendor requests of the DFU bootloader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DfuRequest {
    /// IN: 2-byte bootloader version
    Version = 0,
    /// OUT: bytes to shift out on SPI
    SpiWrite = 1,
    /// IN: bytes shifted in during the last SPI write
    SpiRead = 2,
}

// ===========================================================================
// SPI flash opcodes used through the bootloader
// ===========================================================================

/// SPI flash commands
pub mod opcodes {
    /// Read status register 1
    pub const RDSR: u8 = 0x05;
    /// Read status register 2
    pub const RDSR2: u8 = 0x35;
    /// Write status register(s)
    pub const WRSR: u8 = 0x01;
    /// Write enable
    pub const WREN: u8 = 0x06;
    /// Write enable for volatile status register
    pub const EWSR: u8 = 0x50;
}

/// Build a WRSR command writing both status registers
pub fn write_status_command(sr: u16) -> [u8; 3] {
    let [lo, hi] = sr.to_le_bytes();
    [opcodes::WRSR, lo, hi]
}

/// Combine the two status register bytes
pub fn combine_status(sr1: u8, sr2: u8) -> u16 {
    ((sr2 as u16) << 8) | sr1 as u16
}

/// Decode a little-endian u16 response
pub fn le_u16(data: &[u8]) -> Option<u16> {
    match data {
        [lo, hi, ..] => Some(u16::from_le_bytes([*lo, *hi])),
        _ => None,
    }
}
