//! Probe abstraction and wire-format helpers
//!
//! [`CalibProbe`] is implemented by the USB driver (`icepick-usb`) and by the
//! simulated probe (`icepick-dummy`). Calibration sweeps in [`crate::sweep`]
//! are written against this trait only.
//!
//! The calibration firmware answers a handful of vendor control requests:
//!
//! | req | direction | meaning                                   |
//! |-----|-----------|-------------------------------------------|
//! | 0   | out       | set Vio PDM (wValue)                      |
//! | 1   | out       | set HF oscillator trim (wValue)           |
//! | 2   | out       | start sense (wValue=mask, wIndex=count)   |
//! | 2   | in        | sense results, `(chg, dis)` u32 LE pairs  |
//! | 3   | out       | start clock count (24-bit duration)       |
//! | 3   | in        | clock results, 3 x u32 LE                 |
//! | 4   | in / out  | GPIO data                                 |
//! | 5   | out       | GPIO output enable                        |
//! | 6   | out       | GPIO pull direction                       |
//! | 7   | out       | GPIO pull enable                          |

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::channel::{SenseChannel, SenseChannels};
use crate::error::{Error, Result};

/// Measurement slots in the firmware result buffer
pub const MAX_SENSE_RESULTS: usize = 128;

/// Size of one sense result on the wire
pub const SENSE_PAIR_LEN: usize = 8;

/// Size of the clock result block on the wire
pub const CLOCK_RESULT_LEN: usize = 12;

/// Largest clock measurement duration (24 bits)
pub const MAX_CLOCK_DURATION: u32 = 0x00FF_FFFF;

/// Largest Vio PDM code (12 bits)
pub const MAX_VIO_PDM: u16 = 0x0FFF;

/// Millivolts per Vio PDM step
pub const VIO_MV_PER_STEP: f64 = 3300.0 / 4096.0;

/// Mask of the ten user I/O pins
pub const GPIO_MASK: u16 = 0x03FF;

/// Flag set by the firmware once a measurement is complete
const RESULT_VALID: u32 = 1 << 31;

/// One charge/discharge measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SensePair {
    /// Charge time
    pub chg: u32,
    /// Discharge time
    pub dis: u32,
}

/// Sense measurements grouped by channel index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SenseResults {
    per_channel: BTreeMap<u8, Vec<SensePair>>,
}

impl SenseResults {
    /// Parse the raw result buffer of a sense run
    ///
    /// Measurements cycle through the active channels in ascending order,
    /// so pair `i` belongs to the `i % n`-th channel of `channels`.
    pub fn parse(raw: &[u8], channels: SenseChannels) -> Self {
        let order: Vec<SenseChannel> = channels.channels().collect();
        let mut results = Self::default();
        if order.is_empty() {
            return results;
        }

        for (i, pair) in raw.chunks_exact(SENSE_PAIR_LEN).enumerate() {
            let chg = u32::from_le_bytes([pair[0], pair[1], pair[2], pair[3]]) & !RESULT_VALID;
            let dis = u32::from_le_bytes([pair[4], pair[5], pair[6], pair[7]]) & !RESULT_VALID;
            results.push(order[i % order.len()], SensePair { chg, dis });
        }
        results
    }

    /// Append a measurement
    pub fn push(&mut self, channel: SenseChannel, pair: SensePair) {
        self.per_channel
            .entry(channel.index())
            .or_default()
            .push(pair);
    }

    /// Measurements of one channel
    pub fn get(&self, channel: SenseChannel) -> &[SensePair] {
        self.per_channel
            .get(&channel.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of measurements of one channel
    pub fn count(&self, channel: SenseChannel) -> usize {
        self.get(channel).len()
    }

    /// Total number of measurements
    pub fn total(&self) -> usize {
        self.per_channel.values().map(Vec::len).sum()
    }

    /// Mean `(chg, dis)` of one channel
    pub fn mean(&self, channel: SenseChannel) -> Option<(f64, f64)> {
        let pairs = self.get(channel);
        if pairs.is_empty() {
            return None;
        }
        let n = pairs.len() as f64;
        let chg: u64 = pairs.iter().map(|p| p.chg as u64).sum();
        let dis: u64 = pairs.iter().map(|p| p.dis as u64).sum();
        Some((chg as f64 / n, dis as f64 / n))
    }
}

/// Cycle counts of the three on-board clocks over one measurement window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClockResults {
    /// Crystal oscillator
    pub xo: u32,
    /// High-frequency internal oscillator
    pub hf: u32,
    /// Low-frequency internal oscillator
    pub lf: u32,
}

impl ClockResults {
    /// Parse the 12-byte clock result block
    ///
    /// Returns `None` while any of the three counters is still running.
    pub fn parse(raw: &[u8]) -> Option<Self> {
        if raw.len() < CLOCK_RESULT_LEN {
            return None;
        }
        let word = |i: usize| u32::from_le_bytes([raw[i], raw[i + 1], raw[i + 2], raw[i + 3]]);
        let (xo, hf, lf) = (word(0), word(4), word(8));
        if xo & hf & lf & RESULT_VALID == 0 {
            return None;
        }
        Some(Self {
            xo: xo & !RESULT_VALID,
            hf: hf & !RESULT_VALID,
            lf: lf & !RESULT_VALID,
        })
    }
}

/// Split a 24-bit clock duration into `(wValue, wIndex)`
pub fn split_clock_duration(duration: u32) -> Result<(u16, u16)> {
    if duration > MAX_CLOCK_DURATION {
        return Err(Error::OutOfRange {
            what: "clock duration",
            value: duration,
        });
    }
    Ok(((duration & 0xFFFF) as u16, ((duration >> 16) & 0xFF) as u16))
}

/// Check that a sense request fits the firmware result buffer
pub fn check_sense_request(channels: SenseChannels, count: u16) -> Result<()> {
    let total = channels.len() * count as usize;
    if channels.is_empty() || count == 0 || total > MAX_SENSE_RESULTS {
        return Err(Error::OutOfRange {
            what: "sense measurement count",
            value: total as u32,
        });
    }
    Ok(())
}

/// Vio PDM code for a target voltage in millivolts
pub fn vio_pdm_for_millivolts(mv: u32) -> u16 {
    let code = (mv as f64 / VIO_MV_PER_STEP) as u32;
    code.min(MAX_VIO_PDM as u32) as u16
}

/// An iCEpick running the calibration firmware
pub trait CalibProbe {
    /// USB serial number, used to name result files
    fn serial(&self) -> Option<String>;

    /// Set the I/O voltage rail PDM code (12 bits)
    fn set_vio(&mut self, pdm: u16) -> Result<()>;

    /// Set the HF oscillator trim
    fn set_hf_trim(&mut self, trim: u16) -> Result<()>;

    /// Start `count` measurements on each channel in `channels`
    fn sense_start(&mut self, channels: SenseChannels, count: u16) -> Result<()>;

    /// Fetch the measurements completed so far
    fn sense_results(&mut self) -> Result<SenseResults>;

    /// Start counting clock cycles over `duration` reference ticks
    fn clock_start(&mut self, duration: u32) -> Result<()>;

    /// Fetch clock counts, `None` while the measurement is running
    fn clock_results(&mut self) -> Result<Option<ClockResults>>;

    /// Read the GPIO input levels
    fn gpio_read(&mut self) -> Result<u16>;

    /// Set the GPIO output levels
    fn gpio_write(&mut self, data: u16) -> Result<()>;

    /// Set the GPIO output enables
    fn gpio_output_enable(&mut self, mask: u16) -> Result<()>;

    /// Set the GPIO pull directions (1 = pull up)
    fn gpio_pull_dir(&mut self, mask: u16) -> Result<()>;

    /// Set the GPIO pull enables
    fn gpio_pull_enable(&mut self, mask: u16) -> Result<()>;

    /// Wait for the given number of milliseconds
    fn delay_ms(&mut self, ms: u32) {
        if ms > 0 {
            std::thread::sleep(Duration::from_millis(ms as u64));
        }
    }
}
