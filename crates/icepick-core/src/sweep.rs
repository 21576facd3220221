//! Calibration procedures
//!
//! Each procedure drives a [`CalibProbe`] through a parameter sweep and
//! returns the raw measurements. They block, sleeping through the probe's
//! [`delay_ms`](CalibProbe::delay_ms) between polls, and give up with
//! [`Error::Timeout`] when the firmware does not deliver in time.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::channel::{SenseChannel, SenseChannels, IO_SENSE_CHANNELS};
use crate::error::{Error, Result};
use crate::probe::{
    check_sense_request, vio_pdm_for_millivolts, CalibProbe, ClockResults, SenseResults,
    GPIO_MASK,
};

/// HF counts over a trim window are scaled by this to get Hz
pub const TRIM_HZ_SCALE: u32 = 10;

/// Polling and sweep parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Delay between two result polls
    pub poll_interval_ms: u32,
    /// Give up polling after this long
    pub poll_timeout_ms: u32,
    /// Measurements per channel and step
    pub sense_count: u16,
    /// Settling time after changing Vio
    pub vio_settle_ms: u32,
    /// Vio sweep start (inclusive)
    pub vio_start_mv: u32,
    /// Vio sweep end (exclusive)
    pub vio_stop_mv: u32,
    /// Vio sweep step
    pub vio_step_mv: u32,
    /// Number of trim values scanned, starting at 0
    pub trim_steps: u16,
    /// Clock window used for each trim value
    pub trim_duration: u32,
    /// Number of clock measurements in a clock calibration
    pub clock_runs: u32,
    /// Clock window used for clock calibration
    pub clock_duration: u32,
    /// Settling time after changing the bench supply
    pub supply_settle_ms: u32,
    /// Bench supply sweep end (inclusive), starting at 0 V
    pub supply_stop_mv: u32,
    /// Bench supply sweep step
    pub supply_step_mv: u32,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            poll_timeout_ms: 5000,
            sense_count: 20,
            vio_settle_ms: 100,
            vio_start_mv: 1200,
            vio_stop_mv: 3350,
            vio_step_mv: 50,
            trim_steps: 1024,
            trim_duration: 1_000_000,
            clock_runs: 10,
            clock_duration: 10_000_000,
            supply_settle_ms: 250,
            supply_stop_mv: 3400,
            supply_step_mv: 50,
        }
    }
}

impl SweepConfig {
    fn poll_attempts(&self) -> u32 {
        (self.poll_timeout_ms / self.poll_interval_ms.max(1)).max(1)
    }

    /// Vio targets in millivolts
    pub fn vio_targets(&self) -> Vec<u32> {
        (self.vio_start_mv..self.vio_stop_mv)
            .step_by(self.vio_step_mv.max(1) as usize)
            .collect()
    }

    /// Bench supply set points in millivolts
    pub fn supply_targets(&self) -> Vec<u32> {
        (0..=self.supply_stop_mv)
            .step_by(self.supply_step_mv.max(1) as usize)
            .collect()
    }
}

/// A programmable bench power supply feeding the probe's sense input
pub trait BenchSupply {
    /// Set the output voltage
    fn set_voltage(&mut self, volts: f64) -> Result<()>;
}

/// One step of a Vio sweep
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VioPoint {
    /// Requested rail voltage
    pub target_mv: u32,
    /// PDM code sent to the probe
    pub pdm: u16,
    /// Mean charge time on the Vio channel
    pub chg: f64,
    /// Mean discharge time on the Vio channel
    pub dis: f64,
}

/// Collected clock calibration runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClockCalib {
    /// Crystal oscillator counts
    pub xo: Vec<u32>,
    /// HF oscillator counts
    pub hf: Vec<u32>,
    /// LF oscillator counts
    pub lf: Vec<u32>,
}

impl ClockCalib {
    fn push(&mut self, r: ClockResults) {
        self.xo.push(r.xo);
        self.hf.push(r.hf);
        self.lf.push(r.lf);
    }
}

/// One step of a bench supply sweep
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensePoint {
    /// Bench supply voltage
    pub volts: f64,
    /// Raw measurements at that voltage
    pub results: SenseResults,
}

fn poll<P, T>(
    probe: &mut P,
    cfg: &SweepConfig,
    what: &'static str,
    mut f: impl FnMut(&mut P) -> Result<Option<T>>,
) -> Result<T>
where
    P: CalibProbe + ?Sized,
{
    for _ in 0..cfg.poll_attempts() {
        if let Some(v) = f(probe)? {
            return Ok(v);
        }
        probe.delay_ms(cfg.poll_interval_ms);
    }
    log::warn!("no {} after {} ms", what, cfg.poll_timeout_ms);
    Err(Error::Timeout { what })
}

/// Run a sense measurement and wait until every channel has `count` results
pub fn sense_collect<P: CalibProbe + ?Sized>(
    probe: &mut P,
    channels: SenseChannels,
    count: u16,
    cfg: &SweepConfig,
) -> Result<SenseResults> {
    check_sense_request(channels, count)?;
    probe.sense_start(channels, count)?;
    poll(probe, cfg, "sense results", |p| {
        let r = p.sense_results()?;
        let done = channels.channels().all(|ch| r.count(ch) >= count as usize);
        Ok(done.then_some(r))
    })
}

/// Run one clock measurement and wait for the counts
pub fn clock_measure<P: CalibProbe + ?Sized>(
    probe: &mut P,
    duration: u32,
    cfg: &SweepConfig,
) -> Result<ClockResults> {
    probe.clock_start(duration)?;
    poll(probe, cfg, "clock results", |p| p.clock_results())
}

/// Sweep the Vio rail and record the Vio sense channel at each step
pub fn scan_vio<P, F>(probe: &mut P, cfg: &SweepConfig, mut progress: F) -> Result<Vec<VioPoint>>
where
    P: CalibProbe + ?Sized,
    F: FnMut(usize, usize),
{
    let targets = cfg.vio_targets();
    let mut points = Vec::with_capacity(targets.len());

    for (step, &mv) in targets.iter().enumerate() {
        let pdm = vio_pdm_for_millivolts(mv);
        probe.set_vio(pdm)?;
        probe.delay_ms(cfg.vio_settle_ms);

        let results = sense_collect(probe, SenseChannels::VIO, cfg.sense_count, cfg)?;
        let (chg, dis) = results
            .mean(SenseChannel::Vio)
            .ok_or(Error::Timeout { what: "Vio samples" })?;
        log::debug!("Vio {} mV (pdm {}): chg {:.1} dis {:.1}", mv, pdm, chg, dis);

        points.push(VioPoint {
            target_mv: mv,
            pdm,
            chg,
            dis,
        });
        progress(step + 1, targets.len());
    }

    Ok(points)
}

/// Sweep the HF oscillator trim and record the resulting frequency in Hz
///
/// Entry `i` of the result is the frequency at trim value `i`.
pub fn scan_trim<P, F>(probe: &mut P, cfg: &SweepConfig, mut progress: F) -> Result<Vec<u32>>
where
    P: CalibProbe + ?Sized,
    F: FnMut(usize, usize),
{
    let total = cfg.trim_steps as usize;
    let mut freqs = Vec::with_capacity(total);

    for trim in 0..cfg.trim_steps {
        probe.set_hf_trim(trim)?;
        let r = clock_measure(probe, cfg.trim_duration, cfg)?;
        log::trace!("trim {}: hf {}", trim, r.hf);
        freqs.push(r.hf.saturating_mul(TRIM_HZ_SCALE));
        progress(trim as usize + 1, total);
    }

    Ok(freqs)
}

/// Repeat clock measurements to characterise all three oscillators
pub fn clock_calib<P, F>(probe: &mut P, cfg: &SweepConfig, mut progress: F) -> Result<ClockCalib>
where
    P: CalibProbe + ?Sized,
    F: FnMut(usize, usize),
{
    let mut calib = ClockCalib::default();
    let total = cfg.clock_runs as usize;

    for run in 0..total {
        let r = clock_measure(probe, cfg.clock_duration, cfg)?;
        log::debug!("clock run {}: xo {} hf {} lf {}", run, r.xo, r.hf, r.lf);
        calib.push(r);
        progress(run + 1, total);
    }

    Ok(calib)
}

/// Sweep a bench supply on the sense input and record Vsense and A0
pub fn scan_sense<P, S, F>(
    probe: &mut P,
    supply: &mut S,
    cfg: &SweepConfig,
    mut progress: F,
) -> Result<Vec<SensePoint>>
where
    P: CalibProbe + ?Sized,
    S: BenchSupply + ?Sized,
    F: FnMut(usize, usize),
{
    let targets = cfg.supply_targets();
    let channels = SenseChannels::VSENSE | SenseChannels::A0;
    let mut points = Vec::with_capacity(targets.len());

    for (step, &mv) in targets.iter().enumerate() {
        let volts = mv as f64 / 1000.0;
        supply.set_voltage(volts)?;
        probe.delay_ms(cfg.supply_settle_ms);

        let results = sense_collect(probe, channels, cfg.sense_count, cfg)?;
        points.push(SensePoint { volts, results });
        progress(step + 1, targets.len());
    }

    Ok(points)
}

/// Step of the GPIO self-test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GpioStep {
    /// Pin left floating after being driven low
    Discharge,
    /// Pin driven high
    DriveHigh,
    /// Pin driven low
    DriveLow,
    /// Pin pulled up
    PullHigh,
    /// Pin pulled down
    PullLow,
}

impl fmt::Display for GpioStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Discharge => "Discharge",
            Self::DriveHigh => "Drive high",
            Self::DriveLow => "Drive low",
            Self::PullHigh => "Pull high",
            Self::PullLow => "Pull low",
        };
        f.write_str(s)
    }
}

/// A failed GPIO self-test check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GpioFault {
    /// Pin index (bit in the GPIO mask)
    pub pin: u8,
    /// Check that failed
    pub step: GpioStep,
    /// Input levels read back
    pub read: u16,
    /// Input levels expected
    pub expected: u16,
}

impl fmt::Display for GpioFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IO[{}] ({}) - {:03x} - Err {}",
            self.pin, IO_SENSE_CHANNELS[self.pin as usize], self.read, self.step
        )
    }
}

/// Settling time before reading a pulled pin
const PULL_SETTLE_MS: u32 = 1;

/// Exercise drive and pull on every user I/O pin
///
/// Every check runs even after a failure; all faults are returned.
pub fn gpio_self_test<P: CalibProbe + ?Sized>(probe: &mut P) -> Result<Vec<GpioFault>> {
    let mut faults = Vec::new();

    for pin in 0..IO_SENSE_CHANNELS.len() as u8 {
        let m = 1u16 << pin;
        let mut check = |probe: &mut P, step: GpioStep, expected: u16| -> Result<()> {
            let read = probe.gpio_read()? & GPIO_MASK;
            if read != expected {
                let fault = GpioFault {
                    pin,
                    step,
                    read,
                    expected,
                };
                log::warn!("{}", fault);
                faults.push(fault);
            }
            Ok(())
        };

        // Reset
        probe.gpio_write(0)?;
        probe.gpio_output_enable(0)?;
        probe.gpio_pull_dir(0)?;
        probe.gpio_pull_enable(0)?;

        // Discharge every pin, then float
        probe.gpio_write(0)?;
        probe.gpio_output_enable(GPIO_MASK)?;
        probe.gpio_output_enable(0)?;
        check(probe, GpioStep::Discharge, 0)?;

        probe.gpio_write(m)?;
        probe.gpio_output_enable(m)?;
        check(probe, GpioStep::DriveHigh, m)?;

        probe.gpio_write(0)?;
        check(probe, GpioStep::DriveLow, 0)?;

        probe.gpio_output_enable(0)?;

        probe.gpio_pull_dir(m)?;
        probe.gpio_pull_enable(m)?;
        probe.delay_ms(PULL_SETTLE_MS);
        check(probe, GpioStep::PullHigh, m)?;

        probe.gpio_pull_dir(0)?;
        probe.delay_ms(PULL_SETTLE_MS);
        check(probe, GpioStep::PullLow, 0)?;
    }

    Ok(faults)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::SensePair;

    /// Minimal probe that completes every measurement on the first poll
    #[derive(Default)]
    struct ScriptedProbe {
        vio: Vec<u16>,
        trims: Vec<u16>,
        active: Option<(SenseChannels, u16)>,
        clock_polls: u32,
        clock_pending: bool,
        stuck: bool,
        gpio_out: u16,
        gpio_oe: u16,
        dead_pin: Option<u8>,
        delays: u32,
    }

    impl CalibProbe for ScriptedProbe {
        fn serial(&self) -> Option<String> {
            Some("test".into())
        }

        fn set_vio(&mut self, pdm: u16) -> Result<()> {
            self.vio.push(pdm);
            Ok(())
        }

        fn set_hf_trim(&mut self, trim: u16) -> Result<()> {
            self.trims.push(trim);
            Ok(())
        }

        fn sense_start(&mut self, channels: SenseChannels, count: u16) -> Result<()> {
            self.active = Some((channels, count));
            Ok(())
        }

        fn sense_results(&mut self) -> Result<SenseResults> {
            let mut r = SenseResults::default();
            if self.stuck {
                return Ok(r);
            }
            if let Some((channels, count)) = self.active {
                let pdm = self.vio.last().copied().unwrap_or(0) as u32;
                for _ in 0..count {
                    for ch in channels.channels() {
                        r.push(ch, SensePair { chg: pdm, dis: 2 * pdm });
                    }
                }
            }
            Ok(r)
        }

        fn clock_start(&mut self, _duration: u32) -> Result<()> {
            self.clock_pending = true;
            Ok(())
        }

        fn clock_results(&mut self) -> Result<Option<ClockResults>> {
            self.clock_polls += 1;
            // Report "running" once before every result
            if self.clock_pending {
                self.clock_pending = false;
                return Ok(None);
            }
            let trim = self.trims.last().copied().unwrap_or(0) as u32;
            Ok(Some(ClockResults {
                xo: 1_000_000,
                hf: 4_000_000 + trim,
                lf: 1_000,
            }))
        }

        fn gpio_read(&mut self) -> Result<u16> {
            let mut v = self.gpio_out & self.gpio_oe;
            if let Some(pin) = self.dead_pin {
                v &= !(1 << pin);
            }
            Ok(v)
        }

        fn gpio_write(&mut self, data: u16) -> Result<()> {
            self.gpio_out = data;
            Ok(())
        }

        fn gpio_output_enable(&mut self, mask: u16) -> Result<()> {
            self.gpio_oe = mask;
            Ok(())
        }

        fn gpio_pull_dir(&mut self, _mask: u16) -> Result<()> {
            Ok(())
        }

        fn gpio_pull_enable(&mut self, _mask: u16) -> Result<()> {
            Ok(())
        }

        fn delay_ms(&mut self, _ms: u32) {
            self.delays += 1;
        }
    }

    #[test]
    fn test_vio_targets() {
        let cfg = SweepConfig::default();
        let targets = cfg.vio_targets();
        assert_eq!(targets.first(), Some(&1200));
        assert_eq!(targets.last(), Some(&3300));
        assert_eq!(targets.len(), 43);
    }

    #[test]
    fn test_supply_targets() {
        let targets = SweepConfig::default().supply_targets();
        assert_eq!(targets.len(), 69);
        assert_eq!(targets[1], 50);
        assert_eq!(targets.last(), Some(&3400));
    }

    #[test]
    fn test_scan_vio() {
        let mut probe = ScriptedProbe::default();
        let cfg = SweepConfig::default();
        let mut steps = 0;
        let points = scan_vio(&mut probe, &cfg, |_, _| steps += 1).unwrap();

        assert_eq!(points.len(), 43);
        assert_eq!(steps, 43);
        assert_eq!(points[0].target_mv, 1200);
        assert_eq!(points[0].pdm, 1489);
        assert_eq!(points[0].chg, 1489.0);
        assert_eq!(points[0].dis, 2978.0);
        assert_eq!(probe.vio.len(), 43);
    }

    #[test]
    fn test_scan_trim_polls_until_valid() {
        let mut probe = ScriptedProbe::default();
        let cfg = SweepConfig {
            trim_steps: 4,
            ..SweepConfig::default()
        };
        let freqs = scan_trim(&mut probe, &cfg, |_, _| {}).unwrap();
        assert_eq!(freqs, vec![40_000_000, 40_000_010, 40_000_020, 40_000_030]);
        assert_eq!(probe.clock_polls, 8);
        assert_eq!(probe.trims, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_clock_calib() {
        let mut probe = ScriptedProbe::default();
        let calib = clock_calib(&mut probe, &SweepConfig::default(), |_, _| {}).unwrap();
        assert_eq!(calib.xo.len(), 10);
        assert!(calib.lf.iter().all(|&v| v == 1_000));
    }

    #[test]
    fn test_sense_timeout() {
        let mut probe = ScriptedProbe {
            stuck: true,
            ..Default::default()
        };
        let cfg = SweepConfig {
            poll_interval_ms: 10,
            poll_timeout_ms: 100,
            ..SweepConfig::default()
        };
        let err = sense_collect(&mut probe, SenseChannels::VIO, 20, &cfg).unwrap_err();
        assert_eq!(err, Error::Timeout { what: "sense results" });
        assert_eq!(probe.delays, 10);
    }

    #[test]
    fn test_sense_request_rejected() {
        let mut probe = ScriptedProbe::default();
        let cfg = SweepConfig::default();
        assert!(sense_collect(&mut probe, SenseChannels::all(), 20, &cfg).is_err());
        assert!(probe.active.is_none());
    }

    struct RecordingSupply(Vec<f64>);

    impl BenchSupply for RecordingSupply {
        fn set_voltage(&mut self, volts: f64) -> Result<()> {
            self.0.push(volts);
            Ok(())
        }
    }

    #[test]
    fn test_scan_sense() {
        let mut probe = ScriptedProbe::default();
        let mut supply = RecordingSupply(Vec::new());
        let cfg = SweepConfig {
            supply_stop_mv: 200,
            ..SweepConfig::default()
        };
        let points = scan_sense(&mut probe, &mut supply, &cfg, |_, _| {}).unwrap();
        assert_eq!(supply.0, vec![0.0, 0.05, 0.1, 0.15, 0.2]);
        assert_eq!(points.len(), 5);
        for p in &points {
            assert_eq!(p.results.count(SenseChannel::Vsense), 20);
            assert_eq!(p.results.count(SenseChannel::A0), 20);
        }
    }

    #[test]
    fn test_gpio_self_test() {
        // Scripted probe has no pull model, so only drive checks pass
        let mut probe = ScriptedProbe::default();
        let faults = gpio_self_test(&mut probe).unwrap();
        assert!(faults.iter().all(|f| f.step == GpioStep::PullHigh));
        assert_eq!(faults.len(), 10);

        let mut probe = ScriptedProbe {
            dead_pin: Some(3),
            ..Default::default()
        };
        let faults = gpio_self_test(&mut probe).unwrap();
        assert!(faults
            .iter()
            .any(|f| f.pin == 3 && f.step == GpioStep::DriveHigh));
    }
}
