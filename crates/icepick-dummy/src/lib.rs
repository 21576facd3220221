//! icepick-dummy - Simulated iCEpick for testing
//!
//! This crate provides a probe that behaves like the calibration firmware
//! without any hardware attached. Sense measurements are derived from an
//! [`RcModel`] and the voltage currently present on each channel, clock
//! counts follow a linear trim law and the GPIO block keeps its registers
//! like the real pins do, including floating pins holding their last level.

use std::cell::Cell;
use std::rc::Rc;

use icepick_core::analysis::PULL_STATES;
use icepick_core::channel::{SenseChannel, SenseChannels, IO_SENSE_CHANNELS};
use icepick_core::error::{Error, Result};
use icepick_core::frame::{SampleRecord, DIS_MAX, RECORD_LEN};
use icepick_core::model::RcModel;
use icepick_core::probe::{
    check_sense_request, split_clock_duration, CalibProbe, ClockResults, SensePair, SenseResults,
    GPIO_MASK, MAX_VIO_PDM, VIO_MV_PER_STEP,
};
use icepick_core::sweep::BenchSupply;

/// Largest HF trim value accepted by the oscillator
pub const MAX_HF_TRIM: u16 = 0x3FF;

/// Configuration for the simulated probe
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Reported USB serial number
    pub serial: String,
    /// RC model used to turn voltages into counter values
    pub model: RcModel,
    /// 3.3 V rail
    pub v3v3: f64,
    /// 1.2 V rail
    pub v1v2: f64,
    /// HF oscillator frequency at trim 0
    pub hf_base_hz: f64,
    /// HF frequency increase per trim step
    pub hf_hz_per_trim: f64,
    /// Crystal frequency; clock durations count crystal cycles
    pub xo_hz: f64,
    /// LF oscillator frequency
    pub lf_hz: f64,
    /// GPIO pins that always read low
    pub stuck_low: u16,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            serial: "DUMMY0001".into(),
            model: RcModel::default(),
            v3v3: 3.3,
            v1v2: 1.2,
            hf_base_hz: 36_000_000.0,
            hf_hz_per_trim: 12_000.0,
            xo_hz: 10_000_000.0,
            lf_hz: 10_000.0,
            stuck_low: 0,
        }
    }
}

/// Bench supply wired to the simulated sense input
///
/// Obtained from [`DummyProbe::supply`].
#[derive(Debug, Clone)]
pub struct DummySupply {
    input: Rc<Cell<f64>>,
}

impl BenchSupply for DummySupply {
    fn set_voltage(&mut self, volts: f64) -> Result<()> {
        log::trace!("dummy supply: {:.3} V", volts);
        self.input.set(volts);
        Ok(())
    }
}

/// Simulated iCEpick running the calibration firmware
pub struct DummyProbe {
    config: DummyConfig,
    vio_pdm: u16,
    hf_trim: u16,
    sense: SenseResults,
    clock_duration: Option<u32>,
    gpio_out: u16,
    gpio_oe: u16,
    pull_dir: u16,
    pull_ena: u16,
    /// Pin levels, kept while a pin floats
    levels: u16,
    sense_input: Rc<Cell<f64>>,
    elapsed_ms: u64,
}

impl DummyProbe {
    /// Create a simulated probe with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        Self {
            config,
            vio_pdm: 0,
            hf_trim: 0,
            sense: SenseResults::default(),
            clock_duration: None,
            gpio_out: 0,
            gpio_oe: 0,
            pull_dir: 0,
            pull_ena: 0,
            levels: 0,
            sense_input: Rc::new(Cell::new(0.0)),
            elapsed_ms: 0,
        }
    }

    /// Create a simulated probe with default configuration
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Bench supply handle driving the sense input of this probe
    pub fn supply(&self) -> DummySupply {
        DummySupply {
            input: Rc::clone(&self.sense_input),
        }
    }

    /// Simulated time spent in [`CalibProbe::delay_ms`]
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    /// Current Vio rail voltage
    pub fn vio_volts(&self) -> f64 {
        self.vio_pdm as f64 * VIO_MV_PER_STEP / 1000.0
    }

    /// HF oscillator frequency at the current trim
    pub fn hf_hz(&self) -> f64 {
        self.config.hf_base_hz + self.hf_trim as f64 * self.config.hf_hz_per_trim
    }

    /// Voltage currently present on a sense channel
    pub fn channel_volts(&self, channel: SenseChannel) -> f64 {
        match channel {
            SenseChannel::Gnd | SenseChannel::Open => 0.0,
            SenseChannel::Vio => self.vio_volts(),
            SenseChannel::Vsense => self.sense_input.get(),
            SenseChannel::V3v3 => self.config.v3v3,
            SenseChannel::V1v2 => self.config.v1v2,
            io => {
                let pin = IO_SENSE_CHANNELS
                    .iter()
                    .position(|&c| c == io)
                    .unwrap_or_default();
                let driven = if self.levels & (1 << pin) != 0 {
                    self.vio_volts()
                } else {
                    0.0
                };
                // A0 shares the bench input with Vsense
                if io == SenseChannel::A0 {
                    driven.max(self.sense_input.get())
                } else {
                    driven
                }
            }
        }
    }

    fn sense_pair(&self, channel: SenseChannel) -> SensePair {
        let volts = self.channel_volts(channel);
        let model = &self.config.model;
        SensePair {
            chg: model.charge_time(volts).round().clamp(0.0, u16::MAX as f64) as u32,
            dis: model.discharge_time(volts).round().clamp(0.0, DIS_MAX as f64) as u32,
        }
    }

    /// One multiplexer cycle as streamed by the sensing front-end
    ///
    /// Records come in channel order with every pull state per channel,
    /// which is the pattern the stream decoder synchronises on.
    pub fn frame(&self) -> Vec<SampleRecord> {
        let mut records = Vec::with_capacity(16 * PULL_STATES);
        for chan in 0..16u8 {
            let pair = SenseChannel::from_index(chan)
                .map(|ch| self.sense_pair(ch))
                .unwrap_or(SensePair { chg: 0, dis: 0 });
            for pull in 0..PULL_STATES as u8 {
                records.push(SampleRecord {
                    chan,
                    pull,
                    chg: pair.chg as u16,
                    dis: pair.dis,
                });
            }
        }
        records
    }

    fn update_levels(&mut self) {
        let driven = self.gpio_oe;
        let pulled = self.pull_ena & !driven;
        self.levels = (self.levels & !(driven | pulled))
            | (self.gpio_out & driven)
            | (self.pull_dir & pulled);
        self.levels &= !self.config.stuck_low;
    }
}

fn check_gpio_mask(mask: u16) -> Result<u16> {
    if mask & !GPIO_MASK != 0 {
        return Err(Error::OutOfRange {
            what: "GPIO mask",
            value: mask as u32,
        });
    }
    Ok(mask)
}

impl CalibProbe for DummyProbe {
    fn serial(&self) -> Option<String> {
        Some(self.config.serial.clone())
    }

    fn set_vio(&mut self, pdm: u16) -> Result<()> {
        if pdm > MAX_VIO_PDM {
            return Err(Error::OutOfRange {
                what: "Vio PDM",
                value: pdm as u32,
            });
        }
        self.vio_pdm = pdm;
        Ok(())
    }

    fn set_hf_trim(&mut self, trim: u16) -> Result<()> {
        if trim > MAX_HF_TRIM {
            return Err(Error::OutOfRange {
                what: "HF trim",
                value: trim as u32,
            });
        }
        self.hf_trim = trim;
        Ok(())
    }

    fn sense_start(&mut self, channels: SenseChannels, count: u16) -> Result<()> {
        check_sense_request(channels, count)?;
        let mut results = SenseResults::default();
        for _ in 0..count {
            for channel in channels.channels() {
                results.push(channel, self.sense_pair(channel));
            }
        }
        self.sense = results;
        Ok(())
    }

    fn sense_results(&mut self) -> Result<SenseResults> {
        Ok(self.sense.clone())
    }

    fn clock_start(&mut self, duration: u32) -> Result<()> {
        split_clock_duration(duration)?;
        self.clock_duration = Some(duration);
        Ok(())
    }

    fn clock_results(&mut self) -> Result<Option<ClockResults>> {
        Ok(self.clock_duration.map(|duration| {
            let window = duration as f64 / self.config.xo_hz;
            ClockResults {
                xo: duration,
                hf: (self.hf_hz() * window).round() as u32,
                lf: (self.config.lf_hz * window).round() as u32,
            }
        }))
    }

    fn gpio_read(&mut self) -> Result<u16> {
        Ok(self.levels)
    }

    fn gpio_write(&mut self, data: u16) -> Result<()> {
        self.gpio_out = check_gpio_mask(data)?;
        self.update_levels();
        Ok(())
    }

    fn gpio_output_enable(&mut self, mask: u16) -> Result<()> {
        self.gpio_oe = check_gpio_mask(mask)?;
        self.update_levels();
        Ok(())
    }

    fn gpio_pull_dir(&mut self, mask: u16) -> Result<()> {
        self.pull_dir = check_gpio_mask(mask)?;
        self.update_levels();
        Ok(())
    }

    fn gpio_pull_enable(&mut self, mask: u16) -> Result<()> {
        self.pull_ena = check_gpio_mask(mask)?;
        self.update_levels();
        Ok(())
    }

    fn delay_ms(&mut self, ms: u32) {
        self.elapsed_ms += ms as u64;
    }
}

/// Build a raw capture: `lead_in` filler bytes followed by `records`
///
/// The filler can never begin a sync match, so when `records` starts with
/// a full [`DummyProbe::frame`] and `lead_in` is below the sync window the
/// decoder locks on at exactly `lead_in`.
pub fn synth_stream(records: &[SampleRecord], lead_in: usize) -> Vec<u8> {
    let mut stream = vec![0xFF; lead_in];
    stream.reserve(records.len() * RECORD_LEN);
    for record in records {
        stream.extend_from_slice(&record.to_bytes());
    }
    stream
}

#[cfg(test)]
mod tests {
    use super::*;
    use icepick_core::analysis::{channel_stats, slot_voltages};
    use icepick_core::frame::{decode_synced, find_sync};
    use icepick_core::sweep::{
        clock_calib, gpio_self_test, scan_sense, scan_trim, scan_vio, sense_collect, SweepConfig,
        TRIM_HZ_SCALE,
    };

    fn quick_config() -> SweepConfig {
        SweepConfig {
            sense_count: 4,
            vio_start_mv: 1200,
            vio_stop_mv: 3300,
            vio_step_mv: 300,
            trim_steps: 16,
            clock_runs: 3,
            supply_stop_mv: 1000,
            supply_step_mv: 250,
            ..SweepConfig::default()
        }
    }

    #[test]
    fn test_sense_rails() {
        let mut probe = DummyProbe::new_default();
        let model = RcModel::default();
        let channels = SenseChannels::V3V3 | SenseChannels::V1V2 | SenseChannels::GND;
        let results = sense_collect(&mut probe, channels, 10, &SweepConfig::default()).unwrap();

        assert_eq!(results.total(), 30);
        let (chg, dis) = results.mean(SenseChannel::V1v2).unwrap();
        assert!((model.charge_voltage(chg as u32) - 1.2).abs() < 0.01);
        assert!((model.discharge_voltage(dis as u32) - 1.2).abs() < 0.01);

        let (chg, dis) = results.mean(SenseChannel::Gnd).unwrap();
        assert_eq!((chg, dis), (0.0, 0.0));
    }

    #[test]
    fn test_sense_rejects_oversized_request() {
        let mut probe = DummyProbe::new_default();
        assert!(probe.sense_start(SenseChannels::all(), 9).is_err());
        assert!(probe.sense_start(SenseChannels::empty(), 1).is_err());
    }

    #[test]
    fn test_scan_vio_monotonic() {
        let mut probe = DummyProbe::new_default();
        let cfg = quick_config();
        let mut last_progress = (0, 0);
        let points = scan_vio(&mut probe, &cfg, |done, total| last_progress = (done, total)).unwrap();

        assert_eq!(points.len(), cfg.vio_targets().len());
        assert_eq!(last_progress, (points.len(), points.len()));
        assert!(points.windows(2).all(|w| w[1].chg > w[0].chg));
        assert!(points.windows(2).all(|w| w[1].dis > w[0].dis));
        // Settling is simulated, not slept
        assert_eq!(probe.elapsed_ms(), points.len() as u64 * cfg.vio_settle_ms as u64);
    }

    #[test]
    fn test_scan_trim_linear() {
        let mut probe = DummyProbe::new_default();
        let cfg = quick_config();
        let freqs = scan_trim(&mut probe, &cfg, |_, _| {}).unwrap();

        assert_eq!(freqs.len(), 16);
        assert_eq!(freqs[0], 36_000_000);
        // 0.1 s window, 12 kHz per step
        assert_eq!(freqs[1] - freqs[0], 1_200 * TRIM_HZ_SCALE);
        assert_eq!(freqs[15], 36_000_000 + 15 * 12_000);
    }

    #[test]
    fn test_clock_calib() {
        let mut probe = DummyProbe::new_default();
        let calib = clock_calib(&mut probe, &quick_config(), |_, _| {}).unwrap();
        assert_eq!(calib.xo, vec![10_000_000; 3]);
        assert_eq!(calib.hf, vec![36_000_000; 3]);
        assert_eq!(calib.lf, vec![10_000; 3]);
    }

    #[test]
    fn test_clock_results_before_start() {
        let mut probe = DummyProbe::new_default();
        assert_eq!(probe.clock_results().unwrap(), None);
        assert!(probe.clock_start(0x0100_0000).is_err());
    }

    #[test]
    fn test_scan_sense_follows_supply() {
        let mut probe = DummyProbe::new_default();
        let mut supply = probe.supply();
        let cfg = quick_config();
        let points = scan_sense(&mut probe, &mut supply, &cfg, |_, _| {}).unwrap();

        let volts: Vec<f64> = points.iter().map(|p| p.volts).collect();
        assert_eq!(volts, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        let model = RcModel::default();
        for point in &points[1..] {
            let (chg, _) = point.results.mean(SenseChannel::Vsense).unwrap();
            assert!((model.charge_voltage(chg as u32) - point.volts).abs() < 0.01);
            assert_eq!(point.results.count(SenseChannel::A0), 4);
        }
    }

    #[test]
    fn test_gpio_self_test_passes() {
        let mut probe = DummyProbe::new_default();
        assert!(gpio_self_test(&mut probe).unwrap().is_empty());
    }

    #[test]
    fn test_gpio_self_test_stuck_pin() {
        let mut probe = DummyProbe::new(DummyConfig {
            stuck_low: 1 << 3,
            ..DummyConfig::default()
        });
        let faults = gpio_self_test(&mut probe).unwrap();
        assert_eq!(faults.len(), 2);
        assert!(faults.iter().all(|f| f.pin == 3 && f.read == 0));
    }

    #[test]
    fn test_floating_pin_keeps_level() {
        let mut probe = DummyProbe::new_default();
        probe.gpio_write(0x001).unwrap();
        probe.gpio_output_enable(0x001).unwrap();
        probe.gpio_output_enable(0).unwrap();
        assert_eq!(probe.gpio_read().unwrap(), 0x001);
        assert!(probe.gpio_write(0x400).is_err());
    }

    #[test]
    fn test_synth_stream_syncs() {
        let mut probe = DummyProbe::new_default();
        probe.set_vio(2000).unwrap();
        let mut records = probe.frame();
        records.extend(probe.frame());

        for lead_in in [0, 3, 17, 200] {
            let stream = synth_stream(&records, lead_in);
            assert_eq!(find_sync(&stream), Some(lead_in));
            assert_eq!(decode_synced(&stream).unwrap(), records);
        }
    }

    #[test]
    fn test_frame_stats() {
        let probe = DummyProbe::new_default();
        let model = RcModel::default();
        let records = probe.frame();
        let stats = channel_stats(&records);

        assert_eq!(stats.len(), 48);
        let (vc, vd) = stats[&(SenseChannel::V3v3.index(), 0)].voltages(&model);
        assert!((vc - 3.3).abs() < 0.01);
        assert!((vd - 3.3).abs() < 0.01);
        let (vc, vd) = slot_voltages(&records, SenseChannel::V1v2.index() as usize, &model).unwrap();
        assert!((vc - vd).abs() < 1e-3);
    }
}
