//! Statistics over decoded sample records
//!
//! A calibration capture cycles through all 16 sense channels, three pull
//! states each, so the record for channel slot `i` recurs every
//! [`FRAME_RECORDS`] records starting at `3 * i`.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::frame::SampleRecord;
use crate::model::RcModel;

/// Pull states captured per channel
pub const PULL_STATES: usize = 3;

/// Records in one full multiplexer cycle
pub const FRAME_RECORDS: usize = 16 * PULL_STATES;

/// Mean of a list of counter values
pub fn mean_u32(values: impl IntoIterator<Item = u32>) -> Option<f64> {
    let (sum, n) = values
        .into_iter()
        .fold((0u64, 0u64), |(sum, n), v| (sum + v as u64, n + 1));
    (n > 0).then(|| sum as f64 / n as f64)
}

fn mean_f64(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Every `stride`-th record starting at `slot`
pub fn interleaved(
    records: &[SampleRecord],
    slot: usize,
    stride: usize,
) -> impl Iterator<Item = &SampleRecord> {
    records.iter().skip(slot).step_by(stride.max(1))
}

/// Aggregate of all records sharing a channel and pull state
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChannelStats {
    /// Sense channel
    pub chan: u8,
    /// Pull state
    pub pull: u8,
    /// Number of records
    pub count: usize,
    /// Mean charge time
    pub chg: f64,
    /// Mean discharge time
    pub dis: f64,
}

impl ChannelStats {
    /// Voltage estimates `(from charge, from discharge)` of the means
    pub fn voltages(&self, model: &RcModel) -> (f64, f64) {
        (
            model.charge_voltage(self.chg.round() as u32),
            model.discharge_voltage(self.dis.round() as u32),
        )
    }
}

/// Group records by `(chan, pull)` and average them
pub fn channel_stats(records: &[SampleRecord]) -> BTreeMap<(u8, u8), ChannelStats> {
    let mut sums: BTreeMap<(u8, u8), (u64, u64, usize)> = BTreeMap::new();
    for r in records {
        let e = sums.entry((r.chan, r.pull)).or_default();
        e.0 += r.chg as u64;
        e.1 += r.dis as u64;
        e.2 += 1;
    }

    sums.into_iter()
        .map(|((chan, pull), (chg, dis, count))| {
            let stats = ChannelStats {
                chan,
                pull,
                count,
                chg: chg as f64 / count as f64,
                dis: dis as f64 / count as f64,
            };
            ((chan, pull), stats)
        })
        .collect()
}

/// Mean charge- and discharge-derived voltages of one channel slot
pub fn slot_voltages(records: &[SampleRecord], slot: usize, model: &RcModel) -> Option<(f64, f64)> {
    let chg = mean_f64(
        interleaved(records, PULL_STATES * slot, FRAME_RECORDS)
            .map(|r| model.charge_voltage(r.chg as u32)),
    )?;
    let dis = mean_f64(
        interleaved(records, PULL_STATES * slot, FRAME_RECORDS).map(|r| model.discharge_voltage(r.dis)),
    )?;
    Some((chg, dis))
}

/// Disagreement between charge- and discharge-derived voltages
///
/// Sum over the 16 channel slots of the squared difference between the mean
/// charge voltage and the mean discharge voltage. A well-fitted model drives
/// this towards zero. Slots with no records are skipped.
pub fn charge_discharge_residual(records: &[SampleRecord], model: &RcModel) -> f64 {
    (0..16)
        .filter_map(|slot| slot_voltages(records, slot, model))
        .map(|(chg, dis)| (chg - dis).powi(2))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(chan: u8, pull: u8, chg: u16, dis: u32) -> SampleRecord {
        SampleRecord {
            chan,
            pull,
            chg,
            dis,
        }
    }

    /// One multiplexer cycle where every channel reads `volts`
    fn frame_at(model: &RcModel, volts: f64) -> Vec<SampleRecord> {
        let chg = model.charge_time(volts).round() as u16;
        let dis = model.discharge_time(volts).round() as u32;
        (0..16u8)
            .flat_map(|chan| (0..PULL_STATES as u8).map(move |pull| rec(chan, pull, chg, dis)))
            .collect()
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean_u32([1, 2, 3, 4]), Some(2.5));
        assert_eq!(mean_u32(Vec::new()), None);
        assert_eq!(mean_u32([u32::MAX, u32::MAX]), Some(u32::MAX as f64));
    }

    #[test]
    fn test_interleaved() {
        let records: Vec<_> = (0..10u16).map(|i| rec(0, 0, i, 0)).collect();
        let picked: Vec<u16> = interleaved(&records, 1, 3).map(|r| r.chg).collect();
        assert_eq!(picked, vec![1, 4, 7]);
        assert_eq!(interleaved(&records, 20, 3).count(), 0);
    }

    #[test]
    fn test_channel_stats() {
        let records = vec![
            rec(2, 0, 100, 1000),
            rec(2, 0, 300, 3000),
            rec(2, 1, 50, 500),
            rec(8, 0, 7, 70),
        ];
        let stats = channel_stats(&records);
        assert_eq!(stats.len(), 3);
        let s = stats[&(2, 0)];
        assert_eq!(s.count, 2);
        assert_eq!(s.chg, 200.0);
        assert_eq!(s.dis, 2000.0);
        assert_eq!(stats[&(8, 0)].count, 1);
    }

    #[test]
    fn test_residual_consistent_model() {
        let model = RcModel::default();
        let mut records = frame_at(&model, 1.2);
        records.extend(frame_at(&model, 1.2));
        let residual = charge_discharge_residual(&records, &model);
        assert!(residual < 1e-6, "residual {}", residual);
    }

    #[test]
    fn test_residual_detects_mismatch() {
        let model = RcModel::default();
        let records = frame_at(&model, 1.2);

        // Same counts read through a model with a wrong charge constant
        let mut skewed = model;
        skewed.charge.k *= 1.2;
        assert!(charge_discharge_residual(&records, &skewed) > 1e-3);
    }

    #[test]
    fn test_residual_empty() {
        assert_eq!(charge_discharge_residual(&[], &RcModel::default()), 0.0);
    }
}
