//! Decode command implementation

use std::path::Path;

use icepick_core::analysis::{channel_stats, charge_discharge_residual, ChannelStats};
use icepick_core::channel::SenseChannel;
use icepick_core::frame::{self, SampleRecord};
use icepick_core::model::RcModel;
use serde::Serialize;

/// Decoded capture summary
#[derive(Debug, Serialize)]
pub struct CaptureSummary {
    /// Byte offset of the sync ramp
    pub sync_offset: usize,
    /// Records used
    pub records: usize,
    /// Per channel and pull state statistics
    pub channels: Vec<ChannelSummary>,
    /// Charge/discharge disagreement of the model on this capture
    pub residual: f64,
}

/// Statistics of one `(chan, pull)` slot with its voltage estimates
#[derive(Debug, Serialize)]
pub struct ChannelSummary {
    /// Channel name
    pub name: &'static str,
    /// Raw statistics
    #[serde(flatten)]
    pub stats: ChannelStats,
    /// Voltage from the mean charge time
    pub v_chg: f64,
    /// Voltage from the mean discharge time
    pub v_dis: f64,
}

/// Summarise records that start on a frame boundary
pub fn summarize(records: &[SampleRecord], sync_offset: usize, model: &RcModel) -> CaptureSummary {
    let channels = channel_stats(records)
        .into_values()
        .map(|stats| {
            let (v_chg, v_dis) = stats.voltages(model);
            ChannelSummary {
                name: SenseChannel::from_index(stats.chan).map_or("?", SenseChannel::name),
                stats,
                v_chg,
                v_dis,
            }
        })
        .collect();

    CaptureSummary {
        sync_offset,
        records: records.len(),
        channels,
        residual: charge_discharge_residual(records, model),
    }
}

/// Print a summary as a table
pub fn print_summary(summary: &CaptureSummary) {
    println!(
        "Sync at offset {}, {} records",
        summary.sync_offset, summary.records
    );
    println!();
    println!(
        "{:<8} {:>4} {:>6} {:>10} {:>10} {:>8} {:>8}",
        "Channel", "Pull", "Count", "Chg", "Dis", "V(chg)", "V(dis)"
    );
    println!("{}", "-".repeat(60));
    for ch in &summary.channels {
        println!(
            "{:<8} {:>4} {:>6} {:>10.1} {:>10.1} {:>8.3} {:>8.3}",
            ch.name, ch.stats.pull, ch.stats.count, ch.stats.chg, ch.stats.dis, ch.v_chg, ch.v_dis
        );
    }
    println!();
    println!("Residual: {:.6}", summary.residual);
}

/// Decode a capture held in memory
pub fn decode_capture(
    data: &[u8],
    limit: Option<usize>,
    model: &RcModel,
) -> Result<CaptureSummary, Box<dyn std::error::Error>> {
    let offset = frame::find_sync(data).ok_or("No sync pattern found in capture")?;
    log::debug!("Sync found at offset {}", offset);

    let mut records = frame::decode_all(&data[offset..]);
    if let Some(limit) = limit {
        records.truncate(limit);
    }

    Ok(summarize(&records, offset, model))
}

/// Run the decode command
pub fn run_decode(
    input: &Path,
    limit: Option<usize>,
    json: bool,
    model: &RcModel,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = std::fs::read(input)?;
    log::info!("Read {} bytes from {}", data.len(), input.display());

    let summary = decode_capture(&data, limit, model)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}
