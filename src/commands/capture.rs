//! Serial capture of the sample stream
//!
//! The front-end streams records back to back and pauses between frames.
//! Reading fixed-size blocks until one of them takes noticeably longer than
//! the rest puts the reader right after such a pause, i.e. on a frame start.

use std::io::{Read, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use icepick_core::frame::{self, RECORD_LEN};
use icepick_core::model::RcModel;
use serialport::{DataBits, FlowControl, Parity, StopBits};

use super::decode::{print_summary, summarize};

/// Block size read while looking for the inter-frame gap
const GAP_PROBE_LEN: usize = 100;

/// A block read slower than this contained the gap
const GAP_THRESHOLD: Duration = Duration::from_millis(100);

/// Give up looking for a gap after this many blocks
const GAP_MAX_BLOCKS: usize = 10_000;

/// Serial read timeout
const SERIAL_TIMEOUT: Duration = Duration::from_secs(2);

/// Consume blocks until one takes longer than `threshold` to arrive
///
/// Returns the number of blocks consumed.
pub fn wait_for_gap<R: Read + ?Sized>(
    reader: &mut R,
    threshold: Duration,
) -> std::io::Result<usize> {
    let mut buf = [0u8; GAP_PROBE_LEN];
    for blocks in 1..=GAP_MAX_BLOCKS {
        let start = Instant::now();
        reader.read_exact(&mut buf)?;
        if start.elapsed() > threshold {
            return Ok(blocks);
        }
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::TimedOut,
        "no gap in sample stream",
    ))
}

/// Align to a frame start and read `records` raw records
pub fn capture<R: Read + ?Sized>(reader: &mut R, records: usize) -> std::io::Result<Vec<u8>> {
    let skipped = wait_for_gap(reader, GAP_THRESHOLD)?;
    log::debug!("Frame gap after {} blocks", skipped);

    let mut data = vec![0u8; records * RECORD_LEN];
    reader.read_exact(&mut data)?;
    Ok(data)
}

/// Run the capture command
pub fn run_capture(
    port: &str,
    baud: u32,
    records: usize,
    output: Option<&Path>,
    model: &RcModel,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut serial = serialport::new(port, baud)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(SERIAL_TIMEOUT)
        .open()?;
    log::info!("Opened serial port {} at {} baud", port, baud);

    let data = capture(serial.as_mut(), records)?;

    if let Some(path) = output {
        let mut file = std::fs::File::create(path)?;
        file.write_all(&data)?;
        println!("Wrote {} bytes to {:?}", data.len(), path);
    }

    let decoded = frame::decode_all(&data);
    print_summary(&summarize(&decoded, 0, model));
    Ok(())
}
