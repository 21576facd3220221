//! Calibration sweep commands
//!
//! Each sweep runs against the selected probe and stores its raw results
//! as `<serial>-<kind>.json` in the output directory.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use icepick_core::config::CalibConfig;
use icepick_core::sweep::{self, BenchSupply};
use serde::Serialize;

use crate::probe::ProbeHandle;
use crate::supply::ScpiSupply;

/// Result file name for a probe serial and sweep kind
pub fn result_path(out_dir: &Path, serial: &str, kind: &str) -> PathBuf {
    out_dir.join(format!("{}-{}.json", serial, kind))
}

/// Write `value` as pretty JSON
pub fn write_json<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn progress_bar(message: &'static str) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );
    pb.set_message(message);
    Ok(pb)
}

fn update(pb: &ProgressBar) -> impl FnMut(usize, usize) + '_ {
    move |done, total| {
        pb.set_length(total as u64);
        pb.set_position(done as u64);
    }
}

/// Run the Vio sweep
pub fn run_vio(
    handle: &mut ProbeHandle,
    config: &CalibConfig,
    out_dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let pb = progress_bar("Vio")?;
    let points = sweep::scan_vio(handle.as_probe_mut(), &config.sweep, update(&pb))?;
    pb.finish_with_message("Vio sweep complete");

    for p in &points {
        let (vc, vd) = (
            config.model.charge_voltage(p.chg.round() as u32),
            config.model.discharge_voltage(p.dis.round() as u32),
        );
        log::debug!("{:>5} mV -> {:.3} V / {:.3} V", p.target_mv, vc, vd);
    }

    write_json(&result_path(out_dir, &handle.serial(), "vio"), &points)
}

/// Run the HF trim sweep
pub fn run_trim(
    handle: &mut ProbeHandle,
    config: &CalibConfig,
    out_dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let pb = progress_bar("Trim")?;
    let freqs = sweep::scan_trim(handle.as_probe_mut(), &config.sweep, update(&pb))?;
    pb.finish_with_message("Trim sweep complete");

    if let (Some(min), Some(max)) = (freqs.iter().min(), freqs.iter().max()) {
        println!("HF range: {} Hz .. {} Hz", min, max);
    }

    write_json(&result_path(out_dir, &handle.serial(), "trim"), &freqs)
}

/// Run the clock calibration
pub fn run_clock(
    handle: &mut ProbeHandle,
    config: &CalibConfig,
    out_dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let pb = progress_bar("Clock")?;
    let calib = sweep::clock_calib(handle.as_probe_mut(), &config.sweep, update(&pb))?;
    pb.finish_with_message("Clock calibration complete");

    for (name, counts) in [("XO", &calib.xo), ("HF", &calib.hf), ("LF", &calib.lf)] {
        if let Some(mean) = icepick_core::analysis::mean_u32(counts.iter().copied()) {
            println!("{}: mean {:.1} over {} runs", name, mean, counts.len());
        }
    }

    write_json(&result_path(out_dir, &handle.serial(), "clock"), &calib)
}

/// Run the bench supply sweep
///
/// The simulated probe comes with its own simulated supply; real hardware
/// needs the SCPI supply from the configuration or command line.
pub fn run_sense(
    handle: &mut ProbeHandle,
    config: &CalibConfig,
    out_dir: &Path,
    supply_addr: Option<&str>,
    supply_channel: Option<u8>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut supply: Box<dyn BenchSupply> = match handle.dummy_supply() {
        Some(dummy) => Box::new(dummy),
        None => {
            let addr = supply_addr.unwrap_or(&config.supply.address);
            let channel = supply_channel.unwrap_or(config.supply.channel);
            Box::new(ScpiSupply::connect(addr, channel)?)
        }
    };

    let pb = progress_bar("Sense")?;
    let points = sweep::scan_sense(
        handle.as_probe_mut(),
        supply.as_mut(),
        &config.sweep,
        update(&pb),
    )?;
    pb.finish_with_message("Sense sweep complete");

    write_json(&result_path(out_dir, &handle.serial(), "sense"), &points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use icepick_core::sweep::SweepConfig;
    use icepick_dummy::DummyProbe;

    fn quick_config() -> CalibConfig {
        CalibConfig {
            sweep: SweepConfig {
                sense_count: 2,
                vio_step_mv: 500,
                trim_steps: 4,
                clock_runs: 2,
                supply_step_mv: 1000,
                ..SweepConfig::default()
            },
            ..CalibConfig::default()
        }
    }

    #[test]
    fn test_result_path() {
        assert_eq!(
            result_path(Path::new("/data"), "ABC123", "vio"),
            PathBuf::from("/data/ABC123-vio.json")
        );
    }

    #[test]
    fn test_sweeps_write_json() {
        let dir = std::env::temp_dir().join(format!("icepick-calib-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let config = quick_config();
        let mut handle = ProbeHandle::Dummy(DummyProbe::new_default());

        run_vio(&mut handle, &config, &dir).unwrap();
        run_trim(&mut handle, &config, &dir).unwrap();
        run_clock(&mut handle, &config, &dir).unwrap();
        run_sense(&mut handle, &config, &dir, None, None).unwrap();

        let trim: Vec<u32> =
            serde_json::from_str(&std::fs::read_to_string(dir.join("DUMMY0001-trim.json")).unwrap())
                .unwrap();
        assert_eq!(trim.len(), 4);
        let vio: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join("DUMMY0001-vio.json")).unwrap())
                .unwrap();
        assert_eq!(vio[0]["target_mv"], 1200);
        let sense: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join("DUMMY0001-sense.json")).unwrap())
                .unwrap();
        assert_eq!(sense.as_array().unwrap().len(), 4);
        assert!(dir.join("DUMMY0001-clock.json").exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
