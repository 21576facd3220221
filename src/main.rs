//! icepick-calib - Bench calibration utilities for the iCEpick
//!
//! Drives the iCEpick calibration firmware through parameter sweeps (Vio
//! rail, HF oscillator trim, clock counts, sense input against a bench
//! supply) and stores the raw results as JSON. Also decodes raw sample
//! captures of the sensing front-end and pokes at the user I/O pins and
//! the flash status registers.
//!
//! Every probe command accepts `--probe dummy` to run against a simulated
//! probe instead of hardware.

mod cli;
mod commands;
mod probe;
mod supply;

use clap::Parser;
use cli::{Cli, Commands};
use icepick_core::config::CalibConfig;
use probe::open_probe;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let config = match CalibConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let serial = cli.serial.as_deref();

    match &cli.command {
        Commands::Vio { output } => {
            let mut handle = open_probe(cli.probe, serial)?;
            commands::calib::run_vio(&mut handle, &config, &output.out_dir)
        }
        Commands::Trim { output } => {
            let mut handle = open_probe(cli.probe, serial)?;
            commands::calib::run_trim(&mut handle, &config, &output.out_dir)
        }
        Commands::Clock { output } => {
            let mut handle = open_probe(cli.probe, serial)?;
            commands::calib::run_clock(&mut handle, &config, &output.out_dir)
        }
        Commands::Sense {
            output,
            supply,
            supply_channel,
        } => {
            let mut handle = open_probe(cli.probe, serial)?;
            commands::calib::run_sense(
                &mut handle,
                &config,
                &output.out_dir,
                supply.as_deref(),
                *supply_channel,
            )
        }
        Commands::Decode {
            input,
            records,
            json,
        } => commands::decode::run_decode(input, *records, *json, &config.model),
        Commands::Capture {
            port,
            baud,
            records,
            output,
        } => commands::capture::run_capture(port, *baud, *records, output.as_deref(), &config.model),
        Commands::Gpio { command } => {
            let mut handle = open_probe(cli.probe, serial)?;
            commands::gpio::run_gpio(handle.as_probe_mut(), command)
        }
        Commands::GpioTest => {
            let mut handle = open_probe(cli.probe, serial)?;
            commands::gpio::run_gpio_test(handle.as_probe_mut())
        }
        #[cfg(feature = "usb")]
        Commands::FlashSr { write, volatile } => {
            commands::flash_sr::run_flash_sr(serial, *write, *volatile)
        }
        #[cfg(not(feature = "usb"))]
        Commands::FlashSr { .. } => Err("USB support not compiled in".into()),
        Commands::List => commands::list_probes(),
    }
}
