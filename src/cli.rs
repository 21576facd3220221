//! CLI argument parsing

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u16
fn parse_hex_u16(s: &str) -> Result<u16, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u16>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Which probe implementation to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ProbeKind {
    /// iCEpick over USB
    #[default]
    Usb,
    /// Simulated probe, no hardware needed
    Dummy,
}

#[derive(Parser)]
#[command(name = "icepick-calib")]
#[command(author, version, about = "iCEpick bench calibration utilities", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Calibration configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Probe to use
    #[arg(long, value_enum, default_value_t = ProbeKind::Usb, global = true)]
    pub probe: ProbeKind,

    /// USB serial number of the probe to open
    #[arg(long, global = true)]
    pub serial: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output location shared by the calibration sweeps
#[derive(clap::Args, Debug, Clone)]
pub struct OutputArgs {
    /// Directory receiving `<serial>-<kind>.json`
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sweep the Vio rail and record the Vio sense channel
    Vio {
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Sweep the HF oscillator trim and record its frequency
    Trim {
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Repeat clock measurements of all three oscillators
    Clock {
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Sweep a bench supply on the sense input
    Sense {
        #[command(flatten)]
        output: OutputArgs,

        /// SCPI supply address (host:port), overrides the configuration
        #[arg(long)]
        supply: Option<String>,

        /// Supply output channel, overrides the configuration
        #[arg(long)]
        supply_channel: Option<u8>,
    },

    /// Decode a raw sample capture
    Decode {
        /// Raw capture file
        #[arg(short, long)]
        input: PathBuf,

        /// Only use the first N records after sync
        #[arg(short = 'n', long)]
        records: Option<usize>,

        /// Print the statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Capture the sample stream from a serial port
    Capture {
        /// Serial device (e.g. /dev/ttyUSB0)
        #[arg(short, long)]
        port: String,

        /// Baud rate
        #[arg(short, long, default_value_t = 115_200)]
        baud: u32,

        /// Number of records to read
        #[arg(short = 'n', long, default_value_t = 100)]
        records: usize,

        /// Save the raw capture to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Access the user I/O pins
    Gpio {
        #[command(subcommand)]
        command: GpioCommands,
    },

    /// Check drive and pull on every user I/O pin
    GpioTest,

    /// Read or write the flash status registers through the bootloader
    FlashSr {
        /// Value to write (hex with 0x prefix, or decimal)
        #[arg(long, value_parser = parse_hex_u16)]
        write: Option<u16>,

        /// Only write the volatile copy (lost on power cycle)
        #[arg(long, requires = "write")]
        volatile: bool,
    },

    /// List connected probes
    List,
}

#[derive(Subcommand)]
pub enum GpioCommands {
    /// Read input levels
    Read,

    /// Set output levels
    Write {
        /// Pin mask (hex with 0x prefix, or decimal)
        #[arg(value_parser = parse_hex_u16)]
        mask: u16,
    },

    /// Set output enables
    Oe {
        /// Pin mask (hex with 0x prefix, or decimal)
        #[arg(value_parser = parse_hex_u16)]
        mask: u16,
    },

    /// Set pull directions (1 = up)
    PullDir {
        /// Pin mask (hex with 0x prefix, or decimal)
        #[arg(value_parser = parse_hex_u16)]
        mask: u16,
    },

    /// Set pull enables
    PullEna {
        /// Pin mask (hex with 0x prefix, or decimal)
        #[arg(value_parser = parse_hex_u16)]
        mask: u16,
    },
}
