//! GPIO commands

use icepick_core::channel::IO_SENSE_CHANNELS;
use icepick_core::probe::CalibProbe;
use icepick_core::sweep::gpio_self_test;

use crate::cli::GpioCommands;

/// Render a pin mask as `a0 a2 b1`
pub fn pin_names(mask: u16) -> String {
    let names: Vec<&str> = IO_SENSE_CHANNELS
        .iter()
        .enumerate()
        .filter(|(pin, _)| mask & (1 << pin) != 0)
        .map(|(_, ch)| ch.name())
        .collect();
    if names.is_empty() {
        "-".to_string()
    } else {
        names.join(" ")
    }
}

/// Run a GPIO register access
pub fn run_gpio(
    probe: &mut dyn CalibProbe,
    command: &GpioCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    match *command {
        GpioCommands::Read => {
            let levels = probe.gpio_read()?;
            println!("0x{:03x} ({})", levels, pin_names(levels));
        }
        GpioCommands::Write { mask } => probe.gpio_write(mask)?,
        GpioCommands::Oe { mask } => probe.gpio_output_enable(mask)?,
        GpioCommands::PullDir { mask } => probe.gpio_pull_dir(mask)?,
        GpioCommands::PullEna { mask } => probe.gpio_pull_enable(mask)?,
    }
    Ok(())
}

/// Run the GPIO self-test
pub fn run_gpio_test(probe: &mut dyn CalibProbe) -> Result<(), Box<dyn std::error::Error>> {
    let faults = gpio_self_test(probe)?;
    if faults.is_empty() {
        println!("All {} I/O pins OK", IO_SENSE_CHANNELS.len());
        return Ok(());
    }

    for fault in &faults {
        println!("{}", fault);
    }
    Err(format!("{} GPIO check(s) failed", faults.len()).into())
}
