//! Flash status register access through the DFU bootloader

use icepick_usb::{IcepickConfig, IcepickDfu};

/// Run the flash-sr command
pub fn run_flash_sr(
    serial: Option<&str>,
    write: Option<u16>,
    volatile: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = IcepickConfig {
        serial: serial.map(str::to_string),
        index: None,
    };
    let dfu = IcepickDfu::open_with_config(&config).map_err(|e| {
        format!(
            "Failed to open iCEpick bootloader: {}\nMake sure the probe is in DFU mode.",
            e
        )
    })?;

    let before = dfu.read_status()?;
    println!("Status: 0x{:04X}", before);

    if let Some(sr) = write {
        if volatile {
            dfu.write_enable_volatile()?;
        } else {
            dfu.write_enable()?;
        }
        dfu.write_status(sr)?;

        let after = dfu.read_status()?;
        println!("Status: 0x{:04X}", after);
        if after != sr {
            log::warn!("Status readback 0x{:04X} differs from 0x{:04X}", after, sr);
        }
    }

    Ok(())
}
