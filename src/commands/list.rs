//! List command implementation

/// List connected probes
#[cfg(feature = "usb")]
pub fn list_probes() -> Result<(), Box<dyn std::error::Error>> {
    let devices = icepick_usb::Icepick::list_devices()?;
    if devices.is_empty() {
        println!("No iCEpick found");
        return Ok(());
    }

    println!("Connected probes:");
    println!();
    for dev in &devices {
        println!("  {}", dev);
    }
    Ok(())
}

/// List connected probes
#[cfg(not(feature = "usb"))]
pub fn list_probes() -> Result<(), Box<dyn std::error::Error>> {
    println!("USB support not compiled in; only --probe dummy is available");
    Ok(())
}
