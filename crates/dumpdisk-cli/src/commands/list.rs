//! List command - displays devices that can be imaged

use anyhow::{Context, Result};
use console::style;
use dumpdisk_platform::DeviceSummary;

use crate::progress::format_size;

/// Execute the list command
pub fn execute(json: bool, silent: bool) -> Result<()> {
    let devices = dumpdisk_platform::list_devices().context("Failed to list devices")?;

    // JSON output mode - always output even in silent mode (it's machine-readable)
    if json {
        let output =
            serde_json::to_string_pretty(&devices).context("Failed to serialize device list")?;
        println!("{}", output);
        return Ok(());
    }

    if silent {
        return Ok(());
    }

    if devices.is_empty() {
        println!("No devices found.");
        if !dumpdisk_platform::has_elevated_privileges() {
            println!(
                "{}",
                style("Tip: Some devices are only visible with elevated privileges").dim()
            );
        }
        return Ok(());
    }

    println!(
        "{} {} device(s):\n",
        style("Found").green().bold(),
        devices.len()
    );

    for device in &devices {
        print_device(device);
    }

    Ok(())
}

/// Print a single device's information
fn print_device(device: &DeviceSummary) {
    let kind = if device.removable {
        style("removable").cyan()
    } else {
        style("internal").yellow()
    };

    println!(
        "{} {} ({}, {})",
        style(&device.path).white().bold(),
        style(device.model.as_deref().unwrap_or("Unknown device")).white(),
        format_size(device.size),
        kind
    );
    println!(
        "    {} bytes | {} byte sectors",
        device.size, device.sector_size
    );
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_device_does_not_panic() {
        print_device(&DeviceSummary {
            path: "/dev/sdb".to_string(),
            size: 32 * 1024 * 1024 * 1024,
            sector_size: 512,
            model: Some("Evidence Stick".to_string()),
            removable: true,
        });
        print_device(&DeviceSummary {
            path: r"\\.\PhysicalDrive1".to_string(),
            size: 0,
            sector_size: 4096,
            model: None,
            removable: false,
        });
    }

    #[test]
    fn test_device_summary_json() {
        let json = serde_json::to_value(DeviceSummary {
            path: "/dev/sdb".to_string(),
            size: 1024,
            sector_size: 512,
            model: None,
            removable: false,
        })
        .unwrap();
        assert_eq!(json["path"], "/dev/sdb");
        assert_eq!(json["sector_size"], 512);
        assert!(json["model"].is_null());
    }
}
