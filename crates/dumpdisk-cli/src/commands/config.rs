//! Configuration file management command

use anyhow::{Context, Result};
use console::style;
use dumpdisk_core::Settings;
use std::path::PathBuf;

/// Arguments for the config command
pub struct ConfigArgs {
    /// Initialize a new configuration file with defaults
    pub init: bool,
    /// Show the path to the configuration file
    pub path: bool,
    /// Show configuration in JSON format
    pub json: bool,
    /// Suppress output (for scripting)
    pub silent: bool,
    /// Custom configuration file path (overrides default)
    pub config_file: Option<PathBuf>,
}

/// Execute the config command
pub fn execute(args: ConfigArgs) -> Result<()> {
    let config_path = args.config_file.clone().or_else(Settings::config_path);

    if args.path {
        if let Some(path) = &config_path {
            if !args.silent {
                println!("{}", path.display());
            }
        } else if !args.silent {
            eprintln!("{}", style("Could not determine config path").yellow());
        }
        return Ok(());
    }

    if args.init {
        return init_config(config_path, args.silent);
    }

    show_config(config_path, args.json, args.silent)
}

/// Initialize a new configuration file with default values
fn init_config(config_path: Option<PathBuf>, silent: bool) -> Result<()> {
    let path = config_path.context("Could not determine configuration directory")?;

    if path.exists() {
        if !silent {
            eprintln!(
                "{} Configuration file already exists at: {}",
                style("Warning:").yellow(),
                path.display()
            );
            eprintln!("Use a text editor to modify it, or delete it to re-initialize.");
        }
        return Ok(());
    }

    let saved_path = Settings::default()
        .save_to_path(Some(path))
        .context("Failed to save configuration file")?;

    if !silent {
        println!(
            "{} Created configuration file at: {}",
            style("Success:").green(),
            saved_path.display()
        );
        println!();
        println!("You can edit this file to customize default settings.");
        println!("Example settings:");
        println!();
        println!("  [image]");
        println!("  block_size = \"1M\"      # Read block size (default depends on source)");
        println!("  stream_digest = true   # Hash during the copy instead of a second pass");
        println!("  bad_sector = \"zero\"    # zero, fill:0xNN or abort");
        println!();
        println!("  [behavior]");
        println!("  skip_confirmation = false");
    }

    Ok(())
}

/// Show the current configuration
fn show_config(config_path: Option<PathBuf>, json: bool, silent: bool) -> Result<()> {
    if silent {
        return Ok(());
    }

    let config_exists = config_path.as_ref().is_some_and(|p| p.exists());
    let settings = Settings::load_from_path(config_path.clone());

    if json {
        let json_output = serde_json::to_string_pretty(&settings)
            .context("Failed to serialize settings to JSON")?;
        println!("{}", json_output);
        return Ok(());
    }

    println!("{}", style("DumpDisk Configuration").bold());
    println!();

    if let Some(path) = &config_path {
        if config_exists {
            println!("  {} {}", style("Config file:").dim(), path.display());
        } else {
            println!(
                "  {} {} {}",
                style("Config file:").dim(),
                path.display(),
                style("(not found, using defaults)").yellow()
            );
        }
    }
    println!();

    println!("{}", style("[image]").cyan());
    match &settings.image.block_size {
        Some(size) => println!("  block_size = \"{}\"", size),
        None => println!("  block_size = {}", style("(auto)").dim()),
    }
    println!("  verify = {}", settings.image.verify);
    println!("  stream_digest = {}", settings.image.stream_digest);
    println!("  bad_sector = \"{}\"", settings.image.bad_sector);
    println!("  mode = \"{}\"", settings.image.mode);
    println!();

    println!("{}", style("[behavior]").cyan());
    println!(
        "  skip_confirmation = {}",
        settings.behavior.skip_confirmation
    );
    println!("  quiet = {}", settings.behavior.quiet);

    if !config_exists {
        println!();
        println!(
            "{}",
            style("Run 'dumpdisk config --init' to create a configuration file.").dim()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dumpdisk_core::{BehaviorSettings, ImageSettings};
    use tempfile::TempDir;

    #[test]
    fn test_show_config_silent() {
        assert!(show_config(None, false, true).is_ok());
        assert!(show_config(None, true, true).is_ok());
    }

    #[test]
    fn test_execute_path_flag() {
        let args = ConfigArgs {
            init: false,
            path: true,
            json: false,
            silent: true,
            config_file: None,
        };
        assert!(execute(args).is_ok());
    }

    #[test]
    fn test_init_creates_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("dumpdisk_config.toml");

        init_config(Some(path.clone()), true).unwrap();
        assert!(path.exists());
        assert_eq!(Settings::load_from_path(Some(path)), Settings::default());
    }

    #[test]
    fn test_init_keeps_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("dumpdisk_config.toml");
        std::fs::write(&path, "[image]\nverify = false\n").unwrap();

        init_config(Some(path.clone()), true).unwrap();
        assert!(!Settings::load_from_path(Some(path)).image.verify);
    }

    #[test]
    fn test_init_without_path() {
        assert!(init_config(None, true).is_err());
    }

    #[test]
    fn test_settings_json_serialization() {
        let settings = Settings {
            image: ImageSettings {
                block_size: Some("2M".to_string()),
                ..ImageSettings::default()
            },
            behavior: BehaviorSettings::default(),
        };
        let json = serde_json::to_string_pretty(&settings).unwrap();
        assert!(json.contains("\"block_size\": \"2M\""));
        assert!(json.contains("bad_sector"));
        assert!(json.contains("skip_confirmation"));
    }
}
