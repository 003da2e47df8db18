//! DumpDisk - write-once forensic disk imaging
//!
//! # Usage
//!
//! ```bash
//! # List devices that can be imaged
//! dumpdisk list
//!
//! # Image a device, hashing the source first and the image afterwards
//! dumpdisk image /dev/sdb evidence.dd
//!
//! # Image with an inline digest and a JSON report
//! dumpdisk image /dev/sdb evidence.dd --stream-hash --report evidence.json
//!
//! # Hash an existing image
//! dumpdisk hash evidence.dd
//! ```

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use clap_mangen::Man;
use console::style;
use dumpdisk_core::Settings;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod progress;

/// DumpDisk - write-once forensic disk imaging
#[derive(Parser)]
#[command(name = "dumpdisk")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Suppress ALL output (implies --quiet and --yes)
    #[arg(long, global = true)]
    silent: bool,

    /// Use a specific configuration file
    #[arg(long, global = true, value_name = "FILE", env = "DUMPDISK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire an image of a device or file
    Image {
        /// Source device or file (e.g., /dev/sdb, \\.\PhysicalDrive1, disk.img)
        source: String,

        /// Destination image file
        destination: PathBuf,

        /// Skip the source and image digests
        #[arg(long)]
        no_verify: bool,

        /// Hash the data while copying instead of re-reading the source
        #[arg(long)]
        stream_hash: bool,

        /// Read block size (e.g., 4M, 1M, 512K)
        #[arg(short, long)]
        block_size: Option<String>,

        /// Source access mode (auto, raw, stream)
        #[arg(long)]
        mode: Option<String>,

        /// What to write for unreadable sectors (zero, fill:0xNN, abort)
        #[arg(long, value_name = "POLICY")]
        bad_sector: Option<String>,

        /// Overwrite the destination if it already exists
        #[arg(short, long)]
        force: bool,

        /// Skip confirmation prompts
        #[arg(short = 'y', long)]
        yes: bool,

        /// Write a JSON acquisition report to this file
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },

    /// Calculate the SHA-256 digest of a device or file
    Hash {
        /// Device or file to hash
        path: String,

        /// Source access mode (auto, raw, stream)
        #[arg(long)]
        mode: Option<String>,

        /// Read block size (e.g., 4M, 1M, 512K)
        #[arg(short, long)]
        block_size: Option<String>,

        /// What to hash for unreadable sectors (zero, fill:0xNN, abort)
        #[arg(long, value_name = "POLICY")]
        bad_sector: Option<String>,
    },

    /// List devices that can be imaged
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show or initialize the configuration file
    Config {
        /// Create a configuration file with default values
        #[arg(long)]
        init: bool,

        /// Print the configuration file path
        #[arg(long)]
        path: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Generate man pages
    Mangen {
        /// Output directory for man pages
        #[arg(short, long, default_value = ".")]
        out_dir: String,
    },
}

fn main() {
    // Set up panic handler for nicer error messages
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("{} {}", style("Error:").red().bold(), panic_info);
    }));

    if let Err(e) = run() {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load_from_path(cli.config.clone().or_else(Settings::config_path));

    // --silent implies --quiet (no logs at all, not even errors to tracing)
    let quiet = cli.quiet || settings.behavior.quiet;
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else if quiet || cli.silent {
        EnvFilter::new("off")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    let silent = cli.silent;

    match cli.command {
        Commands::Image {
            source,
            destination,
            no_verify,
            stream_hash,
            block_size,
            mode,
            bad_sector,
            force,
            yes,
            report,
        } => {
            let skip_confirm = yes || silent || settings.behavior.skip_confirmation;
            commands::image::execute(commands::image::ImageArgs {
                source,
                destination,
                no_verify,
                stream_hash,
                block_size,
                mode,
                bad_sector,
                force,
                skip_confirm,
                report,
                silent,
                settings,
            })
        }
        Commands::Hash {
            path,
            mode,
            block_size,
            bad_sector,
        } => commands::hash::execute(commands::hash::HashArgs {
            path,
            mode,
            block_size,
            bad_sector,
            silent,
            settings,
        }),
        Commands::List { json } => commands::list::execute(json, silent),
        Commands::Config { init, path, json } => {
            commands::config::execute(commands::config::ConfigArgs {
                init,
                path,
                json,
                silent,
                config_file: cli.config,
            })
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
        Commands::Mangen { out_dir } => {
            let cmd = Cli::command();
            let out_path = std::path::Path::new(&out_dir);
            std::fs::create_dir_all(out_path)?;

            let man = Man::new(cmd.clone());
            let mut buffer = Vec::new();
            man.render(&mut buffer)?;
            std::fs::write(out_path.join("dumpdisk.1"), buffer)?;
            if !silent {
                println!("Generated: {}/dumpdisk.1", out_dir);
            }

            for subcommand in cmd.get_subcommands() {
                let name = subcommand.get_name();
                if subcommand.is_hide_set()
                    || name == "completions"
                    || name == "mangen"
                    || name == "help"
                {
                    continue;
                }

                let man = Man::new(subcommand.clone());
                let mut buffer = Vec::new();
                man.render(&mut buffer)?;
                let filename = format!("dumpdisk-{}.1", name);
                std::fs::write(out_path.join(&filename), buffer)?;
                if !silent {
                    println!("Generated: {}/{}", out_dir, filename);
                }
            }

            if !silent {
                println!(
                    "\nInstall with: sudo cp {}/*.1 /usr/local/share/man/man1/",
                    out_dir
                );
            }
            Ok(())
        }
    }
}
