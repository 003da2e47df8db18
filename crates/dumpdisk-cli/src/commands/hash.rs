//! Hash command - computes the SHA-256 digest of a file or device

use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use crate::commands::image::merge_source_flags;
use crate::progress::{create_progress_bar, format_size, progress_message};
use dumpdisk_core::{open_source, Settings, Verifier};

/// Conditionally println based on silent mode
macro_rules! println_if {
    ($silent:expr) => {
        if !$silent {
            println!();
        }
    };
    ($silent:expr, $($arg:tt)*) => {
        if !$silent {
            println!($($arg)*);
        }
    };
}

/// Arguments for the hash command
pub struct HashArgs {
    pub path: String,
    pub mode: Option<String>,
    pub block_size: Option<String>,
    pub bad_sector: Option<String>,
    pub silent: bool,
    pub settings: Settings,
}

/// Execute the hash command
pub fn execute(args: HashArgs) -> Result<()> {
    let silent = args.silent;
    let config = merge_source_flags(
        &args.settings,
        args.block_size.as_deref(),
        args.mode.as_deref(),
        args.bad_sector.as_deref(),
    )?;

    println_if!(
        silent,
        "{} {}",
        style("Source:").bold(),
        style(&args.path).cyan()
    );

    let mut source = open_source(&args.path, config.source_mode)
        .with_context(|| format!("Failed to open source: {}", args.path))?;
    let size = source.info().size;

    if let Some(size) = size {
        println_if!(silent, "  Size: {}", format_size(size));
    }

    println_if!(silent, "\n{} SHA-256...", style("Calculating").bold());

    let pb = create_progress_bar(size, "Hashing", silent);
    let pb_clone = pb.clone();
    let mut verifier = Verifier::new()
        .block_size(config.block_size)
        .bad_sector_policy(config.bad_sector_policy)
        .on_progress(move |progress| {
            pb_clone.set_position(progress.bytes_processed);
            pb_clone.set_message(progress_message(progress));
        });

    let digest = verifier
        .digest_source(source.as_mut())
        .context("Failed to calculate digest")?;

    pb.finish_and_clear();

    // The digest is the useful output, so it is printed even in silent mode
    if silent {
        println!("{}", digest);
    } else {
        println!();
        println!("{} ({}):", style("SHA-256").green().bold(), args.path);
        println!("{}", digest);

        println!();
        println!("{}:", style("Checksum file format").dim());
        println!("{}  {}", digest, file_label(&args.path));
    }

    Ok(())
}

/// Name used in checksum file output
fn file_label(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
}
