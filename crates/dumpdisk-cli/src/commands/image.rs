//! Image command - acquires a forensic image of a source
//!
//! This is the main functionality of DumpDisk. It handles:
//! - Merging persisted settings with command-line flags
//! - Destination safety checks and confirmation
//! - Imaging with progress display
//! - Source and image digests with a verification verdict
//! - The final summary and optional JSON report

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use console::style;
use dialoguer::Confirm;
use indicatif::ProgressBar;
use std::path::PathBuf;

use crate::progress::{create_progress_bar, format_size, progress_message};
use dumpdisk_core::source::resolve_kind;
use dumpdisk_core::{
    format_duration, format_speed, parse_block_size, partial_path_for, Acquisition,
    AcquisitionEvent, AcquisitionReport, Config, Settings, SourceKind, VerificationOutcome,
};
use dumpdisk_platform::has_elevated_privileges;

/// Arguments for the image command
pub struct ImageArgs {
    pub source: String,
    pub destination: PathBuf,
    pub no_verify: bool,
    pub stream_hash: bool,
    pub block_size: Option<String>,
    pub mode: Option<String>,
    pub bad_sector: Option<String>,
    pub force: bool,
    pub skip_confirm: bool,
    pub report: Option<PathBuf>,
    pub silent: bool,
    pub settings: Settings,
}

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

/// Start line printed at launch
pub fn start_banner(time: &DateTime<Local>) -> String {
    format!(
        "Starting : [{}] / [{}]",
        time.format("%H:%M:%S"),
        time.format("%d:%m:%Y")
    )
}

/// Apply the shared source flags on top of persisted settings
///
/// This is the single place where settings and flags meet; `image` and
/// `hash` both go through it.
pub fn merge_source_flags(
    settings: &Settings,
    block_size: Option<&str>,
    mode: Option<&str>,
    bad_sector: Option<&str>,
) -> Result<Config> {
    let mut config = Config::from_settings(settings).context("Invalid configuration file")?;

    if let Some(size) = block_size {
        config = config.block_size(parse_block_size(size)?);
    }
    if let Some(mode) = mode {
        config = config.source_mode(mode.parse().context("Invalid source mode")?);
    }
    if let Some(policy) = bad_sector {
        config = config.bad_sector_policy(policy.parse().context("Invalid bad sector policy")?);
    }

    Ok(config)
}

/// Merge settings and flags into a runtime configuration
pub fn build_config(args: &ImageArgs) -> Result<Config> {
    let mut config = merge_source_flags(
        &args.settings,
        args.block_size.as_deref(),
        args.mode.as_deref(),
        args.bad_sector.as_deref(),
    )?;

    if args.no_verify {
        config = config.verify(false);
    }
    if args.stream_hash {
        config = config.stream_digest(true);
    }

    Ok(config.overwrite(args.force))
}

/// Execute the image command
pub fn execute(args: ImageArgs) -> Result<()> {
    let silent = args.silent;
    println_if!(silent, "{}", style(start_banner(&Local::now())).dim());
    println_if!(silent);

    let mut config = build_config(&args)?;

    // Step 1: Describe source
    let kind = resolve_kind(&args.source, config.source_mode);
    println_if!(
        silent,
        "{} {} ({})",
        style("Source:").bold(),
        style(&args.source).cyan(),
        match kind {
            SourceKind::Raw => "raw device",
            SourceKind::Stream => "stream",
        }
    );

    if kind == SourceKind::Raw && !has_elevated_privileges() {
        eprintln!(
            "{} Raw device access usually requires elevated privileges",
            style("Warning:").yellow().bold()
        );
    }

    // Step 2: Destination checks
    println_if!(
        silent,
        "{} {}",
        style("Destination:").bold(),
        style(args.destination.display()).cyan()
    );

    if args.destination.exists() && !config.overwrite {
        if args.skip_confirm {
            bail!(
                "Destination already exists: {} (use --force to overwrite)",
                args.destination.display()
            );
        }
        let proceed = Confirm::new()
            .with_prompt(format!(
                "{} already exists. Overwrite it?",
                args.destination.display()
            ))
            .default(false)
            .interact()?;
        if !proceed {
            println!("{}", style("Aborted.").yellow());
            return Ok(());
        }
        config = config.overwrite(true);
    }

    println_if!(
        silent,
        "  Block size: {} | Verify: {} | Bad sectors: {}",
        config
            .block_size
            .map(|b| format_size(b as u64))
            .unwrap_or_else(|| "auto".to_string()),
        if !config.verify {
            "off"
        } else if config.stream_digest {
            "stream digest"
        } else {
            "source pass"
        },
        config.bad_sector_policy
    );

    // The process exits on Ctrl+C; say where the partial image is first
    let partial = partial_path_for(&args.destination);
    ctrlc::set_handler(move || {
        eprintln!(
            "\n{} Interrupted. Partial image left at {}",
            style("⚠").yellow().bold(),
            partial.display()
        );
        std::process::exit(130);
    })
    .context("Failed to install Ctrl+C handler")?;

    // Step 3: Acquire
    println_if!(silent);
    let mut current: Option<ProgressBar> = None;
    let acquisition = Acquisition::new(config).on_event(move |event| match event {
        AcquisitionEvent::PhaseStarted { phase, total_bytes } => {
            if let Some(pb) = current.take() {
                pb.finish_and_clear();
            }
            current = Some(create_progress_bar(
                *total_bytes,
                &phase.to_string(),
                silent,
            ));
        }
        AcquisitionEvent::Progress { progress, .. } => {
            if let Some(pb) = &current {
                pb.set_position(progress.bytes_processed);
                pb.set_message(progress_message(progress));
            }
        }
        AcquisitionEvent::PhaseFinished { phase } => {
            if let Some(pb) = current.take() {
                let bytes = pb.position();
                pb.finish_and_clear();
                println_if!(
                    silent,
                    "  {} {} ({})",
                    style("✓").green(),
                    phase,
                    format_size(bytes)
                );
            }
        }
    });

    let report = match acquisition.run(&args.source, &args.destination) {
        Ok(report) => report,
        Err(e) => {
            let partial = partial_path_for(&args.destination);
            if e.leaves_partial_image() && partial.exists() {
                eprintln!(
                    "{} Partial image left at {}",
                    style("⚠").yellow().bold(),
                    partial.display()
                );
            }
            return Err(e.into());
        }
    };

    // Step 4: Summary and report
    print_summary(&report, silent);

    if let Some(path) = &args.report {
        report
            .write_json(path)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        println_if!(
            silent,
            "  {} Report written to {}",
            style("✓").green(),
            path.display()
        );
    }

    if report.verification.is_mismatch() {
        eprintln!(
            "{} The image does not match its source digest",
            style("Warning:").red().bold()
        );
    }

    Ok(())
}

/// Print the final summary of an acquisition
fn print_summary(report: &AcquisitionReport, silent: bool) {
    if silent {
        return;
    }

    println!();
    println!("{}", style("Summary").bold());
    println!("  Image:        {}", report.destination.display());
    println!(
        "  Copied:       {} ({} bytes)",
        format_size(report.bytes_copied),
        report.bytes_copied
    );
    println!(
        "  Elapsed:      {} ({})",
        format_duration(report.elapsed_secs as u64),
        format_speed(report.average_speed_bps)
    );

    if report.unreadable_sectors > 0 {
        println!(
            "  Bad sectors:  {} (replaced: {})",
            style(report.unreadable_sectors).yellow().bold(),
            report.bad_sector_policy
        );
    } else {
        println!("  Bad sectors:  0");
    }

    if let Some(digest) = &report.source_digest {
        println!("  Source:       {}", digest);
    }
    if let Some(digest) = &report.stream_digest {
        println!("  Stream:       {}", digest);
    }
    if let Some(digest) = &report.destination_digest {
        println!("  Image:        {}", digest);
    }

    let verdict = match &report.verification {
        VerificationOutcome::Verified { .. } => style(report.verification.to_string()).green().bold(),
        VerificationOutcome::Mismatch { .. } => style(report.verification.to_string()).red().bold(),
        VerificationOutcome::Skipped => style(report.verification.to_string()).dim(),
    };
    println!();
    println!("{}", verdict);
}
