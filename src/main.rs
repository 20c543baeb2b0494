//! gait-sync CLI: load multi-rate recordings, synchronize them onto one
//! timeline and export the result.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use arrow::util::pretty::pretty_format_batches;
use clap::{Parser, Subcommand};
use log::info;

use gait_sync::data::export::{export_dataset, export_tables, record_batch, ExportFormat};
use gait_sync::data::loader::{load_file, LoadOptions};
use gait_sync::data::select::window_range;
use gait_sync::session::{ModalitySummary, TrialSession};
use gait_sync::{BoundaryMode, SyncConfig, Synchronizer};

/// Synchronize force-plate, EMG and motion-capture recordings
#[derive(Parser)]
#[command(name = "gait-sync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load modalities, synchronize them and export the aligned tables
    Sync {
        /// Modality input as NAME=PATH or NAME=PATH@RATE (repeatable)
        #[arg(short, long = "input", required = true, value_parser = parse_input)]
        inputs: Vec<InputArg>,

        /// JSON config file; flags below override its values
        #[arg(long)]
        config: Option<PathBuf>,

        /// Target rate in Hz
        #[arg(long)]
        target_rate: Option<u32>,

        /// Behaviour outside each source's valid range
        #[arg(long, value_parser = ["extrapolate", "clamp"])]
        boundary: Option<String>,

        /// Compute envelopes of this modality (repeatable)
        #[arg(long = "envelopes")]
        envelope_modalities: Vec<String>,

        /// Envelope smoothing window in milliseconds
        #[arg(long)]
        envelope_window_ms: Option<f64>,

        /// Export only MODALITY's listed channels: MODALITY=CH1,CH2 (repeatable)
        #[arg(long = "channels", value_parser = parse_channels)]
        channels: Vec<(String, Vec<String>)>,

        /// Export only the time window START:END in seconds
        #[arg(long, value_parser = parse_window)]
        window: Option<(f64, f64)>,

        /// Output format
        #[arg(long, default_value = "csv", value_parser = ["csv", "json", "parquet"])]
        format: String,

        /// Trial identifier used in the summary
        #[arg(long, default_value = "trial")]
        trial: String,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Load one file and print what was read
    Inspect {
        /// Path to a .csv, .json or .parquet recording
        path: PathBuf,

        /// Native rate in Hz, overriding the file
        #[arg(long)]
        rate: Option<u32>,

        /// Number of leading rows to print
        #[arg(long, default_value_t = 5)]
        head: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct InputArg {
    name: String,
    path: PathBuf,
    rate: Option<u32>,
}

fn parse_input(s: &str) -> std::result::Result<InputArg, String> {
    let (name, rest) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=PATH[@RATE], got '{s}'"))?;
    if name.is_empty() {
        return Err(format!("missing modality name in '{s}'"));
    }
    let (path, rate) = match rest.rsplit_once('@') {
        Some((path, rate)) if !rate.is_empty() && rate.bytes().all(|b| b.is_ascii_digit()) => {
            let rate = rate
                .parse::<u32>()
                .map_err(|e| format!("invalid rate '{rate}': {e}"))?;
            (path, Some(rate))
        }
        _ => (rest, None),
    };
    if path.is_empty() {
        return Err(format!("missing path in '{s}'"));
    }
    Ok(InputArg {
        name: name.to_string(),
        path: PathBuf::from(path),
        rate,
    })
}

fn parse_channels(s: &str) -> std::result::Result<(String, Vec<String>), String> {
    let (modality, list) = s
        .split_once('=')
        .ok_or_else(|| format!("expected MODALITY=CH1,CH2, got '{s}'"))?;
    let channels = list
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(String::from)
        .collect();
    Ok((modality.to_string(), channels))
}

fn parse_window(s: &str) -> std::result::Result<(f64, f64), String> {
    let (start, end) = s
        .split_once(':')
        .ok_or_else(|| format!("expected START:END, got '{s}'"))?;
    let start: f64 = start
        .trim()
        .parse()
        .map_err(|e| format!("invalid start '{start}': {e}"))?;
    let end: f64 = end
        .trim()
        .parse()
        .map_err(|e| format!("invalid end '{end}': {e}"))?;
    if start > end {
        return Err(format!("window start {start} is after end {end}"));
    }
    Ok((start, end))
}

struct SyncArgs {
    inputs: Vec<InputArg>,
    config: Option<PathBuf>,
    target_rate: Option<u32>,
    boundary: Option<String>,
    envelope_modalities: Vec<String>,
    envelope_window_ms: Option<f64>,
    channels: Vec<(String, Vec<String>)>,
    window: Option<(f64, f64)>,
    format: String,
    trial: String,
    output: PathBuf,
}

fn run_sync(args: SyncArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => SyncConfig::from_file(path)?,
        None => SyncConfig::default(),
    };
    if let Some(rate) = args.target_rate {
        config.target_rate = rate;
    }
    if let Some(boundary) = &args.boundary {
        config.boundary = boundary.parse::<BoundaryMode>().map_err(|e| anyhow!(e))?;
    }
    if let Some(ms) = args.envelope_window_ms {
        config.envelope_window_ms = ms;
    }
    config.validate()?;
    let format: ExportFormat = args.format.parse().map_err(|e: String| anyhow!(e))?;

    let mut session = TrialSession::new(args.trial);
    for input in &args.inputs {
        let options = LoadOptions {
            rate: input.rate,
            ..LoadOptions::named(input.name.clone())
        };
        let table = load_file(&input.path, &options)?;
        session.add_table(input.name.clone(), table);
    }
    for (modality, channels) in args.channels {
        session.selection = std::mem::take(&mut session.selection).only(&modality, channels);
    }

    let synchronizer = Synchronizer::from_config(&config)?;
    session.synchronize(&synchronizer)?;
    for modality in &args.envelope_modalities {
        session.compute_envelopes(modality, config.envelope_window_ms)?;
    }

    let dataset = session
        .synchronized()
        .context("synchronized dataset missing")?;
    let timeline = dataset.timeline().as_slice();
    let range = match (args.window, config.annotation_window_s) {
        (Some((start, end)), _) => window_range(timeline, start, end),
        (None, Some(w)) => window_range(timeline, 0.0, w),
        (None, None) => 0..timeline.len(),
    };
    info!("exporting timeline rows {}..{}", range.start, range.end);

    let mut written = export_dataset(
        dataset,
        &session.selection,
        range.clone(),
        &args.output,
        format,
    )?;
    if !session.envelopes().is_empty() {
        let windowed = session
            .envelopes()
            .iter()
            .map(|(m, t)| (m.clone(), t.slice(range.clone())))
            .collect();
        written.extend(export_tables(&windowed, &args.output.join("envelopes"), format)?);
    }

    print!("{}", session.summary());
    for path in written {
        println!("wrote {}", path.display());
    }
    Ok(())
}

fn run_inspect(path: &Path, rate: Option<u32>, head: usize) -> Result<()> {
    let options = LoadOptions {
        rate,
        ..LoadOptions::default()
    };
    let table = load_file(path, &options)?;
    let summary = ModalitySummary {
        name: table.name().to_string(),
        native_rate: table.native_rate(),
        samples: table.len(),
        channels: table.channels().len(),
        duration: table.duration(),
    };
    println!("{summary}");
    for ch in table.channels() {
        let role = ch.role.map(|r| r.to_string()).unwrap_or_else(|| "-".into());
        let missing = table.len() - ch.valid_count();
        println!("  {:<24} {:<14} {missing} missing", ch.name, role);
    }
    if head > 0 {
        let preview = table.slice(0..head);
        let batch = record_batch(&preview)?;
        println!("{}", pretty_format_batches(&[batch]).context("formatting preview")?);
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Sync {
            inputs,
            config,
            target_rate,
            boundary,
            envelope_modalities,
            envelope_window_ms,
            channels,
            window,
            format,
            trial,
            output,
        } => run_sync(SyncArgs {
            inputs,
            config,
            target_rate,
            boundary,
            envelope_modalities,
            envelope_window_ms,
            channels,
            window,
            format,
            trial,
            output,
        }),
        Commands::Inspect { path, rate, head } => run_inspect(&path, rate, head),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}
