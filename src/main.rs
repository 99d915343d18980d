use clap::{Parser, Subcommand, ValueEnum};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use zen_review::annotation::EditState;
use zen_review::config::Config;
use zen_review::delivery::{BackgroundSink, DirectorySink, ExportSink, StdoutSink};
use zen_review::review::{fetch_and_export, load_session, save_edits, LoadResult, LoadTracker, SaveOutcome};
use zen_review::sample::Session;
use zen_review::segmentation::{Segmentation, SplitPolicy};
use zen_review::store::{FileStore, SessionStore};
use zen_review::timeline::{format_clock, ElapsedAxis, SampleSliceExt};
use zen_review::view::{axis_range, AxisRange, ViewWindowManager, WindowPreset};

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Parser)]
#[command(name = "zen-review")]
#[command(about = "Review, relabel and export recorded heart-rate sessions")]
struct Cli {
    /// Config file to use instead of the platform default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Session directory, overriding the configured one
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored sessions
    List,
    /// Summarize one session
    Show { session_id: String },
    /// Show a window of a session by time range, preset or sample indices
    Window {
        session_id: String,

        /// Start time (HH:MM:SS, MM:SS or SS)
        #[arg(long, requires = "to")]
        from: Option<String>,

        #[arg(long, requires = "from")]
        to: Option<String>,

        #[arg(long, value_enum, conflicts_with_all = ["from", "first"])]
        preset: Option<PresetArg>,

        /// First sample index
        #[arg(long, requires = "last", conflicts_with = "from")]
        first: Option<i64>,

        /// Last sample index (inclusive)
        #[arg(long, requires = "first")]
        last: Option<i64>,
    },
    /// Split a session into segments
    Segments {
        session_id: String,

        #[arg(long, conflicts_with_all = ["duration", "points"])]
        count: Option<usize>,

        /// Segment length in seconds
        #[arg(long, conflicts_with = "points")]
        duration: Option<f64>,

        /// Samples with a value on the channel per segment
        #[arg(long)]
        points: Option<usize>,

        /// Channel for --points (defaults to the configured primary channel)
        #[arg(long, requires = "points")]
        channel: Option<String>,

        /// Focus this segment (0-based)
        #[arg(long)]
        segment: Option<usize>,
    },
    /// Toggle anomaly labels by sample index and save
    Toggle {
        session_id: String,

        #[arg(required = true)]
        indices: Vec<usize>,
    },
    /// Clear every anomaly label of a session
    Reset {
        session_id: String,

        /// Apply and save; without it only the affected count is reported
        #[arg(long)]
        confirm: bool,
    },
    /// Export sessions as delimited text (all sessions when none are given)
    Export {
        session_ids: Vec<String>,

        /// Output directory (defaults to the configured export directory)
        #[arg(long, conflicts_with = "stdout")]
        out: Option<PathBuf>,

        #[arg(long)]
        stdout: bool,

        /// Cell delimiter; "tab" for tab-separated output
        #[arg(long, value_parser = parse_delimiter)]
        delimiter: Option<u8>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PresetArg {
    #[value(name = "10s")]
    TenSeconds,
    #[value(name = "30s")]
    ThirtySeconds,
    #[value(name = "1m")]
    OneMinute,
    #[value(name = "2m")]
    TwoMinutes,
}

impl From<PresetArg> for WindowPreset {
    fn from(preset: PresetArg) -> Self {
        match preset {
            PresetArg::TenSeconds => WindowPreset::TenSeconds,
            PresetArg::ThirtySeconds => WindowPreset::ThirtySeconds,
            PresetArg::OneMinute => WindowPreset::OneMinute,
            PresetArg::TwoMinutes => WindowPreset::TwoMinutes,
        }
    }
}

fn parse_delimiter(text: &str) -> Result<u8, String> {
    match text.as_bytes() {
        b"tab" | b"\\t" => Ok(b'\t'),
        [byte] if byte.is_ascii() => Ok(*byte),
        _ => Err(format!(
            "delimiter must be a single ASCII character, got '{}'",
            text
        )),
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let mut config = loaded.unwrap_or_else(|e| {
        log::warn!("Using default config: {}", e);
        Config::default()
    });
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    if let Err(e) = run(cli.command, config).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: Config) -> CliResult {
    let store = Arc::new(FileStore::new(&config.data_dir, config.session_cache_size));

    match command {
        Commands::List => {
            for session_id in store.list().await? {
                println!("{}", session_id);
            }
            Ok(())
        }
        Commands::Show { session_id } => show(&open(store.as_ref(), &session_id).await?, &config),
        Commands::Window {
            session_id,
            from,
            to,
            preset,
            first,
            last,
        } => {
            let session = open(store.as_ref(), &session_id).await?;
            let axis = ElapsedAxis::from_samples(&session.samples);
            let mut view = ViewWindowManager::new(session.len());

            if let (Some(from), Some(to)) = (from, to) {
                view.by_time_string(&from, &to, &axis)?;
            } else if let Some(preset) = preset {
                view.show_preset(preset.into(), &axis);
            } else if let (Some(first), Some(last)) = (first, last) {
                view.set_window(first, last);
            }

            print_window(&session, &view, &axis, &config);
            Ok(())
        }
        Commands::Segments {
            session_id,
            count,
            duration,
            points,
            channel,
            segment,
        } => {
            let policy = match (count, duration, points) {
                (Some(k), _, _) => SplitPolicy::Count(k),
                (_, Some(secs), _) => SplitPolicy::Duration(secs),
                (_, _, Some(per_segment)) => SplitPolicy::Points {
                    per_segment,
                    channel: channel.unwrap_or_else(|| config.primary_channel.clone()),
                },
                _ => return Err("one of --count, --duration or --points is required".into()),
            };

            let session = open(store.as_ref(), &session_id).await?;
            let axis = ElapsedAxis::from_samples(&session.samples);
            let mut segmentation = match Segmentation::build(&session.samples, &axis, policy) {
                Ok(segmentation) => segmentation,
                Err(e) if e.is_informational() => {
                    println!("{}", e);
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };

            for (i, window) in segmentation.segments().iter().enumerate() {
                println!(
                    "{:>4}  samples {:>6}..={:<6}  {} - {}",
                    i,
                    window.start,
                    window.end,
                    format_clock(axis.get(window.start).unwrap_or(0.0)),
                    format_clock(axis.get(window.end).unwrap_or(0.0)),
                );
            }

            if let Some(index) = segment {
                segmentation.go_to(index);
                let mut view = ViewWindowManager::new(session.len());
                segmentation.apply(&mut view);
                println!(
                    "Segment {} of {}",
                    segmentation.current_index() + 1,
                    segmentation.len()
                );
                print_window(&session, &view, &axis, &config);
            }
            Ok(())
        }
        Commands::Toggle {
            session_id,
            indices,
        } => {
            let session = open(store.as_ref(), &session_id).await?;
            let mut edit = EditState::new(&session.samples);
            for index in indices {
                match edit.toggle(index) {
                    Some(label) => println!("Sample {} -> {}", index, label),
                    None => println!("Sample {} is out of range, ignored", index),
                }
            }
            report_save(save_edits(store.as_ref(), &session_id, &mut edit).await?);
            Ok(())
        }
        Commands::Reset {
            session_id,
            confirm,
        } => {
            let session = open(store.as_ref(), &session_id).await?;
            let mut edit = EditState::new(&session.samples);
            let request = edit.request_reset_all();

            if !confirm {
                println!(
                    "Would clear {} anomaly labels; rerun with --confirm to apply",
                    request.affected()
                );
                return Ok(());
            }

            edit.apply_reset_all(request);
            report_save(save_edits(store.as_ref(), &session_id, &mut edit).await?);
            Ok(())
        }
        Commands::Export {
            session_ids,
            out,
            stdout,
            delimiter,
        } => {
            let session_ids = if session_ids.is_empty() {
                store.list().await?
            } else {
                session_ids
            };
            let delimiter = delimiter.unwrap_or(config.delimiter);

            let batch = fetch_and_export(store, &session_ids, config.export_concurrency, delimiter).await;
            for session_id in &batch.empty {
                println!("Session {} has no samples, skipped", session_id);
            }

            if stdout {
                for file in &batch.files {
                    StdoutSink.deliver(file)?;
                }
            } else {
                let dir = out.unwrap_or_else(|| config.export_dir.clone());
                let sink = BackgroundSink::new(Box::new(DirectorySink::new(&dir)));
                for file in &batch.files {
                    sink.deliver(file)?;
                }
                sink.flush()?;
                println!("Exported {} sessions to {}", sink.delivered(), dir.display());
                if sink.failed() > 0 {
                    return Err(format!("{} export files could not be written", sink.failed()).into());
                }
            }

            if !batch.failures.is_empty() {
                for (session_id, e) in &batch.failures {
                    eprintln!("Session {}: {}", session_id, e);
                }
                return Err(format!("{} sessions could not be exported", batch.failures.len()).into());
            }
            Ok(())
        }
    }
}

async fn open(store: &FileStore, session_id: &str) -> Result<Session, Box<dyn Error>> {
    let tracker = LoadTracker::new();
    match load_session(store, &tracker, session_id).await? {
        LoadResult::Loaded(session) => Ok(session),
        LoadResult::Discarded => Err(format!("load of session {} was abandoned", session_id).into()),
    }
}

fn show(session: &Session, config: &Config) -> CliResult {
    let metadata = &session.metadata;
    let axis = ElapsedAxis::from_samples(&session.samples);

    println!("Session:   {}", session.id);
    if let Some(subject) = &metadata.subject_id {
        println!("Subject:   {}", subject);
    }
    if let Some(name) = &metadata.subject_name {
        println!("Name:      {}", name);
    }
    if let Some(label) = &metadata.label {
        println!("Label:     {}", label);
    }
    if let Some(recorded_at) = &metadata.recorded_at {
        println!("Recorded:  {}", recorded_at);
    }
    println!("Samples:   {}", session.len());
    println!("Duration:  {}", format_clock(axis.total_duration()));
    println!("Anomalies: {}", session.samples.anomaly_count());
    if let Some((min, max)) = session.samples.min_max_channel(&config.primary_channel) {
        println!("{}: {:.1} - {:.1}", config.primary_channel, min, max);
    }
    for (predictor, positives) in session.prediction_counts() {
        println!("Predicted by {}: {}", predictor, positives);
    }
    for (key, value) in &metadata.statistics {
        println!("  {} = {}", key, value);
    }
    Ok(())
}

fn print_window(session: &Session, view: &ViewWindowManager, axis: &ElapsedAxis, config: &Config) {
    let Some(window) = view.window() else {
        println!("Session has no samples");
        return;
    };
    let visible = view.visible(&session.samples);

    println!(
        "Samples {}..={} ({} of {})",
        window.start,
        window.end,
        window.len(),
        session.len()
    );
    match axis_range(Some(window), axis, config.axis_padding) {
        AxisRange::Padded { min, max } => println!("Axis:      {:.1}s - {:.1}s", min, max),
        AxisRange::FullExtent => println!("Axis:      full session"),
    }
    if let Some((first, last)) = visible.min_max_time() {
        println!("Time:      {} - {}", first.format("%H:%M:%S"), last.format("%H:%M:%S"));
    }
    if let Some((min, max)) = visible.min_max_channel(&config.primary_channel) {
        println!("{}: {:.1} - {:.1}", config.primary_channel, min, max);
    }
    println!("Anomalies: {}", visible.anomaly_count());
}

fn report_save(outcome: SaveOutcome) {
    match outcome {
        SaveOutcome::NothingToSave => println!("Nothing to save"),
        SaveOutcome::Saved { changes } => println!("Saved {} label changes", changes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_delimiter() {
        assert_eq!(parse_delimiter(","), Ok(b','));
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert_eq!(parse_delimiter("\\t"), Ok(b'\t'));
        assert!(parse_delimiter("é").is_err());
        assert!(parse_delimiter(",;").is_err());
        assert!(parse_delimiter("").is_err());
    }
}
