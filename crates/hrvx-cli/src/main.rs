use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use hrvx_lib::{
    batch::partition_outcomes,
    conditioning::{EcgConditioner, SignalConditioner},
    config::{read_pipeline_config, PipelineConfig},
    default_pipeline,
    detectors::{BeatDetector, PanTompkinsDetector},
    io::{request as request_io, table as table_io, text as text_io},
    metrics::hrv::hrv_features,
    signal::{Events, RRSeries},
    slice_windows, FeatureTable,
};
use log::{info, warn};
use serde::Serialize;
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

#[derive(Parser)]
#[command(
    name = "hrvx",
    version,
    about = "HRVX: windowed heart-rate-variability features from ECG batches"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the feature table of a JSON batch request read from stdin or --input
    Process {
        #[arg(long)]
        input: Option<PathBuf>,
        /// Pipeline tunables (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override the request's window_slicing_method
        #[arg(long)]
        method: Option<String>,
        /// Override the request's window_size (seconds)
        #[arg(long)]
        window_size: Option<f64>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Keep processing the other subjects when one fails
        #[arg(long)]
        keep_going: bool,
    },
    /// Print the window boundaries of every subject in a batch request
    Windows {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        method: Option<String>,
        #[arg(long)]
        window_size: Option<f64>,
    },
    /// Detect R-peaks from newline-delimited ECG samples
    DetectBeats {
        #[arg(long, default_value_t = 250.0)]
        fs: f64,
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
        /// Skip conditioning and detect on the raw trace
        #[arg(long)]
        raw: bool,
    },
    /// The eight HRV features of newline-delimited RR intervals (seconds)
    Hrv {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Process {
            input,
            config,
            method,
            window_size,
            format,
            output,
            keep_going,
        } => cmd_process(
            input.as_deref(),
            config.as_deref(),
            method,
            window_size,
            format,
            output.as_deref(),
            keep_going,
        )?,
        Commands::Windows {
            input,
            method,
            window_size,
        } => cmd_windows(input.as_deref(), method, window_size)?,
        Commands::DetectBeats {
            fs,
            input,
            config,
            raw,
        } => cmd_detect_beats(fs, input.as_deref(), config.as_deref(), raw)?,
        Commands::Hrv { input, config } => cmd_hrv(input.as_deref(), config.as_deref())?,
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(p) => read_pipeline_config(p),
        None => Ok(PipelineConfig::default()),
    }
}

fn load_request(
    input: Option<&Path>,
    method: Option<String>,
    window_size: Option<f64>,
) -> Result<request_io::BatchRequest> {
    let text = text_io::read_input(input)?;
    let mut request = request_io::parse_batch_request(&text)?;
    if let Some(method) = method {
        request.configs.window_slicing_method = method;
    }
    if let Some(size) = window_size {
        request.configs.window_size = size;
    }
    Ok(request)
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("failed to create {}", p.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    })
}

fn write_table(table: &FeatureTable, format: OutputFormat, output: Option<&Path>) -> Result<()> {
    let mut out = open_output(output)?;
    match format {
        OutputFormat::Json => {
            table_io::write_json(table, &mut out)?;
            writeln!(out)?;
        }
        OutputFormat::Csv => table_io::write_csv(table, &mut out)?,
    }
    out.flush()?;
    Ok(())
}

fn cmd_process(
    input: Option<&Path>,
    config: Option<&Path>,
    method: Option<String>,
    window_size: Option<f64>,
    format: OutputFormat,
    output: Option<&Path>,
    keep_going: bool,
) -> Result<()> {
    let cfg = load_config(config)?;
    let (batch, policy) = load_request(input, method, window_size)?
        .into_batch()
        .context("invalid batch request")?;
    let pipeline = default_pipeline(&cfg);

    let table = if keep_going {
        let outcomes = pipeline.run_per_subject(&batch, &policy);
        let total = outcomes.len();
        let (table, failures) = partition_outcomes(outcomes);
        for failure in &failures {
            eprintln!("skipped: {failure}");
        }
        if failures.len() == total {
            bail!("all {total} subject(s) failed");
        }
        if !failures.is_empty() {
            warn!("{} of {total} subject(s) skipped", failures.len());
        }
        table
    } else {
        #[cfg(feature = "parallel")]
        let result = pipeline.run_parallel(&batch, &policy);
        #[cfg(not(feature = "parallel"))]
        let result = pipeline.run(&batch, &policy);
        result.context("feature extraction aborted")?
    };
    info!("writing {} record(s)", table.len());
    write_table(&table, format, output)
}

#[derive(Serialize)]
struct WindowSummary {
    id: usize,
    start: f64,
    end: f64,
    samples: usize,
}

#[derive(Serialize)]
struct SubjectWindows {
    subject_id: String,
    sample_id: String,
    windows: Vec<WindowSummary>,
}

fn cmd_windows(input: Option<&Path>, method: Option<String>, window_size: Option<f64>) -> Result<()> {
    let (batch, policy) = load_request(input, method, window_size)?
        .into_batch()
        .context("invalid batch request")?;
    for sample in batch.samples() {
        let windows = slice_windows(sample.timestamps(), sample.labels(), &policy)
            .with_context(|| format!("slicing subject {}", sample.subject_id()))?;
        let summary = SubjectWindows {
            subject_id: sample.subject_id().to_string(),
            sample_id: sample.sample_id().to_string(),
            windows: windows
                .iter()
                .map(|w| WindowSummary {
                    id: w.id,
                    start: w.start,
                    end: w.end,
                    samples: w.len(),
                })
                .collect(),
        };
        println!("{}", serde_json::to_string(&summary)?);
    }
    Ok(())
}

#[derive(Serialize)]
struct BeatsOutput {
    fs: f64,
    events: Events,
    rr: RRSeries,
}

fn cmd_detect_beats(fs: f64, input: Option<&Path>, config: Option<&Path>, raw: bool) -> Result<()> {
    let cfg = load_config(config)?;
    let ecg = text_io::parse_ecg_series(&text_io::read_input(input)?)?;
    let cleaned = if raw {
        ecg
    } else {
        EcgConditioner::new(cfg.conditioning).clean(&ecg, fs)?
    };
    let events = PanTompkinsDetector::new(cfg.detector).detect(&cleaned, fs)?;
    let rr = RRSeries::from_events(&events, fs);
    println!("{}", serde_json::to_string(&BeatsOutput { fs, events, rr })?);
    Ok(())
}

fn cmd_hrv(input: Option<&Path>, config: Option<&Path>) -> Result<()> {
    let cfg = load_config(config)?;
    let rr = RRSeries {
        rr: text_io::parse_rr_series(&text_io::read_input(input)?)?,
    };
    let features = hrv_features(&rr, &cfg.frequency)?;
    println!("{}", serde_json::to_string(&features)?);
    Ok(())
}
