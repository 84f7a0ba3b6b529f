//! Rowmark: hand-circled parcel marking extraction for right-of-way scans.
//!
//! Rowmark finds hand-drawn circles on scanned documents, cuts each circle
//! out with everything around it whitened, and packs all circles of one
//! document into a single mosaic image for a downstream OCR step. Large
//! batches are split across independent workers by a pure partitioning
//! formula over a shared index of object names.
//!
//! # Modules
//!
//! - [`partition`]: Work ranges and index reading
//! - [`detect`]: Adaptive circle detection over radius bands
//! - [`crop`]: Circle masking and boundary-clamped cropping
//! - [`mosaic`]: Tiling crops into one raster
//! - [`job`]: The per-worker orchestrator and its ledger
//! - [`summary`]: Run summaries and remaining work
//! - [`raster`], [`storage`]: Codec, PDF, and object storage collaborators
//! - [`error`]: Error types for rowmark operations

pub mod crop;
pub mod detect;
pub mod error;
pub mod job;
pub mod mosaic;
pub mod partition;
pub mod raster;
pub mod storage;
pub mod summary;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

pub use error::RowmarkError;

use detect::{AdaptiveCircleDetector, DetectorConfig};
use job::{JobLedger, JobOrchestrator};
use mosaic::{compose_mosaic, MosaicOptions};
use partition::WorkRange;
use raster::{ImageCodec, StandardCodec};
use storage::{LocalStore, ObjectStore, RetryPolicy, Retrying};

/// The rowmark CLI application.
#[derive(Parser)]
#[command(name = "rowmark")]
#[command(version, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Generate or partition an index of object names.
    #[command(subcommand)]
    Index(IndexCommands),
    /// Convert PDF documents to page images.
    #[command(subcommand)]
    Pdf(PdfCommands),
    /// Detect circles in images.
    #[command(subcommand)]
    Circles(CircleCommands),
    /// Process this task's slice of the index (parameters usually come from the environment).
    Run(RunArgs),
    /// Summarize the ledgers of a completed run.
    Summarize(SummarizeArgs),
    /// Write the index entries that still need processing.
    Remaining(RemainingArgs),
}

#[derive(Subcommand)]
enum IndexCommands {
    /// List every object in a bucket into an index file.
    Generate(GenerateArgs),
    /// Show the work range and entries owned by one task.
    Partition(PartitionArgs),
}

#[derive(Subcommand)]
enum PdfCommands {
    /// Render every page of a PDF to an image.
    Convert(ConvertArgs),
}

#[derive(Subcommand)]
enum CircleCommands {
    /// Detect circles in one image, optionally saving crops and a mosaic.
    Detect(DetectArgs),
}

/// Arguments for `index generate`.
#[derive(clap::Args)]
struct GenerateArgs {
    /// Bucket directory to list.
    #[arg(long)]
    bucket: PathBuf,

    /// Only list keys starting with this prefix.
    #[arg(long, default_value = "")]
    prefix: String,

    /// Index file to write.
    #[arg(long)]
    output: PathBuf,
}

/// Arguments for `index partition`.
#[derive(clap::Args)]
struct PartitionArgs {
    /// Index file to read.
    #[arg(long)]
    index: PathBuf,

    #[arg(long)]
    task_index: usize,

    #[arg(long)]
    task_count: usize,

    /// Total entries in the index (counted from the file when omitted).
    #[arg(long)]
    total_files: Option<usize>,
}

/// Arguments for `pdf convert`.
#[derive(clap::Args)]
struct ConvertArgs {
    /// PDF file to convert.
    input: PathBuf,

    /// Directory for the page images.
    #[arg(long)]
    output_directory: PathBuf,
}

/// Arguments for `circles detect`.
#[derive(clap::Args)]
struct DetectArgs {
    /// Image file to scan.
    input: PathBuf,

    /// Directory to write the individual crops (and the mosaic) to.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Also compose the crops into a mosaic.
    #[arg(long)]
    mosaic: bool,

    /// YAML detector configuration.
    #[arg(long)]
    detector_config: Option<PathBuf>,
}

/// Arguments for `run`.
#[derive(clap::Args)]
struct RunArgs {
    /// Name of the job; prefixes every output key.
    #[arg(long, env = "JOB_NAME")]
    job_name: String,

    /// Bucket holding the source documents.
    #[arg(long, env = "INPUT_BUCKET")]
    input_bucket: PathBuf,

    /// Bucket receiving mosaics and ledgers.
    #[arg(long, env = "OUTPUT_BUCKET")]
    output_bucket: PathBuf,

    /// Index location: a file path, or a key in the input bucket.
    #[arg(long, env = "INDEX_FILE_LOCATION")]
    index: String,

    /// Read the index from the input bucket instead of the local filesystem.
    #[arg(
        long,
        env = "INDEX_IN_INPUT_BUCKET",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    index_in_input_bucket: bool,

    #[arg(long, env = "CLOUD_RUN_TASK_INDEX")]
    task_index: usize,

    #[arg(long, env = "CLOUD_RUN_TASK_COUNT")]
    task_count: usize,

    /// Total entries in the index (counted from the index when omitted).
    #[arg(long, env = "TOTAL_FILES")]
    total_files: Option<usize>,

    /// YAML detector configuration.
    #[arg(long, env = "DETECTOR_CONFIG")]
    detector_config: Option<PathBuf>,

    /// Attempts per storage operation before giving up.
    #[arg(long, env = "STORAGE_ATTEMPTS", default_value_t = 3)]
    storage_attempts: u32,
}

/// Arguments for `summarize`.
#[derive(clap::Args)]
struct SummarizeArgs {
    /// Output bucket of the run.
    #[arg(long)]
    bucket: PathBuf,

    #[arg(long)]
    job_name: String,

    /// Report format ('text' or 'json').
    #[arg(long, default_value = "text")]
    output: String,
}

/// Arguments for `remaining`.
#[derive(clap::Args)]
struct RemainingArgs {
    /// The index the run was started from.
    #[arg(long)]
    index: PathBuf,

    /// Output bucket of the run.
    #[arg(long)]
    bucket: PathBuf,

    #[arg(long)]
    job_name: String,

    /// Write the remaining entries as a new index file instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

/// Run the rowmark CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), RowmarkError> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Index(IndexCommands::Generate(args))) => run_index_generate(args),
        Some(Commands::Index(IndexCommands::Partition(args))) => run_index_partition(args),
        Some(Commands::Pdf(PdfCommands::Convert(args))) => run_pdf_convert(args),
        Some(Commands::Circles(CircleCommands::Detect(args))) => run_circles_detect(args),
        Some(Commands::Run(args)) => run_job(args),
        Some(Commands::Summarize(args)) => run_summarize(args),
        Some(Commands::Remaining(args)) => run_remaining(args),
        None => {
            println!("rowmark {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Hand-circled parcel marking extraction.");
            println!();
            println!("Run 'rowmark --help' for usage information.");
            Ok(())
        }
    }
}

fn load_detector_config(path: Option<&Path>) -> Result<DetectorConfig, RowmarkError> {
    match path {
        Some(path) => DetectorConfig::from_yaml_file(path),
        None => Ok(DetectorConfig::default()),
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string())
}

fn run_index_generate(args: GenerateArgs) -> Result<(), RowmarkError> {
    let store = LocalStore::new(&args.bucket);
    let entries = partition::generate_index(&store, &args.prefix)?;
    partition::write_index(&args.output, &entries)?;
    println!("Wrote {} entries to {}", entries.len(), args.output.display());
    Ok(())
}

fn run_index_partition(args: PartitionArgs) -> Result<(), RowmarkError> {
    let total = match args.total_files {
        Some(total) => total,
        None => partition::count_entries(&args.index)?,
    };
    let range = WorkRange::for_task(args.task_index, args.task_count, total)?;
    let entries = partition::read_index_range(&args.index, range)?;

    println!(
        "Task {}/{}: [{}, {}) of {} ({} entries)",
        args.task_index,
        args.task_count,
        range.first,
        range.last,
        total,
        entries.len()
    );
    for entry in &entries {
        println!("{}", entry);
    }
    Ok(())
}

fn run_pdf_convert(args: ConvertArgs) -> Result<(), RowmarkError> {
    let bytes = std::fs::read(&args.input)?;
    let conversion = raster::pdf::default_rasterizer().rasterize(&bytes);
    let codec = StandardCodec::png();
    let stem = file_stem(&args.input);

    std::fs::create_dir_all(&args.output_directory)?;
    for (page, image) in conversion.images.iter().enumerate() {
        let path = args
            .output_directory
            .join(format!("{}_{}.{}", stem, page + 1, codec.extension()));
        std::fs::write(&path, codec.encode(image)?)?;
    }

    println!("Converted {} page(s)", conversion.page_count);
    if !conversion.message.is_empty() {
        println!("  {}", conversion.message);
    }
    Ok(())
}

fn run_circles_detect(args: DetectArgs) -> Result<(), RowmarkError> {
    let config = load_detector_config(args.detector_config.as_deref())?;
    let detector = AdaptiveCircleDetector::new(config);
    let codec = StandardCodec::jpeg();

    let bytes = std::fs::read(&args.input)?;
    let (image, detection) = detector.detect_bytes(&codec, &bytes).map_err(|err| match err {
        RowmarkError::Decode { source, .. } => RowmarkError::Decode {
            context: args.input.display().to_string(),
            source,
        },
        other => other,
    })?;

    let crops = if detection.is_usable(detector.config()) {
        crop::export_crops(&image, &detection)
    } else {
        Vec::new()
    };
    println!(
        "Detected {} circle(s) in {} (inset {}, {:?})",
        detection.circles.len(),
        args.input.display(),
        detection.inset,
        detection.outcome
    );

    let stem = file_stem(&args.input);
    if let Some(dir) = &args.output_dir {
        let written = crop::save_crops(dir, &stem, &crops, &codec)?;
        println!("Wrote {} crop(s) to {}", written.len(), dir.display());
    }

    if args.mosaic {
        match compose_mosaic(&crops, &MosaicOptions::default()) {
            Some(mosaic) => {
                let dir = args.output_dir.clone().unwrap_or_else(|| PathBuf::from("."));
                std::fs::create_dir_all(&dir)?;
                let path = dir.join(format!("{}_mosaic.{}", stem, codec.extension()));
                std::fs::write(&path, codec.encode(&mosaic)?)?;
                println!(
                    "Mosaic {}x{} written to {}",
                    mosaic.width(),
                    mosaic.height(),
                    path.display()
                );
            }
            None => println!("No mosaic built"),
        }
    }
    Ok(())
}

fn run_job(args: RunArgs) -> Result<(), RowmarkError> {
    let policy = RetryPolicy {
        attempts: args.storage_attempts,
        ..Default::default()
    };
    let input = Retrying::new(LocalStore::new(&args.input_bucket), policy);
    let output = Retrying::new(LocalStore::new(&args.output_bucket), policy);

    let total = match args.total_files {
        Some(total) => total,
        None if args.index_in_input_bucket => {
            partition::count_entries_in_store(&input, &args.index)?
        }
        None => partition::count_entries(Path::new(&args.index))?,
    };
    let range = WorkRange::for_task(args.task_index, args.task_count, total)?;
    let objects = if args.index_in_input_bucket {
        partition::read_index_range_from_store(&input, &args.index, range)?
    } else {
        partition::read_index_range(Path::new(&args.index), range)?
    };
    tracing::info!(
        "job {}: task {}/{} owns [{}, {}) with {} object(s)",
        args.job_name,
        args.task_index,
        args.task_count,
        range.first,
        range.last,
        objects.len()
    );

    let detector = AdaptiveCircleDetector::new(load_detector_config(args.detector_config.as_deref())?);
    let rasterizer = raster::pdf::default_rasterizer();
    let codec = StandardCodec::jpeg();
    let orchestrator = JobOrchestrator {
        job_name: &args.job_name,
        task_index: args.task_index,
        input: &input,
        output: &output,
        rasterizer: rasterizer.as_ref(),
        codec: &codec,
        detector: &detector,
        mosaic: MosaicOptions::default(),
    };

    let ledger = orchestrator.run(&objects, JobLedger::new(&args.job_name, args.task_index));
    output.put(&ledger.storage_key(), &ledger.to_csv()?)?;
    print!("{}", ledger);
    Ok(())
}

fn run_summarize(args: SummarizeArgs) -> Result<(), RowmarkError> {
    let store = LocalStore::new(&args.bucket);
    let summary = summary::summarize_run(&store, &args.job_name)?;

    match args.output.as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(&summary)
                .map_err(|err| RowmarkError::UnsupportedFormat(err.to_string()))?;
            println!("{}", json);
        }
        "text" => print!("{}", summary),
        other => {
            return Err(RowmarkError::UnsupportedFormat(format!(
                "'{}' (supported: text, json)",
                other
            )));
        }
    }
    Ok(())
}

fn run_remaining(args: RemainingArgs) -> Result<(), RowmarkError> {
    let total = partition::count_entries(&args.index)?;
    let index = partition::read_index_range(&args.index, WorkRange { first: 0, last: total })?;
    let store = LocalStore::new(&args.bucket);
    let summary = summary::summarize_run(&store, &args.job_name)?;
    let remaining = summary::remaining_objects(&index, &summary);

    match &args.output {
        Some(path) => {
            partition::write_index(path, &remaining)?;
            println!("{} object(s) remaining, written to {}", remaining.len(), path.display());
        }
        None => {
            for entry in &remaining {
                println!("{}", entry);
            }
        }
    }
    Ok(())
}
