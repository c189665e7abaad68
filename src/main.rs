use clap::{Parser, Subcommand};
use photo_ingest::config::{self, DEFAULT_CONFIG_FILE, Dataset, IngestConfig, Overrides, StrategyName};
use photo_ingest::fs::LocalFs;
use photo_ingest::logging::init_logging;
use photo_ingest::output;
use photo_ingest::pipeline::{self, IngestError, IngestEvent, RunControl, RunOutcome};
use photo_ingest::stage::StageMode;
use photo_ingest::store::SqliteStore;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "photo-ingest")]
#[command(about = "Ingest a photo tree into a static directory and a document collection")]
#[command(long_about = "\
Ingest a photo tree into a static directory and a document collection

Every image below the source directory is staged into the destination
directory and recorded as a document {name, year, city}:

  photos/
  ├── 20190102_beach.png         → {name, year: 2019}
  ├── paris/                     # top-level folder = city
  │   ├── 20230714_001.jpg       → {name, year: 2023, city: \"paris\"}
  │   └── notes.txt              # not an image: skipped (or deleted)
  └── rome/
      └── IMG_0001.jpg           → {name, city: \"rome\"}

The year is the first 8-digit date token in the filename (YYYYMMDD).
Files are processed in sorted order, so an unchanged tree always produces
the same names and documents.

Run 'photo-ingest gen-config' to generate a documented photo-ingest.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file (defaults to photo-ingest.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug diagnostics to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stage images and insert their documents
    Ingest(IngestArgs),
    /// Print a stock photo-ingest.toml with all options documented
    GenConfig,
}

#[derive(clap::Args, Default)]
struct IngestArgs {
    /// Directory tree to ingest
    #[arg(long)]
    source: Option<PathBuf>,

    /// Directory staged images are written to
    #[arg(long)]
    destination: Option<PathBuf>,

    /// Documents per bulk insert
    #[arg(long)]
    batch_size: Option<String>,

    /// Drop the collection before inserting
    #[arg(long, conflicts_with = "append")]
    drop: bool,

    /// Keep existing documents and append
    #[arg(long)]
    append: bool,

    /// Target collection (overrides --dataset)
    #[arg(long)]
    collection: Option<String>,

    /// Dataset whose collection is used: prod or test
    #[arg(long)]
    dataset: Option<Dataset>,

    /// SQLite database file
    #[arg(long)]
    db: Option<PathBuf>,

    /// Naming strategy
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,

    /// Move files instead of copying them
    #[arg(long = "move")]
    move_files: bool,

    /// Replace the destination contents with this run's files
    #[arg(long)]
    replace_destination: bool,

    /// Delete non-image files from the source tree
    #[arg(long)]
    delete_rejected: bool,

    /// Stop between files once this many seconds have passed
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum StrategyArg {
    /// Keep source filenames
    Preserve,
    /// Name files {city}_{year}_{n}
    Rewrite,
}

impl IngestArgs {
    fn overrides(&self) -> Overrides {
        let drop_existing = match (self.drop, self.append) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        Overrides {
            source: self.source.clone(),
            destination: self.destination.clone(),
            batch_size: self.batch_size.clone(),
            drop_existing,
            collection: self.collection.clone(),
            dataset: self.dataset,
            database: self.db.clone(),
            strategy: self.strategy.map(|s| match s {
                StrategyArg::Preserve => StrategyName::Preserve,
                StrategyArg::Rewrite => StrategyName::Rewrite,
            }),
            stage_mode: self.move_files.then_some(StageMode::Move),
            replace_destination: self.replace_destination,
            delete_rejected: self.delete_rejected,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Ingest(args) => match ingest(cli.config.as_deref(), &args) {
            Ok(outcome) => {
                output::print_summary(&outcome);
                if let Some(e) = &outcome.error {
                    eprintln!("error: {e}");
                }
                ExitCode::from(outcome.exit_code())
            }
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::FAILURE
            }
        },
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            ExitCode::SUCCESS
        }
    }
}

/// Resolve configuration, open the store and run the pipeline, printing
/// progress as it arrives.
fn ingest(config_path: Option<&Path>, args: &IngestArgs) -> Result<RunOutcome, IngestError> {
    let mut cfg = load(config_path)?;
    cfg.apply(args.overrides());
    let options = cfg.to_options()?;
    let mut store = SqliteStore::open(&cfg.database.path)?;

    let control = match args.timeout_secs {
        Some(secs) => RunControl::with_deadline(Instant::now() + Duration::from_secs(secs)),
        None => RunControl::default(),
    };

    let (tx, rx) = std::sync::mpsc::channel::<IngestEvent>();
    let printer = std::thread::spawn(move || {
        let mut root = PathBuf::new();
        for event in rx {
            if let IngestEvent::Started { source, .. } = &event {
                root = source.clone();
            }
            output::print_event(&event, &root);
        }
    });
    let outcome = pipeline::run(&LocalFs, &mut store, &options, &control, Some(tx));
    // The sender was moved into the run and is dropped by now.
    let _ = printer.join();
    Ok(outcome)
}

/// An explicit `--config` must exist; the default file is optional.
fn load(config_path: Option<&Path>) -> Result<IngestConfig, IngestError> {
    let cfg = match config_path {
        Some(path) => config::load_config(path)?,
        None => config::load_config_or_default(Path::new(DEFAULT_CONFIG_FILE))?,
    };
    Ok(cfg)
}
