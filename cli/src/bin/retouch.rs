use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use retouch::{BatchRunner, BatchSummary, CancellationToken, ProcessingConfig, RenameReport};
use retouch_cli::{Job, JobMode, ProcessingOverrides, confirm};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Batch retouching of product photos", long_about = None)]
struct Cli {
    /// Skip the confirmation prompt before renaming or deleting files
    #[arg(short, long, global = true)]
    yes: bool,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a job described in a .toml or .json file
    Run {
        /// Job file
        #[arg(short, long)]
        job: PathBuf,
    },
    /// Retouch every image in a folder, one output per input
    Process {
        /// Folder with the source images
        #[arg(short, long)]
        input: PathBuf,
        /// Folder receiving the processed images
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        options: ProcessingOverrides,
    },
    /// Retouch every image in a folder and compose them into one collage
    Merge {
        /// Folder with the source images
        #[arg(short, long)]
        input: PathBuf,
        /// Collage file; its extension follows the output format
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        options: ProcessingOverrides,
    },
    /// Rename the images in a folder to the article without touching pixels
    Rename {
        /// Folder with the images
        #[arg(short, long)]
        dir: PathBuf,
        /// Article the images are named after
        #[arg(short, long)]
        article: String,
    },
    /// Write a job file with default processing options
    Init {
        /// Target job file (.toml or .json)
        #[arg(short, long, default_value = "retouch.toml")]
        path: PathBuf,
        /// Flow the job runs
        #[arg(short, long, default_value_t = JobMode::Process)]
        mode: JobMode,
    },
    /// Print the JSON schema of job files
    Schema,
}

enum Outcome {
    Batch(BatchSummary),
    Renamed(RenameReport),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let job = match cli.command {
        Commands::Run { job } => {
            info!("📄 Loading job from: {}", job.display());
            Job::from_file(&job)?
        }
        Commands::Process { input, output, options } => {
            build_job(JobMode::Process, input, Some(output), &options)?
        }
        Commands::Merge { input, output, options } => {
            build_job(JobMode::Merge, input, Some(output), &options)?
        }
        Commands::Rename { dir, article } => {
            let processing = ProcessingConfig {
                article: Some(article),
                ..Default::default()
            };
            let job = Job { mode: JobMode::Rename, input_dir: dir, output: None, processing };
            job.validate()?;
            job
        }
        Commands::Init { path, mode } => {
            let job = Job {
                mode,
                input_dir: PathBuf::from("input"),
                output: Some(PathBuf::from(match mode {
                    JobMode::Merge => "output/collage.jpg",
                    _ => "output",
                })),
                processing: ProcessingConfig::default(),
            };
            job.to_file(&path)?;
            info!("📝 Wrote {} job to: {}", mode, path.display());
            return Ok(());
        }
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&Job::schema())?);
            return Ok(());
        }
    };

    if job.is_destructive() && !cli.yes {
        let question = match (&job.processing.article, job.processing.delete_originals) {
            (Some(article), true) => format!("Rename outputs to '{article}' and delete the originals?"),
            (Some(article), false) => format!("Rename files to '{article}'?"),
            _ => "Delete the originals after processing?".to_string(),
        };
        if !confirm(&question)? {
            warn!("Aborted by user");
            return Ok(());
        }
    }

    run_job(job).await
}

fn build_job(
    mode: JobMode,
    input_dir: PathBuf,
    output: Option<PathBuf>,
    options: &ProcessingOverrides,
) -> Result<Job> {
    let mut processing = options.base_config()?;
    options.apply(&mut processing);
    let job = Job { mode, input_dir, output, processing };
    job.validate()?;
    Ok(job)
}

async fn run_job(job: Job) -> Result<()> {
    let runner = BatchRunner::new(job.processing.clone())?;
    let token: CancellationToken = runner.cancellation_token();

    info!("🚀 Starting {} of: {}", job.mode, job.input_dir.display());

    let mut work = tokio::task::spawn_blocking(move || -> Result<Outcome> {
        let outcome = match job.mode {
            JobMode::Process => {
                let output = job.output.ok_or_else(|| eyre!("process needs an output folder"))?;
                Outcome::Batch(runner.run_single(&job.input_dir, &output)?)
            }
            JobMode::Merge => {
                let output = job.output.ok_or_else(|| eyre!("merge needs an output file"))?;
                Outcome::Batch(runner.run_merge(&job.input_dir, &output)?)
            }
            JobMode::Rename => Outcome::Renamed(runner.run_rename(&job.input_dir)?),
        };
        Ok(outcome)
    });

    let outcome = tokio::select! {
        joined = &mut work => joined?,
        _ = tokio::signal::ctrl_c() => {
            warn!("🛑 Ctrl-C received, finishing the current files...");
            token.cancel();
            work.await?
        }
    }?;

    match outcome {
        Outcome::Batch(summary) => {
            if summary.cancelled {
                warn!("Batch was cancelled before every file was processed");
            }
        }
        Outcome::Renamed(report) => {
            for leftover in &report.leftover_temp {
                warn!("Temporary file left behind: {}", leftover.display());
            }
        }
    }

    Ok(())
}
