use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::{error, info, warn};

use agritrack::config::{load_config, validate_config, Config};
use agritrack::db::job_repo::{self, JobFilter};
use agritrack::db::{self, Database};
use agritrack::error::{AgritrackError, ConfigError};
use agritrack::worker::{Job, JobStatus, Worker, WorkerHandle};
use agritrack::{enqueue_upload, logging, Pipeline};

#[derive(Parser, Debug)]
#[command(name = "agritrack", version, about = "Video object-tracking job worker")]
struct Cli {
    /// JSON config file
    #[arg(long, short, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Overrides `media_root` from the config
    #[arg(long, global = true, value_name = "DIR")]
    media_root: Option<PathBuf>,

    /// Overrides `database_path` from the config
    #[arg(long, global = true, value_name = "PATH")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the worker until interrupted
    Run,
    /// Queue one or more video files
    Enqueue {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List jobs, newest upload first
    List {
        #[arg(long)]
        status: Option<JobStatus>,
        #[arg(long, default_value_t = 20)]
        limit: u64,
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },
    /// Print one job as JSON
    Show { id: i64 },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), AgritrackError> {
    let config = resolve_config(&cli)?;
    logging::init(&config.logging);

    let db_path = cli
        .database
        .clone()
        .or_else(|| config.database_path())
        .or_else(db::default_database_path)
        .ok_or_else(|| ConfigError::Validation {
            message: "no database path configured and no home directory found".to_string(),
        })?;
    let db = Database::open(&db_path)?;

    match cli.command {
        Command::Run => run_worker(&config, db),
        Command::Enqueue { files } => {
            let media_root = config.media_root();
            for file in files {
                let id = enqueue_upload(&db, &media_root, &file)?;
                println!("{}\t{}", id, file.display());
            }
            Ok(())
        }
        Command::List {
            status,
            limit,
            offset,
        } => {
            let filter = JobFilter {
                status,
                limit: Some(limit),
                offset: Some(offset),
                ..Default::default()
            };
            let (rows, total) = job_repo::query(&db, &filter)?;
            for row in rows {
                let job = Job::try_from(row)?;
                println!(
                    "{}\t{}\t{}%\t{}\t{}",
                    job.id,
                    job.status,
                    job.progress_percentage.unwrap_or(0),
                    job.upload_timestamp,
                    job.file_name
                );
            }
            println!("{} job(s) total", total);
            Ok(())
        }
        Command::Show { id } => {
            let job = Job::find(&db, id)?;
            let json = serde_json::to_string_pretty(&job).map_err(ConfigError::from)?;
            println!("{}", json);
            Ok(())
        }
    }
}

fn resolve_config(cli: &Cli) -> Result<Config, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::with_media_root("."),
    };
    if let Some(media_root) = &cli.media_root {
        config.media_root = media_root.to_string_lossy().to_string();
    }
    validate_config(&config)?;
    Ok(config)
}

fn run_worker(config: &Config, db: Database) -> Result<(), AgritrackError> {
    let pipeline = Pipeline::from_config(config)?;
    let shutdown = Arc::new(AtomicBool::new(false));
    let worker = Worker::new(db, pipeline, &config.worker).with_shutdown_flag(Arc::clone(&shutdown));

    let waker = worker.waker();
    if let Err(e) = ctrlc::set_handler(move || {
        shutdown.store(true, Ordering::Relaxed);
        let _ = waker.try_send(());
    }) {
        warn!("Failed to install Ctrl-C handler: {}", e);
    }

    info!("Media root: {}", config.media_root().display());
    let handle = WorkerHandle::spawn(worker)?;
    handle.join()?;
    Ok(())
}
