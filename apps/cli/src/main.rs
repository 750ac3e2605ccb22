//! Crucible CLI - Command-line interface for the Crucible training platform
//!
//! This CLI provides a `crucible` command for submitting LLM fine-tuning
//! jobs, estimating their cost, and driving them through their lifecycle.

mod commands;

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{
    cancel, estimate, force_start, list, logs, pause, resume, status, submit,
};
use crucible_core::OrchestratorConfig;

/// Crucible CLI - LLM fine-tuning orchestration
///
/// Crucible submits fine-tuning jobs to a local training agent or an
/// ephemeral cloud GPU pod, tracks them in a durable registry, and
/// supports pause/resume through filesystem checkpoints.
#[derive(Parser, Debug)]
#[command(
    name = "crucible",
    author,
    version,
    about = "Crucible - LLM fine-tuning orchestration",
    long_about = "Crucible estimates, submits, and manages LLM fine-tuning jobs.\nJobs run on a local training agent or an ephemeral cloud GPU pod; every\njob is tracked in a durable registry that survives restarts."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    /// Configuration file (overrides the default discovery path)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for the registry and checkpoints (overrides CRUCIBLE_DATA_DIR)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Estimate time, cost, and VRAM feasibility without submitting
    ///
    /// Runs the benchmark-table estimator against a training config and
    /// prints duration, cost, utilization, and feasibility warnings.
    Estimate {
        /// Training config TOML file
        config_file: Option<PathBuf>,

        /// Model name for a quick estimate with default hyperparameters
        #[arg(long, conflicts_with = "config_file")]
        model: Option<String>,

        /// GPU benchmark key (e.g. rtx-4090, a100, h100)
        #[arg(long)]
        gpu: Option<String>,

        /// Known dataset sample count for a tighter estimate
        #[arg(long)]
        dataset_size: Option<usize>,

        /// Budget ceiling in wall-clock hours
        #[arg(long)]
        max_hours: Option<f64>,

        /// Budget ceiling in USD
        #[arg(long)]
        max_cost: Option<f64>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Submit a training job
    ///
    /// Validates and estimates the config, checks it against any budget
    /// ceilings, registers the job durably, and dispatches it to the
    /// selected backend (or queues it with --queue).
    Submit {
        /// Training config TOML file
        config_file: PathBuf,

        /// Path to the training dataset
        #[arg(long)]
        dataset: Option<PathBuf>,

        /// Inline JSONL dataset content instead of a path
        #[arg(long, conflicts_with = "dataset")]
        inline_dataset: Option<String>,

        /// Deployment target (local, pod)
        #[arg(long, default_value = "local")]
        target: String,

        /// Remote agent endpoint (non-loopback endpoints use poll registration)
        #[arg(long)]
        endpoint: Option<String>,

        /// GPU type for the estimate and for pod provisioning
        #[arg(long)]
        gpu: Option<String>,

        /// Number of GPUs for pod provisioning
        #[arg(long)]
        gpu_count: Option<u32>,

        /// Docker image for pod provisioning
        #[arg(long)]
        docker_image: Option<String>,

        /// Pod volume size in GB
        #[arg(long)]
        volume_gb: Option<u32>,

        /// Budget ceiling in USD; submission fails if the estimate exceeds it
        #[arg(long)]
        max_cost: Option<f64>,

        /// Budget ceiling in wall-clock hours
        #[arg(long)]
        max_hours: Option<f64>,

        /// Environment variable for the trainer (repeatable)
        #[arg(long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,

        /// Queue the job instead of dispatching immediately
        #[arg(long)]
        queue: bool,

        /// Known dataset sample count for a tighter estimate
        #[arg(long)]
        dataset_size: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a job's status
    ///
    /// Reconciles the registry against a live backend poll where one is
    /// possible; an unreachable backend degrades to the registry view.
    Status {
        /// Job identifier
        job_id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a job's trainer logs
    Logs {
        /// Job identifier
        job_id: String,

        /// Show only the last N lines
        #[arg(long)]
        tail: Option<usize>,
    },

    /// List all jobs
    List {
        /// Filter by status (queued, pending, starting, running, paused, cancelled, completed, failed)
        #[arg(long)]
        status: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Cancel a job
    ///
    /// Queued jobs are dropped from the queue; live jobs are terminated
    /// on their backend. Cancelling a finished job is a no-op.
    Cancel {
        /// Job identifier
        job_id: String,
    },

    /// Pause a running local job, snapshotting it to a checkpoint
    Pause {
        /// Job identifier
        job_id: String,
    },

    /// Resume a paused job from its checkpoint
    Resume {
        /// Job identifier
        job_id: String,
    },

    /// Dispatch a stuck job immediately, bypassing queue order
    ///
    /// Applies to jobs in queued, pending, failed, or cancelled state.
    ForceStart {
        /// Job identifier
        job_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let subscriber =
        FmtSubscriber::builder().with_max_level(level).without_time().with_target(false).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Load configuration
    let mut config = match &args.config {
        Some(path) => OrchestratorConfig::load_from_file(path)?,
        None => OrchestratorConfig::discover()?,
    };
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }

    // If no command provided, show help
    let Some(command) = args.command else {
        Args::command().print_help()?;
        return Ok(());
    };

    // Execute command
    match command {
        Command::Estimate { config_file, model, gpu, dataset_size, max_hours, max_cost, json } => {
            let options = estimate::EstimateArgs {
                config_file,
                model,
                gpu,
                dataset_size,
                max_hours,
                max_cost,
                json,
            };
            estimate::execute(&config, options).await?;
        }
        Command::Submit {
            config_file,
            dataset,
            inline_dataset,
            target,
            endpoint,
            gpu,
            gpu_count,
            docker_image,
            volume_gb,
            max_cost,
            max_hours,
            env,
            queue,
            dataset_size,
            json,
        } => {
            let options = submit::SubmitArgs {
                config_file,
                dataset,
                inline_dataset,
                target,
                endpoint,
                gpu,
                gpu_count,
                docker_image,
                volume_gb,
                max_cost,
                max_hours,
                env,
                queue,
                dataset_size,
                json,
            };
            submit::execute(&config, options).await?;
        }
        Command::Status { job_id, json } => {
            status::execute(&config, &job_id, json).await?;
        }
        Command::Logs { job_id, tail } => {
            logs::execute(&config, &job_id, tail).await?;
        }
        Command::List { status, json } => {
            list::execute(&config, status, json).await?;
        }
        Command::Cancel { job_id } => {
            cancel::execute(&config, &job_id).await?;
        }
        Command::Pause { job_id } => {
            pause::execute(&config, &job_id).await?;
        }
        Command::Resume { job_id } => {
            resume::execute(&config, &job_id).await?;
        }
        Command::ForceStart { job_id } => {
            force_start::execute(&config, &job_id).await?;
        }
    }

    Ok(())
}
