//! mcphub CLI - manage tool servers and the background jobs that build and run them.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use mcphub_core::{EntityFilter, EntityKind, JobCommand, JobId, JobStatus, Runtime};
use mcphub_jobs::{JobManager, JobRequest, LaunchMode};
use mcphub_orchestrator::{Config, InstallOptions, Orchestrator, OrchestratorError};

mod output;

/// mcphub - tool server catalog and background job runner
#[derive(Parser, Debug)]
#[command(name = "mcphub")]
#[command(about = "Manage tool servers and background jobs", long_about = None)]
struct Cli {
    /// State directory (catalog, jobs, status cache)
    #[arg(long, env = "MCPHUB_HOME", global = true)]
    home: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, env = "MCPHUB_LOG", default_value = "warn", global = true)]
    log_level: String,

    /// Host CLI queried for registrations
    #[arg(long, env = "MCPHUB_HOST_CLI", global = true)]
    host_cli: Option<String>,

    /// Container runtime used to inspect images
    #[arg(long, env = "MCPHUB_CONTAINER_RUNTIME", global = true)]
    container_runtime: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List catalog entities
    List {
        /// Only this kind (tool, skill)
        #[arg(long, value_parser = parse_name::<EntityKind>)]
        kind: Option<EntityKind>,

        /// Only this runtime (local, container, python, docker, ...)
        #[arg(long, value_parser = parse_name::<Runtime>)]
        runtime: Option<Runtime>,

        /// Only this source
        #[arg(long)]
        source: Option<String>,
    },

    /// Search entities by name, description or source
    Search {
        query: String,
    },

    /// Show one entity and its current status
    Info {
        name: String,
    },

    /// Install an entity
    Install {
        name: String,

        /// Register with the host after installing
        #[arg(long)]
        register: bool,

        /// Reinstall even if already installed
        #[arg(long)]
        force: bool,
    },

    /// Register an installed entity with the host
    Register {
        name: String,
    },

    /// Remove an entity's host registration, keeping it installed
    Unregister {
        name: String,
    },

    /// Uninstall an entity
    Uninstall {
        name: String,
    },

    /// Show the installation status of every entity
    Status {
        /// Ignore cached statuses and probe again
        #[arg(long)]
        refresh: bool,
    },

    /// Run a command as a background job
    Submit {
        /// Job name
        #[arg(long)]
        name: Option<String>,

        /// Working directory for the command
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Result artifact path, relative to the working directory
        #[arg(long)]
        output: Option<PathBuf>,

        /// Program and arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Run several shell commands, in order, as one background job
    #[command(name = "submit-batch")]
    SubmitBatch {
        /// Job name
        #[arg(long)]
        name: Option<String>,

        /// Working directory for the commands
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Shell command line (repeatable)
        #[arg(long = "command", short = 'c', required = true)]
        commands: Vec<String>,
    },

    /// Show a job's status
    #[command(name = "job-status")]
    JobStatus {
        id: String,
    },

    /// Print a completed job's result
    #[command(name = "result")]
    JobResult {
        id: String,
    },

    /// Print a job's log
    Log {
        id: String,

        /// Only the last N lines (0 = all)
        #[arg(long, default_value_t = 0)]
        tail: usize,
    },

    /// Cancel a pending or running job
    Cancel {
        id: String,
    },

    /// Wait for a job to finish
    Wait {
        id: String,

        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// List jobs
    #[command(name = "list-jobs")]
    ListJobs {
        /// Only jobs with this status
        #[arg(long)]
        status: Option<JobStatus>,
    },

    /// Execute a submitted job (used by `submit`)
    #[command(name = "run-job", hide = true)]
    RunJob {
        id: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error[{}]: {}", e.kind(), e);
            if let Some(job_id) = e.job_id() {
                eprintln!("  see: mcphub log {job_id}");
            }
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    // Only fails if a subscriber is already installed.
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn config(cli: &Cli) -> Config {
    let mut config = match &cli.home {
        Some(home) => Config::with_home(home),
        None => Config::default(),
    };
    if let Some(host_cli) = &cli.host_cli {
        config.host_cli = host_cli.clone();
    }
    if let Some(runtime) = &cli.container_runtime {
        config.container_runtime = runtime.clone();
    }
    config
}

async fn run(cli: Cli) -> Result<(), OrchestratorError> {
    let config = config(&cli);
    debug!(home = %config.home.display(), "Using mcphub home");

    match cli.command {
        Commands::List {
            kind,
            runtime,
            source,
        } => {
            let hub = Orchestrator::open(config)?;
            let filter = EntityFilter {
                kind,
                runtime,
                source,
                query: None,
            };
            output::print_entities(&hub.list(filter));
        }
        Commands::Search { query } => {
            let hub = Orchestrator::open(config)?;
            output::print_entities(&hub.search(&query));
        }
        Commands::Info { name } => {
            let hub = Orchestrator::open(config)?;
            output::print_entity(&hub.info(&name)?);
        }
        Commands::Install {
            name,
            register,
            force,
        } => {
            let hub = Orchestrator::open(config)?;
            let options = InstallOptions::default()
                .with_register(register)
                .with_force(force);
            let status = hub.install(&name, options).await?;
            println!("{name}: {status}");
        }
        Commands::Register { name } => {
            let hub = Orchestrator::open(config)?;
            let status = hub.register(&name).await?;
            println!("{name}: {status}");
        }
        Commands::Unregister { name } => {
            let hub = Orchestrator::open(config)?;
            let status = hub.unregister(&name).await?;
            println!("{name}: {status}");
        }
        Commands::Uninstall { name } => {
            let hub = Orchestrator::open(config)?;
            let status = hub.uninstall(&name).await?;
            println!("{name}: {status}");
        }
        Commands::Status { refresh } => {
            let hub = Orchestrator::open(config)?;
            output::print_statuses(&hub.status(refresh)?);
        }
        Commands::Submit {
            name,
            cwd,
            output,
            command,
        } => {
            let jobs = detached_jobs(&config)?;
            let mut parts = command.into_iter();
            let program = parts.next().unwrap_or_default();
            let mut request =
                JobRequest::new(JobCommand::new(program).with_args(parts), working_dir(cwd)?);
            request.name = name;
            request.output_path = output;

            let receipt = jobs.submit_request(request)?;
            output::print_job(&jobs.status(&receipt.job_id)?);
        }
        Commands::SubmitBatch {
            name,
            cwd,
            commands,
        } => {
            let jobs = detached_jobs(&config)?;
            let commands = commands.into_iter().map(JobCommand::shell).collect();
            let receipt = jobs.submit_batch(commands, working_dir(cwd)?, name)?;
            output::print_job(&jobs.status(&receipt.job_id)?);
        }
        Commands::JobStatus { id } => {
            let jobs = JobManager::new(config.job_manager_config());
            output::print_job(&jobs.status(&JobId::new(id))?);
        }
        Commands::JobResult { id } => {
            let jobs = JobManager::new(config.job_manager_config());
            let result = jobs.result(&JobId::new(id))?;
            println!("{}", serde_json::to_string_pretty(&result).unwrap_or_default());
        }
        Commands::Log { id, tail } => {
            let jobs = JobManager::new(config.job_manager_config());
            output::print_log(&jobs.log(&JobId::new(id), tail)?);
        }
        Commands::Cancel { id } => {
            let jobs = JobManager::new(config.job_manager_config());
            let record = jobs.cancel(&JobId::new(id))?;
            println!("Job cancelled:");
            output::print_job(&record);
        }
        Commands::Wait { id, timeout } => {
            let jobs = JobManager::new(config.job_manager_config());
            let record = jobs
                .wait(&JobId::new(id), timeout.map(Duration::from_secs))
                .await?;
            output::print_job(&record);
        }
        Commands::ListJobs { status } => {
            let jobs = JobManager::new(config.job_manager_config());
            output::print_jobs(&jobs.list(status).sorted());
        }
        Commands::RunJob { id } => {
            let jobs = JobManager::new(config.job_manager_config());
            jobs.execute(&JobId::new(id)).await?;
        }
    }

    Ok(())
}

/// A job manager whose workers are `mcphub run-job` processes, so jobs
/// outlive this invocation.
fn detached_jobs(config: &Config) -> Result<JobManager, OrchestratorError> {
    let program = std::env::current_exe().map_err(|source| OrchestratorError::Io {
        path: PathBuf::from("/proc/self/exe"),
        source,
    })?;
    let launch = LaunchMode::Detached {
        program,
        args: vec![
            "--home".to_string(),
            config.home.to_string_lossy().into_owned(),
            "run-job".to_string(),
        ],
    };
    Ok(JobManager::new(config.job_manager_config().with_launch(launch)))
}

fn working_dir(cwd: Option<PathBuf>) -> Result<PathBuf, OrchestratorError> {
    match cwd {
        Some(dir) => Ok(dir),
        None => std::env::current_dir().map_err(|source| OrchestratorError::Io {
            path: PathBuf::from("."),
            source,
        }),
    }
}

/// Parse a lowercase name through the type's serde representation,
/// so CLI values accept the same aliases as the catalog.
fn parse_name<T: DeserializeOwned>(value: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(value.to_ascii_lowercase()))
        .map_err(|_| format!("unknown value '{value}'"))
}
