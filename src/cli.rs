use crate::{
    config::Config,
    interpret::Interpreter,
    job::{JobDescriptor, JobState},
    locate,
};
use anyhow::{Context, Result, anyhow};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "payload-diagnose")]
#[command(about = "Payload outcome diagnosis (job report + log heuristics + job metrics)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./payload-diagnose.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Full pass: exit status, classification and metrics.
    Interpret(JobArgs),
    /// Error classification only.
    Classify(JobArgs),
    /// The job metrics string only.
    Metrics(JobArgs),
    /// Resolved artifact paths.
    Locate {
        #[arg(long)]
        workdir: PathBuf,
    },
}

#[derive(ClapArgs, Debug)]
pub struct JobArgs {
    #[arg(long)]
    pub workdir: PathBuf,
    /// Exit code of the payload process.
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub exit_code: i32,
    #[arg(long, value_enum, default_value_t = JobState::Finished)]
    pub state: JobState,
    #[arg(long, default_value_t = 0)]
    pub core_count: u32,
    #[arg(long, default_value_t = 0)]
    pub actual_core_count: u32,
    /// Maximum working directory size seen during the run, in bytes.
    #[arg(long, default_value_t = 0)]
    pub workdir_size: u64,
    #[arg(long)]
    pub dask_scheduler_ip: Option<String>,
    #[arg(long)]
    pub jupyter_session_ip: Option<String>,
}

impl JobArgs {
    fn descriptor(&self) -> JobDescriptor {
        JobDescriptor {
            workdir: self.workdir.clone(),
            exit_code: self.exit_code,
            state: self.state,
            core_count: self.core_count,
            actual_core_count: self.actual_core_count,
            max_workdir_size: self.workdir_size,
            dask_scheduler_ip: self.dask_scheduler_ip.clone(),
            jupyter_session_ip: self.jupyter_session_ip.clone(),
        }
    }
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg = resolve_config(args.config.as_deref())?;
    let log_path = resolve_log_path(&cfg);
    let _guard = init_logging(&args, &cfg, log_path.as_deref())?;

    match &args.cmd {
        Command::Interpret(job) => interpret(&cfg, job),
        Command::Classify(job) => classify(&cfg, job),
        Command::Metrics(job) => metrics(&cfg, job),
        Command::Locate { workdir } => {
            check_workdir(workdir)?;
            let set = locate::locate(workdir, &cfg.files);
            println!("{}", serde_json::to_string_pretty(&set)?);
            Ok(())
        }
    }
}

fn resolve_config(user: Option<&Path>) -> Result<Config> {
    let mut cfg = match user {
        Some(p) => Config::load(p)?,
        None => {
            let default = PathBuf::from("payload-diagnose.toml");
            if default.exists() {
                Config::load(&default)?
            } else {
                Config::default()
            }
        }
    };
    if cfg.features.machine_features_dir.is_empty() {
        cfg.features.machine_features_dir = std::env::var("MACHINEFEATURES").unwrap_or_default();
    }
    if cfg.features.job_features_dir.is_empty() {
        cfg.features.job_features_dir = std::env::var("JOBFEATURES").unwrap_or_default();
    }
    Ok(cfg)
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries the command output
    let console_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create_dir_all {}", parent.display()))?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn interpret(cfg: &Config, args: &JobArgs) -> Result<()> {
    check_workdir(&args.workdir)?;
    let out = Interpreter::new(cfg).interpret(&args.descriptor());
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn classify(cfg: &Config, args: &JobArgs) -> Result<()> {
    check_workdir(&args.workdir)?;
    let c = Interpreter::new(cfg).classify_job(&args.descriptor())?;
    match &c {
        Some(c) => info!("classification {:?} code={}", c.kind, c.code),
        None => info!("no payload error identified"),
    }
    println!("{}", serde_json::to_string_pretty(&c)?);
    Ok(())
}

fn metrics(cfg: &Config, args: &JobArgs) -> Result<()> {
    check_workdir(&args.workdir)?;
    let out = Interpreter::new(cfg).interpret(&args.descriptor());
    println!("{}", out.metrics);
    Ok(())
}

fn check_workdir(workdir: &Path) -> Result<()> {
    if !workdir.is_dir() {
        return Err(anyhow!("workdir is not a directory: {}", workdir.display()));
    }
    if workdir.read_dir().map(|mut d| d.next().is_none()).unwrap_or(false) {
        warn!("workdir is empty: {}", workdir.display());
    }
    Ok(())
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }
    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }
    Some(PathBuf::from("payload-diagnose.log"))
}
