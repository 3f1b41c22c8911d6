// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod model;
pub mod pilot;
pub mod plan;
pub mod provider;
pub mod store;
pub mod types;

use std::fs;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::{CliArgs, OutputFormat};
use crate::config::{PlanConfig, default_config_path, load_and_validate};
use crate::engine::{CoreDriver, Driver, DriverEvent, JobReport};
use crate::exec::HandlerExecutor;
use crate::model::{Job, RuntimeDetails};
use crate::pilot::PilotHandler;
use crate::plan::TaskPlan;
use crate::provider::{Handlers, StopSignal};

/// Boxed future returned by handler, store and transport methods.
pub type BoxFuture<'a, T = ()> =
    Pin<Box<dyn Future<Output = errors::Result<T>> + Send + 'a>>;

/// Build the task plan for one job. Pure; nothing is executed.
pub fn plan_job(
    job: Job,
    runtime: RuntimeDetails,
    config: PlanConfig,
) -> errors::Result<TaskPlan> {
    plan::build_plan(job, runtime, config)
}

/// Execute a plan against real handlers until it succeeds, fails or is
/// cancelled through `stop`.
pub async fn execute_plan(
    plan: TaskPlan,
    handlers: Handlers,
    pilot: Arc<dyn PilotHandler>,
    stop: StopSignal,
) -> errors::Result<JobReport> {
    let (tx, rx) = mpsc::channel::<DriverEvent>(64);

    // Forward an external stop into the core so it stops dispatching.
    let forwarder = {
        let tx = tx.clone();
        let stop = stop.clone();
        tokio::spawn(async move {
            stop.stopped().await;
            let _ = tx.send(DriverEvent::CancelRequested).await;
        })
    };

    let executor = HandlerExecutor::new(handlers, pilot, tx);
    let driver = Driver::new(CoreDriver::new(plan), rx, executor, stop);
    let report = driver.run().await;

    // The forwarder only ends on its own when the job was stopped.
    forwarder.abort();
    report
}

/// High-level entry point used by `main.rs`: load the inputs, build the plan
/// and print it.
pub async fn run(args: CliArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let job: Job = read_json(&args.job).context("reading job")?;
    let runtime: RuntimeDetails = read_json(&args.runtime).context("reading runtime")?;

    info!(
        job_id = %job.job_id,
        action = %job.job_action,
        provider = %runtime.provider,
        "planning job"
    );

    let plan = plan_job(job, runtime, config)?;

    match args.format {
        OutputFormat::Text => print!("{plan}"),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
    }

    debug!(
        layers = plan.len(),
        tasks = plan.task_count(),
        "dry-run complete (no execution)"
    );
    Ok(())
}

/// Explicit path, else `Pitrix.toml` when present, else built-in defaults.
fn load_config(path: Option<&Path>) -> Result<PlanConfig> {
    if let Some(path) = path {
        return load_and_validate(path)
            .with_context(|| format!("loading config {}", path.display()));
    }
    let default_path = default_config_path();
    if default_path.exists() {
        return load_and_validate(&default_path)
            .with_context(|| format!("loading config {}", default_path.display()));
    }
    debug!("no config file; using defaults");
    Ok(PlanConfig::default())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
}
