//! brainflow-worker: long-running process that pulls jobs from one or more lanes.
//!
//! ```text
//! brainflow-worker --queue ai-processing-high,ai-processing --config worker.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};

use brainflow_infra::jobs::{Lane, LaneWorkerPool};
use brainflow_infra::{WorkerConfig, WorkflowScheduler};
use brainflow_observability::LogFormat;

#[derive(Parser)]
#[command(name = "brainflow-worker")]
#[command(about = "Background worker for the AI content workflow")]
#[command(version)]
struct Args {
    /// Lanes to serve (comma separated); all lanes when omitted
    #[arg(long = "queue", value_delimiter = ',', env = "BRAINFLOW_QUEUES")]
    queues: Vec<Lane>,

    /// TOML config file; defaults when omitted, an error when unreadable
    #[arg(long, env = "BRAINFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogOutput::Json)]
    log_format: LogOutput,

    /// How often to look for jobs abandoned by dead workers (seconds)
    #[arg(long, default_value_t = 60)]
    recover_every: u64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogOutput {
    Json,
    Pretty,
}

impl From<LogOutput> for LogFormat {
    fn from(output: LogOutput) -> Self {
        match output {
            LogOutput::Json => LogFormat::Json,
            LogOutput::Pretty => LogFormat::Pretty,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    brainflow_observability::init_with(args.log_format.into());

    let config = WorkerConfig::load_with_env(args.config.as_deref())
        .context("failed to load worker config")?;

    let lanes = if args.queues.is_empty() {
        Lane::ALL.to_vec()
    } else {
        args.queues
    };
    if args.recover_every == 0 {
        bail!("--recover-every must be at least 1 second");
    }

    let scheduler = Arc::new(WorkflowScheduler::builder().configure(&config).build());
    let router = scheduler.router().clone();
    let poll_interval = config.poll_interval();

    let mut pools = Vec::with_capacity(lanes.len());
    for lane in lanes {
        let pool = LaneWorkerPool::spawn(scheduler.clone(), router.config(lane), poll_interval)
            .with_context(|| format!("failed to start workers for lane {lane}"))?;
        pools.push(pool);
    }

    tracing::info!(
        lanes = ?pools.iter().map(|p| p.lane().as_str()).collect::<Vec<_>>(),
        workers = pools.iter().map(LaneWorkerPool::workers).sum::<usize>(),
        "worker started"
    );

    let mut recovery = tokio::time::interval(Duration::from_secs(args.recover_every));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = recovery.tick() => {
                if let Err(err) = scheduler.recover_stalled() {
                    tracing::warn!(error = %err, "stalled job recovery failed");
                }
            }
        }
    }

    tracing::info!("shutdown requested; waiting for in-flight jobs");
    let stopping = tokio::task::spawn_blocking(move || {
        for pool in pools {
            let stats = pool.stats();
            let lane = pool.lane();
            pool.shutdown();
            tracing::info!(
                lane = %lane,
                processed = stats.jobs_processed,
                succeeded = stats.jobs_succeeded,
                retried = stats.jobs_retried,
                dead_lettered = stats.jobs_dead_lettered,
                skipped = stats.jobs_skipped,
                "lane stopped"
            );
        }
    });
    stopping.await.context("worker shutdown panicked")?;

    Ok(())
}
