//! Lane worker pools: `concurrency` threads per lane, each pulling with `run_next`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::scheduler::{DispatchOutcome, WorkflowScheduler};

use super::lane::{Lane, LaneConfig};

/// Pool runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct WorkerStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_retried: u64,
    pub jobs_dead_lettered: u64,
    pub jobs_skipped: u64,
    pub errors: u64,
    pub current_running: usize,
    pub uptime_secs: u64,
}

impl WorkerStats {
    fn record(&mut self, outcome: &DispatchOutcome) {
        self.jobs_processed += 1;
        match outcome {
            DispatchOutcome::Completed { .. } => self.jobs_succeeded += 1,
            DispatchOutcome::RetryScheduled { .. } => self.jobs_retried += 1,
            DispatchOutcome::DeadLettered { .. } => self.jobs_dead_lettered += 1,
            DispatchOutcome::Skipped { .. } => self.jobs_skipped += 1,
        }
    }
}

/// Handle to the worker threads of one lane.
#[derive(Debug)]
pub struct LaneWorkerPool {
    lane: Lane,
    shutdown: Arc<AtomicBool>,
    joins: Vec<thread::JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
    started: Instant,
}

impl LaneWorkerPool {
    /// Start `config.concurrency` workers for `config.lane`.
    pub fn spawn(
        scheduler: Arc<WorkflowScheduler>,
        config: LaneConfig,
        poll_interval: Duration,
    ) -> std::io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(Mutex::new(WorkerStats::default()));
        let mut joins = Vec::with_capacity(config.concurrency);

        for index in 0..config.concurrency.max(1) {
            let name = format!("{}-{index}", config.lane);
            let scheduler = scheduler.clone();
            let shutdown = shutdown.clone();
            let stats = stats.clone();
            let lane = config.lane;

            let join = thread::Builder::new().name(name.clone()).spawn(move || {
                worker_loop(&name, &scheduler, lane, poll_interval, &shutdown, &stats);
            })?;
            joins.push(join);
        }

        info!(lane = %config.lane, workers = joins.len(), "lane worker pool started");

        Ok(Self {
            lane: config.lane,
            shutdown,
            joins,
            stats,
            started: Instant::now(),
        })
    }

    pub fn lane(&self) -> Lane {
        self.lane
    }

    pub fn workers(&self) -> usize {
        self.joins.len()
    }

    /// Ask every worker to stop after its current job and wait for them.
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for join in self.joins.drain(..) {
            let _ = join.join();
        }
        info!(lane = %self.lane, "lane worker pool stopped");
    }

    pub fn stats(&self) -> WorkerStats {
        let mut stats = self.stats.lock().map(|s| s.clone()).unwrap_or_default();
        stats.uptime_secs = self.started.elapsed().as_secs();
        stats
    }
}

fn worker_loop(
    name: &str,
    scheduler: &WorkflowScheduler,
    lane: Lane,
    poll_interval: Duration,
    shutdown: &AtomicBool,
    stats: &Mutex<WorkerStats>,
) {
    debug!(worker = name, lane = %lane, "worker started");

    while !shutdown.load(Ordering::SeqCst) {
        if let Ok(mut s) = stats.lock() {
            s.current_running += 1;
        }

        let result = scheduler.run_next(lane);

        if let Ok(mut s) = stats.lock() {
            s.current_running = s.current_running.saturating_sub(1);
            match &result {
                Ok(Some(outcome)) => s.record(outcome),
                Ok(None) => {}
                Err(_) => s.errors += 1,
            }
        }

        match result {
            Ok(Some(_)) => {}
            Ok(None) => thread::sleep(poll_interval),
            Err(err) => {
                error!(worker = name, lane = %lane, error = %err, "failed to run job");
                thread::sleep(poll_interval);
            }
        }
    }

    debug!(worker = name, lane = %lane, "worker stopped");
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use brainflow_core::{ContentItem, ContentStatus, UserId};

    use crate::repository::ContentRepository;

    use super::*;

    #[test]
    fn pool_processes_jobs_and_shuts_down() {
        let scheduler = Arc::new(WorkflowScheduler::builder().build());
        let item = ContentItem::new(UserId::new(), "Action: email Dana by Tuesday", Utc::now());
        let content_id = item.id;
        scheduler.submit_brain_dump(item).unwrap();

        let pool = LaneWorkerPool::spawn(
            scheduler.clone(),
            LaneConfig {
                lane: Lane::AiProcessing,
                concurrency: 2,
            },
            Duration::from_millis(5),
        )
        .unwrap();
        assert_eq!(pool.workers(), 2);

        let deadline = Instant::now() + Duration::from_secs(5);
        while pool.stats().jobs_succeeded == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        let stats = pool.stats();
        pool.shutdown();

        assert_eq!(stats.jobs_succeeded, 1);
        let stored = scheduler.content().get(content_id).unwrap().unwrap();
        assert_eq!(stored.status, ContentStatus::Processed);
    }
}
