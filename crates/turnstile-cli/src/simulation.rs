//! Contention simulation
//!
//! Every worker owns its own `Locker`, standing in for a separate process,
//! and repeatedly takes the same resource through the shared store. An
//! occupancy counter around the critical section detects any overlap.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::Context as _;
use tokio::task::JoinSet;
use tracing::{debug, error, info};
use turnstile_lock::{Context, CoordinationStore, LockStats, Locker, LockerConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationConfig {
    pub resource: String,
    pub workers: usize,
    pub rounds: usize,
    /// Time spent inside the critical section each round
    pub hold: Duration,
    /// Acquire deadline per round; `None` waits indefinitely
    pub timeout: Option<Duration>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            resource: "accounts:42".to_string(),
            workers: 8,
            rounds: 25,
            hold: Duration::from_millis(5),
            timeout: Some(Duration::from_secs(5)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimulationReport {
    /// Rounds that acquired, ran and released
    pub completed: u64,
    /// Rounds abandoned on deadline or cancellation
    pub timed_out: u64,
    /// Critical sections entered while another was in progress
    pub violations: u64,
    pub elapsed: Duration,
    pub stats: LockStats,
}

impl SimulationReport {
    pub fn is_exclusive(&self) -> bool {
        self.violations == 0
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "completed rounds:   {}", self.completed)?;
        writeln!(f, "timed out rounds:   {}", self.timed_out)?;
        writeln!(f, "violations:         {}", self.violations)?;
        writeln!(f, "elapsed:            {:?}", self.elapsed)?;
        writeln!(f, "acquisitions:       {}", self.stats.acquisitions)?;
        writeln!(f, "releases:           {}", self.stats.releases)?;
        writeln!(f, "contentions:        {}", self.stats.contentions)?;
        writeln!(f, "cancellations:      {}", self.stats.cancellations)?;
        writeln!(f, "store errors:       {}", self.stats.store_errors)?;
        writeln!(f, "avg wait (ms):      {}", self.stats.avg_wait_ms())?;
        write!(f, "avg hold (ms):      {}", self.stats.avg_hold_ms())
    }
}

#[derive(Debug, Default)]
struct WorkerOutcome {
    completed: u64,
    timed_out: u64,
    stats: LockStats,
}

/// Shared critical-section bookkeeping
#[derive(Debug, Default)]
struct Occupancy {
    inside: AtomicUsize,
    violations: AtomicU64,
}

impl Occupancy {
    fn enter(&self, worker: usize, round: usize) {
        let inside = self.inside.fetch_add(1, Ordering::SeqCst) + 1;
        if inside > 1 {
            self.violations.fetch_add(1, Ordering::SeqCst);
            error!(worker, round, inside, "Mutual exclusion violated");
        }
    }

    fn leave(&self) {
        self.inside.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Run the simulation until every worker finishes its rounds or `root` is canceled
pub async fn run(
    store: Arc<dyn CoordinationStore>,
    locker_config: &LockerConfig,
    simulation: &SimulationConfig,
    root: &Context,
) -> anyhow::Result<SimulationReport> {
    if let Some(timeout) = simulation.timeout
        && timeout > locker_config.max_lease()
    {
        anyhow::bail!(
            "acquire timeout {:?} exceeds the maximum lease {:?}",
            timeout,
            locker_config.max_lease()
        );
    }

    info!(
        resource = %simulation.resource,
        workers = simulation.workers,
        rounds = simulation.rounds,
        "Starting contention simulation"
    );

    let started = Instant::now();
    let occupancy = Arc::new(Occupancy::default());
    let mut workers = JoinSet::new();

    for worker in 0..simulation.workers {
        let locker = Locker::new(store.clone(), locker_config.clone());
        let simulation = simulation.clone();
        let root = root.clone();
        let occupancy = occupancy.clone();
        workers.spawn(async move { run_worker(worker, locker, simulation, root, occupancy).await });
    }

    let mut report = SimulationReport::default();
    while let Some(joined) = workers.join_next().await {
        let outcome = joined.context("simulation worker panicked")??;
        report.completed += outcome.completed;
        report.timed_out += outcome.timed_out;
        report.stats.merge(&outcome.stats);
    }

    report.violations = occupancy.violations.load(Ordering::SeqCst);
    report.elapsed = started.elapsed();

    info!(
        completed = report.completed,
        timed_out = report.timed_out,
        violations = report.violations,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Contention simulation finished"
    );
    Ok(report)
}

async fn run_worker(
    worker: usize,
    locker: Locker,
    simulation: SimulationConfig,
    root: Context,
    occupancy: Arc<Occupancy>,
) -> anyhow::Result<WorkerOutcome> {
    let mut outcome = WorkerOutcome::default();

    for round in 0..simulation.rounds {
        if root.err().is_some() {
            debug!(worker, round, "Simulation canceled, worker stopping");
            break;
        }

        let ctx = match simulation.timeout {
            Some(timeout) => root.with_timeout(timeout),
            None => root.clone(),
        };

        let mut handle = locker.new_lock(simulation.resource.as_str()).await?;
        match handle.acquire(&ctx).await {
            Ok(()) => {}
            Err(e) if e.is_cancellation() => {
                debug!(worker, round, error = %e, "Round abandoned");
                outcome.timed_out += 1;
                continue;
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("worker {} failed to acquire in round {}", worker, round));
            }
        }

        occupancy.enter(worker, round);
        tokio::time::sleep(simulation.hold).await;
        occupancy.leave();

        handle
            .release(&Context::background())
            .await
            .with_context(|| format!("worker {} failed to release in round {}", worker, round))?;
        outcome.completed += 1;
    }

    outcome.stats = locker.stats();
    Ok(outcome)
}
