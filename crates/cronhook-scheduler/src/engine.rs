use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cronhook_core::JobSet;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{
    clock::Clock,
    error::{Result, SchedulerError},
    executor::{run_firing, Executor},
    registry::{FireTicket, JobRegistry},
    types::Job,
};

/// Longest the dispatch loop sleeps without re-reading the clock.
const IDLE_WAIT: Duration = Duration::from_secs(60);

/// Timeline size below which stale tickets are never compacted away.
const MIN_COMPACT_LEN: usize = 1024;

/// Owns the single dispatch loop that turns scheduled jobs into executions.
///
/// The [`JobRegistry`] is usable whether or not the loop runs. While it runs,
/// every new pending fire reaches the loop through an unbounded channel that
/// the loop drains on each wake-up, so a change never waits behind a sleep.
pub struct TriggerEngine {
    registry: Arc<JobRegistry>,
    executor: Arc<dyn Executor>,
    clock: Arc<dyn Clock>,
    runtime: Mutex<Option<LoopHandle>>,
}

struct LoopHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TriggerEngine {
    pub fn new(executor: Arc<dyn Executor>, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry: Arc::new(JobRegistry::new(clock.clone())),
            executor,
            clock,
            runtime: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Replace the registry contents with persisted jobs.
    ///
    /// Entries whose expression does not parse are skipped with a warning.
    /// No occurrence missed while the process was down is fired: schedules
    /// are computed from the current time. Returns the number of jobs loaded.
    pub fn load(&self, source: &JobSet) -> usize {
        let mut parsed: BTreeMap<String, Vec<Job>> = BTreeMap::new();
        for (tenant, specs) in source {
            let jobs = parsed.entry(tenant.clone()).or_default();
            for spec in specs {
                match Job::from_spec(spec) {
                    Ok(job) => jobs.push(job),
                    Err(e) => warn!(tenant = %tenant, job_id = %spec.id, "skipping job: {e}"),
                }
            }
        }
        let count = self.registry.replace_all(parsed);
        info!(tenants = source.len(), jobs = count, "jobs loaded");
        count
    }

    /// Spawn the dispatch loop. Fails with `AlreadyRunning` if it is up.
    pub async fn start(&self) -> Result<()> {
        let mut runtime = self.runtime.lock().await;
        self.start_locked(&mut runtime)
    }

    /// Stop the dispatch loop and wait for it to exit. Executions already in
    /// flight are left to finish on their own.
    pub async fn stop(&self) -> Result<()> {
        let mut runtime = self.runtime.lock().await;
        self.stop_locked(&mut runtime).await
    }

    pub async fn is_running(&self) -> bool {
        self.runtime.lock().await.is_some()
    }

    /// Swap the entire job set: stop the loop if it runs, reload from
    /// `source`, start again. Returns the number of jobs loaded.
    pub async fn reload(&self, source: &JobSet) -> Result<usize> {
        let mut runtime = self.runtime.lock().await;
        if runtime.is_some() {
            self.stop_locked(&mut runtime).await?;
        }
        let count = self.load(source);
        self.start_locked(&mut runtime)?;
        info!(jobs = count, "trigger engine reloaded");
        Ok(count)
    }

    fn start_locked(&self, runtime: &mut Option<LoopHandle>) -> Result<()> {
        if runtime.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }

        let (ticket_tx, ticket_rx) = mpsc::unbounded_channel();
        let seed = self.registry.attach(ticket_tx);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        info!(scheduled = seed.len(), "trigger engine started");

        let dispatcher = Dispatcher {
            registry: self.registry.clone(),
            executor: self.executor.clone(),
            clock: self.clock.clone(),
            timeline: seed.into_iter().map(Reverse).collect(),
            compact_at: MIN_COMPACT_LEN,
        };
        let task = tokio::spawn(dispatcher.run(ticket_rx, shutdown_rx));
        *runtime = Some(LoopHandle {
            shutdown: shutdown_tx,
            task,
        });
        Ok(())
    }

    async fn stop_locked(&self, runtime: &mut Option<LoopHandle>) -> Result<()> {
        let handle = runtime.take().ok_or(SchedulerError::NotRunning)?;
        self.registry.detach();
        let _ = handle.shutdown.send(true);
        if let Err(e) = handle.task.await {
            error!("dispatch loop terminated abnormally: {e}");
        }
        info!("trigger engine stopped");
        Ok(())
    }
}

/// State owned by the running loop.
struct Dispatcher {
    registry: Arc<JobRegistry>,
    executor: Arc<dyn Executor>,
    clock: Arc<dyn Clock>,
    /// Min-heap of pending fires; may hold stale tickets.
    timeline: BinaryHeap<Reverse<FireTicket>>,
    compact_at: usize,
}

impl Dispatcher {
    async fn run(
        mut self,
        mut tickets: mpsc::UnboundedReceiver<FireTicket>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            let now = self.clock.now();
            self.fire_due(now);
            self.compact();
            let wait = self.wait_after(now);

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("dispatch loop shutting down");
                        break;
                    }
                }
                ticket = tickets.recv() => match ticket {
                    Some(ticket) => {
                        self.timeline.push(Reverse(ticket));
                        while let Ok(ticket) = tickets.try_recv() {
                            self.timeline.push(Reverse(ticket));
                        }
                    }
                    // registry detached: stop() is about to signal shutdown
                    None => break,
                },
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Claim and launch every ticket due at or before `now`. Executions run
    /// on their own tasks; the loop never waits for one.
    fn fire_due(&mut self, now: DateTime<Utc>) {
        while self
            .timeline
            .peek()
            .is_some_and(|Reverse(ticket)| ticket.fire_at <= now)
        {
            let Some(Reverse(ticket)) = self.timeline.pop() else {
                break;
            };
            let Some(claim) = self.registry.claim(&ticket) else {
                debug!(tenant = %ticket.tenant, job_id = %ticket.job_id, "stale ticket dropped");
                continue;
            };
            if let Some(next) = claim.next {
                self.timeline.push(Reverse(next));
            }
            debug!(tenant = %ticket.tenant, job_id = %ticket.job_id, fire_at = %ticket.fire_at, "firing");
            tokio::spawn(run_firing(
                self.registry.clone(),
                self.executor.clone(),
                claim.firing,
            ));
        }
    }

    /// Rebuild the timeline from the registry once stale tickets pile up.
    fn compact(&mut self) {
        if self.timeline.len() < self.compact_at {
            return;
        }
        let before = self.timeline.len();
        self.timeline = self
            .registry
            .scheduled_tickets()
            .into_iter()
            .map(Reverse)
            .collect();
        self.compact_at = (self.timeline.len() * 2).max(MIN_COMPACT_LEN);
        debug!(before, after = self.timeline.len(), "timeline compacted");
    }

    fn wait_after(&self, now: DateTime<Utc>) -> Duration {
        match self.timeline.peek() {
            Some(Reverse(ticket)) => (ticket.fire_at - now)
                .to_std()
                .unwrap_or(Duration::ZERO)
                .min(IDLE_WAIT),
            None => IDLE_WAIT,
        }
    }
}
