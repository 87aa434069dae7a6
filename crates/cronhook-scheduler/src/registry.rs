use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{Result, SchedulerError};
use crate::types::{Job, JobStatus, Outcome, Upsert};

/// A pending fire as seen by the dispatch loop.
///
/// Tickets are never removed from the loop's timeline when a job changes.
/// Instead each ticket carries the job's incarnation and generation at the
/// time it was issued, and [`JobRegistry::claim`] rejects any ticket that no
/// longer matches the live record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct FireTicket {
    pub fire_at: DateTime<Utc>,
    pub tenant: String,
    pub job_id: String,
    pub incarnation: u64,
    pub generation: u64,
}

/// A claimed firing, handed to the executor.
#[derive(Debug, Clone)]
pub(crate) struct Firing {
    pub tenant: String,
    pub job: Job,
    /// Nominal firing time, recorded as `last_run`.
    pub fire_at: DateTime<Utc>,
    pub incarnation: u64,
}

pub(crate) struct Claim {
    pub firing: Firing,
    /// The job's following fire, if it is still scheduled.
    pub next: Option<FireTicket>,
}

struct JobRecord {
    job: Job,
    /// Created on first activation.
    status: Option<JobStatus>,
    /// Changes only when the record is created anew.
    incarnation: u64,
    /// Changes whenever the pending fire is recomputed or cancelled.
    generation: u64,
}

impl JobRecord {
    fn next_run(&self) -> Option<DateTime<Utc>> {
        self.status.as_ref().and_then(|s| s.next_run)
    }

    /// Record a freshly computed pending fire (or its absence).
    fn reschedule(&mut self, next: Option<DateTime<Utc>>, generation: u64) {
        self.generation = generation;
        match next {
            Some(at) => self.status.get_or_insert_with(JobStatus::default).next_run = Some(at),
            None => {
                if let Some(status) = self.status.as_mut() {
                    status.next_run = None;
                }
            }
        }
    }

    fn ticket(&self, tenant: &str) -> Option<FireTicket> {
        if !self.job.active {
            return None;
        }
        Some(FireTicket {
            fire_at: self.next_run()?,
            tenant: tenant.to_string(),
            job_id: self.job.id.clone(),
            incarnation: self.incarnation,
            generation: self.generation,
        })
    }
}

#[derive(Default)]
struct Inner {
    tenants: BTreeMap<String, BTreeMap<String, JobRecord>>,
    incarnations: u64,
    generations: u64,
    /// Wake channel of the running dispatch loop, if any.
    notifier: Option<UnboundedSender<FireTicket>>,
}

impl Inner {
    fn next_incarnation(&mut self) -> u64 {
        self.incarnations += 1;
        self.incarnations
    }

    fn next_generation(&mut self) -> u64 {
        self.generations += 1;
        self.generations
    }

    fn notify(&self, ticket: Option<FireTicket>) {
        if let (Some(tx), Some(ticket)) = (self.notifier.as_ref(), ticket) {
            // A closed channel means the loop is shutting down; start() reseeds.
            let _ = tx.send(ticket);
        }
    }

    fn record(&self, tenant: &str, id: &str) -> Option<&JobRecord> {
        self.tenants.get(tenant)?.get(id)
    }

    fn record_mut(&mut self, tenant: &str, id: &str) -> Option<&mut JobRecord> {
        self.tenants.get_mut(tenant)?.get_mut(id)
    }
}

/// Concurrency-safe store of every tenant's jobs and their execution status.
///
/// All state sits behind one `RwLock`; every public operation takes the lock
/// once, so readers never see a half-applied change. The lock is never held
/// across an await point or an outbound request.
///
/// Whenever an operation gives a job a new pending fire, the registry pushes
/// a [`FireTicket`] to the attached dispatch loop, which wakes it if that
/// fire is earlier than whatever it is waiting for. Cancellation needs no
/// message: stale tickets are discarded when claimed.
pub struct JobRegistry {
    inner: RwLock<Inner>,
    clock: Arc<dyn Clock>,
}

impl JobRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            clock,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// First pending fire for an active job, relative to now.
    fn first_fire(&self, job: &Job) -> Result<Option<DateTime<Utc>>> {
        if job.active {
            Ok(Some(job.schedule.next_after(self.clock.now())?))
        } else {
            Ok(None)
        }
    }

    // ── Mutations ────────────────────────────────────────────────────────────

    /// Insert a job, or replace the job with the same ID wholesale.
    ///
    /// A replaced job loses its pending fire and, if active, is rescheduled
    /// from now. Its status history is kept. Fails with `Unsatisfiable`
    /// (leaving the registry untouched) when an active job's schedule has no
    /// upcoming occurrence, and with `UnknownTenant` when the tenant is not
    /// registered. Tenants are never created implicitly.
    pub fn upsert(&self, tenant: &str, job: Job) -> Result<Upsert> {
        let next = self.first_fire(&job)?;

        let mut guard = self.write();
        let inner = &mut *guard;
        let generation = inner.next_generation();
        let incarnation = inner.incarnations + 1;
        let Some(jobs) = inner.tenants.get_mut(tenant) else {
            return Err(unknown_tenant(tenant));
        };

        let (result, ticket) = match jobs.get_mut(&job.id) {
            Some(record) => {
                let was_active = record.job.active;
                record.job = job;
                record.reschedule(next, generation);
                (Upsert::Replaced { was_active }, record.ticket(tenant))
            }
            None => {
                let id = job.id.clone();
                let mut record = JobRecord {
                    job,
                    status: None,
                    incarnation,
                    generation,
                };
                record.reschedule(next, generation);
                let ticket = record.ticket(tenant);
                jobs.insert(id, record);
                inner.incarnations = incarnation;
                (Upsert::Inserted, ticket)
            }
        };

        debug!(tenant, ?result, next_run = ?next, "job upserted");
        inner.notify(ticket);
        Ok(result)
    }

    /// Remove a job. Returns `false` if it did not exist.
    pub fn remove(&self, tenant: &str, id: &str) -> bool {
        let removed = self
            .write()
            .tenants
            .get_mut(tenant)
            .and_then(|jobs| jobs.remove(id))
            .is_some();
        if removed {
            debug!(tenant, job_id = id, "job removed");
        }
        removed
    }

    /// Activate or deactivate a job.
    ///
    /// Returns `Ok(false)` if the job does not exist and `Ok(true)` otherwise,
    /// including when the flag already had the requested value (nothing is
    /// rescheduled in that case).
    pub fn set_active(&self, tenant: &str, id: &str, active: bool) -> Result<bool> {
        let now = self.clock.now();
        let mut guard = self.write();
        let inner = &mut *guard;

        let Some(record) = inner.record_mut(tenant, id) else {
            return Ok(false);
        };
        if record.job.active == active {
            return Ok(true);
        }
        let next = if active {
            Some(record.job.schedule.next_after(now)?)
        } else {
            None
        };

        let generation = inner.next_generation();
        let Some(record) = inner.record_mut(tenant, id) else {
            return Ok(false);
        };
        record.job.active = active;
        record.reschedule(next, generation);
        let ticket = record.ticket(tenant);

        debug!(tenant, job_id = id, active, "job activation changed");
        inner.notify(ticket);
        Ok(true)
    }

    /// Set the flag on every job of a tenant. Returns how many jobs now carry
    /// the requested flag. Jobs whose schedule has no upcoming occurrence
    /// cannot be activated and are skipped.
    pub fn set_all_active(&self, tenant: &str, active: bool) -> usize {
        let now = self.clock.now();
        let mut guard = self.write();
        let inner = &mut *guard;
        let generation = inner.next_generation();

        let Some(jobs) = inner.tenants.get_mut(tenant) else {
            return 0;
        };

        let mut count = 0;
        let mut tickets = Vec::new();
        for record in jobs.values_mut() {
            if record.job.active == active {
                count += 1;
                continue;
            }
            let next = if active {
                match record.job.schedule.next_after(now) {
                    Ok(next) => Some(next),
                    Err(e) => {
                        warn!(tenant, job_id = %record.job.id, "not activated: {e}");
                        continue;
                    }
                }
            } else {
                None
            };
            record.job.active = active;
            record.reschedule(next, generation);
            tickets.extend(record.ticket(tenant));
            count += 1;
        }

        info!(tenant, active, count, "bulk activation");
        for ticket in tickets {
            inner.notify(Some(ticket));
        }
        count
    }

    /// Register a tenant with no jobs. No-op if it already exists.
    pub fn add_tenant(&self, tenant: &str) {
        self.write().tenants.entry(tenant.to_string()).or_default();
    }

    /// Drop a tenant and every one of its jobs in one step. Returns the
    /// number of jobs removed.
    pub fn remove_tenant(&self, tenant: &str) -> usize {
        let removed = self
            .write()
            .tenants
            .remove(tenant)
            .map_or(0, |jobs| jobs.len());
        info!(tenant, jobs = removed, "tenant removed from registry");
        removed
    }

    /// Replace a tenant's whole job list.
    ///
    /// Every active job is checked for an upcoming occurrence before anything
    /// changes; the first failure is returned and the registry is untouched.
    /// Jobs keeping their ID keep their status history. The tenant must
    /// already be registered.
    pub fn replace_tenant(&self, tenant: &str, jobs: Vec<Job>) -> Result<usize> {
        let mut planned = Vec::with_capacity(jobs.len());
        for job in jobs {
            let next = self.first_fire(&job)?;
            planned.push((job, next));
        }

        let mut guard = self.write();
        let inner = &mut *guard;
        let Some(mut previous) = inner.tenants.remove(tenant) else {
            return Err(unknown_tenant(tenant));
        };
        let generation = inner.next_generation();
        let mut replacement = BTreeMap::new();

        for (job, next) in planned {
            let (status, incarnation) = match previous.remove(&job.id) {
                Some(old) => (old.status, old.incarnation),
                None => (None, inner.next_incarnation()),
            };
            let mut record = JobRecord {
                job,
                status,
                incarnation,
                generation,
            };
            record.reschedule(next, generation);
            replacement.insert(record.job.id.clone(), record);
        }

        let count = replacement.len();
        let tickets: Vec<_> = replacement.values().filter_map(|r| r.ticket(tenant)).collect();
        inner.tenants.insert(tenant.to_string(), replacement);
        for ticket in tickets {
            inner.notify(Some(ticket));
        }
        info!(tenant, jobs = count, "tenant jobs replaced");
        Ok(count)
    }

    /// Replace every tenant and job. Status history is discarded and every
    /// record gets a new incarnation, so outcomes of firings started before
    /// the swap are dropped. Active jobs with no upcoming occurrence are kept
    /// but stored inactive. Returns the total number of jobs.
    pub fn replace_all(&self, source: BTreeMap<String, Vec<Job>>) -> usize {
        let now = self.clock.now();
        let mut guard = self.write();
        let inner = &mut *guard;
        let generation = inner.next_generation();
        inner.tenants.clear();

        let mut total = 0;
        let mut tickets = Vec::new();
        for (tenant, jobs) in source {
            let mut records = BTreeMap::new();
            for mut job in jobs {
                let next = if job.active {
                    match job.schedule.next_after(now) {
                        Ok(next) => Some(next),
                        Err(e) => {
                            warn!(tenant = %tenant, job_id = %job.id, "loaded inactive: {e}");
                            job.active = false;
                            None
                        }
                    }
                } else {
                    None
                };
                let mut record = JobRecord {
                    job,
                    status: None,
                    incarnation: inner.next_incarnation(),
                    generation,
                };
                record.reschedule(next, generation);
                tickets.extend(record.ticket(&tenant));
                records.insert(record.job.id.clone(), record);
            }
            total += records.len();
            inner.tenants.insert(tenant, records);
        }

        for ticket in tickets {
            inner.notify(Some(ticket));
        }
        total
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn get(&self, tenant: &str, id: &str) -> Option<Job> {
        self.read().record(tenant, id).map(|r| r.job.clone())
    }

    /// Jobs of a tenant ordered by ID.
    pub fn list(&self, tenant: &str) -> Vec<Job> {
        self.read()
            .tenants
            .get(tenant)
            .map(|jobs| jobs.values().map(|r| r.job.clone()).collect())
            .unwrap_or_default()
    }

    pub fn list_tenants(&self) -> Vec<String> {
        self.read().tenants.keys().cloned().collect()
    }

    /// Snapshot of one job's status; `None` if the job is unknown or has
    /// never been active.
    pub fn status(&self, tenant: &str, id: &str) -> Option<JobStatus> {
        self.read().record(tenant, id)?.status.clone()
    }

    /// Snapshot of every status of a tenant, keyed by job ID.
    pub fn all_status(&self, tenant: &str) -> BTreeMap<String, JobStatus> {
        self.read()
            .tenants
            .get(tenant)
            .map(|jobs| {
                jobs.iter()
                    .filter_map(|(id, r)| Some((id.clone(), r.status.clone()?)))
                    .collect()
            })
            .unwrap_or_default()
    }

    // ── Dispatch loop interface ──────────────────────────────────────────────

    /// Connect a dispatch loop. Every active job is rescheduled from now and
    /// the resulting tickets are returned to seed the loop's timeline.
    pub(crate) fn attach(&self, notifier: UnboundedSender<FireTicket>) -> Vec<FireTicket> {
        let now = self.clock.now();
        let mut guard = self.write();
        let inner = &mut *guard;
        let generation = inner.next_generation();
        inner.notifier = Some(notifier);

        let mut tickets = Vec::new();
        for (tenant, jobs) in inner.tenants.iter_mut() {
            for record in jobs.values_mut().filter(|r| r.job.active) {
                match record.job.schedule.next_after(now) {
                    Ok(next) => record.reschedule(Some(next), generation),
                    Err(e) => {
                        warn!(tenant = %tenant, job_id = %record.job.id, "deactivated: {e}");
                        record.job.active = false;
                        record.reschedule(None, generation);
                    }
                }
                tickets.extend(record.ticket(tenant));
            }
        }
        tickets
    }

    pub(crate) fn detach(&self) {
        self.write().notifier = None;
    }

    /// Tickets for every currently scheduled job.
    pub(crate) fn scheduled_tickets(&self) -> Vec<FireTicket> {
        self.read()
            .tenants
            .iter()
            .flat_map(|(tenant, jobs)| jobs.values().filter_map(move |r| r.ticket(tenant)))
            .collect()
    }

    /// Turn a due ticket into a firing.
    ///
    /// Returns `None` for a stale ticket (job removed, replaced, deactivated
    /// or rescheduled since the ticket was issued). Otherwise the job's next
    /// fire is computed from the nominal firing time, so execution latency
    /// never shifts the schedule. If the loop fell behind far enough that
    /// this next fire is already past, missed occurrences are skipped and the
    /// next one after now is used instead.
    pub(crate) fn claim(&self, ticket: &FireTicket) -> Option<Claim> {
        let now = self.clock.now();
        let mut guard = self.write();
        let record = guard.record_mut(&ticket.tenant, &ticket.job_id)?;
        if record.incarnation != ticket.incarnation
            || record.generation != ticket.generation
            || !record.job.active
            || record.next_run() != Some(ticket.fire_at)
        {
            return None;
        }

        let schedule = &record.job.schedule;
        let next = schedule.next_after(ticket.fire_at).and_then(|next| {
            if next < now {
                debug!(tenant = %ticket.tenant, job_id = %ticket.job_id, "skipping missed occurrences");
                schedule.next_after(now)
            } else {
                Ok(next)
            }
        });
        let generation = record.generation;
        match next {
            Ok(next) => record.reschedule(Some(next), generation),
            Err(e) => {
                warn!(tenant = %ticket.tenant, job_id = %ticket.job_id, "deactivated: {e}");
                record.job.active = false;
                record.reschedule(None, generation);
            }
        }

        let claim = Claim {
            firing: Firing {
                tenant: ticket.tenant.clone(),
                job: record.job.clone(),
                fire_at: ticket.fire_at,
                incarnation: record.incarnation,
            },
            next: record.ticket(&ticket.tenant),
        };
        Some(claim)
    }

    /// Write an execution outcome into the job's status.
    ///
    /// Dropped (returning `false`) when the job has since been removed or
    /// recreated, or when a later firing of the same job has already been
    /// recorded.
    pub(crate) fn record_outcome(&self, firing: &Firing, outcome: &Outcome) -> bool {
        let mut guard = self.write();
        let Some(record) = guard.record_mut(&firing.tenant, &firing.job.id) else {
            return false;
        };
        if record.incarnation != firing.incarnation {
            return false;
        }
        let status = record.status.get_or_insert_with(JobStatus::default);
        if status.last_run.is_some_and(|last| last > firing.fire_at) {
            return false;
        }
        status.last_run = Some(firing.fire_at);
        match outcome {
            Outcome::Success => {
                status.last_success = true;
                status.last_error.clear();
            }
            Outcome::Failure(error) => {
                status.last_success = false;
                status.last_error = error.clone();
            }
        }
        true
    }
}

fn unknown_tenant(tenant: &str) -> SchedulerError {
    SchedulerError::UnknownTenant {
        tenant: tenant.to_string(),
    }
}
