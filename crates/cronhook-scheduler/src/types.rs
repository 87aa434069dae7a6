use chrono::{DateTime, Utc};
use cronhook_core::JobSpec;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::expression::Schedule;

/// A validated job as held by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Unique within its tenant only.
    pub id: String,
    pub schedule: Schedule,
    /// Target of the GET issued on every firing.
    pub url: String,
    pub active: bool,
}

impl Job {
    pub fn new(
        id: impl Into<String>,
        schedule: Schedule,
        url: impl Into<String>,
        active: bool,
    ) -> Self {
        Self {
            id: id.into(),
            schedule,
            url: url.into(),
            active,
        }
    }

    /// Parse the persisted form. Fails on a malformed cron expression.
    pub fn from_spec(spec: &JobSpec) -> Result<Self> {
        Ok(Self {
            id: spec.id.clone(),
            schedule: Schedule::parse(&spec.cron)?,
            url: spec.url.clone(),
            active: spec.active,
        })
    }

    /// Persisted form, carrying the canonical expression.
    pub fn to_spec(&self) -> JobSpec {
        JobSpec {
            id: self.id.clone(),
            cron: self.schedule.expression().to_string(),
            url: self.url.clone(),
            active: self.active,
        }
    }
}

/// Execution state of one job.
///
/// `last_*` fields describe the most recent attempt and survive
/// deactivation. `next_run` is present only while the job is scheduled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    /// Nominal firing time of the most recent attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_success: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run: Option<DateTime<Utc>>,
}

/// Result of a single execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Transport error text or a status description such as
    /// `HTTP Status: 503 Service Unavailable`.
    Failure(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// What [`crate::JobRegistry::upsert`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Replaced { was_active: bool },
}
