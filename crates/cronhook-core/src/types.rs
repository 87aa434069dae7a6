use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A job as it is persisted in the configuration file and exchanged over
/// the HTTP API.
///
/// `cron` holds the canonical six-field form once it has passed through the
/// expression parser; older files may still carry five-field or `**`
/// spellings, which the parser accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub id: String,
    pub cron: String,
    pub url: String,
    #[serde(default)]
    pub active: bool,
}

impl JobSpec {
    pub fn new(
        id: impl Into<String>,
        cron: impl Into<String>,
        url: impl Into<String>,
        active: bool,
    ) -> Self {
        Self {
            id: id.into(),
            cron: cron.into(),
            url: url.into(),
            active,
        }
    }
}

/// Every tenant's job list, keyed by tenant name.
pub type JobSet = BTreeMap<String, Vec<JobSpec>>;
