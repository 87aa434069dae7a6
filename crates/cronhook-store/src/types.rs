use std::collections::BTreeMap;

use cronhook_core::JobSpec;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Everything persisted for one tenant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenantData {
    #[serde(default)]
    pub cron: Vec<JobSpec>,
    /// Arbitrary JSON values keyed by name.
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// The whole configuration file: tenant name → tenant data.
pub type Document = BTreeMap<String, TenantData>;
