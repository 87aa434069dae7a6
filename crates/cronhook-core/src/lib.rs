//! `cronhook-core`: configuration, error type and persisted job shape
//! shared by every cronhook crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::CronhookConfig;
pub use error::{CronhookError, Result};
pub use types::{JobSet, JobSpec};
