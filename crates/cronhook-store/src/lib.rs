//! `cronhook-store` holds the JSON configuration document: tenants, their
//! persisted jobs and their free-form key-value data.
//!
//! The document lives in memory behind [`ConfigStore`] and is written back to
//! disk only when it has changed since the last save.

pub mod error;
pub mod store;
pub mod types;

pub use error::{Result, StoreError};
pub use store::ConfigStore;
pub use types::{Document, TenantData};
