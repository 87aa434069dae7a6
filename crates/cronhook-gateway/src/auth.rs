//! Path-key authentication.
//!
//! Admin routes carry the super-admin key as their second path segment.
//! Tenant routes carry the tenant key, which is the tenant name itself and
//! must belong to an existing tenant.

use tracing::warn;

use crate::app::AppState;
use crate::http::error::ApiError;

pub fn require_super_admin(state: &AppState, key: &str) -> Result<(), ApiError> {
    if key == state.config.gateway.super_admin_key {
        Ok(())
    } else {
        warn!("rejected admin request with invalid key");
        Err(ApiError::unauthorized("invalid admin key"))
    }
}

pub fn require_user(state: &AppState, user: &str) -> Result<(), ApiError> {
    if state.store.tenant_exists(user) {
        Ok(())
    } else {
        warn!(user = %user, "rejected request for unknown user key");
        Err(ApiError::unauthorized("invalid user key"))
    }
}
