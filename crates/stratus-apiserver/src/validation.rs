use crate::error::{ApiError, Result};
use stratus_core::Resource;

/// Validate a resource before it is accepted by a write handler.
pub fn validate_resource<T: Resource>(resource: &T) -> Result<()> {
    resource
        .validate()
        .map_err(|e| ApiError::ValidationFailed(e.to_string()))
}
