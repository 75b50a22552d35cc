//! Shared error taxonomy for catalog operations.
//!
//! Every fallible operation across the workspace resolves to one of these
//! variants so callers can map outcomes uniformly (HTTP layers, CLIs, tests)
//! without inspecting message strings.

use thiserror::Error;

/// Errors surfaced by catalog services and the store.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Malformed or out-of-bounds input (empty fields, length caps, unknown
    /// categories, invalid ratings).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The actor's tier or ownership does not permit the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The operation lost a race or would duplicate unique state
    /// (concurrent transitions, duplicate votes, taken slugs).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The subject exists and the actor is allowed, but required prior
    /// state is missing (e.g. approving before the safety check ran).
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// A build pipeline fault surfaced through the job or request record.
    #[error("build failure: {0}")]
    BuildFailure(String),

    /// The referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, CatalogError>;

impl CatalogError {
    /// Stable machine-readable code for each variant.
    pub fn code(&self) -> &'static str {
        match self {
            CatalogError::Validation(_) => "validation",
            CatalogError::PermissionDenied(_) => "permission_denied",
            CatalogError::Conflict(_) => "conflict",
            CatalogError::PreconditionFailed(_) => "precondition_failed",
            CatalogError::BuildFailure(_) => "build_failure",
            CatalogError::NotFound(_) => "not_found",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CatalogError::Conflict("request already approved".to_string());
        assert_eq!(err.to_string(), "conflict: request already approved");
        assert_eq!(err.code(), "conflict");
    }

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            CatalogError::Validation(String::new()),
            CatalogError::PermissionDenied(String::new()),
            CatalogError::Conflict(String::new()),
            CatalogError::PreconditionFailed(String::new()),
            CatalogError::BuildFailure(String::new()),
            CatalogError::NotFound(String::new()),
        ];
        let codes: std::collections::HashSet<_> = errors.iter().map(|e| e.code()).collect();
        assert_eq!(codes.len(), errors.len());
    }
}
