//! Error types for the Bowtie reconciliation system.
//!
//! This module provides the error hierarchy for every layer of an apply run:
//! configuration, state management, the control-plane API, the wire codec,
//! planning, and reconciliation.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the Bowtie reconciliation system.
#[derive(Debug, Error)]
pub enum BowtieError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// State management errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Control-plane API errors.
    #[error("Bowtie API error: {0}")]
    Api(#[from] ApiError),

    /// Polymorphic wire payload errors.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Planning errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// Reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// Duplicate entity definition.
    #[error("Duplicate {kind} name: {name}")]
    DuplicateName {
        /// Kind of entity (site, group, ...).
        kind: String,
        /// The duplicated name.
        name: String,
    },

    /// Invalid port specification.
    #[error("Invalid port specification: {spec}")]
    InvalidPort {
        /// The invalid port specification.
        spec: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// State could not be written.
    #[error("Failed to write state: {message}")]
    WriteFailed {
        /// Description of the write failure.
        message: String,
    },

    /// State lock acquisition failed.
    #[error("Failed to acquire state lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// State lock is held by another process.
    #[error("State is locked by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },
}

/// Control-plane API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The entity addressed by a request no longer exists remotely.
    ///
    /// Callers treat this as stale local state and recreate on the next
    /// apply, never as a fatal condition.
    #[error("Entity gone: {kind} {id}")]
    EntityGone {
        /// Kind of entity (group, site, ...).
        kind: String,
        /// Identifier that was expected to exist.
        id: String,
    },

    /// A named lookup found no match in a fetched listing.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Kind of entity looked up.
        kind: String,
        /// Identifier that was looked up.
        id: String,
    },

    /// Authentication failed.
    #[error("Bowtie authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// API request returned a non-success status.
    #[error("Bowtie API request failed: {status} - {message}")]
    RequestFailed {
        /// HTTP status code.
        status: u16,
        /// Response body from the API.
        message: String,
    },

    /// Network error.
    #[error("Network error communicating with Bowtie: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from API.
    #[error("Invalid response from Bowtie API: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// Errors raised while mapping polymorphic wire entities.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// A polymorphic payload could not be interpreted as any known shape.
    #[error("Failed to decode {field}: {message}")]
    Decode {
        /// Wire field being decoded (location, ports).
        field: String,
        /// Description of the failure.
        message: String,
    },

    /// A value with no populated variant was handed to the encoder.
    #[error("Failed to encode {field}: {message}")]
    Encode {
        /// Wire field being encoded.
        field: String,
        /// Description of the failure.
        message: String,
    },
}

/// Planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The same identifier was assigned to two declared entities.
    #[error("Identifier {id} is claimed by both {first} and {second}")]
    ConflictingIds {
        /// The duplicated identifier.
        id: String,
        /// First claimant.
        first: String,
        /// Second claimant.
        second: String,
    },
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Applying a single entity failed.
    #[error("Failed to apply {kind} '{name}': {reason}")]
    EntityApplyFailed {
        /// Kind of entity.
        kind: String,
        /// Name of the entity.
        name: String,
        /// Reason for failure.
        reason: String,
    },

    /// Reconciliation was aborted.
    #[error("Reconciliation aborted: {reason}")]
    Aborted {
        /// Reason for abort.
        reason: String,
    },
}

/// Result type alias for Bowtie operations.
pub type Result<T> = std::result::Result<T, BowtieError>;

impl BowtieError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if the error signals that a remote entity disappeared.
    #[must_use]
    pub const fn is_entity_gone(&self) -> bool {
        matches!(self, Self::Api(ApiError::EntityGone { .. }))
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl StateError {
    /// Creates a write error with the given message.
    #[must_use]
    pub fn write(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl ApiError {
    /// Creates an API request error.
    #[must_use]
    pub fn request_failed(status: u16, message: impl Into<String>) -> Self {
        Self::RequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Creates an entity-gone error.
    #[must_use]
    pub fn gone(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::EntityGone {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Creates a named-lookup miss.
    #[must_use]
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

impl CodecError {
    /// Creates a decode error.
    #[must_use]
    pub fn decode(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an encode error.
    #[must_use]
    pub fn encode(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Encode {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_gone_detection() {
        let err = BowtieError::from(ApiError::gone("group", "abc"));
        assert!(err.is_entity_gone());

        let err = BowtieError::from(ApiError::not_found("policy", "abc"));
        assert!(!err.is_entity_gone());
    }

    #[test]
    fn test_not_found_message() {
        let err = ApiError::not_found("policy", "p-1");
        assert_eq!(err.to_string(), "policy not found: p-1");
    }
}
