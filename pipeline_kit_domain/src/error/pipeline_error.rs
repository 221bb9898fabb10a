// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! This module provides the typed, hierarchical error system for the
//! PipelineKit dispatch domain. Every layer of the runtime - chain execution,
//! admission control, batching, rate limiting, resilience - surfaces failures
//! through this single taxonomy, so callers handle one error type end to end.
//!
//! ## Overview
//!
//! The error system is designed around Domain-Driven Design principles:
//!
//! - **Domain-Specific**: Errors are tailored to command-dispatch domain
//!   concepts
//! - **Structured**: Variants carry typed detail, never bare strings, so
//!   callers can branch on the failure shape
//! - **Actionable**: Each error provides sufficient context for debugging and
//!   recovery
//! - **Type-Safe**: Rust's type system ensures comprehensive error handling
//! - **Interoperable**: Seamless integration with standard library and
//!   third-party errors
//!
//! ## Error Architecture
//!
//! ### Error Categories
//!
//! The error system organizes failures into logical categories:
//!
//! #### Input Errors
//! - **Validation**: Invalid command input (field-level detail)
//! - **Authorization**: Credential and permission failures
//!
//! #### Admission Errors
//! - **RateLimitExceeded**: A rate-limiter scope denied the request
//! - **BackPressure**: The back-pressure semaphore rejected, dropped, or
//!   cancelled the request
//! - **CircuitOpen**: A circuit breaker is isolating a failing downstream
//!
//! #### Execution Errors
//! - **Timeout**: Wall-clock execution bound exceeded
//! - **HandlerNotFound**: No registered pipeline for a command type
//! - **NextAlreadyCalled / NextCurrentlyExecuting**: Middleware violated the
//!   exactly-once `next` contract
//! - **Cancelled**: The caller's task was cancelled mid-flight
//!
//! #### Collaborator Errors
//! - **Encryption**: Failures surfaced by the encryption middleware contract
//!
//! #### System Errors
//! - **Internal**: Last-resort wrapper carrying a breadcrumb message
//!
//! ## Error Recovery Strategies
//!
//! ### Transient Errors
//!
//! Some errors indicate temporary conditions that retry policies may
//! re-attempt:
//!
//! - **Timeout**: The execution bound elapsed; a later attempt may succeed
//! - **BackPressure (Rejected / QueueFull / Dropped)**: Momentary saturation
//! - **RateLimitExceeded**: Allowance refills with time
//!
//! ### Non-Transient Errors
//!
//! These errors indicate conditions that retrying cannot fix:
//!
//! - **Validation / Authorization**: The input itself is unacceptable
//! - **HandlerNotFound**: A wiring error; no pipeline is registered
//! - **NextAlreadyCalled / NextCurrentlyExecuting**: A middleware bug
//! - **Cancelled**: The caller gave up; re-attempting is not wanted
//!
//! ## Propagation Policy
//!
//! Errors flow upward through `next` returns unchanged. Middleware may catch
//! and recover (a circuit breaker records the failure and rethrows; a retry
//! middleware swallows and re-attempts). The chain never wraps errors it does
//! not understand; the executor translates admission failures into the
//! corresponding variants and otherwise passes errors through.

use std::time::Duration;
use thiserror::Error;

/// Reason detail for [`PipelineError::Validation`].
///
/// Validation middleware reports the precise rule that failed so callers can
/// produce field-level feedback without string matching.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationReason {
    #[error("value is empty")]
    Empty,

    #[error("value exceeds maximum length of {limit}")]
    TooLong { limit: usize },

    #[error("value contains invalid characters")]
    InvalidCharacters,

    #[error("{0}")]
    Custom(String),
}

/// Reason detail for [`PipelineError::Authorization`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationReason {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("insufficient permissions: required {required}, actual {actual}")]
    InsufficientPermissions { required: String, actual: String },
}

/// Admission outcome detail for [`PipelineError::BackPressure`].
///
/// Each variant maps to one back-pressure strategy outcome:
///
/// - `Rejected`: the error strategy refused the caller immediately
/// - `Dropped`: a drop strategy sacrificed this caller (or an older waiter)
/// - `QueueFull`: the suspend strategy found the waiter queue at capacity
/// - `Cancelled`: the semaphore closed (or the caller cancelled) while waiting
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackPressureError {
    #[error("rejected: concurrency limit reached")]
    Rejected,

    #[error("dropped by back-pressure policy")]
    Dropped,

    #[error("waiter queue is full")]
    QueueFull,

    #[error("cancelled while waiting for admission")]
    Cancelled,
}

/// Failure detail for [`PipelineError::Encryption`].
///
/// The encryption middleware body is a replaceable collaborator; these are
/// the failure shapes its contract is allowed to surface into the core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncryptionError {
    #[error("encryption key not found: {identifier}")]
    KeyNotFound { identifier: String },

    #[error("encryption failed: {details}")]
    EncryptionFailed { details: String },

    #[error("decryption failed: {details}")]
    DecryptionFailed { details: String },

    #[error("command exposes no sensitive fields")]
    NoSensitiveFields,

    #[error("invalid key format")]
    InvalidKeyFormat,

    #[error("unsupported algorithm: {algorithm}")]
    UnsupportedAlgorithm { algorithm: String },

    #[error("invalid encrypted data")]
    InvalidData,

    #[error("encryption is not configured")]
    NotConfigured,
}

/// Domain-specific errors for the command-dispatch runtime.
///
/// This enum represents all possible errors that can occur within the
/// dispatch core. Each variant carries structured detail designed to
/// provide clear information about what went wrong and potentially how to
/// recover from it.
///
/// ## Design Principles
///
/// - **Specific**: Each error type represents a specific failure mode
/// - **Structured**: Detail fields are typed, never encoded into messages
/// - **Categorized**: Errors are grouped by type for systematic handling
/// - **Classifiable**: [`PipelineError::is_transient`] drives retry policies
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("validation failed{}: {reason}", .field.as_deref().map(|f| format!(" for field '{f}'")).unwrap_or_default())]
    Validation {
        field: Option<String>,
        reason: ValidationReason,
    },

    #[error("authorization failed: {reason}")]
    Authorization { reason: AuthorizationReason },

    #[error("rate limit exceeded: limit {limit}{}", .scope.as_deref().map(|s| format!(" for scope '{s}'")).unwrap_or_default())]
    RateLimitExceeded {
        limit: u64,
        reset_time: Option<Duration>,
        scope: Option<String>,
    },

    #[error("execution timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },

    #[error("back-pressure: {0}")]
    BackPressure(#[from] BackPressureError),

    #[error("circuit breaker is open")]
    CircuitOpen,

    #[error("no pipeline registered for command type '{command_type}'{}", .name.as_deref().map(|n| format!(" with name '{n}'")).unwrap_or_default())]
    HandlerNotFound {
        command_type: String,
        name: Option<String>,
    },

    #[error("encryption: {0}")]
    Encryption(#[from] EncryptionError),

    #[error("middleware invoked next more than once")]
    NextAlreadyCalled,

    #[error("middleware invoked next while it is already executing")]
    NextCurrentlyExecuting,

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl PipelineError {
    /// Creates a validation error without field attribution
    pub fn validation(reason: ValidationReason) -> Self {
        Self::Validation { field: None, reason }
    }

    /// Creates a validation error for a specific field
    pub fn validation_field(field: impl Into<String>, reason: ValidationReason) -> Self {
        Self::Validation {
            field: Some(field.into()),
            reason,
        }
    }

    /// Creates an authorization error
    pub fn authorization(reason: AuthorizationReason) -> Self {
        Self::Authorization { reason }
    }

    /// Creates a timeout error
    pub fn timeout(elapsed: Duration) -> Self {
        Self::Timeout { elapsed }
    }

    /// Creates a handler-not-found error for a command type
    pub fn handler_not_found(command_type: impl Into<String>, name: Option<&str>) -> Self {
        Self::HandlerNotFound {
            command_type: command_type.into(),
            name: name.map(|n| n.to_string()),
        }
    }

    /// Creates a new internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Checks if the error is transient
    ///
    /// Transient errors reflect momentary conditions (saturation, elapsed
    /// bounds, depleted allowances) that a bounded retry may overcome.
    /// Cancellation is deliberately non-transient: the caller gave up.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PipelineError::Timeout { .. }
                | PipelineError::RateLimitExceeded { .. }
                | PipelineError::BackPressure(
                    BackPressureError::Rejected | BackPressureError::QueueFull | BackPressureError::Dropped
                )
        )
    }

    /// Checks if the error reports a middleware contract violation
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            PipelineError::NextAlreadyCalled | PipelineError::NextCurrentlyExecuting
        )
    }

    /// Gets the error category
    ///
    /// Categories are stable identifiers used as metric tags and log fields.
    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::Validation { .. } => "validation",
            PipelineError::Authorization { .. } => "authorization",
            PipelineError::RateLimitExceeded { .. } => "rate_limit",
            PipelineError::Timeout { .. } => "timeout",
            PipelineError::BackPressure(_) => "back_pressure",
            PipelineError::CircuitOpen => "circuit_breaker",
            PipelineError::HandlerNotFound { .. } => "registry",
            PipelineError::Encryption(_) => "encryption",
            PipelineError::NextAlreadyCalled | PipelineError::NextCurrentlyExecuting => "middleware_contract",
            PipelineError::Cancelled => "cancellation",
            PipelineError::Internal { .. } => "internal",
        }
    }
}

// Implement conversion from standard library errors
impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Internal {
            message: format!("io error: {}", err),
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Internal {
            message: format!("serialization error: {}", err),
        }
    }
}
