//! Error types for the Cloudian provider
//!
//! Provides structured error types for the Cloudian SDK client, quantity
//! parsing, and the Kubernetes reconcilers built on top of them.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the provider
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Cloudian API Errors
    // =========================================================================
    /// The Cloudian admin API answered 204 No Content, its way of saying the
    /// requested entity does not exist.
    #[error("not found")]
    NotFound,

    #[error("{operation} failed: {source}")]
    Transport {
        operation: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{operation} returned unexpected status {status}: {message}")]
    UnexpectedStatus {
        operation: String,
        status: u16,
        message: String,
    },

    #[error("{operation}: cannot decode response body: {source}")]
    Decode {
        operation: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{operation}: cannot encode request body: {source}")]
    Encode {
        operation: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("user listing did not advance past offset {offset}")]
    PaginationStalled { offset: String },

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },

    // =========================================================================
    // Domain Errors
    // =========================================================================
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("Invalid quantity {value:?}: {reason}")]
    InvalidQuantity { value: String, reason: String },

    // =========================================================================
    // Kubernetes Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Finalizer error: {0}")]
    Finalizer(#[source] Box<kube::runtime::finalizer::Error<Error>>),

    #[error(
        "cannot determine creation result of the external resource, remove the {annotation} \
         annotation if it is safe to proceed"
    )]
    CreateIncomplete { annotation: &'static str },

    #[error("Resource not found: {kind}/{name}")]
    ResourceNotFound { kind: String, name: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Action to take on error during reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Requeue with exponential backoff
    RequeueWithBackoff,
    /// Requeue after specific duration
    RequeueAfter(Duration),
    /// Don't requeue, wait for changes
    NoRequeue,
}

impl Error {
    /// Wrap this error with the context of the failing call site.
    pub fn context(self, context: impl Into<String>) -> Self {
        Error::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error, or the error it wraps, is [`Error::NotFound`].
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound => true,
            Error::Context { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// The innermost error, looking through any [`Error::Context`] layers and
    /// the apply or cleanup failure a finalizer reports.
    pub fn root(&self) -> &Error {
        use kube::runtime::finalizer::Error as FinalizerError;

        match self {
            Error::Context { source, .. } => source.root(),
            Error::Finalizer(inner) => match inner.as_ref() {
                FinalizerError::ApplyFailed(e) | FinalizerError::CleanupFailed(e) => e.root(),
                _ => self,
            },
            other => other,
        }
    }

    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self.root() {
            Error::NotFound => "not_found",
            Error::Transport { .. } => "transport",
            Error::UnexpectedStatus { .. } => "unexpected_status",
            Error::Decode { .. } | Error::Encode { .. } => "serialization",
            Error::PaginationStalled { .. } => "pagination",
            Error::PolicyViolation(_) => "policy_violation",
            Error::InvalidQuantity { .. } => "invalid_quantity",
            Error::Kube(_) | Error::Finalizer(_) => "kubernetes",
            Error::CreateIncomplete { .. } => "create_incomplete",
            Error::ResourceNotFound { .. } => "resource_not_found",
            Error::Configuration(_) => "configuration",
            Error::Metrics(_) | Error::Internal(_) | Error::Context { .. } => "internal",
        }
    }

    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self.root() {
            // Transient errors - retry with backoff
            Error::Transport { .. }
            | Error::Kube(_)
            | Error::UnexpectedStatus { .. }
            | Error::NotFound => ErrorAction::RequeueWithBackoff,

            // Someone has to remove the offending access keys first
            Error::PolicyViolation(_) => ErrorAction::RequeueAfter(Duration::from_secs(60)),

            // The referenced ProviderConfig or Secret may show up later
            Error::ResourceNotFound { .. } => ErrorAction::RequeueAfter(Duration::from_secs(30)),

            // Configuration/validation errors - don't retry automatically
            Error::Configuration(_) | Error::InvalidQuantity { .. } => ErrorAction::NoRequeue,

            // Waits for an operator to clear the pending annotation
            Error::CreateIncomplete { .. } => ErrorAction::NoRequeue,

            // All other errors - retry with backoff
            _ => ErrorAction::RequeueWithBackoff,
        }
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        matches!(
            self.root(),
            Error::Transport { .. } | Error::Kube(_) | Error::UnexpectedStatus { .. }
        )
    }
}

/// Attach call-site context to the error of a [`Result`].
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(context))
    }
}

/// Result type alias for the provider
pub type Result<T> = std::result::Result<T, Error>;
