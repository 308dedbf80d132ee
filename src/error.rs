// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the probing engine.
//!
//! Errors are categorized by when they can occur and include enough
//! context (endpoint, failing sub-query) to render a precise diagnostic.
//!
//! # Error Categories
//!
//! | Error Type | Phase | Description |
//! |------------------|-------------------|----------------------------------------------|
//! | `InvalidLocator` | Before probing | Connection locator could not be parsed |
//! | `MissingEndpoint`| Before probing | A required endpoint was not configured |
//! | `Probe` | During a session | A sub-query against one endpoint failed |
//! | `Internal` | Any | Unexpected internal error |
//!
//! A poll deadline expiring is **not** an error: [`CatchUpReport`] reports it
//! as `caught_up = false`.
//!
//! # Propagation
//!
//! No layer retries. A [`ProbeError::Probe`] aborts the enclosing session or
//! poll immediately; the attempts completed before the failure travel inside
//! [`SessionAborted`] so callers can show how far the session got.
//!
//! [`CatchUpReport`]: crate::poller::CatchUpReport

use crate::fetch::ProbeQuery;
use crate::observation::{EndpointRole, ProbeAttempt};
use thiserror::Error;

/// Result type alias for probing operations.
pub type Result<T> = std::result::Result<T, ProbeError>;

/// Errors that can occur while probing replicas.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// Connection locator could not be parsed as a URI.
    ///
    /// Raised by the endpoint resolver before any connection is attempted.
    #[error("Invalid endpoint locator '{locator}': {message}")]
    InvalidLocator { locator: String, message: String },

    /// A required endpoint was not configured.
    ///
    /// Raised during configuration validation, before any probing starts.
    #[error("Missing endpoint: no locator configured for the {role} endpoint")]
    MissingEndpoint { role: EndpointRole },

    /// A specific sub-query against a specific endpoint failed.
    ///
    /// A broken probe is never misreported as "replica lacks the write";
    /// it aborts the enclosing session or poll instead.
    #[error("Probe failure against {endpoint} ({query}): {message}")]
    Probe {
        endpoint: String,
        query: ProbeQuery,
        message: String,
        #[source]
        source: Option<tokio_postgres::Error>,
    },

    /// Unexpected internal error.
    ///
    /// Catch-all for precondition violations that shouldn't happen.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProbeError {
    /// Create a probe failure from a driver error.
    pub fn probe(
        endpoint: impl Into<String>,
        query: ProbeQuery,
        source: tokio_postgres::Error,
    ) -> Self {
        Self::Probe {
            endpoint: endpoint.into(),
            query,
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a probe failure without a driver source.
    pub fn probe_msg(
        endpoint: impl Into<String>,
        query: ProbeQuery,
        message: impl Into<String>,
    ) -> Self {
        Self::Probe {
            endpoint: endpoint.into(),
            query,
            message: message.into(),
            source: None,
        }
    }

    /// Check whether this error was raised before any probing started.
    ///
    /// Configuration-phase errors mean no connection was ever opened.
    pub fn is_precondition(&self) -> bool {
        match self {
            Self::InvalidLocator { .. } => true,
            Self::MissingEndpoint { .. } => true,
            Self::Probe { .. } => false,
            Self::Internal(_) => false,
        }
    }
}

/// A session or poll that aborted partway through.
///
/// Carries the attempts completed before the failure; partial results are
/// never discarded.
#[derive(Error, Debug)]
#[error("aborted after {} completed attempt(s): {error}", partial.len())]
pub struct SessionAborted {
    /// Attempts recorded before the failure, in order.
    pub partial: Vec<ProbeAttempt>,
    /// The failure that stopped the session.
    #[source]
    pub error: ProbeError,
}
