// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Data model for probe observations.
//!
//! Every fetch produces a fresh [`ReplicaObservation`]; nothing here is
//! mutated after creation. `unknown` is a first-class value throughout:
//! an endpoint that cannot answer is never conflated with one that
//! answered "no".

use crate::error::{ProbeError, Result};
use crate::locator::{self, ConnectParams};
use std::fmt;
use std::time::Duration;

/// Which cluster role an endpoint plays in the probing topology.
///
/// A label for routing, logs, and reports; the endpoint's actual role is
/// whatever it reports at fetch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointRole {
    /// The write primary.
    Primary,
    /// The synchronous replica (sticky routing target).
    Sync,
    /// The load-balanced read endpoint.
    Balanced,
    /// The asynchronous replica (catch-up polling target).
    Async,
}

impl fmt::Display for EndpointRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Primary => "primary",
            Self::Sync => "sync",
            Self::Balanced => "balanced",
            Self::Async => "async",
        };
        f.write_str(label)
    }
}

/// One resolved data endpoint.
///
/// Immutable after resolution; supplied once per endpoint at session start
/// and only ever borrowed by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub role: EndpointRole,
    /// The raw locator string this descriptor was resolved from.
    pub locator: String,
    pub params: ConnectParams,
}

impl EndpointDescriptor {
    /// Resolve a locator string into an endpoint descriptor.
    ///
    /// An empty locator means the endpoint was never configured and fails
    /// with [`ProbeError::MissingEndpoint`]; a malformed one fails with
    /// [`ProbeError::InvalidLocator`].
    pub fn resolve(role: EndpointRole, locator: &str) -> Result<Self> {
        if locator.trim().is_empty() {
            return Err(ProbeError::MissingEndpoint { role });
        }
        let params = locator::resolve(locator)?;
        Ok(Self {
            role,
            locator: locator.to_string(),
            params,
        })
    }

    /// Short identity for diagnostics, e.g. `sync@replica-1:5433`.
    pub fn describe(&self) -> String {
        match (&self.params.host, self.params.port) {
            (Some(host), Some(port)) => format!("{}@{}:{}", self.role, host, port),
            (Some(host), None) => format!("{}@{}", self.role, host),
            _ => format!("{}@?", self.role),
        }
    }
}

/// The identity of the row just written, used to test read visibility.
///
/// Created once per session and read-only thereafter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteWitness {
    /// Row identifier on the primary.
    pub row_id: i64,
    /// The primary's write-ahead log position at the moment of write,
    /// when it was captured.
    pub primary_lsn: Option<String>,
}

impl WriteWitness {
    /// Create a witness, enforcing the "usable row id" precondition.
    ///
    /// A zero or negative identifier is a fatal precondition failure:
    /// no read attempt may be issued against it.
    pub fn new(row_id: i64, primary_lsn: Option<String>) -> Result<Self> {
        if row_id <= 0 {
            return Err(ProbeError::Internal(format!(
                "write produced no usable row id (got {})",
                row_id
            )));
        }
        Ok(Self {
            row_id,
            primary_lsn,
        })
    }
}

/// Whether an endpoint reported itself in replica (standby) mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaRole {
    /// Operating as a replica.
    Replica,
    /// Operating as a primary.
    Primary,
    /// The endpoint could not answer.
    Unknown,
}

impl ReplicaRole {
    /// Report label: `yes` / `no` / `unknown`.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Replica => "yes",
            Self::Primary => "no",
            Self::Unknown => "unknown",
        }
    }
}

impl From<Option<bool>> for ReplicaRole {
    fn from(answer: Option<bool>) -> Self {
        match answer {
            Some(true) => Self::Replica,
            Some(false) => Self::Primary,
            None => Self::Unknown,
        }
    }
}

/// Replication lag in bytes, with `unknown` kept distinct from zero.
///
/// Callers must never conflate "no lag" with "lag unknown".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LagBytes {
    /// Byte distance behind the witnessed primary position. Never negative.
    Bytes(i64),
    /// The lag query could not be answered.
    Unknown,
}

impl LagBytes {
    /// Build from a measured diff, clamping negatives to zero.
    ///
    /// The witnessed position is a lower bound; a replica that replayed
    /// past it has zero lag against this witness.
    pub fn from_diff(diff: i64) -> Self {
        Self::Bytes(diff.max(0))
    }
}

impl fmt::Display for LagBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(n) => write!(f, "{}", n),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Result of one probe against one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaObservation {
    /// The endpoint's self-reported cluster/node identity,
    /// or `"unknown"` when it could not answer.
    pub node: String,
    /// Whether the endpoint reported itself in replica mode.
    pub role: ReplicaRole,
    /// Whether the witnessed row was visible.
    pub row_visible: bool,
    /// Lag against the witnessed primary position.
    /// `None` exactly when lag was not requested or no position was captured.
    pub lag: Option<LagBytes>,
}

/// One entry in a session's ordered observation log.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeAttempt {
    /// 1-based attempt counter.
    pub sequence: u32,
    /// The endpoint this attempt was routed to.
    pub target: EndpointDescriptor,
    pub observation: ReplicaObservation,
    /// Wall-clock time since the session or poll began.
    pub elapsed: Duration,
}
