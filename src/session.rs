// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bounded consistency probe sessions.
//!
//! A session runs a fixed number of read attempts, each routed by the
//! session's [`RoutingMode`] and probed through a [`StateFetch`]
//! implementation, and produces an ordered, append-only observation log.
//!
//! The loop is strictly sequential: one blocking probe at a time, an
//! explicit suspend between attempts, no overlap between a fetch and the
//! session's own bookkeeping. There is no retry at any layer; the first
//! probe failure aborts the session with the partial log attached.

use crate::error::SessionAborted;
use crate::fetch::StateFetch;
use crate::observation::{EndpointDescriptor, ProbeAttempt, WriteWitness};
use crate::routing::{self, RoutingMode};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// The two read endpoints a session routes between.
#[derive(Debug, Clone)]
pub struct SessionEndpoints {
    /// Synchronous replica (sticky routing target).
    pub sync: EndpointDescriptor,
    /// Load-balanced read endpoint.
    pub balanced: EndpointDescriptor,
}

/// Tunables for one session, fixed at session start.
#[derive(Debug, Clone)]
pub struct SessionPlan {
    /// Number of read attempts. Values below 1 are coerced to 1: a session
    /// always makes at least one attempt (lenient by contract, matching
    /// the configuration surface's `>= 1` precondition).
    pub attempts: u32,
    /// Suspend between attempts (skipped after the last).
    pub inter_attempt_delay: Duration,
    pub mode: RoutingMode,
    /// Whether observations should carry lag against the witnessed LSN.
    pub want_lag: bool,
}

/// Orchestrates a bounded sequence of read attempts.
///
/// Shares no mutable state with the fetcher; each attempt is a fresh,
/// independent probe.
pub struct ConsistencyProbeSession<'a, F: StateFetch + ?Sized> {
    fetcher: &'a F,
    endpoints: &'a SessionEndpoints,
    witness: &'a WriteWitness,
}

impl<'a, F: StateFetch + ?Sized> ConsistencyProbeSession<'a, F> {
    pub fn new(
        fetcher: &'a F,
        endpoints: &'a SessionEndpoints,
        witness: &'a WriteWitness,
    ) -> Self {
        Self {
            fetcher,
            endpoints,
            witness,
        }
    }

    /// Run the session and return its ordered observation log.
    ///
    /// Attempts are numbered from 1; elapsed times are measured from
    /// session start and are non-decreasing. A probe failure aborts
    /// immediately, carrying the attempts completed so far inside
    /// [`SessionAborted`].
    pub async fn run(&self, plan: &SessionPlan) -> Result<Vec<ProbeAttempt>, SessionAborted> {
        let attempts = plan.attempts.max(1);
        let start = Instant::now();
        let mut log = Vec::with_capacity(attempts as usize);

        debug!(
            attempts,
            mode = %plan.mode,
            delay_ms = plan.inter_attempt_delay.as_millis() as u64,
            row_id = self.witness.row_id,
            "starting probe session"
        );

        for sequence in 1..=attempts {
            let target =
                routing::resolve_target(plan.mode, &self.endpoints.sync, &self.endpoints.balanced);

            let observation = match self.fetcher.fetch(target, self.witness, plan.want_lag).await {
                Ok(observation) => observation,
                Err(error) => {
                    return Err(SessionAborted {
                        partial: log,
                        error,
                    })
                }
            };

            debug!(
                sequence,
                target = %target.describe(),
                node = %observation.node,
                row_visible = observation.row_visible,
                "recorded probe attempt"
            );

            log.push(ProbeAttempt {
                sequence,
                target: target.clone(),
                observation,
                elapsed: start.elapsed(),
            });

            if sequence < attempts && !plan.inter_attempt_delay.is_zero() {
                tokio::time::sleep(plan.inter_attempt_delay).await;
            }
        }

        Ok(log)
    }
}
