// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bounded catch-up polling of an asynchronous replica.
//!
//! A cooperative state machine, `Polling -> {CaughtUp, TimedOut}`:
//! repeatedly probe one designated endpoint until the witnessed row becomes
//! visible or a wall-clock deadline elapses.
//!
//! The deadline is checked at the top of each iteration, before a fetch is
//! issued, so the loop never starts a new probe after the deadline has
//! passed; a fetch already in flight is allowed to complete. There is no
//! cancellation token for an in-flight fetch. Timing out is a normal
//! terminal outcome, not an error.

use crate::error::SessionAborted;
use crate::fetch::StateFetch;
use crate::observation::{EndpointDescriptor, ProbeAttempt, WriteWitness};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Governs how long and how often a catch-up poll probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingDeadline {
    /// Total wall-clock budget; once elapsed time reaches it, no new fetch
    /// starts.
    pub max_duration: Duration,
    /// Suspend between polls (skipped once a terminal state is reached).
    pub poll_interval: Duration,
}

/// Outcome of one catch-up poll.
#[derive(Debug, Clone)]
pub struct CatchUpReport {
    /// Every poll attempt, in order, with elapsed times measured from the
    /// start of the loop.
    pub attempts: Vec<ProbeAttempt>,
    /// `true` when the row became visible within the deadline;
    /// `false` on timeout.
    pub caught_up: bool,
}

/// Polls one asynchronous endpoint until the write becomes visible or the
/// deadline elapses.
pub struct AsyncCatchUpPoller<'a, F: StateFetch + ?Sized> {
    fetcher: &'a F,
    endpoint: &'a EndpointDescriptor,
    witness: &'a WriteWitness,
}

impl<'a, F: StateFetch + ?Sized> AsyncCatchUpPoller<'a, F> {
    pub fn new(
        fetcher: &'a F,
        endpoint: &'a EndpointDescriptor,
        witness: &'a WriteWitness,
    ) -> Self {
        Self {
            fetcher,
            endpoint,
            witness,
        }
    }

    /// Poll until the witnessed row is visible or the deadline elapses.
    ///
    /// Visibility is the sole success exit: the loop stops immediately on
    /// the first visible observation, appending nothing further. A probe
    /// failure aborts with the partial log, identical to a session; it is
    /// never treated as "not yet caught up".
    pub async fn await_visibility(
        &self,
        deadline: PollingDeadline,
        want_lag: bool,
    ) -> Result<CatchUpReport, SessionAborted> {
        let start = Instant::now();
        let mut attempts = Vec::new();
        let mut sequence = 1u32;

        debug!(
            endpoint = %self.endpoint.describe(),
            max_ms = deadline.max_duration.as_millis() as u64,
            interval_ms = deadline.poll_interval.as_millis() as u64,
            row_id = self.witness.row_id,
            "starting catch-up poll"
        );

        loop {
            // Deadline gate: evaluated before issuing the next fetch. A
            // deadline landing exactly on a poll boundary stops the loop.
            if start.elapsed() >= deadline.max_duration {
                info!(
                    endpoint = %self.endpoint.describe(),
                    polls = attempts.len(),
                    "catch-up poll timed out"
                );
                return Ok(CatchUpReport {
                    attempts,
                    caught_up: false,
                });
            }

            let observation = match self
                .fetcher
                .fetch(self.endpoint, self.witness, want_lag)
                .await
            {
                Ok(observation) => observation,
                Err(error) => {
                    return Err(SessionAborted {
                        partial: attempts,
                        error,
                    })
                }
            };

            let visible = observation.row_visible;
            attempts.push(ProbeAttempt {
                sequence,
                target: self.endpoint.clone(),
                observation,
                elapsed: start.elapsed(),
            });

            if visible {
                info!(
                    endpoint = %self.endpoint.describe(),
                    polls = attempts.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "async replica caught up"
                );
                return Ok(CatchUpReport {
                    attempts,
                    caught_up: true,
                });
            }

            sequence += 1;
            if !deadline.poll_interval.is_zero() {
                tokio::time::sleep(deadline.poll_interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ProbeError, Result as ProbeResult};
    use crate::fetch::{BoxFuture, ProbeQuery};
    use crate::observation::{EndpointRole, ReplicaObservation, ReplicaRole};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn observation(visible: bool) -> ReplicaObservation {
        ReplicaObservation {
            node: "pg-async".to_string(),
            role: ReplicaRole::Replica,
            row_visible: visible,
            lag: None,
        }
    }

    fn endpoint() -> EndpointDescriptor {
        EndpointDescriptor::resolve(EndpointRole::Async, "postgresql://app@replica-async:5434/app")
            .unwrap()
    }

    fn witness() -> WriteWitness {
        WriteWitness::new(42, None).unwrap()
    }

    struct ScriptFetcher {
        script: Mutex<VecDeque<ProbeResult<ReplicaObservation>>>,
    }

    impl ScriptFetcher {
        fn new(script: Vec<ProbeResult<ReplicaObservation>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
            }
        }

        /// A fetcher whose endpoint never shows the row.
        fn never_visible() -> Self {
            Self::new(Vec::new())
        }
    }

    impl StateFetch for ScriptFetcher {
        fn fetch<'a>(
            &'a self,
            _endpoint: &'a EndpointDescriptor,
            _witness: &'a WriteWitness,
            _want_lag: bool,
        ) -> BoxFuture<'a, ReplicaObservation> {
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(observation(false)));
            Box::pin(async move { next })
        }
    }

    fn deadline(max_ms: u64, interval_ms: u64) -> PollingDeadline {
        PollingDeadline {
            max_duration: Duration::from_millis(max_ms),
            poll_interval: Duration::from_millis(interval_ms),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_immediately_when_visible_on_iteration_k() {
        let fetcher = ScriptFetcher::new(vec![
            Ok(observation(false)),
            Ok(observation(false)),
            Ok(observation(true)),
        ]);
        let endpoint = endpoint();
        let witness = witness();
        let poller = AsyncCatchUpPoller::new(&fetcher, &endpoint, &witness);

        let report = poller
            .await_visibility(deadline(10_000, 500), false)
            .await
            .unwrap();

        assert!(report.caught_up);
        assert_eq!(report.attempts.len(), 3);
        assert_eq!(report.attempts[2].sequence, 3);
        assert!(report.attempts[2].observation.row_visible);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_scenario_four_polls_in_two_seconds() {
        let fetcher = ScriptFetcher::never_visible();
        let endpoint = endpoint();
        let witness = witness();
        let poller = AsyncCatchUpPoller::new(&fetcher, &endpoint, &witness);

        let report = poller
            .await_visibility(deadline(2_000, 500), false)
            .await
            .unwrap();

        // Polls at 0, 500, 1000, 1500ms; the loop stops before starting a
        // fifth at 2000ms.
        assert!(!report.caught_up);
        assert_eq!(report.attempts.len(), 4);
        let elapsed: Vec<u64> = report
            .attempts
            .iter()
            .map(|a| a.elapsed.as_millis() as u64)
            .collect();
        assert_eq!(elapsed, vec![0, 500, 1000, 1500]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_attempt_within_deadline() {
        let fetcher = ScriptFetcher::never_visible();
        let endpoint = endpoint();
        let witness = witness();
        let poller = AsyncCatchUpPoller::new(&fetcher, &endpoint, &witness);

        let report = poller
            .await_visibility(deadline(1_300, 400), false)
            .await
            .unwrap();

        assert!(!report.caught_up);
        for attempt in &report.attempts {
            assert!(attempt.elapsed <= Duration::from_millis(1_300));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequence_numbers_start_at_one() {
        let fetcher = ScriptFetcher::never_visible();
        let endpoint = endpoint();
        let witness = witness();
        let poller = AsyncCatchUpPoller::new(&fetcher, &endpoint, &witness);

        let report = poller
            .await_visibility(deadline(1_000, 250), false)
            .await
            .unwrap();

        let sequences: Vec<u32> = report.attempts.iter().map(|a| a.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_aborts_not_treated_as_lagging() {
        let fetcher = ScriptFetcher::new(vec![
            Ok(observation(false)),
            Err(ProbeError::probe_msg(
                "async@replica-async:5434",
                ProbeQuery::Identity,
                "connection refused",
            )),
        ]);
        let endpoint = endpoint();
        let witness = witness();
        let poller = AsyncCatchUpPoller::new(&fetcher, &endpoint, &witness);

        let aborted = poller
            .await_visibility(deadline(10_000, 500), false)
            .await
            .unwrap_err();

        assert_eq!(aborted.partial.len(), 1);
        assert!(matches!(aborted.error, ProbeError::Probe { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_visible_on_first_poll_yields_single_attempt() {
        let fetcher = ScriptFetcher::new(vec![Ok(observation(true))]);
        let endpoint = endpoint();
        let witness = witness();
        let poller = AsyncCatchUpPoller::new(&fetcher, &endpoint, &witness);

        let report = poller
            .await_visibility(deadline(5_000, 500), false)
            .await
            .unwrap();

        assert!(report.caught_up);
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(report.attempts[0].elapsed, Duration::ZERO);
    }
}
