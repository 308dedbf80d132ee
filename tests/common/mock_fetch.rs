//! Scripted `StateFetch` implementation for tests.
//!
//! Replays a queue of prepared responses, then repeats a configurable
//! fallback observation. Records every fetch call (target, want_lag) for
//! assertions.

use replica_probe::fetch::BoxFuture;
use replica_probe::{
    EndpointDescriptor, ProbeError, ReplicaObservation, ReplicaRole, StateFetch, WriteWitness,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A recorded fetch() call.
#[derive(Debug, Clone)]
pub struct FetchCall {
    pub target: String,
    pub want_lag: bool,
}

/// Build a plain observation for scripting.
pub fn obs(node: &str, visible: bool) -> ReplicaObservation {
    ReplicaObservation {
        node: node.to_string(),
        role: ReplicaRole::Replica,
        row_visible: visible,
        lag: None,
    }
}

/// Scripted fetcher: pops prepared responses, then repeats the fallback.
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<Result<ReplicaObservation, ProbeError>>>,
    fallback: ReplicaObservation,
    calls: Mutex<Vec<FetchCall>>,
    count: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new(script: Vec<Result<ReplicaObservation, ProbeError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: obs("pg-fallback", false),
            calls: Mutex::new(Vec::new()),
            count: AtomicUsize::new(0),
        }
    }

    /// A fetcher whose endpoint never shows the witnessed row.
    pub fn never_visible(node: &str) -> Self {
        let mut fetcher = Self::new(Vec::new());
        fetcher.fallback = obs(node, false);
        fetcher
    }

    /// A fetcher whose endpoint always shows the witnessed row.
    pub fn always_visible(node: &str) -> Self {
        let mut fetcher = Self::new(Vec::new());
        fetcher.fallback = obs(node, true);
        fetcher
    }

    /// Number of fetches issued so far.
    pub fn call_count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// All recorded calls, in order.
    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Targets of all recorded calls, via `EndpointDescriptor::describe`.
    pub fn targets(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.target).collect()
    }
}

impl StateFetch for ScriptedFetcher {
    fn fetch<'a>(
        &'a self,
        endpoint: &'a EndpointDescriptor,
        _witness: &'a WriteWitness,
        want_lag: bool,
    ) -> BoxFuture<'a, ReplicaObservation> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(FetchCall {
            target: endpoint.describe(),
            want_lag,
        });
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()));
        Box::pin(async move { next })
    }
}
