//! # Replica Probe
//!
//! A consistency prober for replicated PostgreSQL clusters: writes one
//! witness row on the primary, then measures when and where that write
//! becomes visible across a synchronous replica, a load-balanced read
//! endpoint, and an asynchronous replica.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                           replica-probe                            │
//! │                                                                    │
//! │  ┌───────────────┐   ┌──────────────────┐   ┌───────────────────┐  │
//! │  │ WitnessWriter │──►│ ProbeSession     │──►│ AsyncCatchUpPoller│  │
//! │  │ (primary)     │   │ (routing + fetch)│   │ (deadline loop)   │  │
//! │  └───────────────┘   └──────────────────┘   └───────────────────┘  │
//! │          │                    │                       │            │
//! │          ▼                    ▼                       ▼            │
//! │  ┌──────────────────────────────────────────────────────────────┐  │
//! │  │ StateFetch: one short-lived connection per probe             │  │
//! │  │ (identity / role / visibility / lag named queries)           │  │
//! │  └──────────────────────────────────────────────────────────────┘  │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Single-threaded and cooperative: one blocking probe at a time, an
//! explicit suspend between attempts, no connection sharing across
//! attempts, no retries. Each component consumes read-only inputs and
//! produces a fresh, append-only observation log.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use replica_probe::config::ProbeConfig;
//! use replica_probe::fetch::PgStateFetcher;
//! use replica_probe::session::ConsistencyProbeSession;
//! use replica_probe::writer::WitnessWriter;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ProbeConfig::for_testing();
//! let endpoints = config.resolve_endpoints()?;
//!
//! let writer = WitnessWriter::new(endpoints.primary.clone(), &config.witness_table)?;
//! let (_row, witness) = writer.create_witness(false).await?;
//!
//! let fetcher = PgStateFetcher::new(&config.witness_table)?;
//! let session_endpoints = endpoints.session_endpoints();
//! let session = ConsistencyProbeSession::new(&fetcher, &session_endpoints, &witness);
//! let log = session.run(&config.session.plan()).await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod locator;
pub mod observation;
pub mod poller;
pub mod report;
pub mod routing;
pub mod session;
pub mod writer;

// Re-exports for convenience
pub use config::{ProbeConfig, ResolvedEndpoints};
pub use error::{ProbeError, Result, SessionAborted};
pub use fetch::{PgStateFetcher, ProbeQuery, StateFetch};
pub use observation::{
    EndpointDescriptor, EndpointRole, LagBytes, ProbeAttempt, ReplicaObservation, ReplicaRole,
    WriteWitness,
};
pub use poller::{AsyncCatchUpPoller, CatchUpReport, PollingDeadline};
pub use routing::{resolve_target, RoutingMode};
pub use session::{ConsistencyProbeSession, SessionEndpoints, SessionPlan};
pub use writer::WitnessWriter;
