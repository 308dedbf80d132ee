// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-endpoint state fetching.
//!
//! One fetch opens a short-lived connection to one endpoint, asks a small
//! fixed set of named, parameterized queries, and returns a
//! [`ReplicaObservation`]. The connection is scoped to the call and released
//! on every exit path, including errors: a slow or wedged endpoint affects
//! only its own attempt.
//!
//! # Query shapes
//!
//! | Query | Answers | On failure |
//! |--------------|----------------------------------------|---------------------------|
//! | `identity` | `current_setting('cluster_name')` | aborts the probe |
//! | `role` | `pg_is_in_recovery()` | aborts the probe |
//! | `visibility` | witnessed row present by id | aborts the probe |
//! | `lag` | byte distance behind the witnessed LSN | reported as `unknown` |
//!
//! A NULL identity or role answer is normal (`unknown`); only a failing
//! query or connection aborts, because a broken probe must never be
//! misreported as "replica lacks the write".
//!
//! The [`StateFetch`] trait is the seam: sessions and pollers are generic
//! over it, so tests drive them with scripted fetchers instead of a live
//! cluster.

use crate::error::{ProbeError, Result};
use crate::observation::{
    EndpointDescriptor, LagBytes, ReplicaObservation, ReplicaRole, WriteWitness,
};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, warn};

/// Default table holding the witnessed row.
pub const DEFAULT_WITNESS_TABLE: &str = "product";

/// Node identity reported when an endpoint cannot answer.
pub const UNKNOWN_NODE: &str = "unknown";

/// Identity query: the endpoint's self-reported cluster/node name.
pub const IDENTITY_SQL: &str = "SELECT current_setting('cluster_name')";

/// Role query: whether the endpoint is operating in replica (standby) mode.
pub const ROLE_SQL: &str = "SELECT pg_is_in_recovery()";

/// Lag query: byte distance between the witnessed primary position and the
/// endpoint's last-replayed position. An endpoint not in recovery reports 0.
pub const LAG_SQL: &str = "SELECT (CASE WHEN pg_is_in_recovery() \
     THEN pg_wal_lsn_diff($1::text::pg_lsn, pg_last_wal_replay_lsn()) \
     ELSE 0 END)::bigint";

/// The sub-queries a probe can issue, named for error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeQuery {
    /// Opening the connection itself.
    Connect,
    Identity,
    Role,
    Visibility,
    Lag,
    /// Writer-side: inserting the witness row on the primary.
    InsertWitness,
    /// Writer-side: capturing the primary's current WAL position.
    WalPosition,
}

impl fmt::Display for ProbeQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::Identity => "identity",
            Self::Role => "role",
            Self::Visibility => "visibility",
            Self::Lag => "lag",
            Self::InsertWitness => "insert-witness",
            Self::WalPosition => "wal-position",
        };
        f.write_str(name)
    }
}

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Trait defining what the engine needs from a state fetcher.
///
/// Sessions and pollers only ever call [`fetch`](Self::fetch); this trait
/// decouples them from the wire protocol and allows testing with scripted
/// fetchers.
pub trait StateFetch: Send + Sync {
    /// Probe one endpoint for the witnessed row.
    ///
    /// Each call is a fresh, independent probe over its own connection.
    /// Lag is computed only when `want_lag` is set and the witness carries
    /// a primary log position.
    fn fetch<'a>(
        &'a self,
        endpoint: &'a EndpointDescriptor,
        witness: &'a WriteWitness,
        want_lag: bool,
    ) -> BoxFuture<'a, ReplicaObservation>;
}

/// A connection scoped to one probe call.
///
/// Holds the driver task alongside the client; dropping the guard aborts
/// the driver, so the connection is released on every exit path.
pub(crate) struct ProbeConn {
    pub(crate) client: Client,
    driver: tokio::task::JoinHandle<()>,
}

impl ProbeConn {
    /// Open a fresh connection to the endpoint.
    pub(crate) async fn open(endpoint: &EndpointDescriptor) -> Result<Self> {
        let config = endpoint.params.pg_config();
        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(|e| ProbeError::probe(endpoint.describe(), ProbeQuery::Connect, e))?;

        let peer = endpoint.describe();
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(endpoint = %peer, error = %e, "connection driver ended with error");
            }
        });

        Ok(Self { client, driver })
    }
}

impl Drop for ProbeConn {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Validate that a table name is a plain identifier.
///
/// Table names cannot be bound as parameters, so the one piece of SQL we
/// build from configuration is restricted to identifier characters.
pub(crate) fn validate_table_ident(name: &str) -> Result<&str> {
    let mut chars = name.chars();
    let valid_first = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    let valid_rest = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if !valid_first || !valid_rest {
        return Err(ProbeError::Internal(format!(
            "witness table name '{}' is not a plain identifier",
            name
        )));
    }
    Ok(name)
}

/// Lag for an endpoint that already answered "not a replica".
///
/// A node serving as primary has nothing to replay, so its lag against the
/// witnessed position is exactly zero, decided here without issuing the lag
/// query. Replica and unknown-role nodes still get measured; the lag query
/// itself answers 0 for a node not in recovery.
fn known_primary_lag(role: ReplicaRole) -> Option<LagBytes> {
    match role {
        ReplicaRole::Primary => Some(LagBytes::Bytes(0)),
        ReplicaRole::Replica | ReplicaRole::Unknown => None,
    }
}

/// State fetcher backed by PostgreSQL.
///
/// Opens a brand-new connection per probe rather than reusing one across
/// attempts; this trades connection-setup latency for complete attempt
/// isolation.
pub struct PgStateFetcher {
    visibility_sql: String,
}

impl PgStateFetcher {
    /// Create a fetcher probing the given witness table.
    pub fn new(witness_table: &str) -> Result<Self> {
        let table = validate_table_ident(witness_table)?;
        Ok(Self {
            visibility_sql: format!("SELECT 1 FROM {} WHERE id = $1::bigint", table),
        })
    }

    /// The visibility query this fetcher issues.
    pub fn visibility_sql(&self) -> &str {
        &self.visibility_sql
    }

    async fn fetch_state(
        &self,
        endpoint: &EndpointDescriptor,
        witness: &WriteWitness,
        want_lag: bool,
    ) -> Result<ReplicaObservation> {
        let conn = ProbeConn::open(endpoint).await?;
        let peer = endpoint.describe();

        // A NULL answer means the endpoint cannot say; a failed query is a
        // broken probe and aborts.
        let node = conn
            .client
            .query_opt(IDENTITY_SQL, &[])
            .await
            .map_err(|e| ProbeError::probe(peer.clone(), ProbeQuery::Identity, e))?
            .and_then(|row| row.try_get::<_, Option<String>>(0).ok().flatten())
            .unwrap_or_else(|| UNKNOWN_NODE.to_string());

        let role: ReplicaRole = conn
            .client
            .query_opt(ROLE_SQL, &[])
            .await
            .map_err(|e| ProbeError::probe(peer.clone(), ProbeQuery::Role, e))?
            .and_then(|row| row.try_get::<_, Option<bool>>(0).ok().flatten())
            .into();

        // Absence of the row is a normal outcome, not an error.
        let row_visible = conn
            .client
            .query_opt(&self.visibility_sql, &[&witness.row_id])
            .await
            .map_err(|e| ProbeError::probe(peer.clone(), ProbeQuery::Visibility, e))?
            .is_some();

        let lag = if want_lag {
            match &witness.primary_lsn {
                Some(lsn) => Some(match known_primary_lag(role) {
                    Some(lag) => lag,
                    None => self.fetch_lag(&conn, &peer, lsn).await,
                }),
                None => None,
            }
        } else {
            None
        };

        debug!(
            endpoint = %peer,
            node = %node,
            replica = role.label(),
            row_visible,
            "probed endpoint"
        );

        Ok(ReplicaObservation {
            node,
            role,
            row_visible,
            lag,
        })
    }

    /// Compute lag against the witnessed position.
    ///
    /// Failure here is not a broken probe: the observation stays usable and
    /// the lag is reported as `unknown`, which callers must not conflate
    /// with zero.
    async fn fetch_lag(&self, conn: &ProbeConn, peer: &str, primary_lsn: &str) -> LagBytes {
        match conn.client.query_one(LAG_SQL, &[&primary_lsn]).await {
            Ok(row) => match row.try_get::<_, i64>(0) {
                Ok(diff) => LagBytes::from_diff(diff),
                Err(e) => {
                    warn!(endpoint = %peer, error = %e, "lag diff had unexpected shape");
                    LagBytes::Unknown
                }
            },
            Err(e) => {
                warn!(endpoint = %peer, error = %e, "lag query failed");
                LagBytes::Unknown
            }
        }
    }
}

impl StateFetch for PgStateFetcher {
    fn fetch<'a>(
        &'a self,
        endpoint: &'a EndpointDescriptor,
        witness: &'a WriteWitness,
        want_lag: bool,
    ) -> BoxFuture<'a, ReplicaObservation> {
        Box::pin(self.fetch_state(endpoint, witness, want_lag))
    }
}
