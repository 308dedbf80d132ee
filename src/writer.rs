//! Write-witness production against the primary.
//!
//! Creates one demo row on the primary and returns its identity, optionally
//! together with the primary's write-ahead log position at the moment of
//! write. The witness is what every subsequent read attempt tests
//! visibility against.

use crate::error::{ProbeError, Result};
use crate::fetch::{validate_table_ident, ProbeConn, ProbeQuery};
use crate::observation::{EndpointDescriptor, WriteWitness};
use rand::Rng;
use tracing::info;

/// WAL position query on the primary, captured once per invocation.
pub const WAL_POSITION_SQL: &str = "SELECT pg_current_wal_lsn()::text";

/// A row created by the witness writer, for the write report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WitnessRow {
    pub id: i64,
    pub name: String,
    pub price: String,
}

/// Produces write witnesses by inserting demo rows on the primary.
pub struct WitnessWriter {
    endpoint: EndpointDescriptor,
    insert_sql: String,
}

impl WitnessWriter {
    /// Create a writer targeting the given primary endpoint and table.
    pub fn new(endpoint: EndpointDescriptor, witness_table: &str) -> Result<Self> {
        let table = validate_table_ident(witness_table)?;
        Ok(Self {
            endpoint,
            insert_sql: format!(
                "INSERT INTO {} (name, price) VALUES ($1, $2::text::numeric) RETURNING id::bigint",
                table
            ),
        })
    }

    /// Insert one demo row and return its witness.
    ///
    /// Captures the primary's WAL position in the same short-lived
    /// connection when `capture_lsn` is set, so the position is a faithful
    /// lower bound for lag measurements. The connection is released before
    /// returning on every path.
    pub async fn create_witness(&self, capture_lsn: bool) -> Result<(WitnessRow, WriteWitness)> {
        let conn = ProbeConn::open(&self.endpoint).await?;
        let peer = self.endpoint.describe();

        let (name, price) = demo_values();
        let id: i64 = conn
            .client
            .query_one(&self.insert_sql, &[&name, &price])
            .await
            .map_err(|e| ProbeError::probe(peer.clone(), ProbeQuery::InsertWitness, e))?
            .try_get(0)
            .map_err(|e| ProbeError::probe(peer.clone(), ProbeQuery::InsertWitness, e))?;

        let primary_lsn = if capture_lsn {
            let lsn: String = conn
                .client
                .query_one(WAL_POSITION_SQL, &[])
                .await
                .map_err(|e| ProbeError::probe(peer.clone(), ProbeQuery::WalPosition, e))?
                .try_get(0)
                .map_err(|e| ProbeError::probe(peer.clone(), ProbeQuery::WalPosition, e))?;
            Some(lsn)
        } else {
            None
        };

        info!(
            row_id = id,
            name = %name,
            lsn = primary_lsn.as_deref().unwrap_or("-"),
            "created witness row on primary"
        );

        let witness = WriteWitness::new(id, primary_lsn)?;
        let row = WitnessRow {
            id,
            name,
            price,
        };
        Ok((row, witness))
    }
}

/// Random demo row values: `Demo <hex6>` and a 10.00..=99.99 price.
fn demo_values() -> (String, String) {
    let mut rng = rand::thread_rng();
    let suffix: u32 = rng.gen_range(0..0x1_000_000);
    let cents: u32 = rng.gen_range(10_00..=99_99);
    (
        format!("Demo {:06x}", suffix),
        format!("{}.{:02}", cents / 100, cents % 100),
    )
}
