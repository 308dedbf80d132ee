//! Command-line surface.
//!
//! Mirrors the engine's configuration surface as flags, with locators
//! sourced from the conventional environment variables. All logic is
//! delegated here from `main.rs`.

use crate::config::{EndpointLocators, ProbeConfig};
use crate::error::SessionAborted;
use crate::fetch::PgStateFetcher;
use crate::poller::AsyncCatchUpPoller;
use crate::report;
use crate::routing::RoutingMode;
use crate::session::ConsistencyProbeSession;
use crate::writer::WitnessWriter;
use anyhow::Context;
use clap::Parser;

/// Demonstrate sync/async replicas with optional read-your-writes routing.
#[derive(Parser, Debug)]
#[command(name = "replica-probe", version, about, long_about = None)]
pub struct Cli {
    /// Route reads to the sync replica (read-your-writes)
    #[arg(long = "read-your-writes")]
    pub read_your_writes: bool,

    /// Number of read attempts
    #[arg(long, default_value_t = 4)]
    pub reads: u32,

    /// Delay between reads in milliseconds
    #[arg(long, default_value_t = 400)]
    pub delay: u64,

    /// Show LSN diff between primary and replica
    #[arg(long = "show-lsn")]
    pub show_lsn: bool,

    /// After initial reads, poll the async replica until it catches up
    #[arg(long = "await-async")]
    pub await_async: bool,

    /// Max seconds to wait for the async replica
    #[arg(long = "await-async-seconds", default_value_t = 6)]
    pub await_async_seconds: u64,

    /// Primary (write) locator
    #[arg(long = "primary-url", env = "DATABASE_URL", default_value = "", hide_env_values = true)]
    pub primary_url: String,

    /// Sync replica locator
    #[arg(
        long = "sync-url",
        env = "DATABASE_URL_READ_SYNC",
        default_value = "",
        hide_env_values = true
    )]
    pub sync_url: String,

    /// Load-balanced read locator
    #[arg(
        long = "balancer-url",
        env = "DATABASE_URL_READ_BALANCER",
        default_value = "",
        hide_env_values = true
    )]
    pub balancer_url: String,

    /// Async replica locator
    #[arg(
        long = "async-url",
        env = "DATABASE_URL_READ_ASYNC",
        default_value = "",
        hide_env_values = true
    )]
    pub async_url: String,

    /// Table holding the witnessed row
    #[arg(long, default_value = "product")]
    pub table: String,
}

impl Cli {
    /// Translate flags into engine configuration.
    pub fn into_config(self) -> ProbeConfig {
        ProbeConfig {
            endpoints: EndpointLocators {
                primary: self.primary_url,
                sync: self.sync_url,
                balanced: self.balancer_url,
                r#async: self.async_url,
            },
            session: crate::config::SessionSettings {
                attempts: self.reads,
                delay: format!("{}ms", self.delay),
                routing: if self.read_your_writes {
                    RoutingMode::Sticky
                } else {
                    RoutingMode::Balanced
                },
                show_lag: self.show_lsn,
            },
            catch_up: crate::config::CatchUpSettings {
                enabled: self.await_async,
                max_wait: format!("{}s", self.await_async_seconds.max(1)),
            },
            witness_table: self.table,
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Parse arguments and run one probing invocation.
pub async fn run() -> anyhow::Result<()> {
    init_tracing();
    let config = Cli::parse().into_config();
    execute(config).await
}

/// Run one probing invocation against the given configuration.
pub async fn execute(config: ProbeConfig) -> anyhow::Result<()> {
    let endpoints = config.resolve_endpoints()?;
    let plan = config.session.plan();

    let writer = WitnessWriter::new(endpoints.primary.clone(), &config.witness_table)?;
    let (row, witness) = writer
        .create_witness(config.session.show_lag)
        .await
        .context("failed to create witness row on primary")?;

    println!("Write");
    println!("-----");
    println!(
        "Created row id={} name={} price={}",
        row.id, row.name, row.price
    );
    println!();

    match plan.mode {
        RoutingMode::Sticky => println!("Read (read-your-writes -> sync replica)"),
        RoutingMode::Balanced => println!("Read (balancer: sync + async)"),
    }
    println!("----");

    let fetcher = PgStateFetcher::new(&config.witness_table)?;
    let session_endpoints = endpoints.session_endpoints();
    let session = ConsistencyProbeSession::new(&fetcher, &session_endpoints, &witness);

    let attempts = match session.run(&plan).await {
        Ok(attempts) => attempts,
        Err(SessionAborted { partial, error }) => {
            // Show how far we got before surfacing the failure.
            print!(
                "{}",
                report::render_read_table(&partial, plan.attempts.max(1), plan.want_lag)
            );
            return Err(error.into());
        }
    };
    print!(
        "{}",
        report::render_read_table(&attempts, plan.attempts.max(1), plan.want_lag)
    );

    if let Some(async_endpoint) = &endpoints.catch_up {
        println!();
        println!("Async follow-up (eventual consistency)");
        println!("--------------------------------------");

        let deadline = config.catch_up.deadline(plan.inter_attempt_delay);
        let poller = AsyncCatchUpPoller::new(&fetcher, async_endpoint, &witness);
        match poller.await_visibility(deadline, plan.want_lag).await {
            Ok(result) => {
                print!("{}", report::render_catch_up_table(&result, plan.want_lag));
                if !result.caught_up {
                    println!("{}", report::catch_up_warning(deadline.max_duration));
                }
            }
            Err(SessionAborted { partial, error }) => {
                let partial = crate::poller::CatchUpReport {
                    attempts: partial,
                    caught_up: false,
                };
                print!("{}", report::render_catch_up_table(&partial, plan.want_lag));
                return Err(error.into());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("replica-probe").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_match_configuration_surface() {
        let config = parse(&[]).into_config();
        assert_eq!(config.session.attempts, 4);
        assert_eq!(config.session.delay, "400ms");
        assert_eq!(config.session.routing, RoutingMode::Balanced);
        assert!(!config.session.show_lag);
        assert!(!config.catch_up.enabled);
        assert_eq!(config.catch_up.max_wait, "6s");
        assert_eq!(config.witness_table, "product");
    }

    #[test]
    fn test_read_your_writes_selects_sticky_routing() {
        let config = parse(&["--read-your-writes"]).into_config();
        assert_eq!(config.session.routing, RoutingMode::Sticky);
    }

    #[test]
    fn test_await_async_seconds_floor_is_one() {
        let config = parse(&["--await-async", "--await-async-seconds", "0"]).into_config();
        assert!(config.catch_up.enabled);
        assert_eq!(config.catch_up.max_wait, "1s");
    }

    #[test]
    fn test_reads_and_delay_flow_through() {
        let config = parse(&["--reads", "7", "--delay", "150"]).into_config();
        assert_eq!(config.session.attempts, 7);
        assert_eq!(config.session.delay, "150ms");
    }

    #[test]
    fn test_locator_flags_populate_endpoints() {
        let config = parse(&[
            "--primary-url",
            "postgresql://app@db-primary/app",
            "--sync-url",
            "postgresql://app@replica-sync/app",
            "--balancer-url",
            "postgresql://app@balancer/app",
        ])
        .into_config();
        assert!(config.endpoints.primary.contains("db-primary"));
        assert!(config.endpoints.sync.contains("replica-sync"));
        assert!(config.endpoints.balanced.contains("balancer"));
        assert!(config.endpoints.r#async.is_empty());
    }
}
