//! Simulated Rate Feed
//!
//! A background loop standing in for a live market-data source:
//!
//! ```text
//!   ┌──────────────┐   base tables   ┌───────────────┐  perturbed   ┌──────────────┐
//!   │ data source  │ ──────────────► │ × [0.8, 1.2)  │ ───────────► │ WalletEngine │
//!   └──────────────┘                 │ round 6 dp    │              └──────────────┘
//!          ▲                         └───────────────┘                     │
//!          └─────────────────────── sleep(interval) ◄──────────────────────┘
//! ```
//!
//! The loop only talks to the engine through `update_rate_tables`, whose
//! critical section never yields, so cancelling the task cannot leave a
//! half-applied update behind.

mod jitter;

pub use jitter::{FixedJitter, RandomJitter, RateJitter};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::FeedConfig;
use crate::decimal::round_half_up;
use crate::engine::WalletEngine;
use crate::model::ExchangeRateTable;
use crate::source::WalletDataSource;

/// Multiply every band rate by a fresh factor and round it.
///
/// Both the factor and the product are rounded half-up to
/// `config.precision`. A band whose product overflows keeps its base rate.
/// Timestamps are moved to now, since the result is a new observation.
pub fn perturb_tables(
    mut tables: Vec<ExchangeRateTable>,
    jitter: &dyn RateJitter,
    config: &FeedConfig,
) -> Vec<ExchangeRateTable> {
    let now = Utc::now().timestamp();
    for table in &mut tables {
        for band in &mut table.rates {
            let factor = round_half_up(
                jitter.next_factor(config.jitter_low, config.jitter_high),
                config.precision,
            );
            match band.rate.checked_mul(factor) {
                Some(rate) => band.rate = round_half_up(rate, config.precision),
                None => tracing::warn!(
                    from = %table.from_currency,
                    to = %table.to_currency,
                    rate = %band.rate,
                    %factor,
                    "perturbed rate overflows, keeping base rate"
                ),
            }
        }
        table.time_stamp = now;
    }
    tables
}

#[derive(Default)]
struct FeedStats {
    cycles: AtomicU64,
    skipped: AtomicU64,
}

/// State moved into the spawned loop
struct FeedWorker {
    engine: Arc<WalletEngine>,
    source: Arc<dyn WalletDataSource>,
    jitter: Arc<dyn RateJitter>,
    config: FeedConfig,
    stats: Arc<FeedStats>,
}

impl FeedWorker {
    async fn run(self) {
        loop {
            self.cycle().await;
            tokio::time::sleep(self.config.interval).await;
        }
    }

    async fn cycle(&self) {
        match self.source.exchange_rates().await {
            Ok(tables) => {
                let perturbed = perturb_tables(tables, self.jitter.as_ref(), &self.config);
                self.engine.update_rate_tables(perturbed).await;
                self.stats.cycles.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                self.stats.skipped.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(source = self.source.name(), error = %e, "rate fetch failed, skipping cycle");
            }
        }
    }
}

/// Start/stop handle for the simulated feed
pub struct SimulatedRateFeed {
    engine: Arc<WalletEngine>,
    source: Arc<dyn WalletDataSource>,
    jitter: Arc<dyn RateJitter>,
    config: FeedConfig,
    task: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<FeedStats>,
}

impl SimulatedRateFeed {
    pub fn new(
        engine: Arc<WalletEngine>,
        source: Arc<dyn WalletDataSource>,
        jitter: Arc<dyn RateJitter>,
        config: FeedConfig,
    ) -> Self {
        Self {
            engine,
            source,
            jitter,
            config,
            task: Mutex::new(None),
            stats: Arc::new(FeedStats::default()),
        }
    }

    /// Feed driven by an entropy-seeded `RandomJitter`
    pub fn with_random_jitter(
        engine: Arc<WalletEngine>,
        source: Arc<dyn WalletDataSource>,
        config: FeedConfig,
    ) -> Self {
        Self::new(engine, source, Arc::new(RandomJitter::new()), config)
    }

    /// Start the loop, cancelling a running one first.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;

        if let Some(previous) = task.take() {
            previous.abort();
            // Wait for the cancellation so two loops never overlap
            let _ = previous.await;
            tracing::debug!("previous feed loop cancelled");
        }

        let worker = FeedWorker {
            engine: self.engine.clone(),
            source: self.source.clone(),
            jitter: self.jitter.clone(),
            config: self.config.clone(),
            stats: self.stats.clone(),
        };
        *task = Some(tokio::spawn(worker.run()));

        tracing::info!(
            interval_ms = u64::try_from(self.config.interval.as_millis()).unwrap_or(u64::MAX),
            "simulated rate feed started"
        );
    }

    /// Cancel the loop. Returns `false` if it was not running.
    ///
    /// Once this returns, the feed issues no further rate updates.
    pub async fn stop(&self) -> bool {
        let Some(handle) = self.task.lock().await.take() else {
            return false;
        };

        handle.abort();
        let _ = handle.await;
        tracing::info!(cycles = self.cycles(), "simulated rate feed stopped");
        true
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Updates pushed to the engine, across all runs
    pub fn cycles(&self) -> u64 {
        self.stats.cycles.load(Ordering::SeqCst)
    }

    /// Cycles skipped because the source failed
    pub fn skipped_cycles(&self) -> u64 {
        self.stats.skipped.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }
}
