use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::stream::StreamExt;
use opentelemetry_sdk::util::tokio_interval_stream;

pub use overdue_notification_sweep::OverdueNotificationSweep;
pub use unverified_account_sweep::UnverifiedAccountSweep;

mod overdue_notification_sweep;
mod unverified_account_sweep;

/// Outcome of one sweep run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Rows that qualified for action
    pub examined: u64,
    /// Rows acted upon
    pub acted: u64,
    /// Rows skipped because of an error, retried on the next run
    pub failed: u64,
}

/// Periodic scan-and-act job over persisted state.
/// Runs are stateless, everything they need comes from `now` and the store.
#[async_trait::async_trait]
pub trait Sweep: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run_once(&self, now: DateTime<Utc>) -> anyhow::Result<SweepReport>;
}

/// Runs the sweep on every tick, a failed run is logged and the loop carries on
pub async fn run_periodically(sweep: Arc<dyn Sweep>, interval: Duration) {
    let mut ticks = tokio_interval_stream(interval);
    while ticks.next().await.is_some() {
        match sweep.run_once(Utc::now()).await {
            Ok(report) => tracing::info!(
                sweep = sweep.name(),
                examined = report.examined,
                acted = report.acted,
                failed = report.failed,
                "Sweep finished"
            ),
            Err(err) => tracing::error!(sweep = sweep.name(), "Sweep failed: {:#}", err),
        }
    }
}

pub fn spawn_periodically(sweep: Arc<dyn Sweep>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tracing::info!(sweep = sweep.name(), "Scheduling sweep every {:?}", interval);
    tokio::spawn(run_periodically(sweep, interval))
}
