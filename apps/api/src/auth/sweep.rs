//! Periodic removal of expired verification tokens and sessions.
//!
//! Tokens from links nobody clicks, or whose delivery failed, and sessions
//! that are never read again would otherwise stay in the tables forever.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::store::IdentityStore;
use crate::errors::AppError;

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    pub tokens: u64,
    pub sessions: u64,
}

pub async fn sweep_expired(
    store: &dyn IdentityStore,
    now: DateTime<Utc>,
) -> Result<SweepReport, AppError> {
    let report = SweepReport {
        tokens: store.delete_expired_tokens(now).await?,
        sessions: store.delete_expired_sessions(now).await?,
    };
    if report == SweepReport::default() {
        debug!("Expiry sweep found nothing to delete");
    } else {
        info!(
            tokens = report.tokens,
            sessions = report.sessions,
            "Deleted expired sign-in tokens and sessions"
        );
    }
    Ok(report)
}

/// Runs `sweep_expired` immediately and then once per `period` until the
/// returned handle is aborted. Failures are logged and retried next period.
pub fn spawn_expiry_sweeper(store: Arc<dyn IdentityStore>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            if let Err(e) = sweep_expired(store.as_ref(), Utc::now()).await {
                warn!(error = %e, "Expiry sweep failed");
            }
        }
    })
}
