//! First-sign-in provisioning.
//!
//! `on_user_created` is the only listener for the "account created" event and
//! is awaited inline by the sign-in flow, right after the user row is inserted.
//! It is best-effort: a failed stats insert is logged and the new account is
//! kept. `reconcile_missing_stats` runs at startup and repairs such accounts.

use tracing::{error, info, warn};

use crate::auth::store::IdentityStore;
use crate::errors::AppError;
use crate::models::stats::StatsRow;
use crate::models::user::User;

pub async fn on_user_created(store: &dyn IdentityStore, user: &User) {
    let stats = StatsRow::initial(user.id);
    match store.create_stats(&stats).await {
        Ok(true) => info!(
            user_id = %user.id,
            ai_credits = stats.ai_credits,
            "Provisioned stats for new user"
        ),
        Ok(false) => warn!(user_id = %user.id, "Stats already present for new user"),
        Err(e) => error!(
            user_id = %user.id,
            error = %e,
            "Failed to provision stats; account kept, startup reconciliation will retry"
        ),
    }
}

pub async fn reconcile_missing_stats(store: &dyn IdentityStore) -> Result<u64, AppError> {
    let created = store.create_missing_stats().await?;
    if created > 0 {
        warn!(created, "Backfilled stats for users created without them");
    } else {
        info!("Stats reconciliation found nothing to repair");
    }
    Ok(created)
}
