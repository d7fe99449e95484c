use std::sync::Arc;

use crate::analysis::store::AnalysisStore;
use crate::auth::store::IdentityStore;
use crate::config::Config;
use crate::mail::Mailer;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Users, sessions, verification tokens and stats. Postgres in production.
    pub identity: Arc<dyn IdentityStore>,
    /// Sign-in mail delivery. SMTP relay in production.
    pub mailer: Arc<dyn Mailer>,
    pub analyses: Arc<dyn AnalysisStore>,
}
