use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::models::analysis::ObjectId;
use crate::state::AppState;

pub const NOT_FOUND_MESSAGE: &str = "Analysis data not found in database.";

/// GET /api/analysis/:id
///
/// The id comes from the router's percent-decoded path parameter. Malformed
/// ids are rejected before the store is touched.
pub async fn handle_get_analysis(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    info!(id = %raw_id, "Analysis lookup requested");

    let Some(id) = ObjectId::parse(&raw_id) else {
        warn!(id = %raw_id, "Analysis id is not 24 hex characters");
        return Err(AppError::MalformedIdentifier(raw_id));
    };

    let Some(mut document) = state.analyses.find_by_id(&id).await? else {
        warn!(%id, "No analysis document for id");
        return Err(AppError::NotFound(NOT_FOUND_MESSAGE.to_string()));
    };

    if let Value::Object(fields) = &mut document {
        fields
            .entry("_id")
            .or_insert_with(|| Value::String(id.to_string()));
    }

    info!(%id, "Analysis document found");
    Ok(Json(document))
}
