use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::api::handlers;
use crate::store::traits::Store;

pub fn create_router<S: Store + 'static>() -> Router<Arc<S>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Material selections, addressed by the owning lot
        .route(
            "/lots/:lot_id/material-selection",
            get(handlers::get_current_view::<S>),
        )
        .route(
            "/lots/:lot_id/material-selection/versions",
            get(handlers::list_versions::<S>).post(handlers::submit_version::<S>),
        )
        .route(
            "/material-selection/versions/:version_id",
            get(handlers::get_version_detail::<S>),
        )
}
