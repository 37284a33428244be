use axum::{
    middleware,
    routing::get,
    Router,
};

use crate::{handlers::dashboard, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/stats", get(dashboard::get_stats))
        .route("/report", get(dashboard::get_report))
        .route_layer(middleware::from_fn(crate::middleware::auth::require_admin))
        .route_layer(middleware::from_fn(crate::middleware::auth::auth_middleware))
}
