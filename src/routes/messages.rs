use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::{handlers::messages, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(messages::get_messages).post(messages::create_message))
        .route("/seen", put(messages::mark_as_seen))
        .route_layer(middleware::from_fn(crate::middleware::auth::auth_middleware))
}

// Public marketing-site contact form
pub fn contact_routes() -> Router<AppState> {
    Router::new().route("/contact", post(messages::submit_contact))
}
