use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    let public = Router::new()
        .route("/register", post(crate::handlers::auth::register))
        .route("/login", post(crate::handlers::auth::login));

    let protected = Router::new()
        .route("/me", get(crate::handlers::auth::me))
        .route("/users", get(crate::handlers::auth::get_all_users))
        .route_layer(middleware::from_fn(crate::middleware::auth::auth_middleware));

    public.merge(protected)
}
