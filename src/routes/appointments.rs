use axum::{
    middleware,
    routing::get,
    Router,
};

use crate::{handlers::appointments, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(appointments::get_appointments).post(appointments::create_appointment),
        )
        .route(
            "/:id",
            get(appointments::get_appointment_by_id)
                .put(appointments::update_appointment)
                .delete(appointments::delete_appointment),
        )
        .route_layer(middleware::from_fn(crate::middleware::auth::auth_middleware))
}
