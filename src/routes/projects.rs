use axum::{
    middleware,
    routing::get,
    Router,
};

use crate::{handlers::projects, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(projects::get_projects).post(projects::create_project))
        .route(
            "/:id",
            get(projects::get_project_by_id)
                .put(projects::update_project)
                .delete(projects::delete_project),
        )
        .route_layer(middleware::from_fn(crate::middleware::auth::auth_middleware))
}
