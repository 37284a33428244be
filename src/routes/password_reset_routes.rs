use axum::{
    routing::post,
    Router,
};

use crate::{
    handlers::password_reset,
    state::AppState,
};

pub fn password_reset_routes() -> Router<AppState> {
    Router::new()
        // Request a reset code by email
        .route("/auth/forgot-password", post(password_reset::forgot_password))

        // Exchange the 6-digit code for a reset token
        .route("/auth/verify-reset-code", post(password_reset::verify_reset_code))

        // Change the password with the verified token
        .route("/auth/reset-password-with-token", post(password_reset::reset_password_with_token))
}
