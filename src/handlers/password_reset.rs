use axum::{extract::State, response::Json};
use validator::Validate;

use crate::dtos::auth_dtos::{
    ForgotPasswordRequest, ForgotPasswordResponse, ResetPasswordRequest, ResetPasswordResponse,
    VerifyResetCodeRequest, VerifyResetCodeResponse,
};
use crate::errors::{AppError, Result};
use crate::state::AppState;

// 1. Forgot Password - request a reset code
//
// Always answers with the same acknowledgment; whether the account exists
// is decided (and kept) server-side.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<Json<ForgotPasswordResponse>> {
    if let Err(errors) = req.validate() {
        return Err(AppError::invalid_data(format!("{}", errors)));
    }

    state.reset_service.request_reset(&req.email).await?;

    Ok(Json(ForgotPasswordResponse {
        success: true,
        message: "If an account exists for that address, a reset code has been emailed".to_string(),
    }))
}

// 2. Verify the 6-digit code, exchange it for a reset token
pub async fn verify_reset_code(
    State(state): State<AppState>,
    Json(req): Json<VerifyResetCodeRequest>,
) -> Result<Json<VerifyResetCodeResponse>> {
    if let Err(errors) = req.validate() {
        return Err(AppError::invalid_data(format!("{}", errors)));
    }

    let reset_token = state
        .reset_service
        .verify_code(&req.email, &req.code)
        .await?;

    Ok(Json(VerifyResetCodeResponse {
        success: true,
        reset_token,
    }))
}

// 3. Reset password with the verified token
pub async fn reset_password_with_token(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<ResetPasswordResponse>> {
    state
        .reset_service
        .reset_password(&req.reset_token, &req.password, &req.confirm_password)
        .await?;

    Ok(Json(ResetPasswordResponse {
        success: true,
        message: "Password reset successful".to_string(),
    }))
}
