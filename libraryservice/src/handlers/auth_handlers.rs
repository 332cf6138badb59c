use actix_web::web::Data;
use actix_web::{Error, HttpResponse};
use chrono::Utc;
use paperclip::actix::{api_v2_operation, web};

use crate::api::{
    ForgotPasswordRequest, LoginRequest, MessageResponse, ProfileResponse, RegisterRequest,
    ResetPasswordRequest, UpdatePasswordRequest, VerifyOtpRequest,
};
use crate::auth_engine::AuthEngine;
use crate::handlers::session_response;
use crate::session::{AuthenticatedUser, SessionTokens};

#[api_v2_operation]
pub async fn register(
    auth_engine: Data<AuthEngine>,
    request: web::Json<RegisterRequest>,
) -> Result<HttpResponse, Error> {
    auth_engine.register(request.into_inner(), Utc::now()).await?;
    Ok(HttpResponse::Ok().json(MessageResponse::ok("Verification code sent successfully")))
}

#[api_v2_operation]
pub async fn verify_otp(
    auth_engine: Data<AuthEngine>,
    sessions: Data<SessionTokens>,
    request: web::Json<VerifyOtpRequest>,
) -> Result<HttpResponse, Error> {
    let session = auth_engine
        .verify_otp(request.into_inner(), Utc::now())
        .await?;
    Ok(session_response(&sessions, session, "Account verified successfully"))
}

#[api_v2_operation]
pub async fn login(
    auth_engine: Data<AuthEngine>,
    sessions: Data<SessionTokens>,
    request: web::Json<LoginRequest>,
) -> Result<HttpResponse, Error> {
    let session = auth_engine.login(request.into_inner(), Utc::now()).await?;
    Ok(session_response(&sessions, session, "Login successful"))
}

#[api_v2_operation]
pub async fn logout(
    _user: AuthenticatedUser,
    sessions: Data<SessionTokens>,
) -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok()
        .cookie(sessions.expired_cookie())
        .json(MessageResponse::ok("Logged out successfully")))
}

#[api_v2_operation]
pub async fn me(user: AuthenticatedUser) -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok().json(ProfileResponse {
        success: true,
        user: user.0.profile(),
    }))
}

#[api_v2_operation]
pub async fn forgot_password(
    auth_engine: Data<AuthEngine>,
    request: web::Json<ForgotPasswordRequest>,
) -> Result<HttpResponse, Error> {
    let email = auth_engine
        .forgot_password(request.into_inner(), Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(MessageResponse::ok(format!(
        "Email sent to {email} successfully"
    ))))
}

#[api_v2_operation]
pub async fn reset_password(
    auth_engine: Data<AuthEngine>,
    sessions: Data<SessionTokens>,
    token: web::Path<String>,
    request: web::Json<ResetPasswordRequest>,
) -> Result<HttpResponse, Error> {
    let session = auth_engine
        .reset_password(&token.into_inner(), request.into_inner(), Utc::now())
        .await?;
    Ok(session_response(&sessions, session, "Password reset successfully"))
}

#[api_v2_operation]
pub async fn update_password(
    user: AuthenticatedUser,
    auth_engine: Data<AuthEngine>,
    sessions: Data<SessionTokens>,
    request: web::Json<UpdatePasswordRequest>,
) -> Result<HttpResponse, Error> {
    let session = auth_engine
        .update_password(&user.0, request.into_inner(), Utc::now())
        .await?;
    Ok(session_response(&sessions, session, "Password updated successfully"))
}
