use std::sync::Arc;

use actix_web::web::Data;
use actix_web::{Error, HttpResponse};
use chrono::Utc;
use paperclip::actix::{api_v2_operation, web};

use crate::api::{NewAdminRequest, NewAdminResponse, UsersResponse};
use crate::auth_engine::AuthEngine;
use crate::capability::{require_capability, Capability};
use crate::error::ApiError;
use crate::library_repository::LibraryRepository;
use crate::session::AuthenticatedUser;

#[api_v2_operation]
pub async fn get_all_users(
    user: AuthenticatedUser,
    repository: Data<Arc<dyn LibraryRepository>>,
) -> Result<HttpResponse, Error> {
    require_capability(user.0.role, Capability::ManageUsers)?;
    let users = repository
        .list_verified_accounts()
        .await
        .map_err(ApiError::from)?
        .iter()
        .map(|account| account.profile())
        .collect();
    Ok(HttpResponse::Ok().json(UsersResponse {
        success: true,
        users,
    }))
}

#[api_v2_operation]
pub async fn add_new_admin(
    user: AuthenticatedUser,
    auth_engine: Data<AuthEngine>,
    request: web::Json<NewAdminRequest>,
) -> Result<HttpResponse, Error> {
    let admin = auth_engine
        .register_admin(&user.0, request.into_inner(), Utc::now())
        .await?;
    Ok(HttpResponse::Created().json(NewAdminResponse {
        success: true,
        message: "Admin registered successfully".to_string(),
        admin: admin.profile(),
    }))
}
