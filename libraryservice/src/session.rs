use std::sync::Arc;

use actix_web::cookie::{time, Cookie, SameSite};
use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::web::Data;
use actix_web::{FromRequest, HttpRequest};
use chrono::{DateTime, Duration, Utc};
use futures_util::future::LocalBoxFuture;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use paperclip::actix::OperationModifier;
use paperclip::v2::schema::Apiv2Schema;
use serde::{Deserialize, Serialize};

use crate::api::UserId;
use crate::error::ApiError;
use crate::library_repository::{Account, AccountsRepositoryError, LibraryRepository};
use crate::settings::SessionSettings;

pub const SESSION_COOKIE: &str = "token";

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("Failed to sign session token: {0}")]
    Signing(jsonwebtoken::errors::Error),

    #[error("Invalid session token: {0}")]
    Invalid(jsonwebtoken::errors::Error),
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Signing(_) => ApiError::Internal(err.to_string()),
            SessionError::Invalid(_) => {
                ApiError::Unauthenticated("Invalid or expired token".to_string())
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    id: UserId,
    iat: i64,
    exp: i64,
}

/// Issues and checks the signed session tokens
pub struct SessionTokens {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_ttl: Duration,
    cookie_ttl: Duration,
    secure_cookie: bool,
}

impl SessionTokens {
    pub fn new(settings: &SessionSettings) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(settings.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.jwt_secret.as_bytes()),
            token_ttl: Duration::hours(settings.jwt_expire_hours),
            cookie_ttl: Duration::days(settings.cookie_expire_days),
            secure_cookie: settings.secure_cookie,
        }
    }

    pub fn issue(&self, user_id: UserId, now: DateTime<Utc>) -> Result<String, SessionError> {
        let claims = SessionClaims {
            id: user_id,
            iat: now.timestamp(),
            exp: (now + self.token_ttl).timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(SessionError::Signing)
    }

    /// Checks signature and expiry, returns the user the token was issued for
    pub fn verify(&self, token: &str) -> Result<UserId, SessionError> {
        jsonwebtoken::decode::<SessionClaims>(
            token,
            &self.decoding_key,
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims.id)
        .map_err(SessionError::Invalid)
    }

    pub fn cookie(&self, token: &str) -> Cookie<'static> {
        Cookie::build(SESSION_COOKIE, token.to_string())
            .path("/")
            .http_only(true)
            .same_site(SameSite::Strict)
            .secure(self.secure_cookie)
            .max_age(time::Duration::seconds(self.cookie_ttl.num_seconds()))
            .finish()
    }

    pub fn expired_cookie(&self) -> Cookie<'static> {
        let mut cookie = Cookie::build(SESSION_COOKIE, "")
            .path("/")
            .http_only(true)
            .same_site(SameSite::Strict)
            .secure(self.secure_cookie)
            .finish();
        cookie.make_removal();
        cookie
    }
}

/// Token from the session cookie, or from an `Authorization: Bearer` header
fn session_token(req: &HttpRequest) -> Option<String> {
    if let Some(cookie) = req.cookie(SESSION_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Account behind a valid session, resolved on every request
pub struct AuthenticatedUser(pub Account);

impl FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let token = session_token(req);
        let sessions = req.app_data::<Data<SessionTokens>>().cloned();
        let repository = req
            .app_data::<Data<Arc<dyn LibraryRepository>>>()
            .cloned();

        Box::pin(async move {
            let (Some(sessions), Some(repository)) = (sessions, repository) else {
                return Err(ApiError::Internal("Session handling is not configured".to_string()).into());
            };
            let token = token
                .ok_or_else(|| ApiError::Unauthenticated("User is not authenticated".to_string()))?;
            let user_id = sessions.verify(&token).map_err(ApiError::from)?;

            match repository.get_account(user_id).await {
                Ok(account) => Ok(AuthenticatedUser(account)),
                Err(AccountsRepositoryError::NotFound(_)) => {
                    Err(ApiError::NotFound("User does not exist".to_string()).into())
                }
                Err(err) => Err(ApiError::from(err).into()),
            }
        })
    }
}

impl Apiv2Schema for AuthenticatedUser {}

impl OperationModifier for AuthenticatedUser {}
