use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::api::{
    ForgotPasswordRequest, LoginRequest, NewAdminRequest, RegisterRequest, ResetPasswordRequest,
    Role, UpdatePasswordRequest, VerifyOtpRequest,
};
use crate::capability::{require_capability, Capability};
use crate::credentials::{
    check_password_length, generate_reset_token, generate_verification_code, hash_password,
    hash_reset_token, normalize_email, verify_password, CHANGE_PASSWORD_LENGTH,
    REGISTER_PASSWORD_LENGTH, RESET_TOKEN_TTL, VERIFICATION_CODE_TTL,
};
use crate::error::ApiError;
use crate::library_repository::{
    Account, LibraryRepository, NewAccount, PasswordReset, VerificationCode,
};
use crate::mailer::templates::{password_reset_email, verification_code_email};
use crate::mailer::Mailer;
use crate::session::SessionTokens;
use crate::settings::BootstrapAdminSettings;

/// Unverified registrations allowed per email before further attempts are refused
pub const MAX_REGISTRATION_ATTEMPTS: usize = 5;

const INVALID_RESET_TOKEN: &str = "Reset password token is invalid or has expired";

/// Freshly opened session, the token goes to the cookie and the response body
pub struct Session {
    pub token: String,
    pub account: Account,
}

/// Registration, verification, login and password lifecycle
pub struct AuthEngine {
    repository: Arc<dyn LibraryRepository>,
    mailer: Arc<dyn Mailer>,
    sessions: Arc<SessionTokens>,
    frontend_url: String,
}

fn require_fields<S: AsRef<str>>(fields: &[S], message: &str) -> Result<(), ApiError> {
    if fields.iter().any(|field| field.as_ref().trim().is_empty()) {
        return Err(ApiError::InvalidInput(message.to_string()));
    }
    Ok(())
}

impl AuthEngine {
    pub fn new(
        repository: Arc<dyn LibraryRepository>,
        mailer: Arc<dyn Mailer>,
        sessions: Arc<SessionTokens>,
        frontend_url: &str,
    ) -> Self {
        Self {
            repository,
            mailer,
            sessions,
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
        }
    }

    /// Creates an unverified account and emails its verification code
    pub async fn register(
        &self,
        request: RegisterRequest,
        now: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        require_fields(
            &[&request.name, &request.email, &request.password],
            "Please enter all fields",
        )?;
        let email = normalize_email(&request.email);

        if self.repository.find_verified_account(&email).await?.is_some() {
            return Err(ApiError::Conflict("User already registered".to_string()));
        }
        let attempts = self.repository.list_unverified_accounts(&email).await?;
        if attempts.len() >= MAX_REGISTRATION_ATTEMPTS {
            return Err(ApiError::RateLimited(
                "You have exceeded the maximum number of registration attempts. Please try again later."
                    .to_string(),
            ));
        }
        check_password_length(&request.password, REGISTER_PASSWORD_LENGTH)?;

        let code = generate_verification_code();
        let user_id = self
            .repository
            .create_account(NewAccount {
                name: request.name.trim().to_string(),
                email: email.clone(),
                password_hash: hash_password(&request.password).await?,
                role: Role::User,
                account_verified: false,
                verification: Some(VerificationCode {
                    code,
                    expires_at: now + VERIFICATION_CODE_TTL,
                }),
                created_at: now,
            })
            .await?;
        tracing::info!(user_id, attempt = attempts.len() + 1, "Registration started");

        // The unverified row stays on failure, the expiry sweep removes it
        if let Err(err) = self.mailer.send(verification_code_email(&email, code)).await {
            tracing::error!(user_id, "Sending verification code failed: {}", err);
            return Err(ApiError::DeliveryFailed(
                "Failed to send verification code".to_string(),
            ));
        }
        Ok(())
    }

    /// Verifies the newest registration attempt for the email and drops the older ones
    pub async fn verify_otp(
        &self,
        request: VerifyOtpRequest,
        now: DateTime<Utc>,
    ) -> Result<Session, ApiError> {
        require_fields(&[&request.email, &request.otp], "Please enter all fields")?;
        let email = normalize_email(&request.email);

        let attempts = self.repository.list_unverified_accounts(&email).await?;
        let newest = attempts.into_iter().next().ok_or_else(|| {
            ApiError::NotFound("User not found or already verified".to_string())
        })?;
        let removed = self
            .repository
            .delete_unverified_except(&email, newest.id)
            .await?;
        if removed > 0 {
            tracing::info!(user_id = newest.id, removed, "Collapsed registration attempts");
        }

        let otp: Option<u32> = request.otp.trim().parse().ok();
        let verification = match (&newest.verification, otp) {
            (Some(verification), Some(otp)) if verification.code == otp => verification,
            _ => return Err(ApiError::InvalidInput("Invalid OTP".to_string())),
        };
        if now > verification.expires_at {
            return Err(ApiError::Expired("OTP has expired".to_string()));
        }

        if !self.repository.mark_verified(newest.id).await? {
            return Err(ApiError::NotFound(
                "User not found or already verified".to_string(),
            ));
        }
        tracing::info!(user_id = newest.id, "Account verified");

        let account = self.repository.get_account(newest.id).await?;
        self.open_session(account, now)
    }

    pub async fn login(
        &self,
        request: LoginRequest,
        now: DateTime<Utc>,
    ) -> Result<Session, ApiError> {
        require_fields(&[&request.email, &request.password], "Please enter all fields")?;
        let email = normalize_email(&request.email);

        let account = self
            .repository
            .find_verified_account(&email)
            .await?
            .ok_or(ApiError::InvalidCredentials)?;
        if !verify_password(&request.password, &account.password_hash).await? {
            return Err(ApiError::InvalidCredentials);
        }
        self.open_session(account, now)
    }

    /// Stores the hash of a new reset token and emails the reset link.
    /// Returns the email the link went to.
    pub async fn forgot_password(
        &self,
        request: ForgotPasswordRequest,
        now: DateTime<Utc>,
    ) -> Result<String, ApiError> {
        require_fields(&[&request.email], "Email is required")?;
        let email = normalize_email(&request.email);

        let account = self
            .repository
            .find_verified_account(&email)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

        let token = generate_reset_token();
        self.repository
            .set_password_reset(
                account.id,
                Some(PasswordReset {
                    token_hash: hash_reset_token(&token),
                    expires_at: now + RESET_TOKEN_TTL,
                }),
            )
            .await?;

        let reset_url = format!("{}/password/reset/{}", self.frontend_url, token);
        if let Err(err) = self
            .mailer
            .send(password_reset_email(&account.email, &reset_url))
            .await
        {
            tracing::error!(user_id = account.id, "Sending reset link failed: {}", err);
            if let Err(err) = self.repository.set_password_reset(account.id, None).await {
                tracing::error!(user_id = account.id, "Dropping reset token failed: {}", err);
            }
            return Err(ApiError::DeliveryFailed(
                "Failed to send password reset email".to_string(),
            ));
        }
        Ok(account.email)
    }

    pub async fn reset_password(
        &self,
        token: &str,
        request: ResetPasswordRequest,
        now: DateTime<Utc>,
    ) -> Result<Session, ApiError> {
        let token_hash = hash_reset_token(token);
        let account = self
            .repository
            .find_by_reset_token(&token_hash)
            .await?
            .ok_or_else(|| ApiError::InvalidInput(INVALID_RESET_TOKEN.to_string()))?;
        match &account.password_reset {
            Some(reset) if reset.expires_at > now => {}
            _ => return Err(ApiError::Expired(INVALID_RESET_TOKEN.to_string())),
        }

        if request.password != request.confirm_password {
            return Err(ApiError::InvalidInput("Passwords do not match".to_string()));
        }
        check_password_length(&request.password, CHANGE_PASSWORD_LENGTH)?;

        let consumed = self
            .repository
            .reset_password(account.id, &token_hash, hash_password(&request.password).await?)
            .await?;
        if !consumed {
            return Err(ApiError::InvalidInput(INVALID_RESET_TOKEN.to_string()));
        }
        tracing::info!(user_id = account.id, "Password reset");

        let account = self.repository.get_account(account.id).await?;
        self.open_session(account, now)
    }

    pub async fn update_password(
        &self,
        account: &Account,
        request: UpdatePasswordRequest,
        now: DateTime<Utc>,
    ) -> Result<Session, ApiError> {
        require_fields(
            &[
                &request.current_password,
                &request.new_password,
                &request.confirm_new_password,
            ],
            "Please enter all fields",
        )?;
        if !verify_password(&request.current_password, &account.password_hash).await? {
            return Err(ApiError::InvalidInput(
                "Current password is incorrect".to_string(),
            ));
        }
        check_password_length(&request.new_password, CHANGE_PASSWORD_LENGTH)?;
        if request.new_password != request.confirm_new_password {
            return Err(ApiError::InvalidInput(
                "New password and confirm password do not match".to_string(),
            ));
        }

        self.repository
            .update_password(account.id, hash_password(&request.new_password).await?)
            .await?;
        tracing::info!(user_id = account.id, "Password updated");

        let account = self.repository.get_account(account.id).await?;
        self.open_session(account, now)
    }

    /// Creates a verified admin account on behalf of an admin
    pub async fn register_admin(
        &self,
        actor: &Account,
        request: NewAdminRequest,
        now: DateTime<Utc>,
    ) -> Result<Account, ApiError> {
        require_capability(actor.role, Capability::ManageUsers)?;
        require_fields(
            &[&request.name, &request.email, &request.password],
            "Please fill all fields",
        )?;
        let email = normalize_email(&request.email);

        if self.repository.find_verified_account(&email).await?.is_some() {
            return Err(ApiError::Conflict("User already registered".to_string()));
        }
        check_password_length(&request.password, CHANGE_PASSWORD_LENGTH)?;

        let admin = self
            .create_admin(request.name.trim(), &email, &request.password, now)
            .await?;
        tracing::info!(user_id = admin.id, created_by = actor.id, "Admin registered");
        Ok(admin)
    }

    /// Creates the configured admin unless a verified account already uses its email.
    /// Returns true if the account was created.
    pub async fn ensure_bootstrap_admin(
        &self,
        admin: &BootstrapAdminSettings,
        now: DateTime<Utc>,
    ) -> Result<bool, ApiError> {
        require_fields(
            &[&admin.name, &admin.email, &admin.password],
            "Bootstrap admin needs name, email and password",
        )?;
        let email = normalize_email(&admin.email);
        if self.repository.find_verified_account(&email).await?.is_some() {
            return Ok(false);
        }

        let admin = self
            .create_admin(admin.name.trim(), &email, &admin.password, now)
            .await?;
        tracing::info!(user_id = admin.id, "Bootstrap admin created");
        Ok(true)
    }

    async fn create_admin(
        &self,
        name: &str,
        email: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<Account, ApiError> {
        let user_id = self
            .repository
            .create_account(NewAccount {
                name: name.to_string(),
                email: email.to_string(),
                password_hash: hash_password(password).await?,
                role: Role::Admin,
                account_verified: true,
                verification: None,
                created_at: now,
            })
            .await?;
        Ok(self.repository.get_account(user_id).await?)
    }

    fn open_session(&self, account: Account, now: DateTime<Utc>) -> Result<Session, ApiError> {
        let token = self.sessions.issue(account.id, now)?;
        Ok(Session { token, account })
    }
}
