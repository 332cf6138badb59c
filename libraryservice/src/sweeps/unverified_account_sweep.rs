use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::library_repository::LibraryRepository;
use crate::sweeps::{Sweep, SweepReport};

/// How long an unverified registration is kept
pub const UNVERIFIED_RETENTION: Duration = Duration::minutes(30);

/// Deletes registrations that were not verified in time
pub struct UnverifiedAccountSweep {
    repository: Arc<dyn LibraryRepository>,
}

impl UnverifiedAccountSweep {
    pub fn new(repository: Arc<dyn LibraryRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait::async_trait]
impl Sweep for UnverifiedAccountSweep {
    fn name(&self) -> &'static str {
        "unverified_accounts"
    }

    async fn run_once(&self, now: DateTime<Utc>) -> anyhow::Result<SweepReport> {
        let deleted = self
            .repository
            .delete_unverified_created_before(now - UNVERIFIED_RETENTION)
            .await?;
        if deleted > 0 {
            tracing::info!("Deleted {} unverified accounts", deleted);
        }
        Ok(SweepReport {
            examined: deleted,
            acted: deleted,
            failed: 0,
        })
    }
}

#[cfg(test)]
mod tests_unverified_account_sweep {
    use chrono::TimeZone;

    use crate::api::Role;
    use crate::library_repository::{
        AccountsRepository, InMemoryLibraryRepository, NewAccount,
    };

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 10, 8, 0, 0).unwrap()
    }

    fn attempt(email: &str, created_at: DateTime<Utc>, verified: bool) -> NewAccount {
        NewAccount {
            name: "Reader".to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            role: Role::User,
            account_verified: verified,
            verification: None,
            created_at,
        }
    }

    #[tokio::test]
    async fn test_only_stale_unverified_accounts_are_deleted() {
        let repository = Arc::new(InMemoryLibraryRepository::default());
        let stale = repository
            .create_account(attempt("old@example.com", now() - Duration::minutes(31), false))
            .await
            .unwrap();
        let fresh = repository
            .create_account(attempt("new@example.com", now() - Duration::minutes(29), false))
            .await
            .unwrap();
        let verified = repository
            .create_account(attempt("kept@example.com", now() - Duration::days(30), true))
            .await
            .unwrap();

        let sweep = UnverifiedAccountSweep::new(repository.clone());
        let report = sweep.run_once(now()).await.unwrap();
        assert_eq!(report.acted, 1);

        assert!(repository.get_account(stale).await.is_err());
        assert!(repository.get_account(fresh).await.is_ok());
        assert!(repository.get_account(verified).await.is_ok());

        assert_eq!(sweep.run_once(now()).await.unwrap(), SweepReport::default());
    }
}
