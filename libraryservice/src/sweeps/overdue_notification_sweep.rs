use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::api::BorrowRecord;
use crate::library_repository::LibraryRepository;
use crate::mailer::templates::return_reminder_email;
use crate::mailer::Mailer;
use crate::sweeps::{Sweep, SweepReport};

/// Loans are reminded about once they are this far past their due date
pub const REMINDER_GRACE: Duration = Duration::hours(24);

/// Emails borrowers of overdue books once per loan
pub struct OverdueNotificationSweep {
    repository: Arc<dyn LibraryRepository>,
    mailer: Arc<dyn Mailer>,
}

impl OverdueNotificationSweep {
    pub fn new(repository: Arc<dyn LibraryRepository>, mailer: Arc<dyn Mailer>) -> Self {
        Self { repository, mailer }
    }

    /// At least once: a failed `mark_notified` after a sent email resends it on the next tick
    async fn notify(&self, record: &BorrowRecord) -> anyhow::Result<bool> {
        self.mailer
            .send(return_reminder_email(&record.user.email, &record.user.name))
            .await?;
        Ok(self.repository.mark_notified(record.id).await?)
    }
}

#[async_trait::async_trait]
impl Sweep for OverdueNotificationSweep {
    fn name(&self) -> &'static str {
        "overdue_notifications"
    }

    async fn run_once(&self, now: DateTime<Utc>) -> anyhow::Result<SweepReport> {
        let overdue = self
            .repository
            .list_overdue_unnotified(now - REMINDER_GRACE)
            .await?;

        let mut report = SweepReport {
            examined: overdue.len() as u64,
            ..SweepReport::default()
        };
        for record in &overdue {
            match self.notify(record).await {
                Ok(true) => report.acted += 1,
                Ok(false) => {
                    tracing::info!(borrow_id = record.id, "Reminder already recorded by another run")
                }
                Err(err) => {
                    report.failed += 1;
                    tracing::error!(
                        borrow_id = record.id,
                        user_id = record.user.id,
                        "Sending return reminder failed: {:#}",
                        err
                    );
                }
            }
        }
        Ok(report)
    }
}
