use crate::mailer::{Email, Mailer, MailerError};

/// Stand-in used when SMTP is disabled, only writes the email to the log
#[derive(Default)]
pub struct LogMailer;

#[async_trait::async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<(), MailerError> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            body = %email.html_body,
            "SMTP disabled, email not sent"
        );
        Ok(())
    }
}
