pub use log_mailer::LogMailer;
#[cfg(test)]
pub use recording_mailer::RecordingMailer;
pub use smtp_mailer::SmtpMailer;

mod log_mailer;
#[cfg(test)]
mod recording_mailer;
mod smtp_mailer;
pub mod templates;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

#[derive(thiserror::Error, Debug)]
pub enum MailerError {
    #[error("Invalid address {0}")]
    InvalidAddress(String),

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Failed to deliver message: {0}")]
    Transport(String),
}

/// Outbound email delivery
#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), MailerError>;
}
