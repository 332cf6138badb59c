use anyhow::Context;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::mailer::{Email, Mailer, MailerError};
use crate::settings::SmtpSettings;

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(settings: &SmtpSettings) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
            .context("Failed to setup SMTP relay")?
            .port(settings.port)
            .credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ))
            .build();
        let from = settings
            .from
            .parse()
            .context("Invalid sender address")?;
        tracing::info!("SMTP relay: {}:{}", settings.host, settings.port);

        Ok(Self { transport, from })
    }
}

#[async_trait::async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: Email) -> Result<(), MailerError> {
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|_| MailerError::InvalidAddress(email.to.clone()))?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject)
            .header(ContentType::TEXT_HTML)
            .body(email.html_body)
            .map_err(|err| MailerError::Build(err.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|err| MailerError::Transport(err.to_string()))?;
        tracing::info!(to = %email.to, "Email sent");
        Ok(())
    }
}
