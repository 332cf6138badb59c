use std::collections::HashSet;

use parking_lot::Mutex;

use crate::mailer::{Email, Mailer, MailerError};

/// Keeps every email instead of sending it, can be told to fail for chosen recipients
#[derive(Default)]
pub struct RecordingMailer {
    outbox: Mutex<Vec<Email>>,
    failing_recipients: Mutex<HashSet<String>>,
}

impl RecordingMailer {
    pub fn fail_for(&self, recipient: &str) {
        self.failing_recipients.lock().insert(recipient.to_string());
    }

    pub fn sent(&self) -> Vec<Email> {
        self.outbox.lock().clone()
    }

    pub fn sent_to(&self, recipient: &str) -> Vec<Email> {
        self.outbox
            .lock()
            .iter()
            .filter(|email| email.to == recipient)
            .cloned()
            .collect()
    }
}

#[async_trait::async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: Email) -> Result<(), MailerError> {
        if self.failing_recipients.lock().contains(&email.to) {
            return Err(MailerError::Transport(format!(
                "Mailbox {} unavailable",
                email.to
            )));
        }
        self.outbox.lock().push(email);
        Ok(())
    }
}
