use crate::mailer::Email;

pub const VERIFICATION_CODE_SUBJECT: &str = "Library Management System - Verification Code";
pub const PASSWORD_RESET_SUBJECT: &str = "Library Management System - Password Reset";
pub const RETURN_REMINDER_SUBJECT: &str = "Book Return Reminder";

const FOOTER: &str = r#"
        <footer style="margin-top: 20px; text-align: center; font-size: 14px; color: #666;">
            <p>Thank you,<br><strong>Library Team</strong></p>
            <p style="font-size: 12px; color: #444;">This is an automated message. Please do not reply to this email.</p>
        </footer>"#;

pub fn verification_code_email(to: &str, code: u32) -> Email {
    let html_body = format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px; border: 1px solid #ddd;">
        <h2 style="color: #fff; background-color: #4CAF50; padding: 10px; text-align: center;">Verify Your Email Address</h2>
        <p style="font-size: 16px; color: #333;">Dear User,</p>
        <p style="font-size: 16px; color: #333;">To complete your registration, please use the following verification code:</p>
        <div style="text-align: center; margin: 20px 0;">
            <span style="display: inline-block; font-size: 24px; font-weight: bold; padding: 10px 20px; border: 2px dashed #4CAF50;">{code}</span>
        </div>
        <p style="font-size: 16px; color: #555;">This code is valid for <strong>10 minutes</strong>. Please do not share this code with anyone.</p>
        <p style="font-size: 16px; color: #555;">If you did not request this email, please ignore it.</p>{FOOTER}
    </div>"#
    );
    Email {
        to: to.to_string(),
        subject: VERIFICATION_CODE_SUBJECT.to_string(),
        html_body,
    }
}

pub fn password_reset_email(to: &str, reset_url: &str) -> Email {
    let html_body = format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px; border: 1px solid #ddd; border-radius: 8px;">
        <h2 style="text-align: center;">Reset Your Password</h2>
        <p style="font-size: 16px;">Dear User,</p>
        <p style="font-size: 16px;">You requested to reset your password. Please click the button below to proceed:</p>
        <div style="text-align: center; margin: 20px 0;">
            <a href="{reset_url}" style="display: inline-block; font-size: 16px; font-weight: bold; text-decoration: none; padding: 12px 20px; border: 1px solid #000; border-radius: 5px;">Reset Password</a>
        </div>
        <p style="font-size: 16px;">If you did not request this, please ignore this email. The link will expire in 15 minutes.</p>
        <p style="font-size: 16px;">If the button above does not work, copy and paste the following URL into your browser:</p>
        <p style="font-size: 16px; word-wrap: break-word;">{reset_url}</p>{FOOTER}
    </div>"#
    );
    Email {
        to: to.to_string(),
        subject: PASSWORD_RESET_SUBJECT.to_string(),
        html_body,
    }
}

/// Escapes text placed into an HTML body or attribute
fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            c => escaped.push(c),
        }
    }
    escaped
}

pub fn return_reminder_email(to: &str, borrower_name: &str) -> Email {
    // set by the user at registration
    let borrower_name = escape_html(borrower_name);
    let html_body = format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
        <p style="font-size: 16px;">Hello {borrower_name},</p>
        <p style="font-size: 16px;">This is a reminder that the book you borrowed is past its due date. Please return it as soon as possible, a fine accrues for every started hour.</p>{FOOTER}
    </div>"#
    );
    Email {
        to: to.to_string(),
        subject: RETURN_REMINDER_SUBJECT.to_string(),
        html_body,
    }
}

#[cfg(test)]
mod templates_tests {
    use super::*;

    #[test]
    fn test_templates_embed_their_payload() {
        let email = verification_code_email("a@b.c", 54321);
        assert_eq!(email.subject, VERIFICATION_CODE_SUBJECT);
        assert!(email.html_body.contains("54321"));

        let email = password_reset_email("a@b.c", "http://front/password/reset/abc");
        assert_eq!(email.to, "a@b.c");
        assert!(email.html_body.contains("http://front/password/reset/abc"));

        let email = return_reminder_email("a@b.c", "Ada");
        assert_eq!(email.subject, RETURN_REMINDER_SUBJECT);
        assert!(email.html_body.contains("Hello Ada"));
    }

    #[test]
    fn test_reminder_escapes_markup_in_the_borrower_name() {
        let email = return_reminder_email("a@b.c", r#"<a href="http://evil">click</a> & 'co'"#);
        assert!(!email.html_body.contains("<a href"));
        assert!(email.html_body.contains(
            "Hello &lt;a href=&quot;http://evil&quot;&gt;click&lt;/a&gt; &amp; &#x27;co&#x27;,"
        ));
    }
}
