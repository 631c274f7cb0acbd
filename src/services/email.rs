use lettre::{
    Message, SmtpTransport, Transport,
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
};
use log::{info, error, warn};

use crate::config::Config;

pub struct EmailService;

/// Escapes user-supplied text for interpolation into an HTML body.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

impl EmailService {
    /// Sends in the background; failures are logged and never surface to the caller.
    fn dispatch(to: String, subject: String, body: String) {
        tokio::task::spawn_blocking(move || match Self::try_send(&to, &subject, body) {
            Ok(_) => info!("Email '{}' sent to {}", subject, to),
            Err(e) => error!("Failed to send email '{}' to {}: {}", subject, to, e),
        });
    }

    fn try_send(to: &str, subject: &str, body: String) -> Result<(), Box<dyn std::error::Error>> {
        let mail_user = Config::mail_user();
        let mail_password = Config::mail_password();

        if mail_user.is_empty() || mail_password.is_empty() {
            warn!("Email credentials not configured. Skipping email send.");
            return Err("Email not configured".into());
        }

        let from_mailbox: Mailbox = Config::mail_from().parse()?;
        let to_mailbox: Mailbox = to.parse()?;

        let email_message = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(body)?;

        let creds = Credentials::new(mail_user, mail_password);
        let mailer = SmtpTransport::relay(&Config::mail_host())?
            .credentials(creds)
            .build();

        mailer.send(&email_message)?;
        Ok(())
    }

    fn layout(heading: &str, content: &str) -> String {
        format!(
            r#"
            <!DOCTYPE html>
            <html>
            <body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
                <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
                    <h2>{}</h2>
                    {}
                    <p><a href="{}">Open AspireBridge</a></p>
                    <p>Best regards,<br><strong>AspireBridge Team</strong></p>
                </div>
            </body>
            </html>
            "#,
            heading,
            content,
            Config::frontend_url()
        )
    }

    pub fn send_welcome(email: &str, name: &str, is_achiever: bool) {
        let next_step = if is_achiever {
            "<p>Your mentor profile is under review. We will email you once an admin approves it.</p>"
        } else {
            "<p>Browse achievers in your exam category and book your first session.</p>"
        };
        let body = Self::layout(&format!("Welcome, {}!", escape_html(name)), next_step);
        Self::dispatch(email.to_string(), "Welcome to AspireBridge".to_string(), body);
    }

    pub fn send_approval_decision(email: &str, name: &str, approved: bool, reason: Option<&str>) {
        let content = if approved {
            "<p>Your achiever profile has been approved. Set your availability to start receiving bookings.</p>".to_string()
        } else {
            format!(
                "<p>Your achiever profile was not approved.</p><p>Reason: {}</p>",
                escape_html(reason.unwrap_or("not specified"))
            )
        };
        let body = Self::layout(&format!("Hi {}", escape_html(name)), &content);
        Self::dispatch(email.to_string(), "Your AspireBridge profile review".to_string(), body);
    }

    pub fn send_booking_requested(email: &str, aspirant_name: &str, date: &str, start_time: &str) {
        let body = Self::layout(
            "New session request",
            &format!(
                "<p><strong>{}</strong> requested a session on {} at {}.</p><p>Please confirm or decline it from your dashboard.</p>",
                escape_html(aspirant_name),
                escape_html(date),
                escape_html(start_time)
            ),
        );
        Self::dispatch(email.to_string(), "New booking request".to_string(), body);
    }

    pub fn send_booking_update(email: &str, date: &str, start_time: &str, status: &str) {
        let body = Self::layout(
            "Booking update",
            &format!(
                "<p>Your session on {} at {} is now <strong>{}</strong>.</p>",
                escape_html(date),
                escape_html(start_time),
                status
            ),
        );
        Self::dispatch(email.to_string(), format!("Booking {}", status), body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markup_in_user_text_is_escaped() {
        assert_eq!(
            escape_html("<script>alert('x')</script> & \"co\""),
            "&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt; &amp; &quot;co&quot;"
        );
        assert_eq!(escape_html("Asha Kumari"), "Asha Kumari");
    }
}
