//! Reminder notifications
//!
//! Sending is fire-and-forget for callers: [`send_best_effort`] logs a
//! failure and moves on.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use lettre::message::{header::ContentType, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::{ExposeSecret, SecretString};
use tracing::{error, info};

use crate::config::{secret_from_env, EmailConfig, SMTP_PASSWORD_ENV, SMTP_USERNAME_ENV};
use crate::error::{Result, ServiceError};

/// "No journal entry today" reminder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub date: NaiveDate,
}

impl Reminder {
    pub fn new(date: NaiveDate) -> Self {
        Self { date }
    }

    fn display_date(&self) -> String {
        format!(
            "{}年{}月{}日",
            self.date.year(),
            self.date.month(),
            self.date.day()
        )
    }

    pub fn subject(&self) -> String {
        "⚠️ 今天还没写日记！".to_string()
    }

    pub fn html(&self) -> String {
        format!(
            r#"<div style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
  <h2 style="color: #e74c3c;">📝 嘿，今天的日记还没写哦！</h2>
  <p style="font-size: 16px; color: #333; line-height: 1.6;">今天是 <strong>{}</strong>，我注意到你还没有在 Notion 里写日记。</p>
  <p style="font-size: 16px; color: #333; line-height: 1.6;">记录每一天的想法和经历是一个很棒的习惯！哪怕只是几句话，也是对这一天的珍贵记录。</p>
  <p style="font-size: 16px; color: #333; line-height: 1.6;">✨ 现在就去 Notion 写下今天的故事吧！</p>
  <p style="font-size: 14px; color: #666; margin-top: 30px;">你的自动化助手</p>
</div>"#,
            self.display_date()
        )
    }

    pub fn text(&self) -> String {
        format!(
            "嘿，今天的日记还没写哦！\n\n今天是 {}，我注意到你还没有在 Notion 里写日记。\n现在就去 Notion 写下今天的故事吧！\n\n你的自动化助手\n",
            self.display_date()
        )
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, reminder: &Reminder) -> Result<()>;
}

/// SMTP delivery through lettre
pub struct SmtpNotifier {
    config: EmailConfig,
    username: String,
    password: SecretString,
}

impl SmtpNotifier {
    pub fn new(config: EmailConfig, username: String, password: SecretString) -> Self {
        Self {
            config,
            username,
            password,
        }
    }

    /// Build from `[email]` with credentials from `SMTP_USERNAME`/`SMTP_PASSWORD`
    pub fn from_config(config: &EmailConfig) -> Result<Self> {
        let username = secret_from_env(SMTP_USERNAME_ENV)?.expose_secret().to_string();
        let password = secret_from_env(SMTP_PASSWORD_ENV)?;
        Ok(Self::new(config.clone(), username, password))
    }

    fn message(&self, reminder: &Reminder) -> Result<Message> {
        let from: Mailbox = self
            .config
            .from
            .parse()
            .map_err(|e| ServiceError::Email(format!("invalid from address: {}", e)))?;
        let to: Mailbox = self
            .config
            .to
            .parse()
            .map_err(|e| ServiceError::Email(format!("invalid to address: {}", e)))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(reminder.subject())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(reminder.text()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(reminder.html()),
                    ),
            )
            .map_err(|e| ServiceError::Email(format!("failed to build message: {}", e)).into())
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let creds = Credentials::new(
            self.username.clone(),
            self.password.expose_secret().to_string(),
        );
        // Port 465 speaks TLS from the first byte; anything else upgrades.
        let builder = if self.config.smtp_port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)
        }
        .map_err(|e| ServiceError::Email(format!("failed to create transport: {}", e)))?;

        Ok(builder
            .port(self.config.smtp_port)
            .credentials(creds)
            .build())
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, reminder: &Reminder) -> Result<()> {
        let email = self.message(reminder)?;
        self.transport()?
            .send(email)
            .await
            .map_err(|e| ServiceError::Email(e.to_string()))?;
        info!(to = %self.config.to, date = %reminder.date, "Reminder email sent");
        Ok(())
    }
}

/// Send and log; never returns the failure. Returns whether it went out.
pub async fn send_best_effort(notifier: &dyn Notifier, reminder: &Reminder) -> bool {
    match notifier.send(reminder).await {
        Ok(()) => true,
        Err(e) => {
            error!(error = %e, date = %reminder.date, "Failed to send reminder");
            false
        }
    }
}
