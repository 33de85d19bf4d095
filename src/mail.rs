//! Outgoing mail.
//!
//! Only password reset codes are mailed. The transport is pluggable: `log`
//! writes through tracing (development), `outbox` drops one `.eml` file per
//! message into a directory that a relay or a human can pick up.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::MailConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl MailMessage {
    /// Header values must stay on one line.
    pub fn check_headers(&self) -> anyhow::Result<()> {
        for (name, value) in [("To", &self.to), ("Subject", &self.subject)] {
            if value.contains(['\r', '\n']) {
                anyhow::bail!("line break in {} header", name);
            }
        }
        Ok(())
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &MailMessage) -> anyhow::Result<()>;
}

pub fn from_config(cfg: &MailConfig) -> anyhow::Result<Arc<dyn Mailer>> {
    let sender = format!("{} <{}>", cfg.sender_name, cfg.sender_address);
    match cfg.transport.as_str() {
        "log" => Ok(Arc::new(LogMailer { sender })),
        "outbox" => Ok(Arc::new(OutboxMailer { sender, dir: cfg.outbox_dir.clone() })),
        other => Err(anyhow::anyhow!("unknown mail transport: {}", other)),
    }
}

pub struct LogMailer {
    sender: String,
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &MailMessage) -> anyhow::Result<()> {
        message.check_headers()?;
        tracing::info!(from = %self.sender, to = %message.to, subject = %message.subject, "mail sent (log transport)");
        tracing::debug!(to = %message.to, body = %message.body, "mail body");
        Ok(())
    }
}

pub struct OutboxMailer {
    sender: String,
    dir: PathBuf,
}

impl OutboxMailer {
    fn render(&self, message: &MailMessage) -> anyhow::Result<String> {
        message.check_headers()?;
        Ok(format!(
            "From: {}\r\nTo: {}\r\nSubject: {}\r\nDate: {}\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{}\r\n",
            self.sender,
            message.to,
            message.subject,
            chrono::Utc::now().to_rfc2822(),
            message.body
        ))
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send(&self, message: &MailMessage) -> anyhow::Result<()> {
        let path = self.dir.join(format!(
            "{}-{}.eml",
            chrono::Utc::now().format("%Y%m%dT%H%M%S"),
            uuid::Uuid::new_v4().simple()
        ));
        let text = self.render(message)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&path, text).await?;
        tracing::info!(to = %message.to, path = %path.display(), "mail written to outbox");
        Ok(())
    }
}

/// Keeps every message in memory; lets tests read the reset code.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryMailer {
    pub sent: tokio::sync::Mutex<Vec<MailMessage>>,
}

#[cfg(test)]
#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, message: &MailMessage) -> anyhow::Result<()> {
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}
