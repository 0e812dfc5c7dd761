use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use ulid::Ulid;

/// SMTP relay settings. Present only when host, port, user and password are all set.
#[derive(Clone, PartialEq, Eq)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Implicit TLS when true, opportunistic STARTTLS otherwise.
    pub secure: bool,
    pub from: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("secure", &self.secure)
            .field("from", &self.from)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug)]
pub enum MailError {
    InvalidAddress(String),
    Build(lettre::error::Error),
    Transport(lettre::transport::smtp::Error),
    Timeout,
}

impl std::fmt::Display for MailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MailError::InvalidAddress(addr) => write!(f, "invalid email address: {}", addr),
            MailError::Build(err) => write!(f, "failed to build message: {}", err),
            MailError::Transport(err) => write!(f, "smtp delivery failed: {}", err),
            MailError::Timeout => write!(f, "smtp delivery timed out"),
        }
    }
}

impl std::error::Error for MailError {}

/// Delivery capability: hands one HTML message to a transport and returns
/// the message id the transport accepted it under.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<String, MailError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    timeout: Duration,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self, MailError> {
        let from = parse_mailbox(&config.from)?;

        let builder = if config.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(MailError::Transport)?
        } else {
            let tls = TlsParameters::new(config.host.clone()).map_err(MailError::Transport)?;
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                .tls(Tls::Opportunistic(tls))
        };

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(
                config.user.clone(),
                config.password.clone(),
            ))
            .timeout(Some(config.timeout))
            .build();

        Ok(Self {
            transport,
            from,
            timeout: config.timeout,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<String, MailError> {
        let message_id = new_message_id(&self.from);
        let message = build_message(&self.from, &mail, &message_id)?;

        tokio::time::timeout(self.timeout, self.transport.send(message))
            .await
            .map_err(|_| MailError::Timeout)?
            .map_err(MailError::Transport)?;

        tracing::debug!(message_id = %message_id, "mail accepted by relay");
        Ok(message_id)
    }
}

pub fn parse_mailbox(raw: &str) -> Result<Mailbox, MailError> {
    raw.trim()
        .parse::<Mailbox>()
        .map_err(|_| MailError::InvalidAddress(raw.to_string()))
}

pub fn new_message_id(from: &Mailbox) -> String {
    format!("<{}@{}>", Ulid::new(), from.email.domain())
}

pub fn build_message(
    from: &Mailbox,
    mail: &OutgoingMail,
    message_id: &str,
) -> Result<Message, MailError> {
    let to = parse_mailbox(&mail.to)?;

    Message::builder()
        .from(from.clone())
        .to(to)
        .subject(mail.subject.as_str())
        .message_id(Some(message_id.to_string()))
        .header(ContentType::TEXT_HTML)
        .body(mail.html.clone())
        .map_err(MailError::Build)
}
