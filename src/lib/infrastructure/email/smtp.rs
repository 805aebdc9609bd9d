//! SMTP transport implementation

use std::{fmt, time::Duration};

use async_trait::async_trait;
use clap::{ArgAction, Parser};
use lettre::{
    address::AddressError,
    message::{Mailbox, MultiPart},
    transport::smtp::{
        self,
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
};
use thiserror::Error;
use tracing::debug;

use crate::domain::{
    broadcast::{errors::TransportError, Message, Transport},
    recipients::RecipientAddress,
};

/// App passwords issued by the common providers are at least this long
const MIN_APP_PASSWORD_LENGTH: usize = 16;

/// SMTP configuration
#[derive(Clone, Parser)]
pub struct SmtpConfig {
    /// The SMTP host
    #[clap(long = "smtp-server", env = "SMTP_SERVER", default_value = "smtp.gmail.com")]
    pub server: String,

    /// The SMTP port
    #[clap(long = "smtp-port", env = "SMTP_PORT", default_value_t = 587)]
    pub port: u16,

    /// The SMTP username, also used as the sender address
    #[clap(
        long = "smtp-username",
        env = "SMTP_USERNAME",
        default_value = "your_email@gmail.com"
    )]
    pub username: String,

    /// The SMTP password
    #[clap(
        long = "smtp-password",
        env = "SMTP_PASSWORD",
        default_value = "your_app_password",
        hide_env_values = true
    )]
    pub password: String,

    /// The display name on the From header
    #[clap(
        long = "smtp-sender-name",
        env = "SMTP_SENDER_NAME",
        default_value = "Broadcast Studio"
    )]
    pub sender_name: String,

    /// Seconds before a single send attempt is abandoned
    #[clap(long = "smtp-timeout", env = "SMTP_TIMEOUT", default_value_t = 30)]
    pub timeout_secs: u64,

    /// Enable STARTTLS (TLS upgrade on connection); otherwise connect over TLS
    #[clap(long = "smtp-starttls", env = "SMTP_STARTTLS", default_value_t = true, action = ArgAction::Set)]
    pub starttls: bool,

    /// Verify the TLS certificate
    #[clap(long = "smtp-verify-tls", env = "SMTP_VERIFY_TLS", default_value_t = true, action = ArgAction::Set)]
    pub verify_tls: bool,
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"********")
            .field("sender_name", &self.sender_name)
            .field("timeout_secs", &self.timeout_secs)
            .field("starttls", &self.starttls)
            .field("verify_tls", &self.verify_tls)
            .finish()
    }
}

/// A credential that still looks like the example value
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CredentialWarning {
    /// The username is a placeholder or not an address
    PlaceholderUsername(String),

    /// The password is a placeholder or too short to be an app password
    PlaceholderPassword,
}

impl fmt::Display for CredentialWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialWarning::PlaceholderUsername(username) => write!(
                f,
                "SMTP_USERNAME appears to be a placeholder: '{username}'. \
                 Update it in your .env file with your actual email address."
            ),
            CredentialWarning::PlaceholderPassword => f.write_str(
                "SMTP_PASSWORD appears to be a placeholder or invalid. Update it in your \
                 .env file with an app password (16 characters). Get one at: \
                 https://myaccount.google.com/apppasswords",
            ),
        }
    }
}

impl SmtpConfig {
    /// The per-attempt timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Check the credentials for leftover example values.
    ///
    /// Returns one warning per suspicious credential; an empty list means they
    /// look real. Nothing is sent to the server.
    pub fn validate_credentials(&self) -> Vec<CredentialWarning> {
        let mut warnings = Vec::new();

        if self.username.to_lowercase().contains("your_email") || !self.username.contains('@') {
            warnings.push(CredentialWarning::PlaceholderUsername(self.username.clone()));
        }

        if self.password.to_lowercase().contains("your_app_password")
            || self.password.chars().count() < MIN_APP_PASSWORD_LENGTH
        {
            warnings.push(CredentialWarning::PlaceholderPassword);
        }

        warnings
    }
}

/// Errors raised while building the SMTP transport
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The username cannot be used as the sender address
    #[error("SMTP_USERNAME is not a valid sender address: {0}")]
    InvalidSender(#[from] AddressError),

    /// The relay or its TLS parameters could not be set up
    #[error("Failed to configure the SMTP relay: {0}")]
    Relay(#[from] smtp::Error),
}

/// Sends each message over its own authenticated SMTP session
#[derive(Clone)]
pub struct SmtpTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
    timeout: Duration,
}

impl fmt::Debug for SmtpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpTransport")
            .field("sender", &self.sender)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SmtpTransport {
    /// Create a new SMTP transport. No connection is opened until the first send.
    pub fn new(config: &SmtpConfig) -> Result<Self, ConfigError> {
        let sender = Mailbox::new(
            Some(config.sender_name.clone()),
            config.username.parse::<Address>()?,
        );

        let creds = Credentials::new(config.username.clone(), config.password.clone());

        let tls_parameters = TlsParameters::builder(config.server.clone())
            .dangerous_accept_invalid_certs(!config.verify_tls)
            .build()?;

        let (relay, tls) = if config.starttls {
            (
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.server)?,
                Tls::Required(tls_parameters),
            )
        } else {
            (
                AsyncSmtpTransport::<Tokio1Executor>::relay(&config.server)?,
                Tls::Wrapper(tls_parameters),
            )
        };

        let mailer = relay
            .credentials(creds)
            .port(config.port)
            .tls(tls)
            .build();

        Ok(Self {
            mailer,
            sender,
            timeout: config.timeout(),
        })
    }

    fn envelope(
        &self,
        message: &Message,
        to: &RecipientAddress,
    ) -> Result<lettre::Message, TransportError> {
        let address = to
            .as_str()
            .parse::<Address>()
            .map_err(|err| TransportError::InvalidRecipient(format!("{to}: {err}")))?;

        lettre::Message::builder()
            .from(self.sender.clone())
            .to(Mailbox::new(None, address))
            .subject(message.subject())
            .multipart(MultiPart::alternative_plain_html(
                message.body_text().to_string(),
                message.body_html().to_string(),
            ))
            .map_err(|err| TransportError::UnknownError(err.into()))
    }

    fn map_error(&self, err: smtp::Error) -> TransportError {
        if err.is_timeout() {
            debug!("smtp::Error -> TransportError::Timeout");
            return TransportError::Timeout(self.timeout);
        }

        if let Some(code) = err.status() {
            debug!("smtp::Error -> TransportError::Rejected");
            return TransportError::Rejected {
                code: u16::from(code),
                message: err.to_string(),
            };
        }

        debug!("smtp::Error -> TransportError::UnknownError");
        TransportError::UnknownError(err.into())
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send_one(&self, message: &Message, to: &RecipientAddress) -> Result<(), TransportError> {
        let email = self.envelope(message, to)?;

        match tokio::time::timeout(self.timeout, self.mailer.send(email)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(self.map_error(err)),
            Err(_) => Err(TransportError::Timeout(self.timeout)),
        }
    }
}
