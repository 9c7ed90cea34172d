use std::fmt;

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
    message::Mailbox,
    transport::smtp::{
        authentication::{Credentials, Mechanism},
        extension::ClientId,
    },
};
use secrecy::{ExposeSecret, SecretString};

use super::{DeliveryError, MailTransport, OutgoingEmail};
use crate::configuration::SmtpSettings;

const IMPLICIT_TLS_PORT: u16 = 465;

#[derive(Debug)]
pub struct SmtpAccountConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub use_ssl: bool,
}

impl SmtpAccountConfig {
    pub fn uses_implicit_tls(&self) -> bool {
        self.use_ssl || self.port == IMPLICIT_TLS_PORT
    }
}

pub struct SmtpClient {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
}

impl SmtpClient {
    pub fn new(
        config: &SmtpAccountConfig,
        sender: Mailbox,
        settings: &SmtpSettings,
    ) -> Result<Self, DeliveryError> {
        // App passwords are often pasted with spaces between groups.
        let password: String = config
            .password
            .expose_secret()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let credentials = Credentials::new(config.username.clone(), password);

        let builder = if config.uses_implicit_tls() {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
        };
        let hello_name = settings
            .hello_name
            .clone()
            .map(ClientId::Domain)
            .unwrap_or_default();

        let transport = builder
            .port(config.port)
            .hello_name(hello_name)
            .authentication(vec![Mechanism::Plain, Mechanism::Login])
            .credentials(credentials)
            .timeout(Some(settings.timeout()))
            .build();

        Ok(Self { transport, sender })
    }
}

impl fmt::Debug for SmtpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpClient")
            .field("sender", &self.sender)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MailTransport for SmtpClient {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), DeliveryError> {
        let message = email.to_message(&self.sender)?;
        self.transport.send(message).await?;
        Ok(())
    }

    async fn probe(&self) -> Result<(), DeliveryError> {
        if self.transport.test_connection().await? {
            Ok(())
        } else {
            Err(DeliveryError::ConnectionTestFailed)
        }
    }
}
