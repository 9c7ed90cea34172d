use std::time::Duration;

use uuid::Uuid;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum SettingsError {
    #[error("Please select at least one email account")]
    NoAccountsSelected,
    #[error("Email subject is required")]
    EmptySubject,
    #[error("messagesPerBlock must be at least 1")]
    EmptyBlock,
    #[error("maxConnections must be at least 1")]
    NoConnections,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CampaignSettings {
    pub subject: String,
    pub pause_between_messages: Duration,
    pub pause_between_blocks: Duration,
    pub messages_per_block: usize,
    pub max_connections: usize,
    pub retries: u32,
    pub selected_account_ids: Vec<Uuid>,
}

impl CampaignSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.selected_account_ids.is_empty() {
            return Err(SettingsError::NoAccountsSelected);
        }
        if self.subject.trim().is_empty() {
            return Err(SettingsError::EmptySubject);
        }
        if self.messages_per_block == 0 {
            return Err(SettingsError::EmptyBlock);
        }
        if self.max_connections == 0 {
            return Err(SettingsError::NoConnections);
        }
        Ok(())
    }

    /// Attempts allowed per recipient.
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}
