//! Sending accounts known to the process, in insertion order.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

use crate::email_client::{DeliveryError, MailTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Gmail,
    Smtp,
}

impl AccountKind {
    pub fn label(self) -> &'static str {
        match self {
            AccountKind::Gmail => "Gmail API",
            AccountKind::Smtp => "SMTP",
        }
    }
}

/// Connection details shown to the UI. Secrets never live here.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AccountDetails {
    Gmail,
    #[serde(rename_all = "camelCase")]
    Smtp {
        host: String,
        port: u16,
        username: String,
        use_ssl: bool,
    },
}

impl AccountDetails {
    pub fn kind(&self) -> AccountKind {
        match self {
            AccountDetails::Gmail => AccountKind::Gmail,
            AccountDetails::Smtp { .. } => AccountKind::Smtp,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Account {
    pub id: Uuid,
    pub details: AccountDetails,
    pub display_name: String,
    pub address: String,
    pub is_connected: bool,
    pub transport: Arc<dyn MailTransport>,
}

impl Account {
    pub fn new(
        details: AccountDetails,
        display_name: String,
        address: String,
        transport: Arc<dyn MailTransport>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            details,
            display_name,
            address,
            is_connected: false,
            transport,
        }
    }

    pub fn kind(&self) -> AccountKind {
        self.details.kind()
    }

    pub fn view(&self) -> AccountView {
        AccountView {
            id: self.id,
            kind: self.kind(),
            name: self.display_name.clone(),
            email: self.address.clone(),
            is_connected: self.is_connected,
            details: self.details.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: AccountKind,
    pub name: String,
    pub email: String,
    pub is_connected: bool,
    #[serde(flatten)]
    pub details: AccountDetails,
}

#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    #[error("Account not found")]
    UnknownAccount,
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum SelectionError {
    #[error("Account ID {0} not found")]
    UnknownAccount(Uuid),
    #[error("Account {0} is not connected")]
    NotConnected(String),
}

#[derive(Debug, Default)]
pub struct AccountRegistry {
    accounts: RwLock<Vec<Account>>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, account: Account) -> Uuid {
        let id = account.id;
        tracing::info!(account_id = %id, email = %account.address, kind = ?account.kind(), "account added");
        self.accounts.write().push(account);
        id
    }

    pub fn remove(&self, id: Uuid) -> Option<Account> {
        let mut accounts = self.accounts.write();
        let index = accounts.iter().position(|a| a.id == id)?;
        let account = accounts.remove(index);
        tracing::info!(account_id = %id, email = %account.address, "account removed");
        Some(account)
    }

    pub fn get(&self, id: Uuid) -> Option<Account> {
        self.accounts.read().iter().find(|a| a.id == id).cloned()
    }

    pub fn find_by_address(&self, kind: AccountKind, address: &str) -> Option<Account> {
        self.accounts
            .read()
            .iter()
            .find(|a| a.kind() == kind && a.address.eq_ignore_ascii_case(address))
            .cloned()
    }

    pub fn list(&self) -> Vec<Account> {
        self.accounts.read().clone()
    }

    pub fn list_connected(&self) -> Vec<Account> {
        self.accounts
            .read()
            .iter()
            .filter(|a| a.is_connected)
            .cloned()
            .collect()
    }

    /// Copy of the selected accounts, in registry order, taken once per run.
    ///
    /// Every id must exist and be connected.
    pub fn snapshot(&self, selected: &[Uuid]) -> Result<Vec<Account>, SelectionError> {
        let accounts = self.accounts.read();
        for id in selected {
            match accounts.iter().find(|a| a.id == *id) {
                None => return Err(SelectionError::UnknownAccount(*id)),
                Some(a) if !a.is_connected => {
                    return Err(SelectionError::NotConnected(a.address.clone()));
                }
                Some(_) => {}
            }
        }
        Ok(accounts
            .iter()
            .filter(|a| selected.contains(&a.id))
            .cloned()
            .collect())
    }

    /// Runs the account's probe and records the result in `is_connected`.
    pub async fn probe(&self, id: Uuid) -> Result<(), ProbeError> {
        let transport = self.get(id).ok_or(ProbeError::UnknownAccount)?.transport;
        let outcome = transport.probe().await;
        self.set_connected(id, outcome.is_ok());
        if let Err(e) = &outcome {
            tracing::warn!(account_id = %id, error = %e, "account probe failed");
        }
        outcome.map_err(ProbeError::from)
    }

    /// Never fails: a failed or impossible probe reads as `false`.
    pub async fn verify(&self, id: Uuid) -> bool {
        self.probe(id).await.is_ok()
    }

    fn set_connected(&self, id: Uuid, connected: bool) {
        if let Some(account) = self.accounts.write().iter_mut().find(|a| a.id == id) {
            account.is_connected = connected;
        }
    }
}
