use std::collections::HashSet;

use super::{recipient_email::RecipientEmail, recipient_name::RecipientName};

pub const DEFAULT_TEMPLATE_KEY: &str = "EN";

#[derive(Debug, Clone, PartialEq)]
pub struct Recipient {
    pub email: RecipientEmail,
    pub name: Option<RecipientName>,
    /// Language code or template id used to pick the template.
    pub template_key: String,
}

impl Recipient {
    pub fn new(email: RecipientEmail, name: Option<RecipientName>, template_key: Option<String>) -> Self {
        let template_key = template_key
            .map(|key| key.trim().to_owned())
            .filter(|key| !key.is_empty())
            .unwrap_or_else(|| DEFAULT_TEMPLATE_KEY.to_owned());
        Self {
            email,
            name,
            template_key,
        }
    }
}

/// Ordered recipients of a run. Email addresses are unique.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipientQueue(Vec<Recipient>);

impl RecipientQueue {
    pub fn parse(recipients: Vec<Recipient>) -> Result<Self, String> {
        let mut seen = HashSet::with_capacity(recipients.len());
        for recipient in &recipients {
            if !seen.insert(recipient.email.as_ref().to_ascii_lowercase()) {
                return Err(format!("{} appears more than once.", recipient.email));
            }
        }
        Ok(Self(recipients))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Recipient> {
        self.0.iter()
    }

    /// Consecutive blocks of at most `size` recipients, in queue order.
    pub fn blocks(&self, size: usize) -> std::slice::Chunks<'_, Recipient> {
        self.0.chunks(size.max(1))
    }
}
