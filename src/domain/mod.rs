mod attachment;
mod campaign_settings;
mod recipient;
mod recipient_email;
mod recipient_name;
mod template;

pub use attachment::{Attachment, AttachmentSet, AttachmentSummary, DEFAULT_CONTENT_TYPE};
pub use campaign_settings::{CampaignSettings, SettingsError};
pub use recipient::{DEFAULT_TEMPLATE_KEY, Recipient, RecipientQueue};
pub use recipient_email::RecipientEmail;
pub use recipient_name::RecipientName;
pub use template::{NAME_PLACEHOLDER, Template, TemplateError, TemplateSet};
