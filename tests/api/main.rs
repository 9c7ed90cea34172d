mod accounts;
mod attachments;
mod campaign;
mod oauth;
