pub mod campaign;
pub mod configuration;
pub mod domain;
pub mod email_client;
pub mod oauth;
pub mod registry;
pub mod routes;
pub mod startup;
pub mod telemetry;
