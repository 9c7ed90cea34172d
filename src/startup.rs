use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    extract::{DefaultBodyLimit, Request},
    http::{HeaderValue, Method, header::CONTENT_TYPE},
    response::Response,
    routing::{delete, get, post},
    serve::Serve,
};
use parking_lot::RwLock;
use reqwest::Client;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Span, info, info_span};
use uuid::Uuid;

use crate::{
    campaign::{Dispatcher, StatusPublisher},
    configuration::{CampaignDefaults, Settings, SmtpSettings},
    domain::{AttachmentSet, RecipientQueue, TemplateSet},
    oauth::GoogleOAuth,
    registry::AccountRegistry,
    routes::{
        add_smtp_account, campaign_status, delete_account, delete_attachment, get_attachments,
        get_contacts, get_oauth_url, get_templates, gmail_status, health_check, list_accounts,
        oauth_callback, reset_campaign, revoke_oauth, save_contacts, save_templates, send_emails,
        send_test_email, stop_campaign, test_account, upload_attachment,
    },
};

/// Largest accepted upload body.
const MAX_ATTACHMENT_BYTES: usize = 25 * 1024 * 1024;

pub struct AppState {
    pub registry: Arc<AccountRegistry>,
    pub dispatcher: Dispatcher,
    pub contacts: RwLock<RecipientQueue>,
    pub templates: RwLock<TemplateSet>,
    pub attachments: RwLock<AttachmentSet>,
    pub oauth: Arc<GoogleOAuth>,
    pub http_client: Client,
    pub gmail_api_base_url: String,
    pub smtp: SmtpSettings,
    pub campaign_defaults: CampaignDefaults,
}

impl AppState {
    pub fn status(&self) -> &StatusPublisher {
        self.dispatcher.status()
    }
}

pub fn run(
    listener: TcpListener,
    app_state: AppState,
    frontend_url: &str,
) -> anyhow::Result<Serve<TcpListener, Router, Router>> {
    // Shared by every handler; the dispatcher and registry must be process-wide.
    let app_state = Arc::new(app_state);

    let cors = CorsLayer::new()
        .allow_origin(frontend_url.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE]);

    let app = Router::new()
        .route("/health_check", get(health_check))
        .route("/send-emails", post(send_emails))
        .route("/campaign-status", get(campaign_status))
        .route("/reset-campaign", post(reset_campaign))
        .route("/stop-campaign", post(stop_campaign))
        .route("/smtp/accounts", get(list_accounts).post(add_smtp_account))
        .route("/smtp/accounts/{id}", delete(delete_account))
        .route("/smtp/test", post(test_account))
        .route("/test-email", post(send_test_email))
        .route("/get-oauth-url", get(get_oauth_url))
        .route("/callback", get(oauth_callback))
        .route("/gmail-status", get(gmail_status))
        .route("/revoke-oauth", post(revoke_oauth))
        .route("/save-contacts", post(save_contacts))
        .route("/get-contacts", get(get_contacts))
        .route("/save-templates", post(save_templates))
        .route("/get-templates", get(get_templates))
        .route(
            "/upload-attachment",
            post(upload_attachment).layer(DefaultBodyLimit::max(MAX_ATTACHMENT_BYTES)),
        )
        .route("/get-attachments", get(get_attachments))
        .route("/delete-attachment", post(delete_attachment))
        .with_state(app_state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let request_id = Uuid::new_v4();
                    info_span!(
                        "http_request",
                        method = ?request.method(),
                        uri = ?request.uri(),
                        version = ?request.version(),
                        request_id = ?request_id,
                        status = tracing::field::Empty,
                    )
                })
                .on_response(|response: &Response, latency: Duration, span: &Span| {
                    let status = response.status();
                    span.record("status", status.as_u16());
                    info!(parent: span, ?status, ?latency, "Response sent");
                }),
        );

    Ok(axum::serve(listener, app))
}

pub struct Application {
    port: u16,
    server: Serve<TcpListener, Router, Router>,
}

impl Application {
    pub async fn build(configuration: Settings) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .timeout(configuration.gmail.timeout())
            .build()?;
        let oauth = Arc::new(GoogleOAuth::new(&configuration.gmail, http_client.clone()));

        let registry = Arc::new(AccountRegistry::new());
        let dispatcher = Dispatcher::new(Arc::clone(&registry), Arc::new(StatusPublisher::new()));

        let app_state = AppState {
            registry,
            dispatcher,
            contacts: RwLock::new(RecipientQueue::default()),
            templates: RwLock::new(TemplateSet::default()),
            attachments: RwLock::new(AttachmentSet::default()),
            oauth,
            http_client,
            gmail_api_base_url: configuration.gmail.api_base_url,
            smtp: configuration.smtp,
            campaign_defaults: configuration.campaign,
        };

        let listener = TcpListener::bind(format!(
            "{}:{}",
            configuration.application.host, configuration.application.port
        ))
        .await?;
        let port = listener.local_addr()?.port();
        info!(port, "listening");

        let server = run(listener, app_state, &configuration.application.frontend_url)?;

        Ok(Self { server, port })
    }

    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        Ok(self.server.await?)
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}
