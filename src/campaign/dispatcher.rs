//! Runs one campaign at a time in the background.
//!
//! A run walks the recipient queue block by block. Inside a block at most
//! `max_connections` deliveries are in flight; each delivery leases an account
//! from the [`Rotation`] and waits for that account's pacing slot before every
//! attempt.

use std::{collections::HashMap, sync::Arc};

use tokio::{
    sync::watch,
    task::{self, JoinError, JoinSet},
};
use tracing::{Instrument, debug, error, info, warn};
use uuid::Uuid;

use super::{
    rotation::{Lease, MAX_PAUSE, Rotation, stop_requested},
    status::{StatusError, StatusPublisher},
};
use crate::{
    domain::{
        Attachment, CampaignSettings, Recipient, RecipientEmail, RecipientQueue, SettingsError,
        TemplateSet,
    },
    email_client::OutgoingEmail,
    registry::{AccountRegistry, SelectionError},
};

/// Everything a run needs, fixed when it starts.
#[derive(Debug, Clone)]
pub struct CampaignRequest {
    pub settings: CampaignSettings,
    pub recipients: RecipientQueue,
    pub templates: TemplateSet,
    /// Added to every message.
    pub attachments: Vec<Attachment>,
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum StartError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error("No valid contacts found")]
    NoContacts,
    #[error(transparent)]
    Status(#[from] StatusError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Delivered,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryAttempt {
    pub recipient: RecipientEmail,
    pub account_id: Uuid,
    /// Starts at 1.
    pub attempt_number: u32,
    pub outcome: AttemptOutcome,
    pub error: Option<String>,
}

/// What a finished run did, attempt by attempt.
#[derive(Debug, Default)]
pub struct RunReport {
    pub attempts: Vec<DeliveryAttempt>,
    pub sent: usize,
    pub failed: usize,
    /// Recipients never attempted because the run was stopped.
    pub skipped: usize,
    pub stopped: bool,
}

impl RunReport {
    fn absorb(&mut self, delivery: Delivery) {
        match delivery.resolution {
            Resolution::Sent => self.sent += 1,
            Resolution::Failed => self.failed += 1,
            Resolution::Skipped => self.skipped += 1,
        }
        self.attempts.extend(delivery.attempts);
    }

    /// Attempts made for one recipient, in order.
    pub fn attempts_for(&self, recipient: &str) -> Vec<&DeliveryAttempt> {
        self.attempts
            .iter()
            .filter(|a| a.recipient.as_ref() == recipient)
            .collect()
    }
}

#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<AccountRegistry>,
    status: Arc<StatusPublisher>,
    stop: parking_lot::Mutex<Option<watch::Sender<bool>>>,
}

impl Dispatcher {
    pub fn new(registry: Arc<AccountRegistry>, status: Arc<StatusPublisher>) -> Self {
        Self {
            registry,
            status,
            stop: parking_lot::Mutex::new(None),
        }
    }

    pub fn status(&self) -> &Arc<StatusPublisher> {
        &self.status
    }

    /// Validates the request, claims the status and spawns the run.
    ///
    /// Nothing is published when this returns an error.
    pub fn start(
        &self,
        request: CampaignRequest,
    ) -> Result<tokio::task::JoinHandle<RunReport>, StartError> {
        let CampaignRequest {
            settings,
            recipients,
            templates,
            attachments,
        } = request;

        settings.validate()?;
        let accounts = self.registry.snapshot(&settings.selected_account_ids)?;
        if recipients.is_empty() {
            return Err(StartError::NoContacts);
        }

        let mut stop_slot = self.stop.lock();
        self.status.begin(recipients.len())?;
        let (stop_tx, stop_rx) = watch::channel(false);
        *stop_slot = Some(stop_tx);
        drop(stop_slot);

        let campaign_id = Uuid::new_v4();
        info!(
            %campaign_id,
            recipients = recipients.len(),
            accounts = accounts.len(),
            messages_per_block = settings.messages_per_block,
            max_connections = settings.max_connections,
            retries = settings.retries,
            attachments = attachments.len(),
            "campaign started"
        );

        let run = CampaignRun {
            rotation: Arc::new(Rotation::new(
                accounts,
                settings.pause_between_messages,
                settings.max_connections,
            )),
            status: Arc::clone(&self.status),
            settings,
            recipients,
            templates,
            attachments,
        };
        let span = tracing::info_span!("campaign", %campaign_id);
        Ok(tokio::spawn(run.execute(stop_rx).instrument(span)))
    }

    /// Asks the active run to stop. In-flight attempts finish; nothing new starts.
    ///
    /// Returns `false` when no run is active.
    pub fn stop(&self) -> bool {
        if !self.status.get().is_running {
            return false;
        }
        match self.stop.lock().as_ref() {
            Some(stop) => {
                stop.send_replace(true);
                info!("campaign stop requested");
                true
            }
            None => false,
        }
    }
}

struct CampaignRun {
    settings: CampaignSettings,
    recipients: RecipientQueue,
    templates: TemplateSet,
    attachments: Vec<Attachment>,
    rotation: Arc<Rotation>,
    status: Arc<StatusPublisher>,
}

impl CampaignRun {
    async fn execute(self, mut stop: watch::Receiver<bool>) -> RunReport {
        let mut report = RunReport::default();
        let blocks = self.recipients.blocks(self.settings.messages_per_block);

        let block_pause = self.settings.pause_between_blocks.min(MAX_PAUSE);

        for (block_number, block) in blocks.enumerate() {
            if block_number > 0 && !block_pause.is_zero() {
                debug!(
                    block = block_number + 1,
                    pause_seconds = block_pause.as_secs_f64(),
                    "pausing between blocks"
                );
                tokio::select! {
                    biased;
                    _ = stop_requested(&mut stop) => {}
                    _ = tokio::time::sleep(block_pause) => {}
                }
            }
            if is_stopped(&stop) {
                break;
            }
            debug!(block = block_number + 1, size = block.len(), "sending block");
            self.process_block(block, &stop, &mut report).await;
        }

        let resolved = report.sent + report.failed + report.skipped;
        report.skipped += self.recipients.len().saturating_sub(resolved);
        report.stopped = report.skipped > 0;

        let stopped_with = report.stopped.then(|| {
            format!(
                "Campaign stopped: {} recipients were not attempted",
                report.skipped
            )
        });
        self.status.finish(stopped_with);
        info!(
            sent = report.sent,
            failed = report.failed,
            skipped = report.skipped,
            attempts = report.attempts.len(),
            "campaign finished"
        );
        report
    }

    async fn process_block(
        &self,
        block: &[Recipient],
        stop: &watch::Receiver<bool>,
        report: &mut RunReport,
    ) {
        let mut deliveries = Deliveries::default();
        let mut pending = block.iter();

        for recipient in pending.by_ref().take(self.settings.max_connections) {
            self.spawn_delivery(&mut deliveries, recipient, stop);
        }

        while let Some(joined) = deliveries.tasks.join_next_with_id().await {
            match joined {
                Ok((id, delivery)) => {
                    deliveries.recipients.remove(&id);
                    report.absorb(delivery);
                }
                Err(e) => {
                    let recipient = deliveries.recipients.remove(&e.id());
                    self.record_lost_delivery(recipient, &e, report);
                }
            }
            if is_stopped(stop) {
                continue;
            }
            if let Some(recipient) = pending.next() {
                self.spawn_delivery(&mut deliveries, recipient, stop);
            }
        }
    }

    /// A task that died mid-delivery still resolves its recipient, as a failure.
    fn record_lost_delivery(
        &self,
        recipient: Option<RecipientEmail>,
        e: &JoinError,
        report: &mut RunReport,
    ) {
        let Some(recipient) = recipient else {
            error!(error = %e, "unknown delivery task failed");
            return;
        };
        error!(recipient = %recipient, error = %e, "delivery task failed");
        self.status.record_failure(format!("{}: {}", recipient, e));
        report.failed += 1;
    }

    /// Renders the recipient's message and leases its first account in queue order.
    fn spawn_delivery(
        &self,
        deliveries: &mut Deliveries,
        recipient: &Recipient,
        stop: &watch::Receiver<bool>,
    ) {
        let template = self.templates.resolve(&recipient.template_key);
        let email = OutgoingEmail {
            to: recipient.email.clone(),
            to_name: recipient.name.as_ref().map(|n| n.as_ref().to_owned()),
            subject: template.subject_or(&self.settings.subject).to_owned(),
            body: template.render(recipient.name.as_ref()),
            attachments: self.attachments.clone(),
        };
        let task = DeliveryTask {
            email,
            rotation: Arc::clone(&self.rotation),
            status: Arc::clone(&self.status),
            max_attempts: self.settings.max_attempts(),
            stop: stop.clone(),
        };
        let first = self.rotation.claim();
        let handle = deliveries.tasks.spawn(task.run(first).in_current_span());
        deliveries
            .recipients
            .insert(handle.id(), recipient.email.clone());
    }
}

/// In-flight deliveries of a block and the recipient each one serves.
#[derive(Default)]
struct Deliveries {
    tasks: JoinSet<Delivery>,
    recipients: HashMap<task::Id, RecipientEmail>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Sent,
    Failed,
    Skipped,
}

struct Delivery {
    resolution: Resolution,
    attempts: Vec<DeliveryAttempt>,
}

struct DeliveryTask {
    email: OutgoingEmail,
    rotation: Arc<Rotation>,
    status: Arc<StatusPublisher>,
    max_attempts: u32,
    stop: watch::Receiver<bool>,
}

impl DeliveryTask {
    async fn run(mut self, first: Lease) -> Delivery {
        let mut attempts: Vec<DeliveryAttempt> = Vec::new();
        let mut lease = first;

        for attempt_number in 1..=self.max_attempts {
            if attempt_number > 1 {
                if is_stopped(&self.stop) {
                    break;
                }
                lease = self.rotation.claim_after(lease.index);
            }
            if !self.rotation.wait_turn(&lease, &mut self.stop).await {
                break;
            }

            let account = self.rotation.account(&lease);
            let account_id = account.id;
            let account_address = account.address.clone();
            let transport = Arc::clone(&account.transport);

            match transport.send(&self.email).await {
                Ok(()) => {
                    info!(
                        recipient = %self.email.to,
                        account = %account_address,
                        attempt = attempt_number,
                        "email sent"
                    );
                    attempts.push(self.attempt(account_id, attempt_number, None));
                    self.status.record_sent();
                    return Delivery {
                        resolution: Resolution::Sent,
                        attempts,
                    };
                }
                Err(e) => {
                    let reason = e.to_string();
                    warn!(
                        recipient = %self.email.to,
                        account = %account_address,
                        attempt = attempt_number,
                        max_attempts = self.max_attempts,
                        error = %reason,
                        "delivery attempt failed"
                    );
                    attempts.push(self.attempt(account_id, attempt_number, Some(reason)));
                }
            }
        }

        let Some(last_error) = attempts.last().and_then(|a| a.error.clone()) else {
            debug!(recipient = %self.email.to, "not attempted, campaign stopped");
            return Delivery {
                resolution: Resolution::Skipped,
                attempts,
            };
        };

        error!(
            recipient = %self.email.to,
            attempts = attempts.len(),
            error = %last_error,
            "giving up on recipient"
        );
        self.status
            .record_failure(format!("{}: {}", self.email.to, last_error));
        Delivery {
            resolution: Resolution::Failed,
            attempts,
        }
    }

    fn attempt(&self, account_id: Uuid, attempt_number: u32, error: Option<String>) -> DeliveryAttempt {
        DeliveryAttempt {
            recipient: self.email.to.clone(),
            account_id,
            attempt_number,
            outcome: match error {
                None => AttemptOutcome::Delivered,
                Some(_) => AttemptOutcome::Failed,
            },
            error,
        }
    }
}

fn is_stopped(stop: &watch::Receiver<bool>) -> bool {
    *stop.borrow()
}
