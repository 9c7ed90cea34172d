mod dispatcher;
mod rotation;
mod status;

pub use dispatcher::{
    AttemptOutcome, CampaignRequest, DeliveryAttempt, Dispatcher, RunReport, StartError,
};
pub use status::{CampaignStatus, RunState, StatusError, StatusPublisher};
