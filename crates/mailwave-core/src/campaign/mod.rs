//! Campaign lifecycle management.

pub mod manager;
pub mod scheduler;

pub use manager::{CampaignError, CampaignManager};
pub use scheduler::CampaignScheduler;
