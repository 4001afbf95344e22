//! Mailwave Core - Campaign execution and analytics
//!
//! This crate provides the core campaign functionality for Mailwave:
//! campaign lifecycle management, the durable delivery dispatcher,
//! open/click analytics, and A/B test orchestration.

pub mod abtest;
pub mod analytics;
pub mod campaign;
pub mod delivery;
pub mod token;

pub use abtest::{select_winner, AbTestOrchestrator, VariationScore};
pub use analytics::{aggregate, classify_opens, parse_user_agent, CampaignAnalytics, OpenKind};
pub use campaign::{CampaignError, CampaignManager, CampaignScheduler};
pub use delivery::{DeliveryDispatcher, DeliveryResult, SendTransport, SmtpSender};
pub use token::{generate_unsubscribe_token, verify_unsubscribe_token, UnsubscribeClaims};
