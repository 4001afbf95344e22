//! Open classification and campaign analytics.
//!
//! Everything in this module is pure: it consumes event rows already
//! fetched from storage and derives summaries, distributions, and
//! engagement metrics at read time. Nothing here writes back.

pub mod aggregator;
pub mod classifier;
pub mod user_agent;

pub use aggregator::{
    aggregate, AxisBucket, CampaignAnalytics, Distributions, EngagementMetrics, EventSummary,
    HourBucket, RecipientInsights, RecipientScore, ResponseTimes, TemporalAnalytics,
};
pub use classifier::{classify_opens, OpenKind};
pub use user_agent::{parse_user_agent, DeviceClass, UserAgentInfo};
