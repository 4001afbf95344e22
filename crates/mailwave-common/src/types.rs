//! Common types for Mailwave

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for campaigns
pub type CampaignId = Uuid;

/// Unique identifier for contacts (audience members)
pub type ContactId = Uuid;

/// Unique identifier for segments
pub type SegmentId = Uuid;

/// Unique identifier for tracking events
pub type EventId = Uuid;

/// Unique identifier for send jobs
pub type SendJobId = Uuid;

/// Unique identifier for click tracking link mappings
pub type TrackingId = Uuid;

/// Unique identifier for account owners
pub type OwnerId = Uuid;

/// Email address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailAddress {
    pub local: String,
    pub domain: String,
}

impl EmailAddress {
    /// Create a new email address
    pub fn new(local: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            domain: domain.into(),
        }
    }

    /// Parse an email address from a string
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.splitn(2, '@').collect();
        if parts.len() == 2 && !parts[0].is_empty() && !parts[1].is_empty() {
            Some(Self::new(parts[0], parts[1]))
        } else {
            None
        }
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

impl std::str::FromStr for EmailAddress {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| crate::Error::Validation("Invalid email address".to_string()))
    }
}

/// Campaign kind, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignKind {
    Immediate,
    Scheduled,
    AbTest,
}

impl std::fmt::Display for CampaignKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignKind::Immediate => write!(f, "immediate"),
            CampaignKind::Scheduled => write!(f, "scheduled"),
            CampaignKind::AbTest => write!(f, "ab_test"),
        }
    }
}

impl std::str::FromStr for CampaignKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "immediate" => Ok(CampaignKind::Immediate),
            "scheduled" => Ok(CampaignKind::Scheduled),
            "ab_test" => Ok(CampaignKind::AbTest),
            _ => Err(crate::Error::Validation(format!(
                "Unknown campaign kind: {}",
                s
            ))),
        }
    }
}

/// Execution state of a campaign. Owned by the system; transitions only
/// move forward (scheduled/pending -> sending -> done/failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignState {
    Scheduled,
    Pending,
    Sending,
    Done,
    Failed,
}

impl CampaignState {
    /// Whether this state may transition to `next`.
    pub fn can_transition_to(self, next: CampaignState) -> bool {
        matches!(
            (self, next),
            (CampaignState::Scheduled, CampaignState::Sending)
                | (CampaignState::Scheduled, CampaignState::Failed)
                | (CampaignState::Pending, CampaignState::Sending)
                | (CampaignState::Pending, CampaignState::Failed)
                | (CampaignState::Sending, CampaignState::Done)
                | (CampaignState::Sending, CampaignState::Failed)
        )
    }

    /// Terminal states never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, CampaignState::Done | CampaignState::Failed)
    }
}

impl std::fmt::Display for CampaignState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignState::Scheduled => write!(f, "scheduled"),
            CampaignState::Pending => write!(f, "pending"),
            CampaignState::Sending => write!(f, "sending"),
            CampaignState::Done => write!(f, "done"),
            CampaignState::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for CampaignState {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(CampaignState::Scheduled),
            "pending" => Ok(CampaignState::Pending),
            "sending" => Ok(CampaignState::Sending),
            "done" => Ok(CampaignState::Done),
            "failed" => Ok(CampaignState::Failed),
            _ => Err(crate::Error::Validation(format!(
                "Unknown campaign state: {}",
                s
            ))),
        }
    }
}

/// User-facing activation flag, orthogonal to the execution state.
/// An inactive campaign is never picked up by the scheduled trigger,
/// but an already-sending one still runs to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Active,
    Inactive,
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignStatus::Active => write!(f, "active"),
            CampaignStatus::Inactive => write!(f, "inactive"),
        }
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CampaignStatus::Active),
            "inactive" => Ok(CampaignStatus::Inactive),
            _ => Err(crate::Error::Validation(format!(
                "Unknown campaign status: {}",
                s
            ))),
        }
    }
}

/// Tracking event types recorded against a campaign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Sent,
    Delivered,
    Open,
    Click,
    Bounce,
    Unsubscribe,
    Spam,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::Sent => write!(f, "sent"),
            EventType::Delivered => write!(f, "delivered"),
            EventType::Open => write!(f, "open"),
            EventType::Click => write!(f, "click"),
            EventType::Bounce => write!(f, "bounce"),
            EventType::Unsubscribe => write!(f, "unsubscribe"),
            EventType::Spam => write!(f, "spam"),
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(EventType::Sent),
            "delivered" => Ok(EventType::Delivered),
            "open" => Ok(EventType::Open),
            "click" => Ok(EventType::Click),
            "bounce" => Ok(EventType::Bounce),
            "unsubscribe" => Ok(EventType::Unsubscribe),
            "spam" => Ok(EventType::Spam),
            _ => Err(crate::Error::Validation(format!("Unknown event type: {}", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_email_address_parse() {
        let email = EmailAddress::parse("user@example.com").unwrap();
        assert_eq!(email.local, "user");
        assert_eq!(email.domain, "example.com");
        assert_eq!(email.to_string(), "user@example.com");
    }

    #[test]
    fn test_email_address_invalid() {
        assert!(EmailAddress::parse("invalid").is_none());
        assert!(EmailAddress::parse("@example.com").is_none());
        assert!(EmailAddress::parse("user@").is_none());
    }

    #[test]
    fn test_state_transitions_only_move_forward() {
        use CampaignState::*;
        assert!(Scheduled.can_transition_to(Sending));
        assert!(Pending.can_transition_to(Sending));
        assert!(Sending.can_transition_to(Done));
        assert!(Sending.can_transition_to(Failed));

        assert!(!Sending.can_transition_to(Pending));
        assert!(!Done.can_transition_to(Sending));
        assert!(!Failed.can_transition_to(Sending));
        assert!(!Done.can_transition_to(Failed));
        assert!(!Scheduled.can_transition_to(Done));
    }

    #[test]
    fn test_terminal_states() {
        assert!(CampaignState::Done.is_terminal());
        assert!(CampaignState::Failed.is_terminal());
        assert!(!CampaignState::Sending.is_terminal());
    }

    #[test]
    fn test_enum_round_trip() {
        assert_eq!(
            "ab_test".parse::<CampaignKind>().unwrap(),
            CampaignKind::AbTest
        );
        assert_eq!(CampaignKind::AbTest.to_string(), "ab_test");
        assert_eq!("open".parse::<EventType>().unwrap(), EventType::Open);
        assert_eq!(
            "delivered".parse::<EventType>().unwrap(),
            EventType::Delivered
        );
        assert_eq!(EventType::Delivered.to_string(), "delivered");
        assert_eq!(
            "inactive".parse::<CampaignStatus>().unwrap(),
            CampaignStatus::Inactive
        );
    }
}
