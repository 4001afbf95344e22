//! Repository layer for data access

pub mod api_keys;
pub mod campaigns;
pub mod events;
pub mod jobs;
pub mod link_mappings;
pub mod recipients;
pub mod segments;
pub mod unsubscribes;

// Re-export concrete repository implementations with simple names
pub use api_keys::DbApiKeyRepository as ApiKeyRepository;
pub use campaigns::CampaignRepository;
pub use events::EventRepository;
pub use jobs::SendJobRepository;
pub use link_mappings::LinkMappingRepository;
pub use recipients::RecipientRepository;
pub use segments::DbSegmentDirectory;
pub use unsubscribes::UnsubscribeRepository;

// Re-export repository traits
pub use api_keys::ApiKeyRepository as ApiKeyRepositoryTrait;
pub use segments::SegmentDirectory;

// Re-export API key model
pub use api_keys::ApiKey;
