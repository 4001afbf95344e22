//! A/B test assignment and winner selection.

pub mod assignment;
pub mod orchestrator;

pub use assignment::assign_variation;
pub use orchestrator::{select_winner, AbTestOrchestrator, VariationScore};
