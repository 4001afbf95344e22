//! Delivery dispatcher and send transport.

pub mod content;
pub mod dispatcher;
pub mod transport;

pub use content::{render_tracked_email, RenderedEmail};
pub use dispatcher::DeliveryDispatcher;
pub use transport::{DeliveryResult, OutgoingEmail, SendTransport, SmtpSender};
