//! Webhook deliveries from GitHub.
//!
//! - [`signature`]: HMAC-SHA256 verification of delivery bodies
//! - [`event`]: the decoded event handed to plugins, and event filters

pub mod event;
pub mod signature;

pub use event::{EventFilter, InvalidEventFilter, WebhookEvent};
pub use signature::{WebhookSecret, parse_signature_header};
