//! Decoded webhook deliveries and the filters handlers subscribe with.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;

use crate::types::{DeliveryId, InstallationId};

/// One webhook delivery: `X-GitHub-Delivery`, `X-GitHub-Event` and the
/// decoded body.
///
/// The payload sits behind an `Arc`, so the event can be handed to every
/// plugin without copying; nothing can mutate it once received.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    id: DeliveryId,
    name: String,
    payload: Arc<Value>,
}

impl WebhookEvent {
    pub fn new(id: impl Into<DeliveryId>, name: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            payload: Arc::new(payload),
        }
    }

    /// Decodes a delivery body.
    pub fn from_body(
        id: impl Into<DeliveryId>,
        name: impl Into<String>,
        body: &[u8],
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(id, name, serde_json::from_slice(body)?))
    }

    pub fn id(&self) -> &DeliveryId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// The payload's `action` field, for events that have one.
    pub fn action(&self) -> Option<&str> {
        self.payload.get("action").and_then(Value::as_str)
    }

    /// The installation the delivery was sent for.
    pub fn installation_id(&self) -> Option<InstallationId> {
        self.payload
            .get("installation")
            .and_then(|i| i.get("id"))
            .and_then(Value::as_u64)
            .map(InstallationId)
    }

    /// `event.action`, or just `event` when there is no action.
    pub fn qualified_name(&self) -> String {
        match self.action() {
            Some(action) => format!("{}.{}", self.name, action),
            None => self.name.clone(),
        }
    }
}

/// Which events a handler receives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventFilter {
    /// Every event.
    Any,
    /// Every action of one event, e.g. `issues`.
    Event(String),
    /// One action of one event, e.g. `issues.opened`.
    Action { event: String, action: String },
}

impl EventFilter {
    pub fn matches(&self, event: &WebhookEvent) -> bool {
        match self {
            EventFilter::Any => true,
            EventFilter::Event(name) => event.name() == name,
            EventFilter::Action { event: name, action } => {
                event.name() == name && event.action() == Some(action.as_str())
            }
        }
    }
}

/// Error for an empty filter string or one with an empty half.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid event filter '{0}'")]
pub struct InvalidEventFilter(pub String);

impl FromStr for EventFilter {
    type Err = InvalidEventFilter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*" {
            return Ok(EventFilter::Any);
        }
        match s.split_once('.') {
            None if !s.is_empty() => Ok(EventFilter::Event(s.to_string())),
            Some((event, action)) if !event.is_empty() && !action.is_empty() => {
                Ok(EventFilter::Action {
                    event: event.to_string(),
                    action: action.to_string(),
                })
            }
            _ => Err(InvalidEventFilter(s.to_string())),
        }
    }
}

impl fmt::Display for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventFilter::Any => f.write_str("*"),
            EventFilter::Event(event) => f.write_str(event),
            EventFilter::Action { event, action } => write!(f, "{}.{}", event, action),
        }
    }
}
