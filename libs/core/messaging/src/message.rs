//! Message trait for payloads carried over the broker.

use serde::{de::DeserializeOwned, Serialize};

/// A payload that crosses the broker as JSON.
pub trait Message: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Identifier used in logs (an order id, for instance).
    fn message_id(&self) -> String;
}
