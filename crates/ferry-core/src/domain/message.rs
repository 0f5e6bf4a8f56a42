//! Message: the opaque payload carried by a record.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::errors::OutboxError;

/// An event to be delivered to the broker.
///
/// The store keeps it as one opaque binary blob; nothing in the dispatcher
/// looks inside except the broker adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Routing / partition key.
    pub key: String,

    pub headers: HashMap<String, String>,

    pub body: Vec<u8>,

    /// Destination topic or subject.
    pub topic: String,
}

impl Message {
    pub fn new(topic: impl Into<String>, key: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            headers: HashMap::new(),
            body: body.into(),
            topic: topic.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|v| v.as_str())
    }

    /// Serialize into the blob stored in the `data` column.
    pub fn encode(&self) -> Result<Vec<u8>, OutboxError> {
        bitcode::serialize(self).map_err(|source| OutboxError::Codec {
            op: "outbox.message.encode",
            source,
        })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, OutboxError> {
        bitcode::deserialize(bytes).map_err(|source| OutboxError::Codec {
            op: "outbox.message.decode",
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_message_keeps_every_field() {
        let message = Message::new("orders", "order-42", vec![0u8, 159, 146, 150, 255])
            .with_header("correlation_id", "req-abc")
            .with_header("content-type", "application/octet-stream");

        let bytes = message.encode().unwrap();
        let decoded = Message::decode(&bytes).unwrap();

        assert_eq!(decoded, message);
        assert_eq!(decoded.header("correlation_id"), Some("req-abc"));
        assert_eq!(decoded.body, vec![0u8, 159, 146, 150, 255]);
    }

    #[test]
    fn empty_message_is_encodable() {
        let bytes = Message::default().encode().unwrap();
        assert_eq!(Message::decode(&bytes).unwrap(), Message::default());
    }

    #[test]
    fn truncated_blob_fails_to_decode() {
        let err = Message::decode(&[]).unwrap_err();
        assert!(matches!(err, OutboxError::Codec { .. }));
    }
}
