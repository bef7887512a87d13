use crate::error::Result;
use crate::message::Message;

/// Maps a message to and from an opaque byte sequence for adapters that
/// cross a process boundary.
///
/// Implementations must be total, deterministic, and round-trip reversible
/// on every message field.
pub trait MessageSerializer: Send + Sync {
    fn serialize(&self, msg: &Message) -> Result<Vec<u8>>;
    fn deserialize(&self, bytes: &[u8]) -> Result<Message>;
}

/// Default serializer: compact JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl MessageSerializer for JsonSerializer {
    fn serialize(&self, msg: &Message) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(msg)?)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Message> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
