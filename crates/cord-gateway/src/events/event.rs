use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::protocol::{GatewayFrame, OpCode};

/// A dispatch event as seen by handlers
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayEvent {
    /// Event name, e.g. `MESSAGE_CREATE`
    pub name: String,
    pub sequence: Option<u64>,
    pub data: Value,
}

impl GatewayEvent {
    pub fn new(name: impl Into<String>, sequence: Option<u64>, data: Value) -> Self {
        Self {
            name: name.into(),
            sequence,
            data,
        }
    }

    /// Build from a dispatch frame; `None` for other opcodes or a missing name
    pub fn from_frame(frame: GatewayFrame) -> Option<Self> {
        if frame.op != OpCode::Dispatch {
            return None;
        }
        let name = frame.t?;
        Some(Self {
            name,
            sequence: frame.s,
            data: frame.d,
        })
    }

    /// Decode the payload into a typed struct
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_from_dispatch_frame() {
        let frame = GatewayFrame::dispatch("MESSAGE_CREATE", 4, json!({"content": "hi"}));
        let event = GatewayEvent::from_frame(frame).unwrap();
        assert_eq!(event.name, "MESSAGE_CREATE");
        assert_eq!(event.sequence, Some(4));
        assert_eq!(event.data["content"], "hi");
    }

    #[test]
    fn test_non_dispatch_is_not_an_event() {
        assert!(GatewayEvent::from_frame(GatewayFrame::heartbeat_ack()).is_none());
    }

    #[test]
    fn test_typed_payload() {
        #[derive(Deserialize)]
        struct Message {
            content: String,
        }

        let event = GatewayEvent::new("MESSAGE_CREATE", Some(1), json!({"content": "hello", "id": "1"}));
        let message: Message = event.data_as().unwrap();
        assert_eq!(message.content, "hello");
        assert!(event.data_as::<u64>().is_err());
    }
}
