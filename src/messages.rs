use serde_derive::{Deserialize, Serialize};
use serde_json::Value;

/// A request published by the device.
#[derive(Clone, Debug, PartialEq)]
pub enum DeviceRequest {
    FetchStatus,
    SendReply(/* message */ String),
}

#[derive(Debug, Deserialize)]
struct RawDeviceRequest {
    fetch: Option<Value>,
    response_message: Option<Value>,
}

impl DeviceRequest {
    /// Decodes an inbound payload. `Ok(None)` means the payload was valid but
    /// asked for nothing.
    pub fn from_payload(payload: &[u8]) -> Result<Option<Self>, serde_json::Error> {
        let raw: RawDeviceRequest = serde_json::from_slice(payload)?;

        if raw.fetch.as_ref().is_some_and(is_truthy) {
            return Ok(Some(DeviceRequest::FetchStatus));
        }

        Ok(match raw.response_message {
            Some(Value::String(message)) if !message.is_empty() => {
                Some(DeviceRequest::SendReply(message))
            }
            _ => None,
        })
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
        Value::Null => false,
    }
}

pub const STATUS_UNAVAILABLE: i8 = -1;
pub const STATUS_ABSENT: i8 = 0;
pub const STATUS_PRESENT: i8 = 1;

/// Door status published back to the device.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatusMessage {
    pub status: i8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visitor_description: Option<String>,
}

impl StatusMessage {
    pub fn absent() -> Self {
        StatusMessage {
            status: STATUS_ABSENT,
            visitor_description: None,
        }
    }

    pub fn present(description: String) -> Self {
        StatusMessage {
            status: STATUS_PRESENT,
            visitor_description: Some(description),
        }
    }

    /// The remote service could not be asked.
    pub fn unavailable() -> Self {
        StatusMessage {
            status: STATUS_UNAVAILABLE,
            visitor_description: None,
        }
    }
}
