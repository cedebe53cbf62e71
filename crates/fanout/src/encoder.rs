//! Payload encoders
//!
//! Both encoders enforce a payload size limit; JSON additionally rejects
//! non-finite floats, which it cannot represent.

use bytes::Bytes;
use std::sync::Arc;

use contracts::{AttributeValue, ContractError, EncodingFormat, Event, PayloadEncoder};

fn check_size(format: &str, payload: Vec<u8>, max: usize) -> Result<Bytes, ContractError> {
    if payload.len() > max {
        return Err(ContractError::encoding(
            format,
            format!("payload of {} bytes exceeds limit of {max}", payload.len()),
        ));
    }
    Ok(Bytes::from(payload))
}

/// JSON encoder (human-readable)
#[derive(Debug, Clone)]
pub struct JsonEncoder {
    max_payload_bytes: usize,
}

impl JsonEncoder {
    pub fn new(max_payload_bytes: usize) -> Self {
        Self { max_payload_bytes }
    }
}

impl PayloadEncoder for JsonEncoder {
    fn format(&self) -> &str {
        "json"
    }

    fn encode(&self, event: &Event) -> Result<Bytes, ContractError> {
        for (name, value) in &event.attributes {
            if let AttributeValue::Float(f) = value {
                if !f.is_finite() {
                    return Err(ContractError::encoding(
                        self.format(),
                        format!("attribute '{name}' is not a finite number ({f})"),
                    ));
                }
            }
        }

        let payload = serde_json::to_vec(event)
            .map_err(|e| ContractError::encoding(self.format(), e.to_string()))?;
        check_size(self.format(), payload, self.max_payload_bytes)
    }
}

/// Bincode encoder (compact binary)
#[derive(Debug, Clone)]
pub struct BincodeEncoder {
    max_payload_bytes: usize,
}

impl BincodeEncoder {
    pub fn new(max_payload_bytes: usize) -> Self {
        Self { max_payload_bytes }
    }
}

impl PayloadEncoder for BincodeEncoder {
    fn format(&self) -> &str {
        "bincode"
    }

    fn encode(&self, event: &Event) -> Result<Bytes, ContractError> {
        let payload = bincode::serialize(event)
            .map_err(|e| ContractError::encoding(self.format(), e.to_string()))?;
        check_size(self.format(), payload, self.max_payload_bytes)
    }
}

/// Encoder for a configured format
pub fn encoder_for(format: EncodingFormat, max_payload_bytes: usize) -> Arc<dyn PayloadEncoder> {
    match format {
        EncodingFormat::Json => Arc::new(JsonEncoder::new(max_payload_bytes)),
        EncodingFormat::Bincode => Arc::new(BincodeEncoder::new(max_payload_bytes)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> Event {
        Event::new("orders").with("id", 102i64).with("item", "book")
    }

    #[test]
    fn test_json_payload_is_event_json() {
        let payload = JsonEncoder::new(1024).encode(&event()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value["stream"], "orders");
        assert_eq!(value["attributes"]["id"]["int"], 102);
    }

    #[test]
    fn test_json_rejects_nan() {
        let err = JsonEncoder::new(1024)
            .encode(&event().with("price", f64::NAN))
            .unwrap_err();
        assert!(matches!(err, ContractError::Encoding { .. }));
        assert!(err.to_string().contains("price"));
    }

    #[test]
    fn test_size_limit_applies_to_every_format() {
        let big = event().with("blob", "x".repeat(256));
        for encoder in [
            encoder_for(EncodingFormat::Json, 64),
            encoder_for(EncodingFormat::Bincode, 64),
        ] {
            let err = encoder.encode(&big).unwrap_err();
            assert!(err.to_string().contains("exceeds limit"), "{}", encoder.format());
        }
    }

    #[test]
    fn test_bincode_payload_decodes_as_event() {
        let payload = BincodeEncoder::new(4096).encode(&event()).unwrap();
        let decoded: Event = bincode::deserialize(&payload).unwrap();
        assert_eq!(decoded.stream, "orders");
        assert_eq!(decoded.get("id"), Some(&AttributeValue::Int(102)));
    }
}
