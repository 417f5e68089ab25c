use serde::{Deserialize, Serialize};

use crate::message::MessageInfo;

/// One line of the durable log: a self-contained, idempotency-keyed envelope
/// around a normalized message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestRecord {
    pub idempotency_key: String,
    pub correlation_id: String,
    /// Milliseconds since epoch at ingestion time.
    pub received_at: i64,
    pub payload: MessageInfo,
}

impl IngestRecord {
    /// Builds the record for `payload`, deriving `idempotencyKey` and
    /// `correlationId` from the message id (falling back to
    /// `from`+`timestamp` for the correlation id when useful).
    pub fn new(payload: MessageInfo, received_at: i64) -> Self {
        let idempotency_key = idempotency_key_for(&payload.id);
        let correlation_id = correlation_id_for(&payload);
        Self {
            idempotency_key,
            correlation_id,
            received_at,
            payload,
        }
    }
}

pub fn idempotency_key_for(message_id: &str) -> String {
    format!("wa:{message_id}")
}

fn correlation_id_for(payload: &MessageInfo) -> String {
    if payload.id.is_empty() {
        format!("cid:{}:{}", payload.from, payload.timestamp)
    } else {
        format!("cid:{}", payload.id)
    }
}
