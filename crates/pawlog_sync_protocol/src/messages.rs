//! Sync protocol messages.
//!
//! All messages are JSON objects with camelCase keys. Timestamps are
//! RFC 3339 strings in UTC.

use crate::category::{Category, LogFields};
use crate::error::{ProtocolResult, ValidationError};
use crate::ids::{IdempotencyKey, OwnerId, RecordId};
use crate::validation::validate_record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A log entry as uploaded by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRecord {
    /// Client-generated dedup token.
    pub idempotency_key: IdempotencyKey,
    /// Entry category.
    pub category: Category,
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
    /// Category-specific fields.
    #[serde(flatten)]
    pub fields: LogFields,
}

/// Client request to the sync endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    /// Owner whose records are synced.
    pub owner_id: OwnerId,
    /// Last successful pull, or `None` for a full pull.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<DateTime<Utc>>,
    /// Pending entries to upload. May be empty.
    #[serde(default)]
    pub batch: Vec<WireRecord>,
}

impl SyncRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(
        owner_id: OwnerId,
        checkpoint: Option<DateTime<Utc>>,
        batch: Vec<WireRecord>,
    ) -> Self {
        Self {
            owner_id,
            checkpoint,
            batch,
        }
    }

    /// Encodes to JSON bytes.
    pub fn to_json(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// A sync request as received by the server.
///
/// Batch items are kept as raw JSON so that one malformed item is
/// rejected on its own instead of failing the whole request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundSyncRequest {
    /// Owner whose records are synced.
    pub owner_id: OwnerId,
    /// Last successful pull.
    #[serde(default)]
    pub checkpoint: Option<DateTime<Utc>>,
    /// Undecoded batch items.
    #[serde(default)]
    pub batch: Vec<serde_json::Value>,
}

impl InboundSyncRequest {
    /// Decodes a request body.
    pub fn from_json(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Decodes and validates every batch item.
    ///
    /// Returns the valid items with their batch index, and a rejection for
    /// every item that failed to decode or validate.
    pub fn decode_batch(
        &self,
        now: DateTime<Utc>,
    ) -> (Vec<(usize, WireRecord)>, Vec<RejectedItem>) {
        let mut valid = Vec::with_capacity(self.batch.len());
        let mut rejected = Vec::new();

        for (index, raw) in self.batch.iter().enumerate() {
            match serde_json::from_value::<WireRecord>(raw.clone()) {
                Ok(record) => match validate_record(&record, now) {
                    Ok(()) => valid.push((index, record)),
                    Err(err) => rejected.push(RejectedItem::new(
                        index,
                        Some(record.idempotency_key.clone()),
                        &err,
                    )),
                },
                Err(err) => {
                    let key = raw
                        .get("idempotencyKey")
                        .and_then(serde_json::Value::as_str)
                        .map(IdempotencyKey::from);
                    rejected.push(RejectedItem::new(
                        index,
                        key,
                        &ValidationError::Malformed(err.to_string()),
                    ));
                }
            }
        }

        (valid, rejected)
    }
}

impl TryFrom<&SyncRequest> for InboundSyncRequest {
    type Error = crate::ProtocolError;

    fn try_from(request: &SyncRequest) -> Result<Self, Self::Error> {
        let batch = request
            .batch
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            owner_id: request.owner_id.clone(),
            checkpoint: request.checkpoint,
            batch,
        })
    }
}

/// A newly inserted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertedRecord {
    /// Key the client uploaded.
    pub idempotency_key: IdempotencyKey,
    /// Server-assigned id.
    pub id: RecordId,
}

/// A batch item the server refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedItem {
    /// Position in the uploaded batch.
    pub index: usize,
    /// Key of the item, when it could be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<IdempotencyKey>,
    /// Human-readable reason.
    pub reason: String,
}

impl RejectedItem {
    /// Creates a rejection from a validation error.
    #[must_use]
    pub fn new(
        index: usize,
        idempotency_key: Option<IdempotencyKey>,
        err: &ValidationError,
    ) -> Self {
        Self {
            index,
            idempotency_key,
            reason: err.to_string(),
        }
    }
}

/// An authoritative record changed at or after the client's checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerChange {
    /// Server id.
    pub id: RecordId,
    /// Key the record was first uploaded with.
    pub idempotency_key: IdempotencyKey,
    /// Entry category.
    pub category: Category,
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
    /// Last server-side modification.
    pub updated_at: DateTime<Utc>,
    /// Whether the record was soft-deleted.
    #[serde(default)]
    pub deleted: bool,
    /// Category-specific fields.
    #[serde(flatten)]
    pub fields: LogFields,
}

/// Server response to a sync request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    /// Number of records newly inserted.
    pub inserted_count: usize,
    /// Key and id of every inserted record.
    #[serde(default)]
    pub inserted: Vec<InsertedRecord>,
    /// Keys that were already present (or repeated within the batch).
    #[serde(default)]
    pub duplicate_idempotency_keys: Vec<IdempotencyKey>,
    /// Items rejected by validation.
    #[serde(default)]
    pub rejected: Vec<RejectedItem>,
    /// Records changed at or after the checkpoint, newest first.
    #[serde(default)]
    pub server_changes: Vec<ServerChange>,
    /// The client's next checkpoint.
    pub synced_at: DateTime<Utc>,
}

impl SyncResponse {
    /// Encodes to JSON bytes.
    pub fn to_json(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Query parameters for the recent-records read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentRecordsQuery {
    /// Inclusive lower bound on event timestamp.
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound on event timestamp.
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    /// Requested maximum; the server caps it.
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Response of the recent-records read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentRecordsResponse {
    /// Owner queried.
    pub owner_id: OwnerId,
    /// Matching records, newest event first.
    pub records: Vec<ServerChange>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        "2026-03-01T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn wire_record_uses_camel_case_and_flattened_fields() {
        let record = WireRecord {
            idempotency_key: IdempotencyKey::new("k1"),
            category: Category::Walk,
            timestamp: now(),
            fields: LogFields::default().with_duration(25),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({
                "idempotencyKey": "k1",
                "category": "walk",
                "timestamp": "2026-03-01T12:00:00Z",
                "durationMinutes": 25
            })
        );
    }

    #[test]
    fn decode_batch_rejects_items_individually() {
        let request = InboundSyncRequest {
            owner_id: OwnerId::new("pet"),
            checkpoint: None,
            batch: vec![
                json!({"idempotencyKey": "a", "category": "meal", "timestamp": "2026-03-01T08:00:00Z"}),
                json!({"idempotencyKey": "b", "category": "teleport", "timestamp": "2026-03-01T08:00:00Z"}),
                json!({"idempotencyKey": "c", "category": "symptom", "timestamp": "2026-03-01T08:00:00Z"}),
                json!(42),
            ],
        };

        let (valid, rejected) = request.decode_batch(now());
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].0, 0);
        assert_eq!(rejected.len(), 3);
        assert_eq!(rejected[0].index, 1);
        assert_eq!(rejected[0].idempotency_key, Some(IdempotencyKey::new("b")));
        assert!(rejected[1].reason.contains("severity"));
        assert_eq!(rejected[2].idempotency_key, None);
    }

    #[test]
    fn response_tolerates_missing_optional_lists() {
        let body = br#"{"insertedCount":0,"duplicateIdempotencyKeys":["x"],"serverChanges":[],"syncedAt":"2026-03-01T12:00:00Z"}"#;
        let response = SyncResponse::from_json(body).unwrap();
        assert_eq!(response.duplicate_idempotency_keys, vec![IdempotencyKey::new("x")]);
        assert!(response.inserted.is_empty());
        assert!(response.rejected.is_empty());
    }

    #[test]
    fn inbound_from_typed_request_preserves_items() {
        let request = SyncRequest::new(
            OwnerId::new("pet"),
            Some(now()),
            vec![WireRecord {
                idempotency_key: IdempotencyKey::new("k"),
                category: Category::Water,
                timestamp: now(),
                fields: LogFields::default().with_quantity(200.0, "ml"),
            }],
        );
        let inbound = InboundSyncRequest::try_from(&request).unwrap();
        let (valid, rejected) = inbound.decode_batch(now());
        assert!(rejected.is_empty());
        assert_eq!(valid[0].1, request.batch[0]);
        assert_eq!(inbound.checkpoint, Some(now()));
    }
}
