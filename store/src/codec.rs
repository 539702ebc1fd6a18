//! Conversion between typed models and stored [`Record`]s.
//!
//! This is the only place where numeric types are normalized for storage:
//! embedding components and scores are f32 in memory and JSON numbers in
//! records. Non-finite values are rejected instead of being stored as null.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::{Record, StoreError, StoreResult};

/// Generates a new record id (UUID v4, 32 hex digits).
pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Serializes a model into a record.
pub fn to_record<T: Serialize>(value: &T) -> StoreResult<Record> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::InvalidRecord(format!(
            "expected an object, got {other}"
        ))),
    }
}

/// Deserializes a record into a model.
pub fn from_record<T: DeserializeOwned>(record: Record) -> StoreResult<T> {
    Ok(serde_json::from_value(Value::Object(record))?)
}

/// Returns the record's `id` field.
pub fn record_id(record: &Record) -> StoreResult<&str> {
    record
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::InvalidRecord("missing string field \"id\"".into()))
}

/// Serde adapter for f32 vectors (`#[serde(with = "codec::vector")]`).
pub mod vector {
    use serde::de::Error as _;
    use serde::ser::{Error as _, SerializeSeq};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &[f32], s: S) -> Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(v.len()))?;
        for (i, &x) in v.iter().enumerate() {
            if !x.is_finite() {
                return Err(S::Error::custom(format!("non-finite component {x} at {i}")));
            }
            seq.serialize_element(&f64::from(x))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<f32>, D::Error> {
        let raw = Vec::<f64>::deserialize(d)?;
        raw.into_iter()
            .map(|x| {
                let y = x as f32;
                if y.is_finite() {
                    Ok(y)
                } else {
                    Err(D::Error::custom(format!("component {x} out of f32 range")))
                }
            })
            .collect()
    }
}

/// Serde adapter for f32 scalars (`#[serde(with = "codec::scalar")]`).
pub mod scalar {
    use serde::de::Error as _;
    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(x: &f32, s: S) -> Result<S::Ok, S::Error> {
        if !x.is_finite() {
            return Err(S::Error::custom(format!("non-finite value {x}")));
        }
        s.serialize_f64(f64::from(*x))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f32, D::Error> {
        let x = f64::deserialize(d)?;
        let y = x as f32;
        if y.is_finite() {
            Ok(y)
        } else {
            Err(D::Error::custom(format!("value {x} out of f32 range")))
        }
    }
}
