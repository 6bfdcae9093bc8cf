//! CBOR codec for serialized records.
//!
//! Each record is the kind-specific payload of one node, encoded after the
//! walker has replaced composite children with references. References are
//! CBOR tag 39 around a `[kind, uuid]` pair; everything else encodes as a
//! native CBOR primitive, so a stored string can never be mistaken for a
//! reference.

use ciborium::Value as Cbor;
use indexmap::IndexMap;
use uuid::Uuid;

use crate::ident::NodeId;
use crate::response::Response;
use crate::value::{Composite, Value};

/// CBOR tag wrapping a node reference.
pub const REF_TAG: u64 = 39;

/// Error producing a serialized record.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// A live node survived into the wire body; the walker substitutes
    /// references before encoding, so this indicates a bug in the caller
    /// encoding a body by hand.
    #[error("live node reference left in wire body")]
    LiveNode,
    #[error("CBOR write failed: {0}")]
    Cbor(String),
}

/// Error reading a serialized record back.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("CBOR read failed: {0}")]
    Cbor(String),
    #[error("malformed {0} record: {1}")]
    Malformed(&'static str, String),
    #[error("unknown function: {0}")]
    UnknownFunc(String),
    #[error("model conversion failed: {0}")]
    Model(String),
}

pub(crate) fn value_to_cbor(value: &Value) -> Result<Cbor, EncodeError> {
    Ok(match value {
        Value::Null => Cbor::Null,
        Value::Bool(b) => Cbor::Bool(*b),
        Value::Int(i) => Cbor::Integer((*i).into()),
        Value::Float(f) => Cbor::Float(*f),
        Value::Text(s) => Cbor::Text(s.clone()),
        Value::Ref(id) => ref_to_cbor(id),
        Value::Node(_) => return Err(EncodeError::LiveNode),
    })
}

fn ref_to_cbor(id: &NodeId) -> Cbor {
    Cbor::Tag(
        REF_TAG,
        Box::new(Cbor::Array(vec![
            Cbor::Text(id.kind().to_owned()),
            Cbor::Text(id.uuid().to_string()),
        ])),
    )
}

pub(crate) fn cbor_to_value(cbor: &Cbor) -> Result<Value, DecodeError> {
    match cbor {
        Cbor::Null => Ok(Value::Null),
        Cbor::Bool(b) => Ok(Value::Bool(*b)),
        Cbor::Integer(i) => i64::try_from(*i)
            .map(Value::Int)
            .map_err(|_| DecodeError::Malformed("value", "integer out of range".into())),
        Cbor::Float(f) => Ok(Value::Float(*f)),
        Cbor::Text(s) => Ok(Value::Text(s.clone())),
        Cbor::Tag(REF_TAG, inner) => cbor_to_ref(inner).map(Value::Ref),
        other => Err(DecodeError::Malformed(
            "value",
            format!("unexpected item {:?}", other),
        )),
    }
}

fn cbor_to_ref(inner: &Cbor) -> Result<NodeId, DecodeError> {
    let parts = inner
        .as_array()
        .filter(|a| a.len() == 2)
        .ok_or_else(|| DecodeError::Malformed("reference", "expected a [kind, uuid] pair".into()))?;
    let kind = parts[0]
        .as_text()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| DecodeError::Malformed("reference", "kind must be a non-empty string".into()))?;
    let uuid = parts[1]
        .as_text()
        .and_then(|u| Uuid::parse_str(u).ok())
        .ok_or_else(|| DecodeError::Malformed("reference", "bad uuid".into()))?;
    Ok(NodeId::from_parts(kind, uuid))
}

/// Encodes the kind-specific payload of a body whose composite children
/// have already been replaced by references.
pub(crate) fn encode_body(body: &Composite) -> Result<Vec<u8>, EncodeError> {
    let payload = match body {
        Composite::Record { fields, .. } => Cbor::Map(
            fields
                .iter()
                .map(|(name, value)| Ok((Cbor::Text(name.clone()), value_to_cbor(value)?)))
                .collect::<Result<_, EncodeError>>()?,
        ),
        Composite::List(items) | Composite::Set(items) => Cbor::Array(
            items
                .iter()
                .map(value_to_cbor)
                .collect::<Result<_, EncodeError>>()?,
        ),
        Composite::Map(entries) => Cbor::Array(
            entries
                .iter()
                .map(|(k, v)| Ok(Cbor::Array(vec![value_to_cbor(k)?, value_to_cbor(v)?])))
                .collect::<Result<_, EncodeError>>()?,
        ),
        Composite::Timestamp(instant) => Cbor::Integer(instant.timestamp_millis().into()),
        Composite::Func(func) => Cbor::Text(func.name().to_owned()),
        Composite::Response(response) => Cbor::Map(vec![
            (
                Cbor::Text("body".into()),
                Cbor::Bytes(response.body().to_vec()),
            ),
            (
                Cbor::Text("status".into()),
                Cbor::Integer(i64::from(response.status()).into()),
            ),
            (
                Cbor::Text("status_text".into()),
                Cbor::Text(response.status_text().to_owned()),
            ),
            (
                Cbor::Text("headers".into()),
                Cbor::Array(
                    response
                        .headers()
                        .iter()
                        .map(|(name, value)| {
                            Cbor::Array(vec![Cbor::Text(name.clone()), Cbor::Text(value.clone())])
                        })
                        .collect(),
                ),
            ),
        ]),
    };

    let mut buf = Vec::new();
    ciborium::into_writer(&payload, &mut buf).map_err(|e| EncodeError::Cbor(e.to_string()))?;
    Ok(buf)
}

fn read(bytes: &[u8]) -> Result<Cbor, DecodeError> {
    ciborium::from_reader(bytes).map_err(|e| DecodeError::Cbor(e.to_string()))
}

/// Decodes a record-kind payload into its fields.
pub(crate) fn decode_fields(bytes: &[u8]) -> Result<IndexMap<String, Value>, DecodeError> {
    let map = match read(bytes)? {
        Cbor::Map(entries) => entries,
        other => {
            return Err(DecodeError::Malformed(
                "record",
                format!("expected a map, got {:?}", other),
            ));
        }
    };
    map.into_iter()
        .map(|(name, value)| {
            let name = name
                .as_text()
                .ok_or_else(|| DecodeError::Malformed("record", "non-text field name".into()))?
                .to_owned();
            Ok((name, cbor_to_value(&value)?))
        })
        .collect()
}

/// Decodes a list- or set-kind payload into its items.
pub(crate) fn decode_items(bytes: &[u8]) -> Result<Vec<Value>, DecodeError> {
    let items = match read(bytes)? {
        Cbor::Array(items) => items,
        other => {
            return Err(DecodeError::Malformed(
                "sequence",
                format!("expected an array, got {:?}", other),
            ));
        }
    };
    items.iter().map(cbor_to_value).collect()
}

/// Decodes a map-kind payload into its ordered entries.
pub(crate) fn decode_entries(bytes: &[u8]) -> Result<Vec<(Value, Value)>, DecodeError> {
    let entries = match read(bytes)? {
        Cbor::Array(entries) => entries,
        other => {
            return Err(DecodeError::Malformed(
                "mapping",
                format!("expected an array of pairs, got {:?}", other),
            ));
        }
    };
    entries
        .into_iter()
        .map(|entry| {
            let pair = entry
                .as_array()
                .filter(|p| p.len() == 2)
                .ok_or_else(|| DecodeError::Malformed("mapping", "entry is not a pair".into()))?;
            Ok((cbor_to_value(&pair[0])?, cbor_to_value(&pair[1])?))
        })
        .collect()
}

/// Decodes a timestamp payload (epoch milliseconds).
pub(crate) fn decode_timestamp(bytes: &[u8]) -> Result<chrono::DateTime<chrono::Utc>, DecodeError> {
    let millis = match read(bytes)? {
        Cbor::Integer(i) => i64::try_from(i)
            .map_err(|_| DecodeError::Malformed("timestamp", "epoch out of range".into()))?,
        other => {
            return Err(DecodeError::Malformed(
                "timestamp",
                format!("expected an integer, got {:?}", other),
            ));
        }
    };
    chrono::DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| DecodeError::Malformed("timestamp", "epoch out of range".into()))
}

/// Decodes a func payload (the registered name).
pub(crate) fn decode_func_name(bytes: &[u8]) -> Result<String, DecodeError> {
    match read(bytes)? {
        Cbor::Text(name) => Ok(name),
        other => Err(DecodeError::Malformed(
            "func",
            format!("expected a name, got {:?}", other),
        )),
    }
}

/// Decodes a response payload.
pub(crate) fn decode_response(bytes: &[u8]) -> Result<Response, DecodeError> {
    let malformed = |detail: String| DecodeError::Malformed("response", detail);
    let map = match read(bytes)? {
        Cbor::Map(entries) => entries,
        other => return Err(malformed(format!("expected a map, got {:?}", other))),
    };

    let mut body = None;
    let mut status = None;
    let mut status_text = None;
    let mut headers = Vec::new();

    for (name, value) in &map {
        match name.as_text() {
            Some("body") => {
                body = Some(
                    value
                        .as_bytes()
                        .ok_or_else(|| malformed("body must be bytes".into()))?
                        .clone(),
                );
            }
            Some("status") => {
                let code = value
                    .as_integer()
                    .and_then(|i| i64::try_from(i).ok())
                    .and_then(|i| u16::try_from(i).ok())
                    .ok_or_else(|| malformed("status must be a u16".into()))?;
                status = Some(code);
            }
            Some("status_text") => {
                status_text = Some(
                    value
                        .as_text()
                        .ok_or_else(|| malformed("status_text must be text".into()))?
                        .to_owned(),
                );
            }
            Some("headers") => {
                let entries = value
                    .as_array()
                    .ok_or_else(|| malformed("headers must be an array".into()))?;
                for entry in entries {
                    let pair = entry
                        .as_array()
                        .filter(|p| p.len() == 2)
                        .ok_or_else(|| malformed("header entry is not a pair".into()))?;
                    let header_name = pair[0]
                        .as_text()
                        .ok_or_else(|| malformed("header name must be text".into()))?;
                    let header_value = pair[1]
                        .as_text()
                        .ok_or_else(|| malformed("header value must be text".into()))?;
                    headers.push((header_name.to_owned(), header_value.to_owned()));
                }
            }
            _ => {}
        }
    }

    Ok(Response::from_parts(
        status.ok_or_else(|| malformed("missing status".into()))?,
        status_text.ok_or_else(|| malformed("missing status_text".into()))?,
        headers,
        body.ok_or_else(|| malformed("missing body".into()))?,
    ))
}
