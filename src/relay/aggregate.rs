//! Fan-out reply merging.
//!
//! Handles exactly two reply shapes. The first reply that parses as an array
//! or an object fixes the shape; arrays are concatenated and objects are
//! unioned (later arrivals win on key collisions). Replies that do not parse,
//! or do not match the shape, are logged and dropped.

use super::types::ShardReply;

use axum::body::Bytes;
use serde_json::Value;

enum Merged {
    Array(Vec<Value>),
    Object(serde_json::Map<String, Value>),
}

/// Merges replies in the order given (arrival order). Returns `None` for an
/// empty input. When nothing could be merged the body is empty and the status
/// is the last reply's.
pub fn merge_replies(replies: &[ShardReply]) -> Option<ShardReply> {
    let last = replies.last()?;

    let mut merged: Option<Merged> = None;
    let mut status = None;

    for (idx, reply) in replies.iter().enumerate() {
        let value: Value = match serde_json::from_slice(&reply.body) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Dropping fan-out reply {}: unparsable body: {}", idx, e);
                continue;
            }
        };

        merged = match (merged.take(), value) {
            (None, Value::Array(items)) => Some(Merged::Array(items)),
            (None, Value::Object(members)) => Some(Merged::Object(members)),
            (Some(Merged::Array(mut acc)), Value::Array(items)) => {
                acc.extend(items);
                Some(Merged::Array(acc))
            }
            (Some(Merged::Object(mut acc)), Value::Object(members)) => {
                acc.extend(members);
                Some(Merged::Object(acc))
            }
            (previous, _) => {
                if previous.is_none() {
                    tracing::warn!("Dropping fan-out reply {}: neither array nor object", idx);
                } else {
                    tracing::warn!("Dropping fan-out reply {}: shape differs from first reply", idx);
                }
                merged = previous;
                continue;
            }
        };
        status = Some(reply.status);
    }

    let body = match merged {
        Some(Merged::Array(items)) => Value::Array(items).to_string(),
        Some(Merged::Object(members)) => Value::Object(members).to_string(),
        None => String::new(),
    };

    Some(ShardReply {
        status: status.unwrap_or(last.status),
        body: Bytes::from(body),
    })
}
