//! Firehose frame decoding
//!
//! Each binary WebSocket message from `com.atproto.sync.subscribeRepos` is
//! two DAG-CBOR values back to back:
//!
//! - a header map `{op, t}` where `op` is `1` for a message and `-1` for an
//!   error, and `t` names the message type (`#commit`, `#identity`, ...)
//! - the message body
//!
//! Only `#commit` bodies are decoded. Every other well-formed message type is
//! reported as [`Decoded::Skip`].

use std::io::Cursor;

use ciborium::Value;

use crate::error::DecodeError;
use crate::types::{Action, CommitEvent, Did, Operation};

/// CBOR tag used by DAG-CBOR for CID links
const CID_TAG: u64 = 42;

const OP_MESSAGE: i64 = 1;
const OP_ERROR: i64 = -1;

/// Outcome of decoding one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A repository commit
    Commit(CommitEvent),
    /// A well-formed message of another type (e.g. `identity`, `info`)
    Skip(String),
}

/// Decode one raw firehose frame
pub fn decode_frame(bytes: &[u8]) -> Result<Decoded, DecodeError> {
    let mut cursor = Cursor::new(bytes);

    let header: Value = ciborium::de::from_reader(&mut cursor).map_err(|e| DecodeError::Cbor {
        part: "header",
        reason: e.to_string(),
    })?;
    let header = header
        .as_map()
        .ok_or_else(|| DecodeError::Header("header is not a map".to_string()))?;

    let op = field(header, "op")
        .and_then(as_i64)
        .ok_or_else(|| DecodeError::Header("missing integer field 'op'".to_string()))?;

    if cursor.position() as usize >= bytes.len() {
        return Err(DecodeError::Header("frame has no body".to_string()));
    }
    let body: Value = ciborium::de::from_reader(&mut cursor).map_err(|e| DecodeError::Cbor {
        part: "body",
        reason: e.to_string(),
    })?;

    match op {
        OP_MESSAGE => {
            let kind = field(header, "t")
                .and_then(Value::as_text)
                .ok_or_else(|| DecodeError::Header("message frame without 't'".to_string()))?;
            match kind {
                "#commit" => decode_commit(&body).map(Decoded::Commit),
                other => Ok(Decoded::Skip(other.trim_start_matches('#').to_string())),
            }
        }
        OP_ERROR => Err(decode_error_frame(&body)),
        other => Err(DecodeError::UnknownOp(other)),
    }
}

/// Sequence number of a frame whose body is CBOR with an integer `seq`
///
/// Works on frames that [`decode_frame`] rejects further down, so a caller
/// can resume past them.
pub fn frame_seq(bytes: &[u8]) -> Option<i64> {
    let mut cursor = Cursor::new(bytes);
    let _header: Value = ciborium::de::from_reader(&mut cursor).ok()?;
    let body: Value = ciborium::de::from_reader(&mut cursor).ok()?;
    body.as_map()
        .and_then(|map| field(map, "seq"))
        .and_then(as_i64)
}

fn decode_commit(body: &Value) -> Result<CommitEvent, DecodeError> {
    const KIND: &str = "commit";

    let map = body
        .as_map()
        .ok_or_else(|| DecodeError::body(KIND, "body is not a map"))?;

    let seq = field(map, "seq")
        .and_then(as_i64)
        .ok_or_else(|| DecodeError::body(KIND, "missing integer field 'seq'"))?;

    let repo = field(map, "repo")
        .and_then(Value::as_text)
        .ok_or_else(|| DecodeError::body(KIND, "missing text field 'repo'"))?;
    let repo = Did::parse(repo).map_err(|e| DecodeError::body(KIND, e.to_string()))?;

    let ops = field(map, "ops")
        .and_then(Value::as_array)
        .ok_or_else(|| DecodeError::body(KIND, "missing array field 'ops'"))?
        .iter()
        .enumerate()
        .map(|(i, op)| decode_operation(op).map_err(|reason| DecodeError::body(KIND, format!("ops[{i}]: {reason}"))))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CommitEvent {
        seq,
        repo,
        rev: field(map, "rev").and_then(Value::as_text).map(str::to_string),
        time: field(map, "time").and_then(Value::as_text).map(str::to_string),
        ops,
        too_big: field(map, "tooBig").and_then(Value::as_bool).unwrap_or(false),
    })
}

fn decode_operation(value: &Value) -> Result<Operation, String> {
    let map = value.as_map().ok_or("operation is not a map")?;

    let action = field(map, "action")
        .and_then(Value::as_text)
        .ok_or("missing text field 'action'")?;
    let action = Action::from_wire(action).ok_or_else(|| format!("unknown action '{action}'"))?;

    let path = field(map, "path")
        .and_then(Value::as_text)
        .ok_or("missing text field 'path'")?;

    let cid = match field(map, "cid") {
        None | Some(Value::Null) => None,
        Some(v) => Some(decode_cid(v).ok_or("field 'cid' is not a CID link")?),
    };

    Ok(Operation {
        action,
        path: path.to_string(),
        cid,
    })
}

/// Render a tag-42 CID link as hex, without the leading multibase identity byte
fn decode_cid(value: &Value) -> Option<String> {
    match value {
        Value::Tag(CID_TAG, inner) => match inner.as_ref() {
            Value::Bytes(bytes) => {
                let raw = bytes.strip_prefix(&[0u8]).unwrap_or(bytes);
                Some(hex::encode(raw))
            }
            _ => None,
        },
        _ => None,
    }
}

fn decode_error_frame(body: &Value) -> DecodeError {
    let map = body.as_map();
    let text = |key: &str| {
        map.and_then(|m| field(m, key))
            .and_then(Value::as_text)
            .map(str::to_string)
    };
    DecodeError::ErrorFrame {
        error: text("error").unwrap_or_else(|| "Unknown".to_string()),
        message: text("message"),
    }
}

fn field<'a>(map: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    map.iter().find_map(|(k, v)| match k {
        Value::Text(name) if name == key => Some(v),
        _ => None,
    })
}

fn as_i64(value: &Value) -> Option<i64> {
    value.as_integer().and_then(|i| i64::try_from(i).ok())
}
