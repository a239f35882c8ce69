//! Relay cursor and global ID encoding
//!
//! Tokens are plain base64 so they interoperate with any server that uses the
//! `graphql-relay` conventions:
//!
//! - offset cursor: `base64("arrayconnection:<index>")`
//! - global ID: `base64("<TypeName>:<id>")`

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};

use crate::RelayError;

const ARRAY_CONNECTION_PREFIX: &str = "arrayconnection:";

/// Cursor encoding/decoding
pub struct CursorCodec;

impl CursorCodec {
    /// Wrap a raw token payload
    pub fn encode(payload: &str) -> String {
        BASE64.encode(payload)
    }

    /// Unwrap a token back to its UTF-8 payload
    pub fn decode(token: &str) -> crate::Result<String> {
        BASE64
            .decode(token)
            .map_err(|e| RelayError::MalformedCursor(format!("{token:?}: {e}")))
            .and_then(|bytes| {
                String::from_utf8(bytes)
                    .map_err(|e| RelayError::MalformedCursor(format!("{token:?}: {e}")))
            })
    }

    /// Encode the zero-based position of an item as an `arrayconnection` cursor
    pub fn encode_offset(index: usize) -> String {
        Self::encode(&format!("{ARRAY_CONNECTION_PREFIX}{index}"))
    }

    /// Decode an `arrayconnection` cursor back to its position
    pub fn decode_offset(cursor: &str) -> crate::Result<usize> {
        let payload = Self::decode(cursor)?;
        let index = payload.strip_prefix(ARRAY_CONNECTION_PREFIX).ok_or_else(|| {
            RelayError::MalformedCursor(format!("missing arrayconnection prefix in {payload:?}"))
        })?;
        if !is_canonical_number(index) {
            return Err(RelayError::MalformedCursor(format!(
                "index in {payload:?} is not a plain decimal"
            )));
        }
        index
            .parse::<usize>()
            .map_err(|e| RelayError::MalformedCursor(format!("{payload:?}: {e}")))
    }
}

/// ASCII digits only, no sign and no leading zeros, so decoding re-encodes to the same token
fn is_canonical_number(digits: &str) -> bool {
    match digits.as_bytes() {
        [] => false,
        [b'0'] => true,
        [b'0', ..] => false,
        bytes => bytes.iter().all(u8::is_ascii_digit),
    }
}

/// Type name and numeric identifier packed into a single opaque token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GlobalId {
    pub type_name: String,
    pub id: u64,
}

impl GlobalId {
    pub fn new(type_name: impl Into<String>, id: u64) -> Self {
        Self {
            type_name: type_name.into(),
            id,
        }
    }

    /// Encode to `base64("<TypeName>:<id>")`
    pub fn encode(&self) -> String {
        CursorCodec::encode(&format!("{}:{}", self.type_name, self.id))
    }

    /// Decode a global ID token.
    ///
    /// The payload must contain exactly one `:` with a non-empty type name
    /// before it and an unsigned integer after it. Anything else is rejected
    /// rather than yielding a partial value.
    pub fn decode(token: &str) -> crate::Result<Self> {
        let payload = CursorCodec::decode(token)
            .map_err(|e| RelayError::MalformedGlobalId(e.to_string()))?;

        let mut parts = payload.split(':');
        let (type_name, id) = match (parts.next(), parts.next(), parts.next()) {
            (Some(type_name), Some(id), None) if !type_name.is_empty() => (type_name, id),
            _ => {
                return Err(RelayError::MalformedGlobalId(format!(
                    "expected <TypeName>:<id>, got {payload:?}"
                )))
            }
        };

        if !is_canonical_number(id) {
            return Err(RelayError::MalformedGlobalId(format!(
                "id in {payload:?} is not a plain decimal"
            )));
        }
        let id = id
            .parse::<u64>()
            .map_err(|e| RelayError::MalformedGlobalId(format!("{payload:?}: {e}")))?;

        Ok(Self::new(type_name, id))
    }
}

/// Shorthand for [`CursorCodec::encode_offset`]
pub fn cursor(index: usize) -> String {
    CursorCodec::encode_offset(index)
}

/// Shorthand for [`GlobalId::encode`]
pub fn to_global_id(type_name: &str, id: u64) -> String {
    GlobalId::new(type_name, id).encode()
}

/// Shorthand for [`GlobalId::decode`]
pub fn from_global_id(token: &str) -> crate::Result<GlobalId> {
    GlobalId::decode(token)
}
