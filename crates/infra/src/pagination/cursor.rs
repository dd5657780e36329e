use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::keyset::Position;

/// A cursor token could not be used to resume a listing.
///
/// Malformed tokens and tokens minted under a different filter list are the
/// same condition to callers; `reason` is for logs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid cursor: {reason}")]
pub struct InvalidCursor {
    reason: String,
}

impl InvalidCursor {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Decoded pagination cursor: last-seen position plus its filter fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    position: Position,
    filters: Vec<i64>,
}

/// JSON layout inside the token.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CursorWire {
    created_at: String,
    position: i64,
    filters: Vec<i64>,
}

impl Cursor {
    pub fn new(position: Position, filters: Vec<i64>) -> Self {
        Self { position, filters }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn filters(&self) -> &[i64] {
        &self.filters
    }

    /// Opaque token for this cursor.
    pub fn encode(&self) -> String {
        let wire = CursorWire {
            created_at: self
                .position
                .created_at
                .to_rfc3339_opts(SecondsFormat::Nanos, true),
            position: self.position.sequence,
            filters: self.filters.clone(),
        };
        // Strings and integers only; serialization cannot fail.
        let body = serde_json::to_vec(&wire).unwrap_or_default();
        STANDARD.encode(body)
    }

    /// Parse a token produced by [`Cursor::encode`].
    pub fn decode(token: &str) -> Result<Self, InvalidCursor> {
        let raw = STANDARD
            .decode(token.as_bytes())
            .map_err(|e| InvalidCursor::new(format!("not base64: {e}")))?;
        let wire: CursorWire = serde_json::from_slice(&raw)
            .map_err(|e| InvalidCursor::new(format!("malformed payload: {e}")))?;
        let created_at = DateTime::parse_from_rfc3339(&wire.created_at)
            .map_err(|e| InvalidCursor::new(format!("malformed created_at: {e}")))?
            .with_timezone(&Utc);

        Ok(Self {
            position: Position {
                created_at,
                sequence: wire.position,
            },
            filters: wire.filters,
        })
    }

    /// Decode `token` and check it was minted under exactly `filters`
    /// (order-sensitive).
    pub fn resume(token: &str, filters: &[i64]) -> Result<Position, InvalidCursor> {
        let cursor = Self::decode(token)?;
        if cursor.filters != filters {
            return Err(InvalidCursor::new(format!(
                "cursor was issued for filters {:?}, request has {:?}",
                cursor.filters, filters
            )));
        }
        Ok(cursor.position)
    }
}
