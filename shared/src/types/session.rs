use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Session token types
// ---------------------------------------------------------------------------

/// The two TTL classes of session token.
///
/// The class is stored in the token record *and* echoed back to the client
/// via the `save` cookie, so a later request can renew against the right
/// TTL without an extra store round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenType {
    /// Short-lived session, the default.  No `Expires` on its cookie, so
    /// it dies with the browser.
    UnsavedSession,
    /// Long-lived "remember me" session.
    SavedSession,
}

impl TokenType {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::UnsavedSession => 0,
            Self::SavedSession => 1,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::UnsavedSession),
            1 => Some(Self::SavedSession),
            _ => None,
        }
    }

    pub fn is_saved(self) -> bool {
        matches!(self, Self::SavedSession)
    }
}

// ---------------------------------------------------------------------------
// Session record
// ---------------------------------------------------------------------------

/// A resolved session token.
///
/// `fields` carries everything beyond the key: `uid` once the user logged
/// in, `create_ip` / `create_ua` from the request that created the token,
/// `update_ip` / `update_ua` refreshed on every renewal, plus whatever
/// extra data a view attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub token_type: TokenType,
    /// Unix timestamp (seconds).
    pub expire_at: i64,
    pub fields: Map<String, Value>,
}

impl Session {
    /// Authenticated user id, if any.  Absent for sessions that only carry
    /// pre-login state.
    pub fn uid(&self) -> Option<i64> {
        self.fields.get("uid").and_then(Value::as_i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn token_type_i64_roundtrip() {
        assert_eq!(
            TokenType::from_i64(TokenType::SavedSession.as_i64()),
            Some(TokenType::SavedSession)
        );
        assert_eq!(
            TokenType::from_i64(TokenType::UnsavedSession.as_i64()),
            Some(TokenType::UnsavedSession)
        );
        assert_eq!(TokenType::from_i64(7), None);
    }

    #[test]
    fn uid_read_from_fields() {
        let mut fields = Map::new();
        fields.insert("uid".into(), json!(42));
        let s = Session {
            id: "abc".into(),
            token_type: TokenType::UnsavedSession,
            expire_at: 0,
            fields,
        };
        assert_eq!(s.uid(), Some(42));
    }

    #[test]
    fn uid_absent_when_not_attached() {
        let s = Session {
            id: "abc".into(),
            token_type: TokenType::SavedSession,
            expire_at: 0,
            fields: Map::new(),
        };
        assert_eq!(s.uid(), None);
    }
}
