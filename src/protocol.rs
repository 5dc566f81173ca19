//! JSON wire protocol for room-scoped collaboration events.
//!
//! Every frame is a JSON object tagged with a `"type"` field and stamped
//! with the originating participant's username:
//! ```text
//! {"type":"update_item","category":"Opportunity","index":0,
//!  "content":"new market","username":"alice"}
//! ```
//!
//! Frames that fail to decode (malformed JSON, unrecognized tag) are
//! reported as [`ProtocolError`]; callers log and drop the single frame
//! without terminating the channel.

use serde::{Deserialize, Serialize};

use crate::document::Category;

/// Whether a participant is entering or leaving a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditStatus {
    Start,
    Stop,
}

/// A single collaboration event, tagged on the wire by `"type"`.
///
/// `Online`/`Offline` are presence announcements with no reply expected.
/// `UpdateTitle`/`UpdateItem` carry content edits resolved last-writer-wins.
/// `EditingField` moves a field lock (see [`crate::session::EditorSession`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    Online {
        username: String,
    },
    Offline {
        username: String,
    },
    UpdateTitle {
        title: String,
        username: String,
    },
    UpdateItem {
        category: Category,
        index: usize,
        content: String,
        username: String,
    },
    EditingField {
        category: Category,
        index: usize,
        username: String,
        status: EditStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
    },
}

impl ChangeEvent {
    /// The username of the participant this event originated from.
    pub fn username(&self) -> &str {
        match self {
            Self::Online { username }
            | Self::Offline { username }
            | Self::UpdateTitle { username, .. }
            | Self::UpdateItem { username, .. }
            | Self::EditingField { username, .. } => username,
        }
    }

    /// Serialize to the JSON wire format.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Deserialize from the JSON wire format.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

/// Fixed display palette, shared with the web front end.
const USER_COLORS: [&str; 5] = ["#FF5733", "#33C3FF", "#9D33FF", "#33FF57", "#FFC300"];

/// Deterministic display color for a username.
///
/// Same username always maps to the same color within a process;
/// collisions between different usernames are acceptable. The hash is
/// the classic `h = c + (h << 5) - h` over UTF-16 code units in
/// wrapping 32-bit arithmetic, the same scheme the web front end uses.
pub fn user_color(username: &str) -> &'static str {
    let mut hash: i32 = 0;
    for code in username.encode_utf16() {
        hash = (code as i32).wrapping_add(hash.wrapping_shl(5).wrapping_sub(hash));
    }
    USER_COLORS[(hash.unsigned_abs() as usize) % USER_COLORS.len()]
}

/// Protocol errors.
#[derive(Debug, Clone)]
pub enum ProtocolError {
    Encode(String),
    Decode(String),
    ConnectionClosed,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encode(e) => write!(f, "Encode error: {e}"),
            Self::Decode(e) => write!(f, "Decode error: {e}"),
            Self::ConnectionClosed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for ProtocolError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_item_roundtrip() {
        let event = ChangeEvent::UpdateItem {
            category: Category::Opportunity,
            index: 0,
            content: "new market".into(),
            username: "alice".into(),
        };
        let encoded = event.encode().unwrap();
        let decoded = ChangeEvent::decode(&encoded).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_wire_format_matches_front_end() {
        // Exact shape the web client emits.
        let text = r#"{"type":"update_item","category":"Opportunity","index":0,"content":"new market","username":"alice"}"#;
        let event = ChangeEvent::decode(text).unwrap();
        assert_eq!(
            event,
            ChangeEvent::UpdateItem {
                category: Category::Opportunity,
                index: 0,
                content: "new market".into(),
                username: "alice".into(),
            }
        );
    }

    #[test]
    fn test_editing_field_without_color() {
        let text = r#"{"type":"editing_field","category":"Strength","index":2,"username":"bob","status":"stop"}"#;
        let event = ChangeEvent::decode(text).unwrap();
        match event {
            ChangeEvent::EditingField { status, color, index, .. } => {
                assert_eq!(status, EditStatus::Stop);
                assert_eq!(index, 2);
                assert!(color.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_editing_field_with_color() {
        let event = ChangeEvent::EditingField {
            category: Category::Threat,
            index: 1,
            username: "carol".into(),
            status: EditStatus::Start,
            color: Some("#FF5733".into()),
        };
        let encoded = event.encode().unwrap();
        assert!(encoded.contains(r#""status":"start""#));
        assert!(encoded.contains(r##""color":"#FF5733""##));
        assert_eq!(ChangeEvent::decode(&encoded).unwrap(), event);
    }

    #[test]
    fn test_online_offline_tags() {
        let online = ChangeEvent::Online { username: "alice".into() };
        assert!(online.encode().unwrap().contains(r#""type":"online""#));

        let offline = ChangeEvent::decode(r#"{"type":"offline","username":"alice"}"#).unwrap();
        assert_eq!(offline, ChangeEvent::Offline { username: "alice".into() });
    }

    #[test]
    fn test_unknown_tag_is_error() {
        let err = ChangeEvent::decode(r#"{"type":"resync_request","username":"x"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_malformed_json_is_error() {
        assert!(ChangeEvent::decode("{not json").is_err());
    }

    #[test]
    fn test_username_accessor() {
        let event = ChangeEvent::UpdateTitle {
            title: "Q3 analysis".into(),
            username: "dave".into(),
        };
        assert_eq!(event.username(), "dave");
    }

    #[test]
    fn test_user_color_deterministic() {
        assert_eq!(user_color("alice"), user_color("alice"));
        assert!(USER_COLORS.contains(&user_color("bob")));
    }

    #[test]
    fn test_user_color_matches_front_end_hash() {
        // Hand-computed with the front end's algorithm.
        assert_eq!(user_color("alice"), "#FF5733");
    }

    #[test]
    fn test_user_color_empty_username() {
        assert_eq!(user_color(""), USER_COLORS[0]);
    }
}
