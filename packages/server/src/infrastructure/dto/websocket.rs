//! WebSocket frame DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::IntoDeserializer};

use crate::domain::{MessageKind, SignalPayload};

/// Frame sent to participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub r#type: MessageKind,
    pub id: String,
    pub username: String,
    pub content: String,
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub room_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<SignalPayload>,
}

/// Frame received from a participant.
///
/// Identity, room, id and timestamp fields sent by the participant are not
/// read; the connection stamps its own.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ClientFrame {
    #[serde(default, deserialize_with = "deserialize_kind")]
    pub r#type: Option<MessageKind>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub target_user: Option<String>,
    #[serde(default, alias = "webrtc_data")]
    pub payload: Option<serde_json::Value>,
}

impl ClientFrame {
    /// Parse a text frame. A JSON string is unwrapped into chat text; anything
    /// else that is not a JSON object is taken verbatim as chat text.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(value @ serde_json::Value::Object(_)) => serde_json::from_value(value),
            Ok(serde_json::Value::String(content)) => Ok(Self::plain_text(&content)),
            _ => Ok(Self::plain_text(text)),
        }
    }

    pub fn plain_text(text: &str) -> Self {
        Self {
            content: text.to_string(),
            ..Self::default()
        }
    }
}

fn serialize_timestamp<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&agora_shared::time::to_rfc3339_millis(*at))
}

/// Missing, `null` and `""` all mean "unset".
fn deserialize_kind<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<MessageKind>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(kind) => MessageKind::deserialize(kind.into_deserializer()).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_signal_frame() {
        // テスト項目: シグナリングフレームが解析される (webrtc_data も payload として扱う)
        // given (前提条件):
        let text = r#"{
            "type": "webrtc_offer",
            "target_user": "bob",
            "webrtc_data": {"offer": {"type": "offer", "sdp": "v=0"}},
            "timestamp": "2024-01-01T00:00:00.000Z"
        }"#;

        // when (操作):
        let frame = ClientFrame::parse(text).unwrap();

        // then (期待する結果):
        assert_eq!(frame.r#type, Some(MessageKind::WebrtcOffer));
        assert_eq!(frame.target_user.as_deref(), Some("bob"));
        assert!(frame.payload.is_some());
    }

    #[test]
    fn test_parse_empty_type_means_unset() {
        // テスト項目: type が空文字列なら未指定として扱われる
        // given (前提条件):
        let text = r#"{"type": "", "content": "hello"}"#;

        // when (操作):
        let frame = ClientFrame::parse(text).unwrap();

        // then (期待する結果):
        assert_eq!(frame.r#type, None);
        assert_eq!(frame.content, "hello");
    }

    #[test]
    fn test_parse_non_json_as_plain_text() {
        // テスト項目: JSON でないテキストはプレーンなチャット本文として扱われる
        // given (前提条件):
        let text = "just text";

        // when (操作):
        let frame = ClientFrame::parse(text).unwrap();

        // then (期待する結果):
        assert_eq!(frame, ClientFrame::plain_text("just text"));
    }

    #[test]
    fn test_parse_json_string_is_unwrapped() {
        // テスト項目: JSON 文字列は引用符を外したチャット本文になる
        // given (前提条件):
        let text = r#""hi""#;

        // when (操作):
        let frame = ClientFrame::parse(text).unwrap();

        // then (期待する結果):
        assert_eq!(frame, ClientFrame::plain_text("hi"));
    }

    #[test]
    fn test_parse_json_scalar_is_kept_verbatim() {
        // テスト項目: 数値など文字列以外の JSON スカラーはそのままの本文になる
        // given (前提条件):
        let text = "42";

        // when (操作):
        let frame = ClientFrame::parse(text).unwrap();

        // then (期待する結果):
        assert_eq!(frame, ClientFrame::plain_text("42"));
    }

    #[test]
    fn test_parse_unknown_type_is_an_error() {
        // テスト項目: 未知の type を持つ JSON オブジェクトはエラーになる
        // given (前提条件):
        let text = r#"{"type": "typing"}"#;

        // when (操作):
        let result = ClientFrame::parse(text);

        // then (期待する結果):
        assert!(result.is_err());
    }

    #[test]
    fn test_wire_message_omits_absent_optional_fields() {
        // テスト項目: target_user と payload が無い場合はシリアライズされない
        // given (前提条件):
        let wire = WireMessage {
            r#type: MessageKind::Chat,
            id: "id-1".to_string(),
            username: "alice".to_string(),
            content: "hi".to_string(),
            timestamp: DateTime::from_timestamp_millis(1_672_531_200_123).unwrap(),
            room_id: "general".to_string(),
            target_user: None,
            payload: None,
        };

        // when (操作):
        let json: serde_json::Value = serde_json::to_value(&wire).unwrap();

        // then (期待する結果):
        assert_eq!(
            json,
            serde_json::json!({
                "type": "chat",
                "id": "id-1",
                "username": "alice",
                "content": "hi",
                "timestamp": "2023-01-01T00:00:00.123Z",
                "room_id": "general",
            })
        );
    }
}
