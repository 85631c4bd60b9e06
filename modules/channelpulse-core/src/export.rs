//! Telegram Desktop data-export parsing. The export's `result.json` lists
//! joined chats under `chats.list` and departed ones under
//! `left_chats.list`; only channel-type entries are of interest here.

use serde::Deserialize;

use channelpulse_common::{Channel, PulseError};

#[derive(Debug, Deserialize)]
struct ExportFile {
    #[serde(default)]
    chats: Option<ChatList>,
    #[serde(default)]
    left_chats: Option<ChatList>,
}

#[derive(Debug, Deserialize)]
struct ChatList {
    #[serde(default)]
    list: Vec<ExportChat>,
}

#[derive(Debug, Deserialize)]
struct ExportChat {
    id: serde_json::Value,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    messages: Vec<ExportMessage>,
}

#[derive(Debug, Deserialize)]
struct ExportMessage {
    #[serde(default)]
    date: Option<String>,
}

/// Parse an uploaded export file into the channels it contains.
/// Accepts the full export (`chats` / `left_chats`) and, for convenience,
/// a bare `{"channels": [...]}` document.
pub fn parse_telegram_export(raw: &[u8]) -> Result<Vec<Channel>, PulseError> {
    // Bare channel-list documents short-circuit.
    #[derive(Deserialize)]
    struct BareList {
        channels: Vec<Channel>,
    }
    if let Ok(bare) = serde_json::from_slice::<BareList>(raw) {
        return Ok(bare.channels);
    }

    let export: ExportFile = serde_json::from_slice(raw)
        .map_err(|e| PulseError::Validation(format!("not a Telegram export: {e}")))?;

    let mut channels = Vec::new();
    if let Some(chats) = export.chats {
        collect_channels(chats.list, false, &mut channels);
    }
    if let Some(left) = export.left_chats {
        collect_channels(left.list, true, &mut channels);
    }

    if channels.is_empty() {
        return Err(PulseError::Validation(
            "export contains no channels".to_string(),
        ));
    }
    Ok(channels)
}

fn collect_channels(chats: Vec<ExportChat>, left: bool, out: &mut Vec<Channel>) {
    for chat in chats {
        if !chat.kind.contains("channel") {
            continue;
        }
        let id = match chat.id {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            _ => continue,
        };
        let last_message_date = chat
            .messages
            .iter()
            .rev()
            .find_map(|m| m.date.clone());
        out.push(Channel {
            id,
            name: chat.name.unwrap_or_default(),
            url: chat.url,
            last_message_date,
            left: left.then_some(true),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_channels_from_chats_and_left_chats() {
        let raw = r#"{
            "chats": {"list": [
                {"id": 100, "name": "Crypto News", "type": "public_channel",
                 "messages": [{"date": "2026-07-01T00:00:00"}, {"date": "2026-07-30T00:00:00"}]},
                {"id": 101, "name": "Friends", "type": "personal_chat"}
            ]},
            "left_chats": {"list": [
                {"id": 102, "name": "Old Channel", "type": "private_channel"}
            ]}
        }"#;
        let channels = parse_telegram_export(raw.as_bytes()).unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].id, "100");
        assert_eq!(
            channels[0].last_message_date.as_deref(),
            Some("2026-07-30T00:00:00")
        );
        assert_eq!(channels[1].id, "102");
        assert_eq!(channels[1].left, Some(true));
    }

    #[test]
    fn accepts_bare_channel_lists() {
        let raw = r#"{"channels": [{"id": "foo", "name": "Foo", "url": "https://t.me/foo"}]}"#;
        let channels = parse_telegram_export(raw.as_bytes()).unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].url.as_deref(), Some("https://t.me/foo"));
    }

    #[test]
    fn rejects_non_export_documents() {
        assert!(parse_telegram_export(b"[1,2,3]").is_err());
        assert!(parse_telegram_export(b"not json").is_err());
        assert!(parse_telegram_export(br#"{"chats": {"list": []}}"#).is_err());
    }
}
