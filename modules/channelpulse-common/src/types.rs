use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

/// What kind of stream a source is. Stored lowercase in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Telegram,
    Rss,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Telegram => "telegram",
            SourceKind::Rss => "rss",
        }
    }

    /// Parse a stored value, defaulting to telegram for anything unknown.
    pub fn from_db(value: &str) -> Self {
        match value {
            "rss" => SourceKind::Rss,
            _ => SourceKind::Telegram,
        }
    }
}

/// A URL-addressable message stream registered with the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: i64,
    pub url: String,
    pub name: String,
    pub source_type: SourceKind,
    pub category: String,
    #[serde(skip_serializing)]
    pub created_at: DateTime<Utc>,
}

/// A message persisted by the ingestor.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: i64,
    pub source_url: String,
    pub source_type: String,
    pub channel_id: String,
    pub message_id: i64,
    pub date: DateTime<Utc>,
    pub text: String,
    /// JSON object mapping each outbound URL to its summary, once resolved.
    pub resolved_links: Option<String>,
    pub processed: bool,
}

/// A model-produced grouping of messages with a label and importance.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TopicSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(skip)]
    pub id: Option<i64>,
    /// Short topic label.
    pub topic: String,
    /// Broad category the topic belongs to.
    pub metatopic: String,
    /// Importance rating, 1 (minor) to 10 (critical).
    pub importance: u8,
    /// A few sentences summarizing the topic.
    #[serde(default)]
    pub summary: String,
    /// Internal ids of the messages supporting this topic.
    pub message_ids: Vec<i64>,
}

/// Directional stance of an insight. The six values are a closed set;
/// anything else from the model is a schema violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Stance {
    Long,
    Short,
    LongNeutral,
    ShortNeutral,
    Neutral,
    NoActionableInsight,
}

/// An external reference attached to an insight.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Resource {
    pub url: String,
    pub description: String,
}

/// Structured analytical record for one topic. List fields are either
/// absent or non-empty; absent means "not applicable".
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Insight {
    pub analysis_summary: String,
    pub stance: Stance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale_long: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale_short: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale_neutral: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risks_and_watchouts: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_questions_for_user: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_instruments_long: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_instruments_short: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub useful_resources: Option<Vec<Resource>>,
}

impl Insight {
    /// Collapse empty list fields to absent so "not applicable" has a
    /// single representation.
    pub fn normalize(mut self) -> Self {
        fn drop_empty<T>(field: &mut Option<Vec<T>>) {
            if field.as_ref().is_some_and(|v| v.is_empty()) {
                *field = None;
            }
        }
        drop_empty(&mut self.risks_and_watchouts);
        drop_empty(&mut self.key_questions_for_user);
        drop_empty(&mut self.suggested_instruments_long);
        drop_empty(&mut self.suggested_instruments_short);
        drop_empty(&mut self.useful_resources);
        self
    }
}

/// A channel as it appears in a Telegram data export (and in the
/// clustering API). Export files carry numeric ids, the API may send
/// strings; both deserialize to a string id.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Channel {
    #[serde(deserialize_with = "id_from_number_or_string")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<bool>,
}

/// One group of a channel clustering: a topic label, the dominant
/// language (ISO 639-1), and the member channels.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClusteredTopic {
    pub topic: String,
    /// Two-letter ISO 639-1 language code.
    pub language: String,
    pub channels: Vec<Channel>,
}

fn id_from_number_or_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "channel id must be a string or number, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stance_uses_kebab_case_wire_values() {
        let json = serde_json::to_string(&Stance::NoActionableInsight).unwrap();
        assert_eq!(json, "\"no-actionable-insight\"");
        let parsed: Stance = serde_json::from_str("\"long-neutral\"").unwrap();
        assert_eq!(parsed, Stance::LongNeutral);
    }

    #[test]
    fn stance_rejects_unknown_values() {
        assert!(serde_json::from_str::<Stance>("\"bullish\"").is_err());
    }

    #[test]
    fn channel_id_accepts_numbers_and_strings() {
        let a: Channel = serde_json::from_str(r#"{"id": 12345, "name": "Alice"}"#).unwrap();
        assert_eq!(a.id, "12345");
        let b: Channel = serde_json::from_str(r#"{"id": "foo", "name": "Bob"}"#).unwrap();
        assert_eq!(b.id, "foo");
    }

    #[test]
    fn insight_normalize_drops_empty_lists() {
        let insight = Insight {
            analysis_summary: "s".to_string(),
            stance: Stance::Neutral,
            rationale_long: None,
            rationale_short: None,
            rationale_neutral: Some("flat".to_string()),
            risks_and_watchouts: Some(vec![]),
            key_questions_for_user: Some(vec!["q".to_string()]),
            suggested_instruments_long: None,
            suggested_instruments_short: Some(vec![]),
            useful_resources: None,
        }
        .normalize();
        assert!(insight.risks_and_watchouts.is_none());
        assert!(insight.suggested_instruments_short.is_none());
        assert_eq!(insight.key_questions_for_user.unwrap().len(), 1);
    }
}
