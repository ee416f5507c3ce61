use chrono::{DateTime, Utc};
use serde::de::Deserializer;
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "assistant" => MessageRole::Assistant,
            _ => MessageRole::User,
        }
    }
}

/// Back-reference from an assistant message to the appointments created in its turn.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MessageMetadata {
    #[default]
    None,
    AppointmentRefs(Vec<i64>),
}

#[derive(Serialize, Deserialize)]
struct AppointmentRefsRepr {
    #[serde(rename = "appointmentIds")]
    appointment_ids: Vec<i64>,
}

impl MessageMetadata {
    /// Empty id lists collapse to `None`.
    pub fn from_appointment_ids(ids: Vec<i64>) -> Self {
        if ids.is_empty() {
            MessageMetadata::None
        } else {
            MessageMetadata::AppointmentRefs(ids)
        }
    }

    pub fn appointment_ids(&self) -> &[i64] {
        match self {
            MessageMetadata::None => &[],
            MessageMetadata::AppointmentRefs(ids) => ids,
        }
    }

    pub fn to_column(&self) -> anyhow::Result<Option<String>> {
        match self {
            MessageMetadata::None => Ok(None),
            MessageMetadata::AppointmentRefs(ids) => Ok(Some(serde_json::to_string(
                &AppointmentRefsRepr {
                    appointment_ids: ids.clone(),
                },
            )?)),
        }
    }

    pub fn from_column(raw: Option<&str>) -> Self {
        raw.and_then(|s| serde_json::from_str::<AppointmentRefsRepr>(s).ok())
            .map(|r| MessageMetadata::from_appointment_ids(r.appointment_ids))
            .unwrap_or_default()
    }
}

impl Serialize for MessageMetadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MessageMetadata::None => serializer.serialize_none(),
            MessageMetadata::AppointmentRefs(ids) => {
                let mut s = serializer.serialize_struct("MessageMetadata", 1)?;
                s.serialize_field("appointmentIds", ids)?;
                s.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for MessageMetadata {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = Option::<AppointmentRefsRepr>::deserialize(deserializer)?;
        Ok(repr
            .map(|r| MessageMetadata::from_appointment_ids(r.appointment_ids))
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub content: String,
    pub role: MessageRole,
    pub timestamp: DateTime<Utc>,
    pub metadata: MessageMetadata,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: i64,
    pub content: String,
    pub role: MessageRole,
    pub metadata: MessageMetadata,
}
