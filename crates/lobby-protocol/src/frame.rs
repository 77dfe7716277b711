//! Frames: the unit exchanged over the wire.
//!
//! A frame is a header (message type, optional correlation id, optional
//! protocol error code) plus an ordered list of payload fields. Field
//! values are either a string or a list of strings; structured values
//! travel as JSON text inside a string field.
//!
//! ```text
//! type: partyCreateResponse   ┐
//! id: 7                       ├ header
//! code: 0                     ┘
//! partyID: p1                 ┐
//! members: [u1,u2]            ┘ payload
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "json")]
use serde::{Serialize, de::DeserializeOwned};

use crate::MessageType;
#[cfg(feature = "json")]
use crate::ProtocolError;

// ---------------------------------------------------------------------------
// MessageId
// ---------------------------------------------------------------------------

/// Client-assigned correlation id linking a request to its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out increasing message ids, starting at 1.
///
/// One generator lives as long as the lobby connection it serves, so ids
/// are never reused within that lifetime.
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    /// Creates a generator whose first id is 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Returns the next id.
    pub fn next_id(&self) -> MessageId {
        MessageId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// FieldValue / Fields
// ---------------------------------------------------------------------------

/// A single payload value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// A plain string (possibly JSON text for nested values).
    Text(String),
    /// A list of strings, written `[a,b,c]` on the wire.
    List(Vec<String>),
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(values: Vec<String>) -> Self {
        Self::List(values)
    }
}

impl From<Vec<&str>> for FieldValue {
    fn from(values: Vec<&str>) -> Self {
        Self::List(values.into_iter().map(str::to_string).collect())
    }
}

/// The ordered key/value payload of a frame.
///
/// Keys keep their insertion order so an encoded frame reads the way it
/// was built. Inserting an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields {
    entries: Vec<(String, FieldValue)>,
}

impl Fields {
    /// Creates an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(
        mut self,
        key: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Self {
        self.insert(key, value);
        self
    }

    /// Sets `key` to `value`, replacing any previous value.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<FieldValue>,
    ) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Returns the value for `key`.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Returns the value for `key` if it is a plain string.
    pub fn get_text(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(FieldValue::Text(text)) => Some(text.as_str()),
            _ => None,
        }
    }

    /// Returns the value for `key` if it is a list.
    pub fn get_list(&self, key: &str) -> Option<&[String]> {
        match self.get(key) {
            Some(FieldValue::List(items)) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Iterates over the fields in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(feature = "json")]
impl Fields {
    /// Parses the JSON text stored under `key`.
    ///
    /// Returns `Ok(None)` if the key is absent or holds a list.
    pub fn get_json<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, ProtocolError> {
        match self.get_text(key) {
            Some(text) => Ok(Some(serde_json::from_str(text)?)),
            None => Ok(None),
        }
    }

    /// Converts the payload into a JSON object.
    ///
    /// Lists become arrays of strings. Text that holds a JSON object or
    /// array (`{...}` / `[...]` nested documents) is parsed; everything
    /// else stays a string.
    pub fn to_json(&self) -> serde_json::Value {
        let object = self
            .entries
            .iter()
            .map(|(key, value)| {
                let json = match value {
                    FieldValue::Text(text) => nested_json(text)
                        .unwrap_or_else(|| {
                            serde_json::Value::String(text.clone())
                        }),
                    FieldValue::List(items) => serde_json::Value::Array(
                        items
                            .iter()
                            .cloned()
                            .map(serde_json::Value::String)
                            .collect(),
                    ),
                };
                (key.clone(), json)
            })
            .collect();
        serde_json::Value::Object(object)
    }

    /// Builds a payload from any struct that serializes to a JSON object.
    ///
    /// Strings stay strings, arrays of strings become lists, `null` fields
    /// are skipped, and anything else (numbers, booleans, nested objects)
    /// is written as its JSON text.
    pub fn from_serialize<T: Serialize>(
        value: &T,
    ) -> Result<Self, ProtocolError> {
        let serde_json::Value::Object(object) = serde_json::to_value(value)?
        else {
            return Err(ProtocolError::InvalidField(
                "payload must serialize to an object".into(),
            ));
        };

        let mut fields = Fields::new();
        for (key, value) in object {
            match value {
                serde_json::Value::Null => {}
                serde_json::Value::String(text) => fields.insert(key, text),
                serde_json::Value::Array(items)
                    if items.iter().all(serde_json::Value::is_string) =>
                {
                    let items = items
                        .into_iter()
                        .filter_map(|item| match item {
                            serde_json::Value::String(s) => Some(s),
                            _ => None,
                        })
                        .collect::<Vec<_>>();
                    fields.insert(key, items);
                }
                other => fields.insert(key, other.to_string()),
            }
        }
        Ok(fields)
    }
}

#[cfg(feature = "json")]
fn nested_json(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim_start();
    if !trimmed.starts_with('{') && !trimmed.starts_with('[') {
        return None;
    }
    serde_json::from_str(text).ok()
}

// ---------------------------------------------------------------------------
// Header / Frame
// ---------------------------------------------------------------------------

/// The routing part of a frame, decodable on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// What kind of message this is.
    pub kind: MessageType,
    /// Correlation id. Requests and responses carry one; notifications
    /// usually don't.
    pub id: Option<MessageId>,
    /// Protocol error code on responses. `0` means success.
    pub code: Option<i64>,
}

/// One complete protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// What kind of message this is.
    pub kind: MessageType,
    /// Correlation id, if any.
    pub id: Option<MessageId>,
    /// Protocol error code, responses only.
    pub code: Option<i64>,
    /// The payload.
    pub fields: Fields,
}

impl Frame {
    /// A client request carrying a correlation id.
    pub fn request(kind: MessageType, id: MessageId, fields: Fields) -> Self {
        Self {
            kind,
            id: Some(id),
            code: None,
            fields,
        }
    }

    /// A server response to request `id`.
    pub fn response(
        kind: MessageType,
        id: MessageId,
        code: i64,
        fields: Fields,
    ) -> Self {
        Self {
            kind,
            id: Some(id),
            code: Some(code),
            fields,
        }
    }

    /// A server push with no correlation id.
    pub fn notification(kind: MessageType, fields: Fields) -> Self {
        Self {
            kind,
            id: None,
            code: None,
            fields,
        }
    }

    /// Reassembles a frame from a decoded header and payload.
    pub fn from_parts(header: Header, fields: Fields) -> Self {
        Self {
            kind: header.kind,
            id: header.id,
            code: header.code,
            fields,
        }
    }

    /// Returns a copy of the header.
    pub fn header(&self) -> Header {
        Header {
            kind: self.kind.clone(),
            id: self.id,
            code: self.code,
        }
    }

    /// Returns `true` unless the frame carries a non-zero error code.
    pub fn is_success(&self) -> bool {
        self.code.unwrap_or(0) == 0
    }

    /// Deserializes the payload into `T` (see [`Fields::to_json`]).
    #[cfg(feature = "json")]
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        Ok(serde_json::from_value(self.fields.to_json())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_generator_starts_at_one_and_increases() {
        let ids = IdGenerator::new();
        assert_eq!(ids.next_id(), MessageId(1));
        assert_eq!(ids.next_id(), MessageId(2));
        assert_eq!(ids.next_id(), MessageId(3));
    }

    #[test]
    fn test_fields_insert_replaces_in_place() {
        let mut fields = Fields::new().with("a", "1").with("b", "2");
        fields.insert("a", "3");
        let keys: Vec<_> = fields.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(fields.get_text("a"), Some("3"));
    }

    #[test]
    fn test_fields_typed_getters_reject_other_shape() {
        let fields = Fields::new()
            .with("name", "alice")
            .with("members", vec!["u1", "u2"]);
        assert_eq!(fields.get_text("members"), None);
        assert_eq!(fields.get_list("name"), None);
        assert_eq!(
            fields.get_list("members"),
            Some(&["u1".to_string(), "u2".to_string()][..])
        );
    }

    #[test]
    fn test_frame_is_success_by_code() {
        let ok = Frame::response(
            MessageType::PartyCreateResponse,
            MessageId(1),
            0,
            Fields::new(),
        );
        let failed = Frame::response(
            MessageType::PartyCreateResponse,
            MessageId(1),
            11_233,
            Fields::new(),
        );
        let notif =
            Frame::notification(MessageType::PartyJoinNotif, Fields::new());
        assert!(ok.is_success());
        assert!(!failed.is_success());
        assert!(notif.is_success());
    }

    #[test]
    #[cfg(feature = "json")]
    fn test_frame_parse_into_struct() {
        #[derive(serde::Deserialize)]
        struct Party {
            #[serde(rename = "partyID")]
            party_id: String,
            members: Vec<String>,
            custom_attribute: serde_json::Value,
        }

        let frame = Frame::response(
            MessageType::PartyInfoResponse,
            MessageId(4),
            0,
            Fields::new()
                .with("partyID", "p1")
                .with("members", vec!["u1", "u2"])
                .with("custom_attribute", r#"{"mode":"ranked"}"#),
        );

        let party: Party = frame.parse().expect("should parse");
        assert_eq!(party.party_id, "p1");
        assert_eq!(party.members, vec!["u1", "u2"]);
        assert_eq!(party.custom_attribute["mode"], "ranked");
    }

    #[test]
    #[cfg(feature = "json")]
    fn test_frame_parse_missing_field_is_shape_error() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct NeedsId {
            #[serde(rename = "partyID")]
            party_id: String,
        }

        let frame =
            Frame::notification(MessageType::PartyJoinNotif, Fields::new());
        let result: Result<NeedsId, _> = frame.parse();
        assert!(matches!(result, Err(ProtocolError::Shape(_))));
    }

    #[test]
    #[cfg(feature = "json")]
    fn test_fields_from_serialize_flattens_values() {
        #[derive(serde::Serialize)]
        struct Invite<'a> {
            #[serde(rename = "friendID")]
            friend_id: &'a str,
            tags: Vec<&'a str>,
            limit: u32,
            note: Option<&'a str>,
        }

        let fields = Fields::from_serialize(&Invite {
            friend_id: "u9",
            tags: vec!["a", "b"],
            limit: 4,
            note: None,
        })
        .unwrap();

        assert_eq!(fields.get_text("friendID"), Some("u9"));
        assert_eq!(
            fields.get_list("tags"),
            Some(&["a".to_string(), "b".to_string()][..])
        );
        assert_eq!(fields.get_text("limit"), Some("4"));
        assert!(fields.get("note").is_none());
    }

    #[test]
    #[cfg(feature = "json")]
    fn test_fields_get_json_reads_nested_document() {
        let fields = Fields::new().with("attrs", r#"{"level":3}"#);
        let attrs: Option<serde_json::Value> =
            fields.get_json("attrs").unwrap();
        assert_eq!(attrs.unwrap()["level"], 3);
        let missing: Option<serde_json::Value> =
            fields.get_json("nope").unwrap();
        assert!(missing.is_none());
    }
}
