//! Optimistic writes to the shared per-party storage document.
//!
//! Every member of a party can edit the party's custom attributes. The
//! server keeps one document per party with an `updatedAt` version; an
//! update carrying a stale version is rejected. [`PartyStorageWriter`]
//! turns that into a read-modify-write loop:
//!
//! ```text
//! fetch ─▶ modify ─▶ update(version) ─┬─ ok ──────────▶ done
//!   ▲                                 └─ conflict ─┐
//!   └─────────────── attempts left? ◀──────────────┘
//! ```
//!
//! Attempts run one after another, each on freshly fetched state. Nothing
//! coordinates concurrent writers on the client; the server's version
//! check is what keeps writes consistent.

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::LobbyError;

/// The server's copy of a party's shared storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyDataDocument {
    pub party_id: String,
    #[serde(default)]
    pub leader: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub invitees: Vec<String>,
    /// The free-form attributes party members edit.
    #[serde(default)]
    pub custom_attribute: Map<String, Value>,
    /// Opaque version token, echoed back to the server exactly as received
    /// (a number, a timestamp string, or whatever the server chose).
    pub updated_at: Value,
}

/// An update request: new attributes plus the version they were based on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyDataUpdate {
    pub custom_attribute: Map<String, Value>,
    pub updated_at: Value,
}

/// Where party storage lives (usually the lobby's REST API).
pub trait PartyStorageBackend: Send + Sync {
    /// Fetches the current document.
    fn fetch(
        &self,
        party_id: &str,
    ) -> impl Future<Output = Result<PartyDataDocument, LobbyError>> + Send;

    /// Replaces the custom attributes if `update.updated_at` still matches.
    ///
    /// # Errors
    /// Must return [`LobbyError::VersionConflict`] when the version is
    /// stale, so the writer knows to retry.
    fn update(
        &self,
        party_id: &str,
        update: PartyDataUpdate,
    ) -> impl Future<Output = Result<PartyDataDocument, LobbyError>> + Send;
}

/// Runs the optimistic read-modify-write loop against a backend.
#[derive(Debug, Clone)]
pub struct PartyStorageWriter<B> {
    backend: B,
}

impl<B: PartyStorageBackend> PartyStorageWriter<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Applies `modify` to the party's custom attributes and stores the
    /// result, retrying on version conflicts.
    ///
    /// `modify` runs once per attempt, each time on freshly fetched
    /// attributes, so it must be safe to call repeatedly.
    ///
    /// # Errors
    /// - [`LobbyError::RetryExhausted`] if all `max_attempts` attempts hit
    ///   a conflict (or `max_attempts` is 0). Retrying later may succeed.
    /// - Any other backend error, immediately.
    pub async fn write<F>(
        &self,
        party_id: &str,
        mut modify: F,
        max_attempts: u32,
    ) -> Result<PartyDataDocument, LobbyError>
    where
        F: FnMut(&mut Map<String, Value>),
    {
        for attempt in 1..=max_attempts {
            let mut document = self.backend.fetch(party_id).await?;
            modify(&mut document.custom_attribute);

            let update = PartyDataUpdate {
                custom_attribute: document.custom_attribute,
                updated_at: document.updated_at,
            };
            match self.backend.update(party_id, update).await {
                Ok(stored) => return Ok(stored),
                Err(LobbyError::VersionConflict) => {
                    tracing::debug!(party_id, attempt, "party storage version conflict");
                }
                Err(e) => return Err(e),
            }
        }

        tracing::warn!(party_id, max_attempts, "party storage write gave up");
        Err(LobbyError::RetryExhausted {
            attempts: max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    /// A backend that rejects the first `conflicts` updates, as if another
    /// member wrote in between each fetch and update.
    struct RacyBackend {
        document: Mutex<PartyDataDocument>,
        conflicts: Mutex<u32>,
        fetches: Mutex<u32>,
    }

    impl RacyBackend {
        fn new(conflicts: u32) -> Self {
            Self {
                document: Mutex::new(PartyDataDocument {
                    party_id: "p1".into(),
                    leader: "u1".into(),
                    members: vec!["u1".into(), "u2".into()],
                    invitees: vec![],
                    custom_attribute: Map::new(),
                    updated_at: json!(1),
                }),
                conflicts: Mutex::new(conflicts),
                fetches: Mutex::new(0),
            }
        }

        fn fetches(&self) -> u32 {
            *self.fetches.lock().unwrap()
        }
    }

    impl PartyStorageBackend for RacyBackend {
        async fn fetch(
            &self,
            _party_id: &str,
        ) -> Result<PartyDataDocument, LobbyError> {
            *self.fetches.lock().unwrap() += 1;
            Ok(self.document.lock().unwrap().clone())
        }

        async fn update(
            &self,
            _party_id: &str,
            update: PartyDataUpdate,
        ) -> Result<PartyDataDocument, LobbyError> {
            let mut document = self.document.lock().unwrap();
            let mut conflicts = self.conflicts.lock().unwrap();
            if *conflicts > 0 {
                // Someone else won the race.
                *conflicts -= 1;
                bump(&mut document.updated_at);
                let version = document.updated_at.clone();
                document.custom_attribute.insert("other".into(), version);
                return Err(LobbyError::VersionConflict);
            }
            if update.updated_at != document.updated_at {
                return Err(LobbyError::VersionConflict);
            }
            document.custom_attribute = update.custom_attribute;
            bump(&mut document.updated_at);
            Ok(document.clone())
        }
    }

    fn bump(version: &mut Value) {
        *version = json!(version.as_i64().unwrap_or(0) + 1);
    }

    fn set_mode(attrs: &mut Map<String, Value>) {
        attrs.insert("mode".into(), json!("ranked"));
    }

    #[tokio::test]
    async fn test_write_without_conflict_takes_one_cycle() {
        let writer = PartyStorageWriter::new(RacyBackend::new(0));
        let stored = writer.write("p1", set_mode, 3).await.unwrap();
        assert_eq!(stored.custom_attribute["mode"], json!("ranked"));
        assert_eq!(writer.backend().fetches(), 1);
    }

    #[tokio::test]
    async fn test_write_retries_conflicts_on_fresh_state() {
        let writer = PartyStorageWriter::new(RacyBackend::new(2));
        let stored = writer.write("p1", set_mode, 3).await.unwrap();

        assert_eq!(writer.backend().fetches(), 3);
        assert_eq!(stored.custom_attribute["mode"], json!("ranked"));
        // The concurrent writer's change survived because each attempt
        // re-fetched before modifying.
        assert!(stored.custom_attribute.contains_key("other"));
    }

    #[tokio::test]
    async fn test_write_gives_up_when_conflicts_exceed_budget() {
        let writer = PartyStorageWriter::new(RacyBackend::new(3));
        let result = writer.write("p1", set_mode, 3).await;
        assert!(matches!(
            result,
            Err(LobbyError::RetryExhausted { attempts: 3 })
        ));
        assert_eq!(writer.backend().fetches(), 3);
    }

    #[tokio::test]
    async fn test_write_zero_attempts_never_touches_backend() {
        let writer = PartyStorageWriter::new(RacyBackend::new(0));
        let result = writer.write("p1", set_mode, 0).await;
        assert!(matches!(result, Err(LobbyError::RetryExhausted { attempts: 0 })));
        assert_eq!(writer.backend().fetches(), 0);
    }

    #[tokio::test]
    async fn test_write_other_errors_are_not_retried() {
        struct Offline;
        impl PartyStorageBackend for Offline {
            async fn fetch(&self, _: &str) -> Result<PartyDataDocument, LobbyError> {
                Err(LobbyError::NotConnected)
            }
            async fn update(
                &self,
                _: &str,
                _: PartyDataUpdate,
            ) -> Result<PartyDataDocument, LobbyError> {
                unreachable!("update without fetch")
            }
        }

        let writer = PartyStorageWriter::new(Offline);
        assert!(matches!(
            writer.write("p1", set_mode, 5).await,
            Err(LobbyError::NotConnected)
        ));
    }

    #[test]
    fn test_document_deserializes_camel_case() {
        let document: PartyDataDocument = serde_json::from_value(json!({
            "partyId": "p9",
            "leader": "u1",
            "members": ["u1"],
            "customAttribute": {"map": "dust"},
            "updatedAt": 42
        }))
        .unwrap();
        assert_eq!(document.party_id, "p9");
        assert_eq!(document.updated_at, json!(42));
        assert!(document.invitees.is_empty());
        assert_eq!(document.custom_attribute["map"], json!("dust"));
    }

    #[test]
    fn test_document_keeps_textual_version_verbatim() {
        let document: PartyDataDocument = serde_json::from_value(json!({
            "partyId": "p9",
            "updatedAt": "2024-05-01T10:00:00.123456Z"
        }))
        .unwrap();
        assert_eq!(document.updated_at, json!("2024-05-01T10:00:00.123456Z"));
    }

    /// Versions are compared as sent, never parsed.
    struct TimestampBackend {
        version: Mutex<Value>,
        seen: Mutex<Vec<PartyDataUpdate>>,
    }

    impl PartyStorageBackend for TimestampBackend {
        async fn fetch(&self, party_id: &str) -> Result<PartyDataDocument, LobbyError> {
            Ok(PartyDataDocument {
                party_id: party_id.into(),
                leader: String::new(),
                members: vec![],
                invitees: vec![],
                custom_attribute: Map::new(),
                updated_at: self.version.lock().unwrap().clone(),
            })
        }

        async fn update(
            &self,
            party_id: &str,
            update: PartyDataUpdate,
        ) -> Result<PartyDataDocument, LobbyError> {
            let mut version = self.version.lock().unwrap();
            if update.updated_at != *version {
                return Err(LobbyError::VersionConflict);
            }
            self.seen.lock().unwrap().push(update.clone());
            *version = json!("2024-05-01T10:00:01.000000Z");
            Ok(PartyDataDocument {
                party_id: party_id.into(),
                leader: String::new(),
                members: vec![],
                invitees: vec![],
                custom_attribute: update.custom_attribute,
                updated_at: version.clone(),
            })
        }
    }

    #[tokio::test]
    async fn test_write_echoes_non_numeric_version_unchanged() {
        let writer = PartyStorageWriter::new(TimestampBackend {
            version: Mutex::new(json!("2024-05-01T10:00:00.123456Z")),
            seen: Mutex::new(Vec::new()),
        });
        let stored = writer.write("p1", set_mode, 1).await.unwrap();

        assert_eq!(stored.updated_at, json!("2024-05-01T10:00:01.000000Z"));
        let seen = writer.backend().seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].updated_at, json!("2024-05-01T10:00:00.123456Z"));
        assert_eq!(
            serde_json::to_value(&seen[0]).unwrap()["updatedAt"],
            json!("2024-05-01T10:00:00.123456Z")
        );
    }
}
