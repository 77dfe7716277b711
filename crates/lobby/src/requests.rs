//! Typed wrappers for common lobby requests and notifications.
//!
//! Each helper is a thin layer over [`Lobby::request`] or
//! [`Lobby::subscribe_as`]: it names the message type, fills in the
//! payload keys, and deserializes the answer.

use lobby_protocol::{Fields, MessageType};
use serde::{Deserialize, Serialize};

use crate::party_storage::PartyDataDocument;
use crate::{Lobby, LobbyError, Subscription};

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// A party as described by party info/create/join responses.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyInfo {
    #[serde(rename = "partyID", alias = "partyId")]
    pub party_id: String,
    #[serde(rename = "leaderID", alias = "leaderId", default)]
    pub leader_id: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub invitees: Vec<String>,
    #[serde(default)]
    pub invitation_token: String,
}

/// Someone invited this user to a party.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyInvitation {
    pub from: String,
    #[serde(rename = "partyID", alias = "partyId")]
    pub party_id: String,
    pub invitation_token: String,
}

/// A chat message, party or personal.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub from: String,
    #[serde(default)]
    pub to: String,
    pub payload: String,
    #[serde(default)]
    pub received_at: String,
}

/// A ban or unban notice. The current token is about to be revoked.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanNotice {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub ban: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub reason: String,
}

/// A user's presence, as set by `setUserStatusRequest` and pushed in
/// `userStatusNotif`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    /// Empty when setting this user's own status.
    #[serde(
        rename = "userID",
        alias = "userId",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub user_id: String,
    pub availability: String,
    #[serde(default)]
    pub activity: String,
}

impl UserStatus {
    /// This user's own status.
    pub fn new(availability: impl Into<String>, activity: impl Into<String>) -> Self {
        Self {
            user_id: String::new(),
            availability: availability.into(),
            activity: activity.into(),
        }
    }

    fn to_fields(&self) -> Result<Fields, LobbyError> {
        Ok(Fields::from_serialize(self)?)
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

impl Lobby {
    /// The party this user is in.
    pub async fn party_info(&self) -> Result<PartyInfo, LobbyError> {
        self.request_as(MessageType::PartyInfoRequest, Fields::new())
            .await
    }

    /// Creates a party led by this user.
    pub async fn create_party(&self) -> Result<PartyInfo, LobbyError> {
        self.request_as(MessageType::PartyCreateRequest, Fields::new())
            .await
    }

    pub async fn leave_party(&self) -> Result<(), LobbyError> {
        self.request(MessageType::PartyLeaveRequest, Fields::new())
            .await?;
        Ok(())
    }

    /// Invites `user_id` to this user's party.
    pub async fn invite_to_party(&self, user_id: &str) -> Result<(), LobbyError> {
        self.request(
            MessageType::PartyInviteRequest,
            Fields::new().with("friendID", user_id),
        )
        .await?;
        Ok(())
    }

    /// Accepts an invitation received through [`on_party_invited`].
    ///
    /// [`on_party_invited`]: Self::on_party_invited
    pub async fn join_party(
        &self,
        party_id: &str,
        invitation_token: &str,
    ) -> Result<PartyInfo, LobbyError> {
        self.request_as(
            MessageType::PartyJoinRequest,
            Fields::new()
                .with("partyID", party_id)
                .with("invitationToken", invitation_token),
        )
        .await
    }

    pub async fn reject_party_invitation(
        &self,
        party_id: &str,
        invitation_token: &str,
    ) -> Result<(), LobbyError> {
        self.request(
            MessageType::PartyRejectRequest,
            Fields::new()
                .with("partyID", party_id)
                .with("invitationToken", invitation_token),
        )
        .await?;
        Ok(())
    }

    /// Removes `user_id` from the party. Leader only.
    pub async fn kick_party_member(&self, user_id: &str) -> Result<(), LobbyError> {
        self.request(
            MessageType::PartyKickRequest,
            Fields::new().with("memberID", user_id),
        )
        .await?;
        Ok(())
    }

    pub async fn send_party_chat(&self, message: &str) -> Result<(), LobbyError> {
        self.request(
            MessageType::PartyChatRequest,
            Fields::new().with("payload", message),
        )
        .await?;
        Ok(())
    }

    pub async fn send_personal_chat(
        &self,
        user_id: &str,
        message: &str,
    ) -> Result<(), LobbyError> {
        self.request(
            MessageType::PersonalChatRequest,
            Fields::new().with("to", user_id).with("payload", message),
        )
        .await?;
        Ok(())
    }

    /// Sets this user's presence, e.g. `UserStatus::new("online", "in lobby")`.
    pub async fn set_user_status(&self, status: &UserStatus) -> Result<(), LobbyError> {
        self.request(MessageType::SetUserStatusRequest, status.to_fields()?)
            .await?;
        Ok(())
    }

    // -- Notifications --

    pub fn on_party_invited<F>(&self, handler: F) -> Subscription
    where
        F: FnMut(PartyInvitation) + Send + 'static,
    {
        self.subscribe_as(MessageType::PartyGetInvitedNotif, handler)
    }

    pub fn on_party_chat<F>(&self, handler: F) -> Subscription
    where
        F: FnMut(ChatMessage) + Send + 'static,
    {
        self.subscribe_as(MessageType::PartyChatNotif, handler)
    }

    pub fn on_personal_chat<F>(&self, handler: F) -> Subscription
    where
        F: FnMut(ChatMessage) + Send + 'static,
    {
        self.subscribe_as(MessageType::PersonalChatNotif, handler)
    }

    /// A friend's presence changed.
    pub fn on_user_status<F>(&self, handler: F) -> Subscription
    where
        F: FnMut(UserStatus) + Send + 'static,
    {
        self.subscribe_as(MessageType::UserStatusNotif, handler)
    }

    /// Another member changed the party's shared storage.
    pub fn on_party_data_update<F>(&self, handler: F) -> Subscription
    where
        F: FnMut(PartyDataDocument) + Send + 'static,
    {
        self.subscribe_as(MessageType::PartyDataUpdateNotif, handler)
    }

    /// The user was banned. The lobby already arms its ban reconnect path
    /// for these; handlers are for the application's own reaction.
    pub fn on_user_banned<F>(&self, handler: F) -> Subscription
    where
        F: FnMut(BanNotice) + Send + 'static,
    {
        self.subscribe_as(MessageType::UserBannedNotification, handler)
    }

    pub fn on_user_unbanned<F>(&self, handler: F) -> Subscription
    where
        F: FnMut(BanNotice) + Send + 'static,
    {
        self.subscribe_as(MessageType::UserUnbannedNotification, handler)
    }
}

#[cfg(test)]
mod tests {
    use lobby_protocol::{Frame, MessageId};

    use super::*;

    #[test]
    fn test_party_info_parses_from_fields() {
        let frame = Frame::response(
            MessageType::PartyInfoResponse,
            MessageId(1),
            0,
            Fields::new()
                .with("partyID", "p1")
                .with("leaderID", "u1")
                .with("members", vec!["u1", "u2"])
                .with("invitees", Vec::<String>::new())
                .with("invitationToken", "tok"),
        );
        let info: PartyInfo = frame.parse().unwrap();
        assert_eq!(info.party_id, "p1");
        assert_eq!(info.members, vec!["u1", "u2"]);
        assert!(info.invitees.is_empty());
        assert_eq!(info.invitation_token, "tok");
    }

    #[test]
    fn test_party_info_accepts_camel_case_id() {
        let frame = Frame::notification(
            MessageType::PartyCreateResponse,
            Fields::new().with("partyId", "p1"),
        );
        let info: PartyInfo = frame.parse().unwrap();
        assert_eq!(info.party_id, "p1");
        assert!(info.members.is_empty());
    }

    #[test]
    fn test_party_data_update_notif_parses_nested_attributes() {
        let frame = Frame::notification(
            MessageType::PartyDataUpdateNotif,
            Fields::new()
                .with("partyId", "p1")
                .with("leader", "u1")
                .with("members", vec!["u1"])
                .with("customAttribute", r#"{"mode":"ranked"}"#)
                .with("updatedAt", "17"),
        );
        let document: PartyDataDocument = frame.parse().unwrap();
        assert_eq!(document.updated_at, serde_json::json!("17"));
        assert_eq!(document.custom_attribute["mode"], "ranked");
    }

    #[test]
    fn test_user_status_to_fields_omits_own_user_id() {
        let fields = UserStatus::new("online", "in lobby").to_fields().unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get_text("availability"), Some("online"));
        assert_eq!(fields.get_text("activity"), Some("in lobby"));
        assert_eq!(fields.get_text("userID"), None);
    }

    #[test]
    fn test_user_status_notif_parses() {
        let frame = Frame::notification(
            MessageType::UserStatusNotif,
            Fields::new()
                .with("userID", "u7")
                .with("availability", "busy")
                .with("activity", "ranked match"),
        );
        let status: UserStatus = frame.parse().unwrap();
        assert_eq!(status.user_id, "u7");
        assert_eq!(status, UserStatus {
            user_id: "u7".into(),
            availability: "busy".into(),
            activity: "ranked match".into(),
        });
    }

    #[test]
    fn test_ban_notice_parses_with_missing_fields() {
        let frame = Frame::notification(
            MessageType::UserBannedNotification,
            Fields::new().with("userId", "u1").with("ban", "LOGIN"),
        );
        let notice: BanNotice = frame.parse().unwrap();
        assert_eq!(notice.user_id, "u1");
        assert_eq!(notice.ban, "LOGIN");
        assert!(notice.reason.is_empty());
    }
}
