//! The catalogue of lobby message types.
//!
//! Every frame starts with a `type:` line naming one of these. Requests end
//! in `Request`, their answers in `Response`, and server pushes in `Notif`
//! (or `Notification` for the ban notices). Names the client doesn't know
//! are kept verbatim in [`MessageType::Unknown`] so newer servers don't
//! break older clients.

use std::fmt;

/// Declares the known message types together with their wire names.
macro_rules! message_types {
    ($($(#[$doc:meta])* $variant:ident => $wire:literal,)+) => {
        /// A lobby message type.
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum MessageType {
            $($(#[$doc])* $variant,)+
            /// A type this client has no name for.
            Unknown(String),
        }

        impl MessageType {
            /// Returns the name used on the wire.
            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $wire,)+
                    Self::Unknown(name) => name,
                }
            }

            /// Maps a wire name to a message type. Never fails: unrecognized
            /// names become [`MessageType::Unknown`].
            pub fn from_wire(name: &str) -> Self {
                match name {
                    $($wire => Self::$variant,)+
                    other => Self::Unknown(other.to_string()),
                }
            }
        }
    };
}

message_types! {
    // -- Connection --
    /// Server → client right after the socket opens; carries the session id.
    ConnectNotif => "connectNotif",
    /// Server → client before it closes the socket on purpose.
    DisconnectNotif => "disconnectNotif",
    ErrorNotif => "errorNotif",
    RefreshTokenRequest => "refreshTokenRequest",
    RefreshTokenResponse => "refreshTokenResponse",
    /// The current token is about to be revoked because the user was banned.
    UserBannedNotification => "userBannedNotification",
    /// The current token is about to be revoked because a ban was lifted.
    UserUnbannedNotification => "userUnbannedNotification",

    // -- Party --
    PartyInfoRequest => "partyInfoRequest",
    PartyInfoResponse => "partyInfoResponse",
    PartyCreateRequest => "partyCreateRequest",
    PartyCreateResponse => "partyCreateResponse",
    PartyLeaveRequest => "partyLeaveRequest",
    PartyLeaveResponse => "partyLeaveResponse",
    PartyInviteRequest => "partyInviteRequest",
    PartyInviteResponse => "partyInviteResponse",
    PartyJoinRequest => "partyJoinRequest",
    PartyJoinResponse => "partyJoinResponse",
    PartyRejectRequest => "partyRejectRequest",
    PartyRejectResponse => "partyRejectResponse",
    PartyKickRequest => "partyKickRequest",
    PartyKickResponse => "partyKickResponse",
    PartyGetInvitedNotif => "partyGetInvitedNotif",
    PartyJoinNotif => "partyJoinNotif",
    PartyLeaveNotif => "partyLeaveNotif",
    PartyKickNotif => "partyKickNotif",
    PartyInviteNotif => "partyInviteNotif",
    PartyRejectNotif => "partyRejectNotif",
    PartyDataUpdateNotif => "partyDataUpdateNotif",

    // -- Chat --
    PersonalChatRequest => "personalChatRequest",
    PersonalChatResponse => "personalChatResponse",
    PartyChatRequest => "partyChatRequest",
    PartyChatResponse => "partyChatResponse",
    PersonalChatNotif => "personalChatNotif",
    PartyChatNotif => "partyChatNotif",
    MessageNotif => "messageNotif",

    // -- Presence --
    SetUserStatusRequest => "setUserStatusRequest",
    SetUserStatusResponse => "setUserStatusResponse",
    FriendsStatusRequest => "friendsStatusRequest",
    FriendsStatusResponse => "friendsStatusResponse",
    UserStatusNotif => "userStatusNotif",

    // -- Friends --
    RequestFriendsRequest => "requestFriendsRequest",
    RequestFriendsResponse => "requestFriendsResponse",
    AcceptFriendsRequest => "acceptFriendsRequest",
    AcceptFriendsResponse => "acceptFriendsResponse",
    UnfriendRequest => "unfriendRequest",
    UnfriendResponse => "unfriendResponse",
    RequestFriendsNotif => "requestFriendsNotif",
    AcceptFriendsNotif => "acceptFriendsNotif",
    UnfriendNotif => "unfriendNotif",

    // -- Blocking --
    BlockPlayerRequest => "blockPlayerRequest",
    BlockPlayerResponse => "blockPlayerResponse",
    UnblockPlayerRequest => "unblockPlayerRequest",
    UnblockPlayerResponse => "unblockPlayerResponse",
    BlockPlayerNotif => "blockPlayerNotif",
    UnblockPlayerNotif => "unblockPlayerNotif",

    // -- Matchmaking --
    StartMatchmakingRequest => "startMatchmakingRequest",
    StartMatchmakingResponse => "startMatchmakingResponse",
    CancelMatchmakingRequest => "cancelMatchmakingRequest",
    CancelMatchmakingResponse => "cancelMatchmakingResponse",
    SetReadyConsentRequest => "setReadyConsentRequest",
    SetReadyConsentResponse => "setReadyConsentResponse",
    MatchmakingNotif => "matchmakingNotif",
    SetReadyConsentNotif => "setReadyConsentNotif",
    RematchmakingNotif => "rematchmakingNotif",
    DsNotif => "dsNotif",

    // -- Signaling --
    SignalingP2PNotif => "signalingP2PNotif",
}

impl MessageType {
    /// Returns `true` for server pushes that have no matching request.
    pub fn is_notification(&self) -> bool {
        let name = self.as_str();
        name.ends_with("Notif") || name.ends_with("Notification")
    }

    /// Returns `true` for the ban and unban notices, which announce that
    /// the server is about to revoke the current access token.
    pub fn is_ban_notice(&self) -> bool {
        matches!(
            self,
            Self::UserBannedNotification | Self::UserUnbannedNotification
        )
    }

    /// Returns the type the server answers this request with, e.g.
    /// `partyCreateRequest` → `partyCreateResponse`.
    ///
    /// Returns `None` if this isn't a request type.
    pub fn response_type(&self) -> Option<MessageType> {
        self.as_str()
            .strip_suffix("Request")
            .map(|stem| MessageType::from_wire(&format!("{stem}Response")))
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for MessageType {
    fn from(name: &str) -> Self {
        Self::from_wire(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_wire_known_name_round_trips() {
        let kind = MessageType::from_wire("partyCreateRequest");
        assert_eq!(kind, MessageType::PartyCreateRequest);
        assert_eq!(kind.as_str(), "partyCreateRequest");
    }

    #[test]
    fn test_from_wire_unknown_name_is_preserved() {
        let kind = MessageType::from_wire("sessionAttributeNotif");
        assert_eq!(
            kind,
            MessageType::Unknown("sessionAttributeNotif".into())
        );
        assert_eq!(kind.to_string(), "sessionAttributeNotif");
    }

    #[test]
    fn test_is_notification_covers_both_suffixes() {
        assert!(MessageType::PartyJoinNotif.is_notification());
        assert!(MessageType::UserBannedNotification.is_notification());
        assert!(MessageType::from_wire("futureThingNotif").is_notification());
        assert!(!MessageType::PartyCreateResponse.is_notification());
        assert!(!MessageType::PartyCreateRequest.is_notification());
    }

    #[test]
    fn test_is_ban_notice_only_for_ban_types() {
        assert!(MessageType::UserBannedNotification.is_ban_notice());
        assert!(MessageType::UserUnbannedNotification.is_ban_notice());
        assert!(!MessageType::PartyKickNotif.is_ban_notice());
    }

    #[test]
    fn test_response_type_maps_request_suffix() {
        assert_eq!(
            MessageType::PartyCreateRequest.response_type(),
            Some(MessageType::PartyCreateResponse)
        );
        assert_eq!(
            MessageType::from_wire("newThingRequest").response_type(),
            Some(MessageType::Unknown("newThingResponse".into()))
        );
        assert_eq!(MessageType::PartyJoinNotif.response_type(), None);
    }
}
