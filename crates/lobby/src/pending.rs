//! The pending-call registry: who is waiting for which response.
//!
//! Every request the lobby sends gets an entry keyed by its message id.
//! The entry holds the response type the caller expects and a oneshot
//! sender for the result. An entry leaves the registry exactly one way:
//!
//! - **resolved** by the matching response frame,
//! - **failed** (payload decode error, timeout),
//! - **swept** with `ConnectionLost` when the socket closes.
//!
//! Removing the entry and completing the oneshot happen together, so a
//! second response with the same id finds nothing and is an orphan.

use std::collections::HashMap;

use lobby_protocol::{Frame, MessageId, MessageType};
use lobby_transport::CloseCode;
use tokio::sync::oneshot;

use crate::LobbyError;

/// Where a pending call's result goes.
pub type Reply = oneshot::Sender<Result<Frame, LobbyError>>;

struct PendingCall {
    expected: MessageType,
    reply: Reply,
}

/// Outstanding requests, keyed by message id.
///
/// Owned by the driver task; no locking.
#[derive(Default)]
pub struct PendingCalls {
    calls: HashMap<MessageId, PendingCall>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls still waiting.
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.calls.contains_key(&id)
    }

    /// Starts waiting for the response to request `id`.
    ///
    /// # Errors
    /// Returns [`LobbyError::DuplicateId`] if `id` is already pending. The
    /// existing entry is untouched; the new `reply` is completed with the
    /// same error.
    pub fn register(
        &mut self,
        id: MessageId,
        expected: MessageType,
        reply: Reply,
    ) -> Result<(), LobbyError> {
        if self.calls.contains_key(&id) {
            tracing::warn!(%id, %expected, "message id already pending");
            let _ = reply.send(Err(LobbyError::DuplicateId(id)));
            return Err(LobbyError::DuplicateId(id));
        }
        self.calls.insert(id, PendingCall { expected, reply });
        Ok(())
    }

    /// Completes the call waiting on `frame.id` with the response.
    ///
    /// The caller receives:
    /// - `Err(ServerError)` if the frame carries a non-zero code,
    /// - `Err(UnexpectedResponse)` if the frame is a different known type
    ///   than expected,
    /// - `Ok(frame)` otherwise. Unknown types are accepted so a newer
    ///   server's renamed responses still reach their caller.
    ///
    /// # Errors
    /// Returns [`LobbyError::OrphanResponse`] if nobody is waiting on the
    /// id (or the frame has none). The frame is dropped.
    pub fn resolve(&mut self, frame: Frame) -> Result<(), LobbyError> {
        let Some(id) = frame.id else {
            return Err(LobbyError::OrphanResponse(MessageId(0)));
        };
        let Some(call) = self.calls.remove(&id) else {
            return Err(LobbyError::OrphanResponse(id));
        };

        let result = if !frame.is_success() {
            Err(server_error(&frame))
        } else if frame.kind == call.expected
            || matches!(frame.kind, MessageType::Unknown(_))
        {
            Ok(frame)
        } else {
            tracing::warn!(
                %id,
                expected = %call.expected,
                actual = %frame.kind,
                "response type does not match request"
            );
            Err(LobbyError::UnexpectedResponse {
                expected: call.expected,
                actual: frame.kind,
            })
        };

        // The receiver may be gone (caller stopped waiting); that's fine.
        let _ = call.reply.send(result);
        Ok(())
    }

    /// Completes the call waiting on `id` with `error`.
    ///
    /// Returns `false` if nothing was pending under `id`.
    pub fn fail(&mut self, id: MessageId, error: LobbyError) -> bool {
        match self.calls.remove(&id) {
            Some(call) => {
                let _ = call.reply.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Drops the entry for `id` without completing it. A response that
    /// arrives later is an orphan.
    pub fn forget(&mut self, id: MessageId) -> bool {
        self.calls.remove(&id).is_some()
    }

    /// Fails every pending call with `ConnectionLost { code }` and empties
    /// the registry. Returns how many calls were swept.
    pub fn sweep_all(&mut self, code: CloseCode) -> usize {
        let swept = self.calls.len();
        for (_, call) in self.calls.drain() {
            let _ = call.reply.send(Err(LobbyError::ConnectionLost { code }));
        }
        if swept > 0 {
            tracing::debug!(swept, %code, "failed pending calls on close");
        }
        swept
    }
}

/// Builds a `ServerError` from an error response. The message comes from
/// the payload when the server sent one.
fn server_error(frame: &Frame) -> LobbyError {
    let message = ["message", "errorMessage"]
        .iter()
        .find_map(|key| frame.fields.get_text(key))
        .unwrap_or_default()
        .to_string();
    LobbyError::ServerError {
        code: frame.code.unwrap_or_default(),
        message,
    }
}
