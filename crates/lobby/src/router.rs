//! Notification routing: message type → ordered list of handlers.
//!
//! Handlers run on the driver task, one at a time, in the order they were
//! subscribed. Subscriptions outlive reconnects; only an explicit
//! unsubscribe (or dropping the lobby) removes them.

use std::collections::HashMap;
use std::fmt;

use lobby_protocol::{Frame, MessageType};

/// Identifies one subscription so it can be removed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A notification callback.
pub type Handler = Box<dyn FnMut(&Frame) + Send>;

/// The routing table.
#[derive(Default)]
pub struct NotificationRouter {
    routes: HashMap<MessageType, Vec<(SubscriptionId, Handler)>>,
}

impl NotificationRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `handler` to the list for `kind`.
    pub fn subscribe(
        &mut self,
        kind: MessageType,
        id: SubscriptionId,
        handler: Handler,
    ) {
        tracing::debug!(%kind, %id, "subscribed");
        self.routes.entry(kind).or_default().push((id, handler));
    }

    /// Removes subscription `id` from `kind`. Removing something that isn't
    /// subscribed is a no-op; returns whether anything was removed.
    pub fn unsubscribe(&mut self, kind: &MessageType, id: SubscriptionId) -> bool {
        let Some(handlers) = self.routes.get_mut(kind) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            self.routes.remove(kind);
        }
        removed
    }

    /// Calls every handler subscribed to `frame.kind`, in subscription
    /// order. Returns how many ran.
    pub fn dispatch(&mut self, frame: &Frame) -> usize {
        let Some(handlers) = self.routes.get_mut(&frame.kind) else {
            tracing::debug!(kind = %frame.kind, "no handler for notification");
            return 0;
        };
        for (_, handler) in handlers.iter_mut() {
            handler(frame);
        }
        handlers.len()
    }

    /// Number of handlers subscribed to `kind`.
    pub fn handler_count(&self, kind: &MessageType) -> usize {
        self.routes.get(kind).map_or(0, Vec::len)
    }

    /// Removes every subscription.
    pub fn clear(&mut self) {
        self.routes.clear();
    }
}
