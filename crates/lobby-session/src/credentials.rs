//! The access-token store shared with the login collaborator.
//!
//! The lobby doesn't log anyone in. Some other component (an OAuth client,
//! a platform SDK, a test) obtains the access token and hands it over by
//! calling [`Credentials::set_access_token`]. That call is the lobby's
//! token-update hook: the connection driver watches it to refresh the token
//! on a live socket, and to finish a ban-triggered reconnect.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

/// A bearer token for the lobby service.
///
/// `Debug` is redacted so tokens never end up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wraps a raw token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token for building headers and refresh requests.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(..)")
    }
}

impl From<&str> for AccessToken {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl From<String> for AccessToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

/// Receiver side of the token hook.
pub type TokenWatch = watch::Receiver<Option<AccessToken>>;

/// Shared handle to the current access token.
///
/// Cheap to clone; every clone sees and updates the same token.
///
/// # Example
///
/// ```rust
/// use lobby_session::Credentials;
///
/// let credentials = Credentials::new();
/// assert!(credentials.access_token().is_none());
///
/// // The login flow finished:
/// credentials.set_access_token("eyJhbGciOi...");
/// assert_eq!(credentials.access_token().unwrap().as_str(), "eyJhbGciOi...");
/// ```
#[derive(Clone)]
pub struct Credentials {
    token: Arc<watch::Sender<Option<AccessToken>>>,
}

impl Credentials {
    /// Creates an empty store.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { token: Arc::new(tx) }
    }

    /// Creates a store that already holds `token`.
    pub fn with_token(token: impl Into<AccessToken>) -> Self {
        let credentials = Self::new();
        credentials.set_access_token(token);
        credentials
    }

    /// The token-update hook. Stores `token` and wakes every watcher, even
    /// if the new token equals the old one.
    pub fn set_access_token(&self, token: impl Into<AccessToken>) {
        self.token.send_replace(Some(token.into()));
        tracing::debug!("access token updated");
    }

    /// Forgets the current token (logout).
    pub fn clear(&self) {
        self.token.send_replace(None);
    }

    /// Returns a copy of the current token.
    pub fn access_token(&self) -> Option<AccessToken> {
        self.token.borrow().clone()
    }

    /// Subscribes to token updates. The current value counts as already
    /// seen, so the receiver only fires for updates made after this call.
    pub fn subscribe(&self) -> TokenWatch {
        self.token.subscribe()
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("has_token", &self.token.borrow().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_debug_is_redacted() {
        let token = AccessToken::new("secret");
        assert_eq!(format!("{token:?}"), "AccessToken(..)");
        assert!(!format!("{:?}", Credentials::with_token("secret")).contains("secret"));
    }

    #[test]
    fn test_clones_share_the_token() {
        let a = Credentials::new();
        let b = a.clone();
        a.set_access_token("t1");
        assert_eq!(b.access_token(), Some(AccessToken::new("t1")));
        b.clear();
        assert!(a.access_token().is_none());
    }

    #[tokio::test]
    async fn test_subscribe_fires_only_for_later_updates() {
        let credentials = Credentials::with_token("old");
        let mut watch = credentials.subscribe();
        assert!(!watch.has_changed().unwrap());

        credentials.set_access_token("new");
        watch.changed().await.unwrap();
        assert_eq!(
            watch.borrow_and_update().clone(),
            Some(AccessToken::new("new"))
        );
    }

    #[tokio::test]
    async fn test_same_token_still_notifies() {
        let credentials = Credentials::with_token("same");
        let mut watch = credentials.subscribe();
        credentials.set_access_token("same");
        assert!(watch.has_changed().unwrap());
    }
}
