//! The process-singleton `Session`: active user identity, the expiring
//! access token and its refresh callback, the network-online flag, and a
//! marker for the single active collaboration session (if any).
//!
//! `gnote_collab`'s actual session object lives in its own crate to keep
//! the CRDT/WebRTC stack decoupled from this one; this crate only holds
//! the small [`ActiveCollabMarker`] so the two subsystems can observe
//! each other's presence without a dependency cycle.

use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;

/// Boxed future used for the one spot in this crate where a callback
/// must be object-safe: the token-refresh hook is stored as a
/// `dyn RefreshTokenCallback`, which rules out the `impl Future` return
/// style used elsewhere in this workspace.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A bearer token with its expiry.
#[derive(Debug, Clone)]
pub struct AccessToken {
    /// The bearer token string.
    pub token: String,
    /// Milliseconds since epoch at which this token expires.
    pub expires_at_ms: i64,
}

/// Result of a successful token refresh.
#[derive(Debug, Clone)]
pub struct TokenRefresh {
    /// New bearer token.
    pub access_token: String,
    /// Seconds until the new token expires.
    pub expires_in_sec: i64,
}

/// Host-supplied callback invoked on `AuthExpired`. Implementations
/// typically wrap an OAuth refresh-token exchange; this crate only
/// contracts the callback shape, not the OAuth dance itself.
pub trait RefreshTokenCallback: Send + Sync {
    /// Attempt to mint a fresh access token for `user_id`.
    fn refresh(&self, user_id: &str) -> BoxFuture<'static, Result<TokenRefresh, String>>;
}

/// Marker recording that a collaboration session is active for a note,
/// without this crate needing to know anything about CRDTs or peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveCollabMarker {
    /// Note the session is attached to.
    pub note_id: crate::model::NoteId,
    /// Six-character room id.
    pub room_id: String,
}

struct State {
    user_id: Option<String>,
    token: Option<AccessToken>,
    active_collab: Option<ActiveCollabMarker>,
    online: bool,
}

/// The process-singleton session object. Cheap to clone-share via `Arc`;
/// internally guarded by a single `RwLock` since all fields change
/// together rarely and are read constantly.
pub struct Session {
    state: RwLock<State>,
    refresh_cb: Option<Box<dyn RefreshTokenCallback>>,
}

impl Session {
    /// Build a session with no signed-in user and the network assumed
    /// online until told otherwise.
    pub fn new(refresh_cb: Option<Box<dyn RefreshTokenCallback>>) -> Self {
        Session {
            state: RwLock::new(State {
                user_id: None,
                token: None,
                active_collab: None,
                online: true,
            }),
            refresh_cb,
        }
    }

    /// Sign in: record the user id and initial access token.
    pub fn sign_in(&self, user_id: impl Into<String>, token: AccessToken) {
        let mut state = self.state.write().unwrap();
        state.user_id = Some(user_id.into());
        state.token = Some(token);
    }

    /// Sign out: clears identity, token and any active collaboration
    /// marker. Called when a token refresh fails during a sync cycle —
    /// auth expired with no successful refresh is terminal for the
    /// session.
    pub fn sign_out(&self) {
        let mut state = self.state.write().unwrap();
        state.user_id = None;
        state.token = None;
        state.active_collab = None;
    }

    /// Currently signed-in user id, if any.
    pub fn user_id(&self) -> Option<String> {
        self.state.read().unwrap().user_id.clone()
    }

    /// Current access token, if signed in.
    pub fn access_token(&self) -> Option<AccessToken> {
        self.state.read().unwrap().token.clone()
    }

    /// Attempt a single token refresh via the host-supplied callback.
    /// On success the new token replaces the old one; on failure the
    /// session is left untouched (callers decide whether to sign out).
    pub async fn refresh_token(&self) -> Result<AccessToken, String> {
        let user_id = self.user_id().ok_or_else(|| "not signed in".to_string())?;
        let cb = self
            .refresh_cb
            .as_ref()
            .ok_or_else(|| "no refresh callback configured".to_string())?;
        let result = cb.refresh(&user_id).await?;
        let now_ms = chrono::Utc::now().timestamp_millis();
        let token = AccessToken {
            token: result.access_token,
            expires_at_ms: now_ms + result.expires_in_sec * 1_000,
        };
        self.state.write().unwrap().token = Some(token.clone());
        Ok(token)
    }

    /// Mark the network as reachable or not. Read by the Sync Engine to
    /// decide whether to trigger a reconnect cycle.
    pub fn set_online(&self, online: bool) {
        self.state.write().unwrap().online = online;
    }

    /// Whether the network is currently believed reachable.
    pub fn is_online(&self) -> bool {
        self.state.read().unwrap().online
    }

    /// Record that a collaboration session has attached. Only one may be
    /// active at a time.
    pub fn attach_collab(&self, marker: ActiveCollabMarker) {
        self.state.write().unwrap().active_collab = Some(marker);
    }

    /// Clear the active collaboration marker on session end.
    pub fn detach_collab(&self) {
        self.state.write().unwrap().active_collab = None;
    }

    /// The currently active collaboration session, if any.
    pub fn active_collab(&self) -> Option<ActiveCollabMarker> {
        self.state.read().unwrap().active_collab.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysFails;
    impl RefreshTokenCallback for AlwaysFails {
        fn refresh(&self, _user_id: &str) -> BoxFuture<'static, Result<TokenRefresh, String>> {
            Box::pin(async { Err("refresh denied".to_string()) })
        }
    }

    struct AlwaysSucceeds;
    impl RefreshTokenCallback for AlwaysSucceeds {
        fn refresh(&self, _user_id: &str) -> BoxFuture<'static, Result<TokenRefresh, String>> {
            Box::pin(async {
                Ok(TokenRefresh {
                    access_token: "new-token".to_string(),
                    expires_in_sec: 3600,
                })
            })
        }
    }

    #[tokio::test]
    async fn refresh_failure_leaves_existing_token_in_place() {
        let session = Session::new(Some(Box::new(AlwaysFails)));
        session.sign_in("u1", AccessToken { token: "old".into(), expires_at_ms: 0 });
        let result = session.refresh_token().await;
        assert!(result.is_err());
        assert_eq!(session.access_token().unwrap().token, "old");
    }

    #[tokio::test]
    async fn refresh_success_replaces_token() {
        let session = Session::new(Some(Box::new(AlwaysSucceeds)));
        session.sign_in("u1", AccessToken { token: "old".into(), expires_at_ms: 0 });
        let refreshed = session.refresh_token().await.unwrap();
        assert_eq!(refreshed.token, "new-token");
        assert_eq!(session.access_token().unwrap().token, "new-token");
    }

    #[test]
    fn only_one_collab_marker_at_a_time() {
        let session = Session::new(None);
        session.attach_collab(ActiveCollabMarker { note_id: "n1".into(), room_id: "abc123".into() });
        session.attach_collab(ActiveCollabMarker { note_id: "n2".into(), room_id: "def456".into() });
        assert_eq!(session.active_collab().unwrap().note_id, crate::model::NoteId("n2".into()));
    }
}
