use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Read-only view of the session credential.
///
/// Pollers read the latest token on every fetch and never write it; the
/// owning application can rotate it through an [`AuthUpdater`].
#[derive(Clone)]
pub struct AuthContext {
    token: watch::Receiver<Arc<str>>,
}

pub struct AuthUpdater {
    token: watch::Sender<Arc<str>>,
}

impl AuthContext {
    /// A context whose token never changes.
    pub fn fixed(token: impl Into<Arc<str>>) -> Self {
        let (_, rx) = watch::channel(token.into());
        Self { token: rx }
    }

    pub fn channel(token: impl Into<Arc<str>>) -> (AuthUpdater, Self) {
        let (tx, rx) = watch::channel(token.into());
        (AuthUpdater { token: tx }, Self { token: rx })
    }

    pub fn token(&self) -> Arc<str> {
        self.token.borrow().clone()
    }
}

impl AuthUpdater {
    pub fn set(&self, token: impl Into<Arc<str>>) {
        self.token.send_replace(token.into());
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("token", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_token_survives_dropped_sender() {
        let auth = AuthContext::fixed("abc");
        assert_eq!(&*auth.token(), "abc");
    }

    #[test]
    fn rotation_is_visible_to_clones() {
        let (updater, auth) = AuthContext::channel("old");
        let clone = auth.clone();
        updater.set("new");
        assert_eq!(&*auth.token(), "new");
        assert_eq!(&*clone.token(), "new");
    }

    #[test]
    fn debug_hides_token() {
        let auth = AuthContext::fixed("hunter2");
        assert!(!format!("{auth:?}").contains("hunter2"));
    }
}
