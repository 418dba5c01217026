use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::SessionConfig;
use crate::nhost::GatewayError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub access_token: Option<String>,
}

/// The signed-in user, if any. Actions that need one call [`Manager::require`]
/// before any request goes out.
#[derive(Debug, Default)]
pub struct Manager {
    active: RwLock<Option<Session>>,
}

impl Manager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(cfg: &SessionConfig) -> Arc<Self> {
        let manager = Arc::new(Self::new());
        let user_id = cfg.user_id.trim();
        if !user_id.is_empty() {
            manager.sign_in(Session {
                user_id: user_id.to_string(),
                access_token: Some(cfg.access_token.trim().to_string())
                    .filter(|token| !token.is_empty()),
            });
        }
        manager
    }

    pub fn sign_in(&self, session: Session) {
        tracing::info!(user_id = %session.user_id, "session active");
        *self.active.write() = Some(session);
    }

    pub fn sign_out(&self) {
        *self.active.write() = None;
    }

    pub fn active(&self) -> Option<Session> {
        self.active.read().clone()
    }

    pub fn user_id(&self) -> Option<String> {
        self.active.read().as_ref().map(|session| session.user_id.clone())
    }

    pub fn require(&self) -> Result<Session, GatewayError> {
        self.active().ok_or(GatewayError::NotSignedIn)
    }
}
