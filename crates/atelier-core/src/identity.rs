//! Current-user identity as provided by the authentication layer.

use serde::{Deserialize, Serialize};

/// Who the local user is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl Identity {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            avatar_url: None,
        }
    }

    pub fn with_avatar(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }

    /// Identity used when nobody is signed in.
    pub fn anonymous() -> Self {
        Self::new(format!("anon-{}", uuid::Uuid::new_v4()), "Anonymous")
    }
}

/// Source of the signed-in user.
pub trait IdentityProvider {
    fn current_user(&self) -> Identity;
}

/// Provider that always returns the same identity.
#[derive(Debug, Clone)]
pub struct StaticIdentity(pub Identity);

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Identity {
        self.0.clone()
    }
}
