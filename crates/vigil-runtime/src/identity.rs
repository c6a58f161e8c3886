//! Signed-in user

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vigil_core::VigilResult;
use vigil_transport::Credential;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub display_name: Option<String>,
}

impl UserProfile {
    pub fn new(id: impl Into<String>) -> Self {
        UserProfile {
            id: id.into(),
            display_name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Identity collaborator. Only consulted on an explicit session start.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<UserProfile>;

    /// Bearer credential for the session, if the backend wants one.
    /// Fails with `Identity`.
    async fn credential(&self) -> VigilResult<Option<Credential>>;
}
