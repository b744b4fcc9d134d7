use std::sync::Arc;

use bodham_gateway::Gateway;
use bodham_types::models::User;
use tracing::info;

use crate::error::ApiError;
use crate::users;

/// The signed-in user, passed explicitly to every service.
///
/// Cheap to clone. Role checks here are client-side gates only.
#[derive(Debug, Clone)]
pub struct Session {
    user: Arc<User>,
}

impl Session {
    pub fn new(user: User) -> Self {
        Self {
            user: Arc::new(user),
        }
    }

    /// Load the user's own profile and open a session for them.
    pub async fn sign_in(gateway: &Gateway, user_id: &str) -> Result<Self, ApiError> {
        if user_id.trim().is_empty() {
            return Err(ApiError::invalid("A user id is required"));
        }
        let profile = users::fetch_profile(gateway, user_id, Some(user_id)).await?;
        info!(user_id, role = profile.user_data.role.as_str(), "session opened");
        Ok(Self::new(profile.user_data))
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    pub fn display_name(&self) -> &str {
        self.user.display_name()
    }

    pub fn role(&self) -> &'static str {
        self.user.role.as_str()
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.user.is_admin() {
            Ok(())
        } else {
            Err(ApiError::forbidden("Admin access required"))
        }
    }

    pub fn require_host(&self) -> Result<(), ApiError> {
        if self.user.can_host() {
            Ok(())
        } else {
            Err(ApiError::forbidden("Only verified hosts can manage sessions"))
        }
    }

    pub fn require_seller(&self) -> Result<(), ApiError> {
        if self.user.can_sell() {
            Ok(())
        } else {
            Err(ApiError::forbidden("Only approved sellers can list products"))
        }
    }
}

/// Reject blank user text; returns the trimmed value.
pub(crate) fn non_blank<'a>(value: &'a str, what: &str) -> Result<&'a str, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ApiError::invalid(format!("{what} cannot be empty")))
    } else {
        Ok(trimmed)
    }
}
