use bodham_gateway::{Gateway, GatewayError};
use bodham_types::models::UserProfile;
use tracing::debug;

use crate::error::ApiError;
use crate::session::Session;

/// Public profile of `user_id` as seen by the signed-in user.
pub async fn profile(gateway: &Gateway, session: &Session, user_id: &str) -> Result<UserProfile, ApiError> {
    Ok(fetch_profile(gateway, user_id, Some(session.user_id())).await?)
}

pub(crate) async fn fetch_profile(
    gateway: &Gateway,
    user_id: &str,
    viewer: Option<&str>,
) -> Result<UserProfile, GatewayError> {
    let path = format!("users/{user_id}");
    let query: Vec<(&str, &str)> = viewer.map(|v| ("current_user_id", v)).into_iter().collect();
    let profile: UserProfile = gateway.get(&path, &query).await?;
    debug!(user_id, posts = profile.posts.len(), "profile loaded");
    Ok(profile)
}
