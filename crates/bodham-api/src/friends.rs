use std::time::Duration;

use bodham_gateway::Gateway;
use bodham_sync::{CollectionStore, MutationController, MutationKind, PollHandle, Poller};
use bodham_types::api::MessageResponse;
use bodham_types::models::{Friend, FriendAction, FriendRequest, User};
use tracing::info;

use crate::error::ApiError;
use crate::session::{Session, non_blank};

const REQUESTS_PATH: &str = "friends/requests";

/// Friend requests inbox, friend list and user search.
pub struct FriendsService {
    gateway: Gateway,
    session: Session,
    inbox: MutationController<FriendRequest>,
}

impl FriendsService {
    pub fn new(gateway: Gateway, session: Session) -> Self {
        Self {
            gateway,
            session,
            inbox: MutationController::new(CollectionStore::new()),
        }
    }

    pub fn inbox(&self) -> &CollectionStore<FriendRequest> {
        self.inbox.store()
    }

    pub fn pending(&self) -> Vec<FriendRequest> {
        self.inbox().items()
    }

    pub async fn refresh_inbox(&self) -> Result<usize, ApiError> {
        let user_id = self.session.user_id();
        Ok(self
            .inbox()
            .refresh(self.gateway.get::<Vec<FriendRequest>>(REQUESTS_PATH, &[("user_id", user_id)]))
            .await?)
    }

    /// Keep the inbox fresh in the background until the handle is stopped
    /// or dropped.
    pub fn watch_inbox(&self, interval: Duration) -> PollHandle {
        let gateway = self.gateway.clone();
        let user_id = self.session.user_id().to_string();
        Poller::into_store(self.inbox().clone(), interval, move || {
            let gateway = gateway.clone();
            let user_id = user_id.clone();
            async move {
                gateway
                    .get::<Vec<FriendRequest>>(REQUESTS_PATH, &[("user_id", user_id.as_str())])
                    .await
            }
        })
    }

    /// Returns the server's acknowledgement, e.g. "Request already pending".
    pub async fn send_request(&self, to_user_id: &str) -> Result<String, ApiError> {
        let to_user_id = non_blank(to_user_id, "Recipient")?;
        if to_user_id == self.session.user_id() {
            return Err(ApiError::invalid("You cannot send a friend request to yourself"));
        }
        let ack: MessageResponse = self
            .gateway
            .post_empty(
                "friends/request",
                &[("from_user_id", self.session.user_id()), ("to_user_id", to_user_id)],
            )
            .await?;
        info!(to_user_id, "friend request sent");
        Ok(ack.message)
    }

    /// Accept or decline. The request leaves the inbox immediately and comes
    /// back if the server refuses.
    pub async fn respond(&self, request_id: &str, action: FriendAction) -> Result<FriendRequest, ApiError> {
        let confirm = async {
            self.gateway
                .post_empty::<MessageResponse>(
                    "friends/respond",
                    &[("request_id", request_id), ("action", action.as_str())],
                )
                .await
                .map(|_| ())
        };
        let request = self.inbox.remove(request_id, MutationKind::Respond, confirm).await?;
        info!(request_id, action = action.as_str(), from = %request.from_user_id, "friend request answered");
        Ok(request)
    }

    /// Verified users matching `query` by name or email, excluding the
    /// signed-in user.
    pub async fn search(&self, query: &str) -> Result<Vec<User>, ApiError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .gateway
            .get(
                "friends/search",
                &[("query", query), ("current_user_id", self.session.user_id())],
            )
            .await?)
    }

    pub async fn list_friends(&self) -> Result<Vec<Friend>, ApiError> {
        Ok(self
            .gateway
            .get("friends/list", &[("user_id", self.session.user_id())])
            .await?)
    }
}
