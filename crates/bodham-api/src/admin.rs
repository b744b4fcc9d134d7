use bodham_gateway::Gateway;
use bodham_sync::{CollectionStore, MutationController, MutationKind};
use bodham_types::api::{MessageResponse, ModerationDecision, PostStatusUpdate};
use bodham_types::models::{AdminStats, Post, PostStatus, User};
use futures_util::future::try_join3;
use parking_lot::Mutex;
use tracing::info;

use crate::error::ApiError;
use crate::session::Session;

/// Which slice of posts the moderation queue shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueFilter {
    #[default]
    Pending,
    Approved,
    Rejected,
    All,
}

impl QueueFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::All => "all",
        }
    }

    pub fn admits(&self, status: PostStatus) -> bool {
        match self {
            Self::Pending => status == PostStatus::Pending,
            Self::Approved => status == PostStatus::Approved,
            Self::Rejected => status == PostStatus::Rejected,
            Self::All => true,
        }
    }
}

impl std::str::FromStr for QueueFilter {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "all" => Ok(Self::All),
            other => Err(ApiError::invalid(format!("Unknown queue filter '{other}'"))),
        }
    }
}

fn decided_status(decision: ModerationDecision) -> PostStatus {
    match decision {
        ModerationDecision::Approved => PostStatus::Approved,
        ModerationDecision::Rejected => PostStatus::Rejected,
    }
}

/// Snapshot for the admin landing screen.
#[derive(Debug, Clone)]
pub struct Dashboard {
    pub stats: AdminStats,
    pub users: Vec<User>,
    pub queued: usize,
}

/// Moderation queue, user list and platform stats.
pub struct AdminService {
    gateway: Gateway,
    session: Session,
    queue: MutationController<Post>,
    filter: Mutex<QueueFilter>,
}

impl AdminService {
    /// Fails with `Forbidden` unless the user is an admin.
    pub fn new(gateway: Gateway, session: Session) -> Result<Self, ApiError> {
        session.require_admin()?;
        Ok(Self {
            gateway,
            session,
            queue: MutationController::new(CollectionStore::new()),
            filter: Mutex::new(QueueFilter::default()),
        })
    }

    pub fn queue(&self) -> Vec<Post> {
        self.queue.store().items()
    }

    pub fn store(&self) -> &CollectionStore<Post> {
        self.queue.store()
    }

    pub fn filter(&self) -> QueueFilter {
        *self.filter.lock()
    }

    pub async fn refresh_queue(&self, filter: QueueFilter) -> Result<usize, ApiError> {
        *self.filter.lock() = filter;
        let query = [("status", filter.as_str()), ("role", self.session.role())];
        Ok(self
            .queue
            .store()
            .refresh(self.gateway.get::<Vec<Post>>("admin/posts", &query))
            .await?)
    }

    /// Approve or reject a post. If the new status no longer matches the
    /// queue filter the post leaves the queue at once, otherwise its status
    /// changes in place. Either way a refusal from the server restores it.
    pub async fn moderate(
        &self,
        post_id: &str,
        decision: ModerationDecision,
        reason: Option<String>,
    ) -> Result<(), ApiError> {
        let rejection_reason = match decision {
            ModerationDecision::Rejected => reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty()),
            ModerationDecision::Approved => None,
        };
        let status = decided_status(decision);
        let body = PostStatusUpdate {
            status: decision,
            rejection_reason: rejection_reason.clone(),
        };
        let path = format!("admin/posts/{post_id}/status");
        let query = [("role", self.session.role())];
        let confirm = async {
            self.gateway
                .put::<_, MessageResponse>(&path, &query, &body)
                .await
                .map(|ack| info!(post_id, status = status.as_str(), "{}", ack.message))
        };

        if self.filter().admits(status) {
            self.queue
                .apply(
                    post_id,
                    MutationKind::Moderate,
                    |post| {
                        post.status = status;
                        post.rejection_reason = rejection_reason.clone();
                    },
                    |post, before| {
                        post.status = before.status;
                        post.rejection_reason = before.rejection_reason.clone();
                    },
                    async { confirm.await.map(|_| None) },
                )
                .await?;
        } else {
            self.queue.remove(post_id, MutationKind::Moderate, confirm).await?;
        }
        Ok(())
    }

    pub async fn stats(&self) -> Result<AdminStats, ApiError> {
        Ok(self
            .gateway
            .get("admin/stats", &[("role", self.session.role())])
            .await?)
    }

    pub async fn users(&self) -> Result<Vec<User>, ApiError> {
        Ok(self
            .gateway
            .get("admin/users", &[("role", self.session.role())])
            .await?)
    }

    /// Stats, users and the pending queue, fetched concurrently.
    pub async fn dashboard(&self) -> Result<Dashboard, ApiError> {
        let (stats, users, queued) =
            try_join3(self.stats(), self.users(), self.refresh_queue(QueueFilter::Pending)).await?;
        Ok(Dashboard { stats, users, queued })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_admission() {
        assert!(QueueFilter::Pending.admits(PostStatus::Pending));
        assert!(!QueueFilter::Pending.admits(PostStatus::Approved));
        assert!(QueueFilter::All.admits(PostStatus::Rejected));
        assert!(QueueFilter::Rejected.admits(decided_status(ModerationDecision::Rejected)));
    }

    #[test]
    fn test_filter_parse() {
        assert_eq!("Approved".parse::<QueueFilter>().unwrap(), QueueFilter::Approved);
        assert!("flagged".parse::<QueueFilter>().is_err());
    }
}
