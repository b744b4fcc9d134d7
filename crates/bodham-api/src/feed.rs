use bodham_gateway::Gateway;
use bodham_sync::{CollectionStore, MutationController, MutationKind, Position};
use bodham_types::api::{CommentBody, CreateCommentRequest, CreatePostRequest, LikeRequest, LikeResponse};
use bodham_types::models::{Comment, Post};
use tracing::{debug, info};

use crate::error::ApiError;
use crate::session::{Session, non_blank};

/// Which posts a feed shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedScope {
    /// Everyone's approved posts.
    Public,
    /// The signed-in user's posts in every moderation state.
    Mine,
}

pub struct FeedService {
    gateway: Gateway,
    session: Session,
    scope: FeedScope,
    posts: MutationController<Post>,
}

impl FeedService {
    pub fn new(gateway: Gateway, session: Session, scope: FeedScope) -> Self {
        Self {
            gateway,
            session,
            scope,
            posts: MutationController::new(CollectionStore::new()),
        }
    }

    pub fn scope(&self) -> FeedScope {
        self.scope
    }

    pub fn store(&self) -> &CollectionStore<Post> {
        self.posts.store()
    }

    pub fn posts(&self) -> Vec<Post> {
        self.store().items()
    }

    /// Whether a post belongs in this feed at all.
    pub fn admits(&self, post: &Post) -> bool {
        match self.scope {
            FeedScope::Public => post.is_visible_in_feed(),
            FeedScope::Mine => post.user_id == self.session.user_id(),
        }
    }

    pub async fn refresh(&self) -> Result<usize, ApiError> {
        let path = match self.scope {
            FeedScope::Public => "posts/",
            FeedScope::Mine => "posts/my",
        };
        let user_id = self.session.user_id();
        let fetch = async {
            let posts: Vec<Post> = self.gateway.get(path, &[("user_id", user_id)]).await?;
            Ok::<_, ApiError>(posts.into_iter().filter(|p| self.admits(p)).collect())
        };
        let len = self.store().refresh(fetch).await?;
        debug!(scope = ?self.scope, len, "feed refreshed");
        Ok(len)
    }

    /// Submit a post for moderation. It only shows up locally once the
    /// server has confirmed it, and never in the public feed while pending.
    pub async fn create_post(&self, content: &str, image_url: Option<String>) -> Result<Post, ApiError> {
        let content = non_blank(content, "Post")?;
        let body = CreatePostRequest {
            content: content.to_string(),
            image_url,
            video_url: None,
        };
        let query = [
            ("user_id", self.session.user_id()),
            ("author_name", self.session.display_name()),
        ];
        let created = self
            .posts
            .insert_confirmed(self.gateway.post("posts/", &query, &body), Position::Front, |p| {
                self.admits(p)
            })
            .await?;
        info!(post_id = %created.id, status = created.status.as_str(), "post created");
        Ok(created)
    }

    /// Flip the viewer's like. The count moves immediately; the server's
    /// answer decides the final value.
    pub async fn toggle_like(&self, post_id: &str) -> Result<Post, ApiError> {
        let path = format!("posts/{post_id}/like");
        let body = LikeRequest {
            user_id: self.session.user_id().to_string(),
        };
        let (post, _) = self
            .posts
            .apply_with(
                post_id,
                MutationKind::Like,
                Post::toggle_like,
                |post: &mut Post, _: &Post| post.toggle_like(),
                self.gateway.post::<_, LikeResponse>(&path, &[], &body),
                |post: &mut Post, resp: &LikeResponse| {
                    post.is_liked_by_me = resp.is_liked;
                    if let Some(count) = resp.likes_count {
                        post.likes_count = count;
                    }
                },
            )
            .await?;
        Ok(post)
    }

    /// Delete one of the signed-in user's own posts.
    pub async fn delete_post(&self, post_id: &str) -> Result<(), ApiError> {
        let owned = self
            .store()
            .find_by_id(post_id)
            .is_none_or(|p| p.user_id == self.session.user_id());
        if !owned {
            return Err(ApiError::forbidden("You can only delete your own posts"));
        }
        let path = format!("posts/{post_id}");
        self.posts
            .remove(
                post_id,
                MutationKind::Delete,
                self.gateway.delete(&path, &[("user_id", self.session.user_id())]),
            )
            .await?;
        info!(post_id, "post deleted");
        Ok(())
    }

    /// Load the comment thread under a post.
    pub async fn comments(&self, post_id: &str) -> Result<CommentThread, ApiError> {
        let thread = CommentThread::new(post_id);
        thread.refresh(&self.gateway).await?;
        Ok(thread)
    }

    /// Comment on a post. The post's comment count is bumped right away and
    /// rolled back if the server refuses; the confirmed comment is appended
    /// to `thread`.
    pub async fn add_comment(&self, thread: &CommentThread, content: &str) -> Result<Comment, ApiError> {
        let content = non_blank(content, "Comment")?;
        let path = format!("posts/{}/comments", thread.post_id());
        let body = CreateCommentRequest {
            comment: CommentBody {
                content: content.to_string(),
            },
            user_id: self.session.user_id().to_string(),
        };
        let request = self.gateway.post::<_, Comment>(&path, &[], &body);

        let comment = if self.store().contains(thread.post_id()) {
            let (_, comment) = self
                .posts
                .apply_with(
                    thread.post_id(),
                    MutationKind::Comment,
                    |post| post.comments_count = post.comments_count.saturating_add(1),
                    |post, _| post.comments_count = post.comments_count.saturating_sub(1),
                    request,
                    |_, _| {},
                )
                .await?;
            comment
        } else {
            request.await?
        };

        thread.comments.upsert_at(comment.clone(), Position::Back);
        Ok(comment)
    }
}

/// Comments under one post, oldest first.
pub struct CommentThread {
    post_id: String,
    comments: CollectionStore<Comment>,
}

impl CommentThread {
    pub fn new(post_id: impl Into<String>) -> Self {
        Self {
            post_id: post_id.into(),
            comments: CollectionStore::new(),
        }
    }

    pub fn post_id(&self) -> &str {
        &self.post_id
    }

    pub fn store(&self) -> &CollectionStore<Comment> {
        &self.comments
    }

    pub fn comments(&self) -> Vec<Comment> {
        self.comments.items()
    }

    pub async fn refresh(&self, gateway: &Gateway) -> Result<usize, ApiError> {
        let path = format!("posts/{}/comments", self.post_id);
        Ok(self
            .comments
            .refresh(async { gateway.get::<Vec<Comment>>(&path, &[]).await })
            .await?)
    }
}
