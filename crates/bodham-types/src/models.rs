use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timestamp;

/// Anything the server hands out under an opaque string id.
/// The client never mints ids for persisted entities.
pub trait Identified {
    fn id(&self) -> &str;
}

macro_rules! identified {
    ($($ty:ty),* $(,)?) => {
        $(impl Identified for $ty {
            fn id(&self) -> &str {
                &self.id
            }
        })*
    };
}

identified!(Post, Comment, FriendRequest, Friend, JournalEntry, Product, LiveRoom, User);

// -- Users --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Host,
    Admin,
    Seller,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Host => "host",
            Self::Admin => "admin",
            Self::Seller => "seller",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub is_verified_host: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seller_status: Option<ApprovalStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_pic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default)]
    pub streak_count: u32,
}

impl User {
    /// Name shown next to authored content: full name, falling back to email.
    pub fn display_name(&self) -> &str {
        match self.full_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.email,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Hosts (and admins) need an approved host profile before running rooms.
    pub fn can_host(&self) -> bool {
        matches!(self.role, Role::Host | Role::Admin) && self.is_verified_host
    }

    /// Sellers, or admins/hosts who registered as sellers, once approved.
    pub fn can_sell(&self) -> bool {
        matches!(self.role, Role::Seller | Role::Admin | Role::Host)
            && self.seller_status == Some(ApprovalStatus::Approved)
    }
}

/// Public profile bundle returned by `GET /users/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_data: User,
    #[serde(default)]
    pub posts: Vec<Post>,
    #[serde(default)]
    pub followers_count: u32,
    #[serde(default)]
    pub following_count: u32,
    #[serde(default)]
    pub streaks: u32,
}

// -- Posts --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Pending,
    Approved,
    Rejected,
    Flagged,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Flagged => "flagged",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub author_name: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    pub status: PostStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub likes_count: u32,
    #[serde(default)]
    pub comments_count: u32,
    #[serde(default)]
    pub is_liked_by_me: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_profile_pic: Option<String>,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
}

impl Post {
    /// Only approved posts belong in the general feed.
    pub fn is_visible_in_feed(&self) -> bool {
        self.status == PostStatus::Approved
    }

    pub fn toggle_like(&mut self) {
        if self.is_liked_by_me {
            self.likes_count = self.likes_count.saturating_sub(1);
        } else {
            self.likes_count = self.likes_count.saturating_add(1);
        }
        self.is_liked_by_me = !self.is_liked_by_me;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    #[serde(default)]
    pub author_name: String,
    pub content: String,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
}

// -- Friends --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendRequest {
    #[serde(rename = "request_id", alias = "id")]
    pub id: String,
    pub from_user_id: String,
    pub from_user_name: String,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendAction {
    Accept,
    Decline,
}

impl FriendAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Decline => "decline",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Friend {
    pub id: String,
    #[serde(default)]
    pub full_name: Option<String>,
    pub email: String,
}

// -- Journal --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub content: String,
    /// The day the entry is about, which may differ from when it was written.
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub date: DateTime<Utc>,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
}

// -- Marketplace --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    #[default]
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub seller_id: String,
    #[serde(default)]
    pub seller_name: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    #[serde(default)]
    pub stock: u32,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub status: ProductStatus,
    #[serde(default, deserialize_with = "timestamp::deserialize_option")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Product {
    pub fn is_listed(&self) -> bool {
        self.status == ProductStatus::Active
    }
}

// -- Live rooms --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    Group,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomAccess {
    Free,
    Paid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    #[default]
    Upcoming,
    Live,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveRoom {
    pub id: String,
    pub host_id: String,
    #[serde(default)]
    pub host_name: Option<String>,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: RoomKind,
    pub access: RoomAccess,
    #[serde(default)]
    pub price: f64,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub scheduled_at: DateTime<Utc>,
    /// Minutes.
    pub duration: u32,
    #[serde(default)]
    pub status: RoomStatus,
}

impl LiveRoom {
    /// Hosts may only reshape their own sessions before they start.
    pub fn is_editable_by(&self, user_id: &str) -> bool {
        self.host_id == user_id && self.status == RoomStatus::Upcoming
    }
}

// -- Admin --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AdminStats {
    pub total_users: u64,
    pub pending_moderation: u64,
}
