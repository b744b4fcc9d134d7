use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{RoomAccess, RoomKind};

// -- Posts --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePostRequest {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
}

/// The two terminal moderation outcomes an admin can choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationDecision {
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostStatusUpdate {
    pub status: ModerationDecision,
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikeRequest {
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikeResponse {
    pub is_liked: bool,
    #[serde(default)]
    pub likes_count: Option<u32>,
}

// -- Comments --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentBody {
    pub content: String,
}

/// `POST /posts/{id}/comments` takes the comment nested next to the author id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCommentRequest {
    pub comment: CommentBody,
    pub user_id: String,
}

// -- Journal --

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JournalEntryRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
}

// -- Marketplace --

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    #[serde(default)]
    pub stock: u32,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

// -- Live rooms --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveRoomRequest {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: RoomKind,
    pub access: RoomAccess,
    pub price: f64,
    pub scheduled_at: DateTime<Utc>,
    pub duration: u32,
}

// -- Acks --

/// Body of endpoints that only acknowledge, e.g. `{"message": "Friend request sent"}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: String,
}
