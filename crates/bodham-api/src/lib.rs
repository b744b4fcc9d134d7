//! Per-resource services for the Bodham REST API, built on the sync layer.

pub mod admin;
pub mod error;
pub mod feed;
pub mod friends;
pub mod journals;
pub mod marketplace;
pub mod rooms;
pub mod session;
pub mod users;

pub use admin::{AdminService, Dashboard, QueueFilter};
pub use error::ApiError;
pub use feed::{CommentThread, FeedScope, FeedService};
pub use friends::FriendsService;
pub use journals::JournalService;
pub use marketplace::{MarketplaceService, SellerService};
pub use rooms::HostService;
pub use session::Session;
