use clap::{Parser, Subcommand, ValueEnum};

use bodham_api::QueueFilter;
use bodham_types::models::FriendAction;

#[derive(Parser, Debug)]
#[command(name = "bodham", about = "Headless client for the Bodham API")]
pub struct Cli {
    /// Signed-in user id
    #[arg(long, env = "BODHAM_USER_ID")]
    pub user_id: String,

    /// API base URL; overrides BODHAM_API_BASE_URL
    #[arg(long)]
    pub api_base: Option<String>,

    /// Bearer token; overrides BODHAM_AUTH_TOKEN
    #[arg(long)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the feed
    Feed {
        /// Your own posts in every moderation state
        #[arg(long)]
        mine: bool,
        /// Toggle your like on a post first
        #[arg(long, value_name = "POST_ID")]
        like: Option<String>,
    },
    /// Submit a post for moderation
    Post {
        content: String,
        #[arg(long)]
        image_url: Option<String>,
    },
    /// Show, or add to, the comments under a post
    Comments {
        post_id: String,
        #[arg(long, value_name = "TEXT")]
        add: Option<String>,
    },
    /// Pending friend requests
    Inbox {
        /// Keep polling and print changes until interrupted
        #[arg(long)]
        watch: bool,
        #[arg(long, default_value_t = 10)]
        interval_secs: u64,
    },
    /// Accept or decline a friend request
    Respond { request_id: String, action: Decision },
    /// Friends, search and requests
    Friends {
        #[arg(long, value_name = "QUERY")]
        search: Option<String>,
        #[arg(long, value_name = "USER_ID")]
        add: Option<String>,
    },
    /// Private journal
    Journal {
        #[command(subcommand)]
        action: JournalCommand,
    },
    /// Browse the marketplace
    Market {
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value = "")]
        query: String,
    },
    /// Moderation queue (admins only)
    Queue {
        #[arg(long, value_enum, default_value_t = Filter::Pending)]
        filter: Filter,
        #[arg(long, value_name = "POST_ID", conflicts_with = "reject")]
        approve: Option<String>,
        #[arg(long, value_name = "POST_ID")]
        reject: Option<String>,
        #[arg(long, requires = "reject")]
        reason: Option<String>,
    },
    /// Admin dashboard: stats, users, pending count
    Stats,
    /// Someone's public profile
    Profile { user_id: String },
}

#[derive(Subcommand, Debug)]
pub enum JournalCommand {
    List,
    Add {
        content: String,
        #[arg(long)]
        title: Option<String>,
    },
    Search {
        query: String,
    },
    Delete {
        id: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum Decision {
    Accept,
    Decline,
}

impl From<Decision> for FriendAction {
    fn from(d: Decision) -> Self {
        match d {
            Decision::Accept => FriendAction::Accept,
            Decision::Decline => FriendAction::Decline,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum Filter {
    Pending,
    Approved,
    Rejected,
    All,
}

impl From<Filter> for QueueFilter {
    fn from(f: Filter) -> Self {
        match f {
            Filter::Pending => QueueFilter::Pending,
            Filter::Approved => QueueFilter::Approved,
            Filter::Rejected => QueueFilter::Rejected,
            Filter::All => QueueFilter::All,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_respond() {
        let cli = Cli::try_parse_from(["bodham", "--user-id", "u1", "respond", "r1", "accept"]).unwrap();
        match cli.command {
            Command::Respond { request_id, action } => {
                assert_eq!(request_id, "r1");
                assert_eq!(FriendAction::from(action), FriendAction::Accept);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_reason_requires_reject() {
        let res = Cli::try_parse_from(["bodham", "--user-id", "a1", "queue", "--reason", "spam"]);
        assert!(res.is_err());
    }

    #[test]
    fn test_queue_defaults_to_pending() {
        let cli = Cli::try_parse_from(["bodham", "--user-id", "a1", "queue"]).unwrap();
        assert!(matches!(cli.command, Command::Queue { filter: Filter::Pending, .. }));
    }
}
