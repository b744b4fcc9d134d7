mod cli;

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use bodham_api::{
    AdminService, FeedScope, FeedService, FriendsService, JournalService, MarketplaceService, Session, users,
};
use bodham_gateway::{ApiConfig, Gateway};
use bodham_sync::StoreEvent;
use bodham_types::api::{JournalEntryRequest, ModerationDecision};
use bodham_types::models::Post;

use cli::{Cli, Command, JournalCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "bodham=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = ApiConfig::from_env();
    if cli.api_base.is_some() {
        config.explicit_base = cli.api_base.clone();
    }
    if cli.token.is_some() {
        config.auth_token = cli.token.clone();
    }
    let gateway = Gateway::from_config(&config).context("invalid API configuration")?;
    info!(base = %gateway.base_url(), "using API");

    let session = Session::sign_in(&gateway, &cli.user_id)
        .await
        .map_err(|e| anyhow::anyhow!("sign-in failed: {}", e.user_message()))?;

    if let Err(e) = run(cli.command, gateway, session).await {
        anyhow::bail!(e.user_message());
    }
    Ok(())
}

async fn run(command: Command, gateway: Gateway, session: Session) -> Result<(), bodham_api::ApiError> {
    match command {
        Command::Feed { mine, like } => {
            let scope = if mine { FeedScope::Mine } else { FeedScope::Public };
            let feed = FeedService::new(gateway, session, scope);
            feed.refresh().await?;
            if let Some(id) = like {
                let post = feed.toggle_like(&id).await?;
                println!("{} {} ({} likes)", if post.is_liked_by_me { "Liked" } else { "Unliked" }, post.id, post.likes_count);
            }
            for post in feed.posts() {
                print_post(&post);
            }
        }
        Command::Post { content, image_url } => {
            let feed = FeedService::new(gateway, session, FeedScope::Mine);
            let post = feed.create_post(&content, image_url).await?;
            println!("Submitted {} for review (status: {})", post.id, post.status.as_str());
        }
        Command::Comments { post_id, add } => {
            let feed = FeedService::new(gateway, session, FeedScope::Public);
            feed.refresh().await?;
            let thread = feed.comments(&post_id).await?;
            if let Some(text) = add {
                feed.add_comment(&thread, &text).await?;
            }
            for c in thread.comments() {
                println!("{:<16} {}", c.author_name, c.content);
            }
        }
        Command::Inbox { watch, interval_secs } => {
            let friends = FriendsService::new(gateway, session);
            if watch {
                watch_inbox(&friends, Duration::from_secs(interval_secs)).await;
            } else {
                friends.refresh_inbox().await?;
                print_inbox(&friends);
            }
        }
        Command::Respond { request_id, action } => {
            let friends = FriendsService::new(gateway, session);
            friends.refresh_inbox().await?;
            let request = friends.respond(&request_id, action.into()).await?;
            println!("Answered request from {}", request.from_user_name);
        }
        Command::Friends { search, add } => {
            let friends = FriendsService::new(gateway, session);
            if let Some(to) = add {
                println!("{}", friends.send_request(&to).await?);
            }
            if let Some(query) = search {
                for user in friends.search(&query).await? {
                    println!("{:<24} {} ({})", user.id, user.display_name(), user.email);
                }
            } else {
                for friend in friends.list_friends().await? {
                    println!("{:<24} {}", friend.id, friend.full_name.as_deref().unwrap_or(&friend.email));
                }
            }
        }
        Command::Journal { action } => {
            let journal = JournalService::new(gateway, session);
            journal.refresh().await?;
            let entries = match action {
                JournalCommand::List => journal.entries(),
                JournalCommand::Search { query } => journal.search(&query),
                JournalCommand::Add { content, title } => {
                    let entry = journal
                        .create(JournalEntryRequest {
                            title,
                            content,
                            date: None,
                        })
                        .await?;
                    vec![entry]
                }
                JournalCommand::Delete { id } => {
                    journal.delete(&id).await?;
                    println!("Deleted {id}");
                    journal.entries()
                }
            };
            for e in entries {
                println!(
                    "{} {:<20} {}",
                    e.date.format("%Y-%m-%d"),
                    e.title.as_deref().unwrap_or("(untitled)"),
                    e.content
                );
            }
        }
        Command::Market { category, query } => {
            let market = MarketplaceService::new(gateway, session);
            market.refresh().await?;
            for p in market.browse(category.as_deref(), &query) {
                println!(
                    "{:<24} {:>8.2} {}",
                    p.title,
                    p.price,
                    p.category.as_deref().unwrap_or("-")
                );
            }
        }
        Command::Queue {
            filter,
            approve,
            reject,
            reason,
        } => {
            let admin = AdminService::new(gateway, session)?;
            admin.refresh_queue(filter.into()).await?;
            if let Some(id) = approve {
                admin.moderate(&id, ModerationDecision::Approved, None).await?;
            }
            if let Some(id) = reject {
                admin.moderate(&id, ModerationDecision::Rejected, reason).await?;
            }
            for post in admin.queue() {
                print_post(&post);
            }
        }
        Command::Stats => {
            let admin = AdminService::new(gateway, session)?;
            let dash = admin.dashboard().await?;
            println!("Users:              {}", dash.stats.total_users);
            println!("Pending moderation: {}", dash.stats.pending_moderation);
            println!("Queued locally:     {}", dash.queued);
            for user in dash.users {
                println!("  {:<24} {:<8} {}", user.id, user.role.as_str(), user.email);
            }
        }
        Command::Profile { user_id } => {
            let profile = users::profile(&gateway, &session, &user_id).await?;
            let user = &profile.user_data;
            println!("{} ({})", user.display_name(), user.role.as_str());
            println!(
                "{} followers, {} following, {} day streak",
                profile.followers_count, profile.following_count, profile.streaks
            );
            for post in &profile.posts {
                print_post(post);
            }
        }
    }
    Ok(())
}

fn print_post(post: &Post) {
    println!(
        "{:<24} [{}] {} likes, {} comments  {}: {}",
        post.id,
        post.status.as_str(),
        post.likes_count,
        post.comments_count,
        post.author_name,
        post.content
    );
}

fn print_inbox(friends: &FriendsService) {
    let pending = friends.pending();
    if pending.is_empty() {
        println!("No pending requests");
    }
    for r in pending {
        println!("{:<24} from {}", r.id, r.from_user_name);
    }
}

/// Poll the inbox and reprint it whenever it changes, until Ctrl-C.
async fn watch_inbox(friends: &FriendsService, interval: Duration) {
    let mut events = friends.inbox().subscribe();
    let handle = friends.watch_inbox(interval);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(StoreEvent::Replaced { len }) => {
                    info!(len, "inbox updated");
                    print_inbox(friends);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => warn!("missed {} inbox events", n),
                Err(RecvError::Closed) => break,
            },
        }
    }
    handle.stop();
}
