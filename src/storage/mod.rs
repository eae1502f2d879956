mod articles;
mod feeds;
mod queue;
mod schema;
mod sync_meta;
mod types;

pub use articles::{ArticleQuery, ReadFilter};
pub use queue::MAX_PUSH_ATTEMPTS;
pub use schema::Database;
pub use sync_meta::LAST_SYNC_KEY;
pub use types::{
    Article, DatabaseError, Feed, QueueAction, QueueEntry, RemoteFeed, RemoteItem, SyncRun,
};
