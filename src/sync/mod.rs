mod engine;
mod last_sync;
mod remote;

pub use engine::{run_sync, SyncError, SyncOutcome};
pub use last_sync::{resolve_last_sync, LastSync, SyncSource};
pub use remote::{RemoteClient, RemoteError};
