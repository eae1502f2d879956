//! tidemark - a terminal RSS reader that syncs read state with a
//! Reader-style aggregation service.
//!
//! Modules:
//! - `app` - Central application state and navigation
//! - `config` - TOML configuration loading
//! - `content` - Full-content fetching via the reader proxy, with auto-parse
//! - `liststate` - Article-list read-state preservation across navigation
//! - `storage` - SQLite persistence layer
//! - `sync` - Remote API client, sync engine, last-sync resolution
//! - `ui` - Terminal user interface
//! - `util` - Text sanitization and URL validation helpers

pub mod app;
pub mod config;
pub mod content;
pub mod liststate;
pub mod storage;
pub mod sync;
pub mod ui;
pub mod util;
