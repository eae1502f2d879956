//! Terminal User Interface module.
//!
//! - `loop_runner` - Main event loop and terminal management
//! - `input` - Keyboard input handling
//! - `events` - Background task event processing
//! - `render` - View rendering dispatch
//! - `articles` - Article list widget
//! - `feeds` - Feed list widget
//! - `reader` - Article reader widget
//! - `status` - Status bar widget

mod articles;
mod events;
mod feeds;
mod input;
mod loop_runner;
pub mod reader;
mod render;
mod status;

pub use loop_runner::{run, Action};
