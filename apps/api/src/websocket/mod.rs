//! WebSocket handlers for real-time viewer feeds

mod feed;

pub use feed::feed_handler;
