//! Library crate for h2-hunter: the concurrent scan engine and its ranker.
pub mod config;
pub mod cursor;
pub mod error;
pub mod format;
pub mod latency;
pub mod probe;
pub mod ranker;
pub mod scanner;
pub mod sink;
pub mod tls;
