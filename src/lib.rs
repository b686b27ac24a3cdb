//! Measurement collector
//!
//! HTTP/1.1 server that accepts gzip measurement uploads from mobile
//! clients and serves a few static pages. Request bodies sent with chunked
//! transfer coding are reassembled into fixed-length bodies before any
//! handler sees them.

pub mod body;
pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod logger;
pub mod server;
pub mod upload;
