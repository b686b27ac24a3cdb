//! Request handler module
//!
//! Routes reassembled requests to the static pages or the upload handler.

pub mod router;
pub mod static_files;
pub mod upload;

// Re-export main entry point
pub use router::{handle_request, Route};
