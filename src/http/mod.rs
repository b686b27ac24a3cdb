//! HTTP protocol layer module
//!
//! Request head parsing, response serialization and response builders.
//! Nothing here knows about uploads or static pages.

pub mod cache;
pub mod mime;
pub mod response;
pub mod wire;

// Re-export commonly used types
pub use response::{
    build_304_response, build_404_response, build_405_response, build_error_response,
    build_text_response,
};
pub use wire::{read_request_head, write_response};
