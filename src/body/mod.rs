//! Request body module
//!
//! Turns whatever body framing a client sent into a single buffered body
//! before routing.

mod chunked;
mod reassembler;

pub use chunked::{ChunkedDecoder, MAX_SIZE_LINE, MAX_TRAILERS};
pub use reassembler::{reassemble, Framing};
