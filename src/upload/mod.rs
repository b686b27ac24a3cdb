//! Measurement upload module
//!
//! Extracts the uploaded file and its describing fields from a multipart
//! body, derives the stored file name and writes the file to disk.

pub mod form;
pub mod naming;
pub mod storage;

pub use form::{UploadForm, UploadRecord, UploadedFile};
pub use naming::UploadName;
pub use storage::UploadStore;
