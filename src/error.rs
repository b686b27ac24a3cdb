//! Error types
//!
//! Every request-level failure maps onto an HTTP status through `status()`,
//! so handlers can turn errors into responses without matching variants.

use http::StatusCode;
use std::io;

/// Chunk framing violations found by the sans-IO decoder.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    #[error("invalid chunk size line: {0:?}")]
    InvalidChunkSize(String),
    #[error("chunk size line exceeds {0} bytes")]
    SizeLineTooLong(usize),
    #[error("expected CRLF after chunk data, found byte 0x{0:02x}")]
    InvalidChunkFooter(u8),
    #[error("trailer section exceeds {0} bytes")]
    TrailersTooLong(usize),
}

/// Failures while materializing a request body.
#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    #[error("invalid Content-Length header: {0:?}")]
    InvalidContentLength(String),
    #[error("unsupported transfer coding {0:?} without a Content-Length")]
    UnsupportedTransferEncoding(String),
    #[error("malformed chunked body: {0}")]
    Framing(#[from] FramingError),
    #[error("request body truncated: expected {expected} bytes, received {received}")]
    Truncated { expected: u64, received: u64 },
    #[error("request body truncated inside chunk framing")]
    TruncatedFraming,
    #[error("request body exceeds the limit of {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("request has no input stream to read a body from")]
    MissingInput,
    #[error("failed to read request body: {0}")]
    Io(#[from] io::Error),
}

impl BodyError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// Failures while reading a request head off the wire.
#[derive(Debug, thiserror::Error)]
pub enum HeadError {
    #[error("malformed request head: {0}")]
    Parse(#[from] httparse::Error),
    #[error("request head exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("connection closed mid request head")]
    Incomplete,
    #[error("invalid request: {0}")]
    Invalid(#[from] http::Error),
    #[error("failed to read request head: {0}")]
    Io(#[from] io::Error),
}

impl HeadError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::TooLarge { .. } => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// Upload validation and storage failures.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("request is not multipart/form-data: {0}")]
    NotMultipart(multer::Error),
    #[error("malformed multipart body: {0}")]
    Multipart(#[from] multer::Error),
    #[error("no file part named '{0}'")]
    MissingFile(String),
    #[error("file extension not allowed: {0:?}")]
    ExtensionNotAllowed(String),
    #[error("missing form field '{0}'")]
    MissingField(&'static str),
    #[error("form field '{0}' contains characters not allowed in a file name")]
    InvalidField(&'static str),
    #[error("failed to store upload: {0}")]
    Storage(#[from] io::Error),
}

impl UploadError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub const fn is_client_error(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_error_status() {
        assert_eq!(
            BodyError::Framing(FramingError::InvalidChunkSize("ZZ".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            BodyError::Truncated {
                expected: 10,
                received: 3
            }
            .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            BodyError::TooLarge { limit: 1 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(BodyError::MissingInput.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            BodyError::UnsupportedTransferEncoding("gzip".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_upload_error_status() {
        assert_eq!(
            UploadError::ExtensionNotAllowed("track.txt".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            UploadError::MissingFile("measurements".into()).status(),
            StatusCode::BAD_REQUEST
        );
        let storage = UploadError::Storage(io::Error::other("disk full"));
        assert_eq!(storage.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!storage.is_client_error());
    }

    #[test]
    fn test_head_error_status() {
        assert_eq!(
            HeadError::TooLarge { limit: 16 }.status(),
            StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE
        );
        assert_eq!(HeadError::Incomplete.status(), StatusCode::BAD_REQUEST);
    }
}
