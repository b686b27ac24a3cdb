//! HTTP/1.1 wire format
//!
//! Reads request heads with `httparse` and serializes responses. Bodies are
//! not touched here: the caller keeps the reader positioned at the first body
//! byte and hands it to the body reassembler.

use bytes::Bytes;
use http::header::{CONNECTION, CONTENT_LENGTH, DATE, EXPECT, SERVER, TRANSFER_ENCODING};
use http::{HeaderValue, Request, Response, Version};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::HeadError;

/// Maximum number of header fields in one request head
pub const MAX_HEADERS: usize = 64;

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Read one request head from `reader`
///
/// Only the bytes of the head are consumed. Returns `Ok(None)` when the peer
/// closed the connection before sending anything but blank lines.
pub async fn read_request_head<R>(
    reader: &mut R,
    max_head_size: usize,
) -> Result<Option<Request<()>>, HeadError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if buf.iter().all(u8::is_ascii_whitespace) {
                return Ok(None);
            }
            return Err(HeadError::Incomplete);
        }

        let before = buf.len();
        buf.extend_from_slice(available);

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut parsed = httparse::Request::new(&mut headers);
        match parsed.parse(&buf)? {
            httparse::Status::Complete(head_len) => {
                if head_len > max_head_size {
                    return Err(HeadError::TooLarge {
                        limit: max_head_size,
                    });
                }
                let request = build_request(&parsed)?;
                reader.consume(head_len - before);
                return Ok(Some(request));
            }
            httparse::Status::Partial => {
                let taken = buf.len() - before;
                reader.consume(taken);
                if buf.len() > max_head_size {
                    return Err(HeadError::TooLarge {
                        limit: max_head_size,
                    });
                }
            }
        }
    }
}

fn build_request(parsed: &httparse::Request<'_, '_>) -> Result<Request<()>, HeadError> {
    let version = match parsed.version {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    };

    let mut builder = Request::builder()
        .method(parsed.method.unwrap_or_default())
        .uri(parsed.path.unwrap_or_default())
        .version(version);
    for header in parsed.headers.iter() {
        builder = builder.header(header.name, header.value);
    }
    Ok(builder.body(())?)
}

/// Whether the connection may serve another request after this one
pub fn wants_keep_alive<T>(request: &Request<T>) -> bool {
    let tokens = connection_tokens(request);
    if tokens.iter().any(|t| t.eq_ignore_ascii_case("close")) {
        return false;
    }
    request.version() == Version::HTTP_11
        || tokens.iter().any(|t| t.eq_ignore_ascii_case("keep-alive"))
}

fn connection_tokens<T>(request: &Request<T>) -> Vec<&str> {
    request
        .headers()
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .collect()
}

/// Whether the client waits for `100 Continue` before sending the body
pub fn expects_continue<T>(request: &Request<T>) -> bool {
    request.version() == Version::HTTP_11
        && request
            .headers()
            .get(EXPECT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("100-continue"))
}

/// Whether the request declares both `Content-Length` and `Transfer-Encoding`
///
/// The body is still read, but the connection cannot be reused afterwards.
pub fn has_ambiguous_framing<T>(request: &Request<T>) -> bool {
    let headers = request.headers();
    headers.contains_key(CONTENT_LENGTH) && headers.contains_key(TRANSFER_ENCODING)
}

/// Fill in the headers every response carries
pub fn finalize_headers(response: &mut Response<Bytes>, server_name: &str, keep_alive: bool) {
    let status = response.status();
    let length = response.body().len();
    let headers = response.headers_mut();

    if status.is_informational()
        || status == http::StatusCode::NO_CONTENT
        || status == http::StatusCode::NOT_MODIFIED
    {
        headers.remove(CONTENT_LENGTH);
    } else {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    }

    let date = chrono::Utc::now().format(HTTP_DATE_FORMAT).to_string();
    if let Ok(value) = HeaderValue::from_str(&date) {
        headers.insert(DATE, value);
    }
    if let Ok(value) = HeaderValue::from_str(server_name) {
        headers.insert(SERVER, value);
    }
    headers.insert(
        CONNECTION,
        HeaderValue::from_static(if keep_alive { "keep-alive" } else { "close" }),
    );
}

/// Serialize `response` to `writer`
///
/// With `include_body` false (HEAD requests) only the head is written, but
/// `Content-Length` still describes the body a GET would get.
pub async fn write_response<W>(
    writer: &mut W,
    response: &Response<Bytes>,
    include_body: bool,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let status = response.status();
    let mut head = Vec::with_capacity(256);
    head.extend_from_slice(b"HTTP/1.1 ");
    head.extend_from_slice(status.as_str().as_bytes());
    head.push(b' ');
    head.extend_from_slice(status.canonical_reason().unwrap_or("").as_bytes());
    head.extend_from_slice(b"\r\n");
    for (name, value) in response.headers() {
        head.extend_from_slice(name.as_str().as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }
    head.extend_from_slice(b"\r\n");

    writer.write_all(&head).await?;
    if include_body && !response.body().is_empty() {
        writer.write_all(response.body()).await?;
    }
    writer.flush().await
}

/// Send the interim response for `Expect: 100-continue`
pub async fn write_continue<W>(writer: &mut W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await?;
    writer.flush().await
}
