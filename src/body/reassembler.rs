//! Request body reassembly
//!
//! Sits between the request head reader and the router. Whatever framing the
//! client used, downstream handlers receive a request whose body is one
//! contiguous buffer and whose `Content-Length` matches it.

use bytes::{Bytes, BytesMut};
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderValue, Request};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use super::chunked::ChunkedDecoder;
use crate::error::BodyError;

/// How the request declares its body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Nonzero `Content-Length`
    Length(u64),
    /// No usable length and `Transfer-Encoding: chunked`
    Chunked,
    /// Neither; the body is empty
    Empty,
}

impl Framing {
    /// Decide framing from request headers
    ///
    /// A nonzero `Content-Length` always wins. Chunked decoding is used only
    /// when the length is absent or zero. Without a length, any other
    /// transfer coding leaves the body length unknown and is rejected, as
    /// are repeated `Content-Length` headers that disagree.
    pub fn detect(headers: &HeaderMap) -> Result<Self, BodyError> {
        let length = declared_length(headers)?.unwrap_or(0);

        if length > 0 {
            return Ok(Self::Length(length));
        }
        match final_coding(headers) {
            None => Ok(Self::Empty),
            Some(coding) if coding.eq_ignore_ascii_case("chunked") => Ok(Self::Chunked),
            Some(coding) => Err(BodyError::UnsupportedTransferEncoding(coding.to_string())),
        }
    }
}

/// Materialize the body of `request`
///
/// The body slot carries the request's input stream, or `None` when no
/// stream is attached. On success the stream is replaced by the buffered
/// body and `Content-Length` is rewritten to its length; other headers are
/// left untouched. Bytes past the end of the body stay in the stream.
pub async fn reassemble<R>(
    request: Request<Option<R>>,
    max_body_size: u64,
) -> Result<Request<Bytes>, BodyError>
where
    R: AsyncBufRead + Unpin,
{
    let (mut parts, input) = request.into_parts();
    let framing = Framing::detect(&parts.headers)?;

    let Some(mut input) = input else {
        return Err(BodyError::MissingInput);
    };

    let body = match framing {
        Framing::Length(length) => read_fixed(&mut input, length, max_body_size).await?,
        Framing::Chunked => read_chunked(&mut input, max_body_size).await?,
        Framing::Empty => Bytes::new(),
    };

    parts
        .headers
        .insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
    Ok(Request::from_parts(parts, body))
}

/// The `Content-Length` all length headers agree on, if any
fn declared_length(headers: &HeaderMap) -> Result<Option<u64>, BodyError> {
    let mut declared = None;
    for value in headers.get_all(CONTENT_LENGTH) {
        let length = parse_content_length(value)?;
        match declared {
            Some(previous) if previous != length => {
                return Err(BodyError::InvalidContentLength(format!(
                    "conflicting values {previous} and {length}"
                )));
            }
            _ => declared = Some(length),
        }
    }
    Ok(declared)
}

fn parse_content_length(value: &HeaderValue) -> Result<u64, BodyError> {
    let invalid = || {
        BodyError::InvalidContentLength(String::from_utf8_lossy(value.as_bytes()).into_owned())
    };
    let digits = value.to_str().map_err(|_| invalid())?.trim();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    digits.parse::<u64>().map_err(|_| invalid())
}

/// The last transfer coding named by the request, if any
fn final_coding(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(TRANSFER_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|coding| !coding.is_empty())
        .last()
}

async fn read_fixed<R>(input: &mut R, length: u64, limit: u64) -> Result<Bytes, BodyError>
where
    R: AsyncBufRead + Unpin,
{
    if length > limit {
        return Err(BodyError::TooLarge { limit });
    }
    let expected = usize::try_from(length).map_err(|_| BodyError::TooLarge { limit })?;

    let mut body = Vec::with_capacity(expected);
    input.take(length).read_to_end(&mut body).await?;
    if body.len() < expected {
        return Err(BodyError::Truncated {
            expected: length,
            received: body.len() as u64,
        });
    }
    Ok(Bytes::from(body))
}

async fn read_chunked<R>(input: &mut R, limit: u64) -> Result<Bytes, BodyError>
where
    R: AsyncBufRead + Unpin,
{
    let mut decoder = ChunkedDecoder::new();
    let mut body = BytesMut::new();

    while !decoder.is_done() {
        let available = input.fill_buf().await?;
        if available.is_empty() {
            decoder.finish()?;
            break;
        }

        let consumed = decoder.decode(available, &mut body)?;
        input.consume(consumed);

        if body.len() as u64 > limit {
            return Err(BodyError::TooLarge { limit });
        }
    }

    Ok(body.freeze())
}
