//! HTTP/1.1 message codec for tunnel frames.
//!
//! One frame holds exactly one complete message, so the body is whatever the
//! framing headers say it is, or the rest of the frame when they say nothing.
//! Encoding always writes `content-length` and never chunks.

use crate::error::WireError;
use crate::MAX_HEADERS;
use bytes::{BufMut, Bytes, BytesMut};
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue, Request, Response, Version};
use httparse::Status;

/// Room reserved for the start line and headers when encoding.
const HEAD_CAPACITY: usize = 512;

/// Serialize a request into one frame.
pub fn encode_request(request: &Request<Bytes>) -> Bytes {
    let target = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let mut out = BytesMut::with_capacity(HEAD_CAPACITY + request.body().len());
    out.put_slice(request.method().as_str().as_bytes());
    out.put_u8(b' ');
    out.put_slice(target.as_bytes());
    out.put_slice(b" HTTP/1.1\r\n");
    write_head(&mut out, request.headers(), request.body());
    out.freeze()
}

/// Serialize a response into one frame.
pub fn encode_response(response: &Response<Bytes>) -> Bytes {
    let status = response.status();

    let mut out = BytesMut::with_capacity(HEAD_CAPACITY + response.body().len());
    out.put_slice(b"HTTP/1.1 ");
    out.put_slice(status.as_str().as_bytes());
    out.put_u8(b' ');
    out.put_slice(status.canonical_reason().unwrap_or("").as_bytes());
    out.put_slice(b"\r\n");
    write_head(&mut out, response.headers(), response.body());
    out.freeze()
}

/// Parse one frame as a request.
pub fn decode_request(frame: &[u8]) -> Result<Request<Bytes>, WireError> {
    let mut slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Request::new(&mut slots);

    let head_len = match parsed.parse(frame).map_err(parse_error)? {
        Status::Complete(len) => len,
        Status::Partial => return Err(WireError::Incomplete),
    };

    let (Some(method), Some(path)) = (parsed.method, parsed.path) else {
        return Err(WireError::Incomplete);
    };
    let mut headers = collect_headers(parsed.headers)?;
    let body = read_body(&mut headers, &frame[head_len..])?;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .version(version(parsed.version))
        .body(body)?;
    *request.headers_mut() = headers;
    Ok(request)
}

/// Parse one frame as a response.
pub fn decode_response(frame: &[u8]) -> Result<Response<Bytes>, WireError> {
    let mut slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Response::new(&mut slots);

    let head_len = match parsed.parse(frame).map_err(parse_error)? {
        Status::Complete(len) => len,
        Status::Partial => return Err(WireError::Incomplete),
    };

    let Some(code) = parsed.code else {
        return Err(WireError::Incomplete);
    };
    let mut headers = collect_headers(parsed.headers)?;
    let body = read_body(&mut headers, &frame[head_len..])?;

    let mut response = Response::builder()
        .status(code)
        .version(version(parsed.version))
        .body(body)?;
    *response.headers_mut() = headers;
    Ok(response)
}

fn write_head(out: &mut BytesMut, headers: &HeaderMap, body: &[u8]) {
    for (name, value) in headers {
        // framing is rewritten below
        if name == CONTENT_LENGTH || name == TRANSFER_ENCODING {
            continue;
        }
        out.put_slice(name.as_str().as_bytes());
        out.put_slice(b": ");
        out.put_slice(value.as_bytes());
        out.put_slice(b"\r\n");
    }
    out.put_slice(b"content-length: ");
    out.put_slice(body.len().to_string().as_bytes());
    out.put_slice(b"\r\n\r\n");
    out.put_slice(body);
}

fn parse_error(e: httparse::Error) -> WireError {
    match e {
        httparse::Error::TooManyHeaders => WireError::TooManyHeaders,
        other => WireError::Parse(other),
    }
}

fn version(minor: Option<u8>) -> Version {
    match minor {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    }
}

fn collect_headers(raw: &[httparse::Header<'_>]) -> Result<HeaderMap, WireError> {
    let mut headers = HeaderMap::with_capacity(raw.len());
    for header in raw {
        let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(http::Error::from)?;
        let value = HeaderValue::from_bytes(header.value).map_err(http::Error::from)?;
        headers.append(name, value);
    }
    Ok(headers)
}

/// Extract the body and normalize framing headers to a plain content-length.
fn read_body(headers: &mut HeaderMap, rest: &[u8]) -> Result<Bytes, WireError> {
    let body = if is_chunked(headers) {
        decode_chunked(rest)?
    } else {
        match content_length(headers)? {
            Some(expected) if rest.len() < expected => {
                return Err(WireError::Truncated {
                    expected,
                    actual: rest.len(),
                })
            }
            Some(expected) => Bytes::copy_from_slice(&rest[..expected]),
            None => Bytes::copy_from_slice(rest),
        }
    };

    headers.remove(TRANSFER_ENCODING);
    headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
    Ok(body)
}

fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get_all(TRANSFER_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
}

fn content_length(headers: &HeaderMap) -> Result<Option<usize>, WireError> {
    let Some(value) = headers.get(CONTENT_LENGTH) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .map(Some)
        .ok_or(WireError::InvalidContentLength)
}

fn decode_chunked(mut rest: &[u8]) -> Result<Bytes, WireError> {
    let mut body = BytesMut::with_capacity(rest.len());
    loop {
        let (consumed, size) = match httparse::parse_chunk_size(rest) {
            Ok(Status::Complete(parsed)) => parsed,
            Ok(Status::Partial) => return Err(WireError::InvalidChunk("missing last chunk")),
            Err(_) => return Err(WireError::InvalidChunk("bad chunk size line")),
        };
        rest = &rest[consumed..];

        // Trailers after the last chunk are not forwarded.
        if size == 0 {
            return Ok(body.freeze());
        }

        let size = usize::try_from(size)
            .map_err(|_| WireError::InvalidChunk("chunk size overflow"))?;
        if rest.len() < size.saturating_add(2) {
            return Err(WireError::InvalidChunk("chunk shorter than declared"));
        }
        body.put_slice(&rest[..size]);
        if &rest[size..size + 2] != b"\r\n" {
            return Err(WireError::InvalidChunk("missing chunk terminator"));
        }
        rest = &rest[size + 2..];
    }
}
