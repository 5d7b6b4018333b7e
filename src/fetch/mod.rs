//! One GET per cycle: headers, status check, chunked body accumulation and
//! gzip decompression.

mod basic;

pub use basic::BasicClient;

use async_trait::async_trait;
use flate2::write::GzDecoder;
use reqwest::{Request, Response, StatusCode};
use reqwest::header::{ACCEPT, ACCEPT_ENCODING, CONNECTION, CONTENT_ENCODING, HeaderValue};
use std::io::Write;
use tracing::debug;

use crate::error::GrabError;

/// Executes a fully built request.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

/// Produces the complete, decompressed response body for one cycle.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<Vec<u8>, GrabError>;
}

/// [`Transport`] over any [`HttpClient`].
pub struct HttpTransport<C> {
    client: C,
}

impl<C: HttpClient> HttpTransport<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C: HttpClient> Transport for HttpTransport<C> {
    async fn get(&self, url: &str) -> Result<Vec<u8>, GrabError> {
        fetch_body(&self.client, url).await
    }
}

/// Builds the request the endpoint expects: gzip first, then JSON, and no
/// keep-alive.
pub fn build_request(url: &str) -> Result<Request, GrabError> {
    let url: reqwest::Url = url
        .parse()
        .map_err(|e| GrabError::Request(format!("invalid url '{url}': {e}")))?;
    let mut req = Request::new(reqwest::Method::GET, url);

    let headers = req.headers_mut();
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(CONNECTION, HeaderValue::from_static("close"));

    Ok(req)
}

/// Issues the GET and returns the body, decompressed when the server says so.
///
/// # Errors
///
/// - [`GrabError::Request`] when no response arrives.
/// - [`GrabError::HttpStatus`] for anything but 200; the body is not read.
/// - [`GrabError::Response`] when the body stream breaks or fails to inflate.
pub async fn fetch_body<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>, GrabError> {
    let req = build_request(url)?;
    let mut resp = client.execute(req).await?;

    let status = resp.status();
    if status != StatusCode::OK {
        return Err(GrabError::HttpStatus(status.as_u16()));
    }

    let gzip = resp
        .headers()
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("gzip"));

    let mut body = BodyBuffer::new(gzip);
    while let Some(chunk) = resp
        .chunk()
        .await
        .map_err(|e| GrabError::Response(e.to_string()))?
    {
        body.push(&chunk)?;
    }

    let bytes = body.finish()?;
    debug!(bytes = bytes.len(), gzip, "Response body received");
    Ok(bytes)
}

/// Accumulates body chunks, inflating them on the way in for gzip bodies.
pub enum BodyBuffer {
    Plain(Vec<u8>),
    Gzip(GzDecoder<Vec<u8>>),
}

impl BodyBuffer {
    pub fn new(gzip: bool) -> Self {
        if gzip {
            BodyBuffer::Gzip(GzDecoder::new(Vec::new()))
        } else {
            BodyBuffer::Plain(Vec::new())
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Result<(), GrabError> {
        match self {
            BodyBuffer::Plain(buf) => {
                buf.extend_from_slice(chunk);
                Ok(())
            }
            BodyBuffer::Gzip(decoder) => decoder
                .write_all(chunk)
                .map_err(|e| GrabError::Response(format!("gzip: {e}"))),
        }
    }

    /// Ends the stream. A gzip body cut off before its trailer is an error.
    pub fn finish(self) -> Result<Vec<u8>, GrabError> {
        match self {
            BodyBuffer::Plain(buf) => Ok(buf),
            BodyBuffer::Gzip(decoder) => decoder
                .finish()
                .map_err(|e| GrabError::Response(format!("gzip: {e}"))),
        }
    }
}
