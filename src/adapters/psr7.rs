//! PSR-7 style interop on top of the `http` crate.
//!
//! RoadRunner's HTTP plugin hands workers a fully parsed PSR-7 request and
//! expects a PSR-7 response back; `http::Request` / `http::Response` play
//! that role here. Header names come out of `http::HeaderMap` lower-cased.

#[cfg(feature = "tracing")]
use tracing::warn;

use super::AdapterError;
use crate::exchange::{CanonicalRequest, CanonicalResponse};
use crate::worker::{TransportError, WorkerTransport};

pub fn from_http_request<B: AsRef<[u8]>>(
    req: http::Request<B>,
) -> Result<CanonicalRequest, AdapterError> {
    let (parts, body) = req.into_parts();
    from_http_parts(parts, body.as_ref().to_vec())
}

pub fn from_http_parts(
    parts: http::request::Parts,
    body: Vec<u8>,
) -> Result<CanonicalRequest, AdapterError> {
    let uri = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let mut builder = CanonicalRequest::builder(parts.method.as_str())
        .with_uri(uri)
        .with_protocol(format!("{:?}", parts.version));

    if let Some(port) = parts.uri.port_u16() {
        builder = builder.with_server_port(port);
    }

    if !parts.headers.contains_key(http::header::HOST) {
        if let Some(host) = parts.uri.host() {
            builder = builder.with_header("Host", host);
        }
    }

    for (name, value) in parts.headers.iter() {
        match value.to_str() {
            Ok(value_str) => builder = builder.with_header(name.as_str(), value_str),
            Err(_) => {
                #[cfg(feature = "tracing")]
                warn!(header = name.as_str(), "Dropping non-visible-ASCII header value");
            }
        }
    }

    Ok(builder.with_body(body).build()?)
}

pub fn into_http_response(
    response: CanonicalResponse,
) -> Result<http::Response<Vec<u8>>, AdapterError> {
    let status = http::StatusCode::from_u16(response.status)
        .map_err(|_| AdapterError::InvalidStatus(response.status))?;

    let mut out = http::Response::new(Vec::new());
    *out.status_mut() = status;

    let headers = out.headers_mut();

    for header in &response.headers {
        let (name, value) = header_pair(header.name(), header.value())?;
        headers.append(name, value);
    }

    for cookie in &response.cookies {
        let (name, value) = header_pair("Set-Cookie", &cookie.to_string())?;
        headers.append(name, value);
    }

    *out.body_mut() = response.body;
    Ok(out)
}

fn header_pair(
    name: &str,
    value: &str,
) -> Result<(http::HeaderName, http::HeaderValue), AdapterError> {
    let invalid = |reason: String| AdapterError::InvalidHeader {
        name: name.to_string(),
        reason,
    };

    let header_name = http::HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| invalid(e.to_string()))?;
    let header_value = http::HeaderValue::from_str(value)
        .map_err(|e| invalid(e.to_string()))?;

    Ok((header_name, header_value))
}

/// Worker connection of a runtime that speaks `http` types.
pub trait HttpTransport {
    fn wait_request(
        &mut self,
    ) -> Result<Option<http::Request<Vec<u8>>>, TransportError>;

    fn respond(
        &mut self,
        response: http::Response<Vec<u8>>,
    ) -> Result<(), TransportError>;

    fn error(&mut self, message: &str) -> Result<(), TransportError> {
        let _ = message;
        Ok(())
    }
}

/// Adapts an [`HttpTransport`] into a [`WorkerTransport`].
///
/// Requests that cannot be adapted get a `400` straight from here and never
/// reach the application. Responses the `http` types cannot carry turn into
/// the fixed 500 response.
pub struct Psr7Transport<T> {
    inner: T,
}

impl<T: HttpTransport> Psr7Transport<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: HttpTransport> WorkerTransport for Psr7Transport<T> {
    fn wait_request(
        &mut self,
    ) -> Result<Option<CanonicalRequest>, TransportError> {
        loop {
            let Some(request) = self.inner.wait_request()? else {
                return Ok(None);
            };

            match from_http_request(request) {
                Ok(canonical) => return Ok(Some(canonical)),
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    warn!(error = %e, "Rejecting malformed request");

                    let bad = into_http_response(CanonicalResponse::text(
                        400,
                        "Bad Request",
                    ))?;
                    self.inner.respond(bad)?;
                    self.inner.error(&e.to_string())?;
                }
            }
        }
    }

    fn respond(
        &mut self,
        response: CanonicalResponse,
    ) -> Result<(), TransportError> {
        match into_http_response(response) {
            Ok(response) => self.inner.respond(response),
            Err(e) => {
                self.inner
                    .respond(into_http_response(CanonicalResponse::internal_error())?)?;
                self.inner.error(&e.to_string())
            }
        }
    }

    fn error(&mut self, message: &str) -> Result<(), TransportError> {
        self.inner.error(message)
    }
}
