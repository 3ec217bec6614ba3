//! Dispatch of prepared requests over a hyper connection pool.
//!
//! The transport is pluggable: anything implementing `DispatchSignedRequest`
//! can carry requests, and the pipeline tests use a scripted stand-in. The
//! bundled `HttpClient` maps hyper failures onto the transport error kinds
//! the retry policy understands.

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use http::{HeaderMap, Method, StatusCode};
use hyper::client::connect::HttpConnector;
use hyper::{Body, Client};
use hyper_tls::HttpsConnector;
use log::debug;

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::io;
use std::mem;
use std::str::FromStr;
use std::time::Duration;

use crate::signature::stream::ByteStream;

/// The wire form of a single attempt: everything the transport needs, with
/// signing and body wrapping already done.
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    /// Headers keyed by lowercased name.
    pub headers: BTreeMap<String, Vec<Vec<u8>>>,
    pub body: Option<ByteStream>,
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// A streaming response. Headers are a case-insensitive mapping; the body
/// has not been read yet.
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap<String>,
    pub body: ByteStream,
}

impl HttpResponse {
    /// Drains the body into memory, e.g. for parsing an XML payload.
    pub async fn buffer(&mut self) -> Result<BufferedHttpResponse, HttpDispatchError> {
        let mut body = mem::replace(&mut self.body, ByteStream::new(futures::stream::empty()));
        let mut buf = Vec::new();
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| HttpDispatchError::with_kind(TransportErrorKind::RecvError, e.to_string()))?
        {
            buf.extend_from_slice(&chunk);
        }
        Ok(BufferedHttpResponse {
            status: self.status,
            headers: self.headers.clone(),
            body: Bytes::from(buf),
        })
    }
}

/// A response whose body has been read into memory.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedHttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap<String>,
    pub body: Bytes,
}

impl BufferedHttpResponse {
    pub fn body_as_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// How the transport failed, independent of any particular HTTP library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The connection could not be established.
    ConnectFailed,
    /// The peer closed the stream before the message was complete.
    PartialFile,
    /// Writing the request body failed.
    WriteError,
    /// The attempt exceeded its time budget.
    TimedOut,
    /// The connection produced no usable response at all.
    GotNothing,
    /// Sending the request failed after the connection was up.
    SendError,
    /// Receiving or parsing the response failed.
    RecvError,
    /// Anything else; not retryable.
    Other,
}

/// An error produced when the transport fails.
#[derive(Debug, PartialEq, Clone)]
pub struct HttpDispatchError {
    kind: TransportErrorKind,
    message: String,
}

impl HttpDispatchError {
    pub fn new(message: String) -> HttpDispatchError {
        HttpDispatchError {
            kind: TransportErrorKind::Other,
            message,
        }
    }

    pub fn with_kind(kind: TransportErrorKind, message: String) -> HttpDispatchError {
        HttpDispatchError { kind, message }
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }
}

impl fmt::Display for HttpDispatchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for HttpDispatchError {}

impl From<hyper::Error> for HttpDispatchError {
    fn from(err: hyper::Error) -> HttpDispatchError {
        let kind = if err.is_connect() {
            TransportErrorKind::ConnectFailed
        } else if err.is_incomplete_message() {
            TransportErrorKind::PartialFile
        } else if err.is_body_write_aborted() {
            TransportErrorKind::WriteError
        } else if err.is_canceled() || err.is_closed() {
            TransportErrorKind::SendError
        } else if err.is_parse() {
            TransportErrorKind::RecvError
        } else {
            TransportErrorKind::Other
        };
        HttpDispatchError::with_kind(kind, err.to_string())
    }
}

impl From<io::Error> for HttpDispatchError {
    fn from(err: io::Error) -> HttpDispatchError {
        let kind = match err.kind() {
            io::ErrorKind::TimedOut => TransportErrorKind::TimedOut,
            io::ErrorKind::ConnectionRefused => TransportErrorKind::ConnectFailed,
            io::ErrorKind::UnexpectedEof => TransportErrorKind::PartialFile,
            _ => TransportErrorKind::Other,
        };
        HttpDispatchError::with_kind(kind, err.to_string())
    }
}

/// Trait for implementors of the actual network transfer.
#[async_trait]
pub trait DispatchSignedRequest {
    async fn dispatch(
        &self,
        request: HttpRequest,
        timeout: Option<Duration>,
    ) -> Result<HttpResponse, HttpDispatchError>;
}

/// Settings for the bundled hyper transport.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Budget for establishing a connection.
    pub connect_timeout: Option<Duration>,
    /// Whether TLS certificates are verified. Off by default, matching the
    /// service's self-hosted deployments.
    pub verify_ssl: bool,
    /// Idle connections kept per host.
    pub max_connections: usize,
}

impl Default for HttpConfig {
    fn default() -> HttpConfig {
        HttpConfig {
            connect_timeout: Some(Duration::from_secs(5)),
            verify_ssl: false,
            max_connections: 16,
        }
    }
}

/// An error produced when constructing the TLS side of the transport.
#[derive(Debug)]
pub struct TlsError {
    message: String,
}

impl fmt::Display for TlsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for TlsError {}

/// HTTP client for dispatching prepared requests over a shared pool.
pub struct HttpClient {
    inner: Client<HttpsConnector<HttpConnector>>,
}

impl HttpClient {
    /// A client with the default configuration.
    pub fn new() -> Result<HttpClient, TlsError> {
        HttpClient::new_with_config(HttpConfig::default())
    }

    pub fn new_with_config(config: HttpConfig) -> Result<HttpClient, TlsError> {
        let mut http = HttpConnector::new();
        http.set_connect_timeout(config.connect_timeout);
        http.enforce_http(false);

        let tls = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()
            .map_err(|e| TlsError {
                message: e.to_string(),
            })?;
        let connector = HttpsConnector::from((http, tokio_tls::TlsConnector::from(tls)));

        let inner = Client::builder()
            .pool_max_idle_per_host(config.max_connections)
            .build(connector);
        Ok(HttpClient { inner })
    }
}

#[async_trait]
impl DispatchSignedRequest for HttpClient {
    async fn dispatch(
        &self,
        request: HttpRequest,
        timeout: Option<Duration>,
    ) -> Result<HttpResponse, HttpDispatchError> {
        let method = Method::from_str(&request.method)
            .map_err(|e| HttpDispatchError::new(format!("invalid method: {}", e)))?;

        let mut builder = hyper::Request::builder()
            .method(method)
            .uri(request.url.as_str());
        for (name, values) in request.headers.iter() {
            for value in values {
                builder = builder.header(name.as_str(), value.as_slice());
            }
        }

        let body = match request.body {
            None => Body::empty(),
            Some(stream) => Body::wrap_stream(stream),
        };
        let http_request = builder
            .body(body)
            .map_err(|e| HttpDispatchError::new(e.to_string()))?;

        debug!(
            "dispatching {} {}",
            http_request.method(),
            http_request.uri()
        );

        let future = self.inner.request(http_request);
        let response = match timeout {
            None => future.await?,
            Some(duration) => tokio::time::timeout(duration, future)
                .await
                .map_err(|_| {
                    HttpDispatchError::with_kind(
                        TransportErrorKind::TimedOut,
                        format!("request timed out after {:?}", duration),
                    )
                })??,
        };

        let (parts, body) = response.into_parts();
        let mut headers: HeaderMap<String> = HeaderMap::default();
        for (name, value) in parts.headers.iter() {
            headers.append(name, value.to_str().unwrap_or_default().to_owned());
        }

        let body = ByteStream::new(body.map_err(|e| io::Error::new(io::ErrorKind::Other, e)));
        Ok(HttpResponse {
            status: parts.status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hyper_errors_map_to_transport_kinds() {
        // The concrete hyper errors cannot be constructed directly; the io
        // mapping covers the shared classification rules.
        let timed_out = HttpDispatchError::from(io::Error::new(io::ErrorKind::TimedOut, "late"));
        assert_eq!(timed_out.kind(), TransportErrorKind::TimedOut);

        let refused =
            HttpDispatchError::from(io::Error::new(io::ErrorKind::ConnectionRefused, "no"));
        assert_eq!(refused.kind(), TransportErrorKind::ConnectFailed);

        let eof = HttpDispatchError::from(io::Error::new(io::ErrorKind::UnexpectedEof, "cut"));
        assert_eq!(eof.kind(), TransportErrorKind::PartialFile);

        let other = HttpDispatchError::from(io::Error::new(io::ErrorKind::NotFound, "what"));
        assert_eq!(other.kind(), TransportErrorKind::Other);
    }

    #[tokio::test]
    async fn buffer_collects_the_whole_body() {
        let mut response = HttpResponse {
            status: StatusCode::OK,
            headers: HeaderMap::<String>::default(),
            body: ByteStream::new(futures::stream::iter(vec![
                Ok(Bytes::from_static(b"first,")),
                Ok(Bytes::from_static(b"second")),
            ])),
        };
        let buffered = response.buffer().await.unwrap();
        assert_eq!(buffered.body_as_str(), "first,second");
    }
}
