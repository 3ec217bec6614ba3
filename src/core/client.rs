//! The request pipeline: validate, complement, sign, dispatch, verify.

use bytes::Bytes;
use futures::TryStreamExt;
use lazy_static::lazy_static;
use log::debug;

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::core::error::{ChecksumMismatch, OSS_CRC64_HEADER, OSS_REQUEST_ID_HEADER};
use crate::core::request::{
    DispatchSignedRequest, HttpClient, HttpDispatchError, HttpRequest, HttpResponse,
};
use crate::core::retry::{ExponentialBackoff, RetryPolicy, RetryableError};
use crate::credential::{CredentialsError, EnvironmentProvider, OssCredentials, ProvideOssCredentials};
use crate::signature::stream::{BodyTap, ByteStream, DigestStream, RateLimit};
use crate::signature::{SignedRequest, SignedRequestPayload};

lazy_static! {
    /// Identifies this library on the wire.
    pub static ref DEFAULT_USER_AGENT: String =
        format!("oss-rust-sdk/{}", env!("CARGO_PKG_VERSION"));
}

/// Knobs shared by every request a client makes. Read-only once the client
/// exists; build a new client to change them.
#[derive(Clone)]
pub struct ClientConfig {
    pub user_agent: String,
    /// Pool width for the bundled transport, and the natural executor width.
    pub max_connections: usize,
    /// Budget for one attempt, re-applied on every retry.
    pub request_timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub retry_policy: Arc<dyn RetryPolicy>,
    pub verify_ssl: bool,
    /// Turns CRC-64 end-to-end checking on for requests that ask for it.
    pub enable_crc64: bool,
    pub send_rate_limiter: Option<Arc<dyn RateLimit>>,
    pub recv_rate_limiter: Option<Arc<dyn RateLimit>>,
}

impl Default for ClientConfig {
    fn default() -> ClientConfig {
        ClientConfig {
            user_agent: DEFAULT_USER_AGENT.clone(),
            max_connections: 16,
            request_timeout: Some(Duration::from_secs(10)),
            connect_timeout: Some(Duration::from_secs(5)),
            retry_policy: Arc::new(ExponentialBackoff::default()),
            verify_ssl: false,
            enable_crc64: true,
            send_rate_limiter: None,
            recv_rate_limiter: None,
        }
    }
}

/// An error produced before or while a request travels the pipeline.
#[derive(Debug, PartialEq)]
pub enum SignAndDispatchError {
    /// The credentials provider failed.
    Credentials(CredentialsError),
    /// The transport failed and retries were exhausted or not allowed.
    Dispatch(HttpDispatchError),
    /// The request failed its local invariants; nothing was sent.
    Validation(String),
    /// The request body the server received does not match what was sent.
    Checksum(ChecksumMismatch),
    /// The client has been disabled.
    Disabled,
    /// The request's cancellation token fired.
    Cancelled,
}

struct ClientInner {
    credentials_provider: Arc<dyn ProvideOssCredentials + Send + Sync>,
    dispatcher: Arc<dyn DispatchSignedRequest + Send + Sync>,
    config: ClientConfig,
    disabled: AtomicBool,
}

/// Re-usable logic for signing and dispatching requests.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// A client with a default transport, credentials from the environment,
    /// and default configuration, shared process-wide.
    pub fn shared() -> Self {
        lazy_static! {
            static ref SHARED: Client = Client::new_with(
                EnvironmentProvider::default(),
                HttpClient::new().expect("failed to create request dispatcher"),
                ClientConfig::default(),
            );
        }
        SHARED.clone()
    }

    pub fn new_with<P, D>(credentials_provider: P, dispatcher: D, config: ClientConfig) -> Self
    where
        P: ProvideOssCredentials + Send + Sync + 'static,
        D: DispatchSignedRequest + Send + Sync + 'static,
    {
        Client {
            inner: Arc::new(ClientInner {
                credentials_provider: Arc::new(credentials_provider),
                dispatcher: Arc::new(dispatcher),
                config,
                disabled: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Fetches a fresh set of credentials from the configured provider.
    pub async fn credentials(&self) -> Result<OssCredentials, CredentialsError> {
        self.inner.credentials_provider.credentials().await
    }

    /// Short-circuits every subsequent dispatch, including retries already
    /// in their backoff sleep.
    pub fn disable(&self) {
        self.inner.disabled.store(true, Ordering::SeqCst);
    }

    pub fn is_disabled(&self) -> bool {
        self.inner.disabled.load(Ordering::SeqCst)
    }

    /// Runs a request through the pipeline and returns the raw response.
    ///
    /// Responses of any status are returned as long as the exchange itself
    /// succeeded; callers classify non-2xx bodies. Server errors (5xx) and
    /// transient transport failures are retried with a fresh signature per
    /// attempt, provided the body can be opened again.
    pub async fn sign_and_dispatch(
        &self,
        mut request: SignedRequest,
    ) -> Result<HttpResponse, SignAndDispatchError> {
        request
            .validate()
            .map_err(SignAndDispatchError::Validation)?;

        let config = &self.inner.config;
        request.complement(&config.user_agent);
        prepare_body(&mut request).await?;

        let crc_enabled =
            request.flags.check_crc64 && config.enable_crc64 && !request.has_header("Range");
        let rewindable = request.payload_rewindable();
        let policy = config.retry_policy.clone();
        let mut attempt: u32 = 0;

        loop {
            if self.is_disabled() {
                return Err(SignAndDispatchError::Disabled);
            }
            if let Some(token) = &request.cancellation {
                if token.is_cancelled() {
                    return Err(SignAndDispatchError::Cancelled);
                }
            }

            // Pre-signed URLs carry their authorization in the query string.
            if request.url.is_none() {
                let credentials = self
                    .inner
                    .credentials_provider
                    .credentials()
                    .await
                    .map_err(SignAndDispatchError::Credentials)?;
                request.sign(&credentials);
            }

            let mut request_tap = None;
            let wire = build_http_request(&mut request, crc_enabled, config, &mut request_tap);

            let result = self
                .inner
                .dispatcher
                .dispatch(wire, config.request_timeout)
                .await;

            let retryable = match &result {
                Err(e) => Some(RetryableError::Transport(e.kind())),
                Ok(response) if response.status.is_server_error() => {
                    Some(RetryableError::Status(response.status.as_u16()))
                }
                Ok(_) => None,
            };
            if let Some(error) = retryable {
                if rewindable && policy.should_retry(&error, attempt) {
                    let delay = policy.delay(attempt);
                    debug!(
                        "attempt {} failed ({:?}), retrying in {:?}",
                        attempt, error, delay
                    );
                    tokio::time::delay_for(delay).await;
                    attempt += 1;
                    continue;
                }
            }

            let mut response = result.map_err(SignAndDispatchError::Dispatch)?;

            // The tap has seen the whole request body once the server has
            // answered, so upload integrity can be settled here.
            if let (Some(tap), Some(server_crc)) =
                (&request_tap, response.headers.get(OSS_CRC64_HEADER))
            {
                if let Ok(server_crc) = server_crc.parse::<u64>() {
                    if tap.is_finished() {
                        let actual = tap.crc64().unwrap_or_default();
                        if actual != server_crc {
                            let request_id = response
                                .headers
                                .get(OSS_REQUEST_ID_HEADER)
                                .cloned()
                                .unwrap_or_default();
                            return Err(SignAndDispatchError::Checksum(ChecksumMismatch {
                                expected: server_crc,
                                actual,
                                transferred_bytes: tap.transferred(),
                                request_id,
                            }));
                        }
                    }
                }
            }

            if config.recv_rate_limiter.is_some() || request.cancellation.is_some() {
                let body = mem::replace(
                    &mut response.body,
                    ByteStream::new(futures::stream::empty()),
                );
                let mut wrapped = DigestStream::new(body);
                if let Some(limiter) = &config.recv_rate_limiter {
                    wrapped = wrapped.with_rate_limit(limiter.clone());
                }
                if let Some(token) = &request.cancellation {
                    wrapped = wrapped.with_cancellation(token.clone());
                }
                response.body = wrapped.into_byte_stream();
            }

            return Ok(response);
        }
    }
}

/// Resolves body metadata that needs a full pass before signing: a missing
/// `Content-Length` for unsized bodies, and `Content-MD5` when the request
/// asks for it. One-shot streams that must be measured are buffered, which
/// also makes them retryable.
async fn prepare_body(request: &mut SignedRequest) -> Result<(), SignAndDispatchError> {
    let needs_md5 = request.flags.content_md5
        && !request.has_header("Content-MD5")
        && request.payload.is_some();
    let needs_length = request.payload.is_some() && !request.has_header("Content-Length");
    if !needs_md5 && !needs_length {
        return Ok(());
    }

    let buffered: Bytes = match request.payload.take() {
        None => return Ok(()),
        Some(SignedRequestPayload::Buffer(bytes)) => bytes,
        Some(SignedRequestPayload::Source(source)) => {
            if !needs_md5 {
                // Length alone never requires a drain for a sized source.
                if let Some(len) = source.len() {
                    request.remove_header("Content-Length");
                    request.add_header("Content-Length", &len.to_string());
                    request.payload = Some(SignedRequestPayload::Source(source));
                    return Ok(());
                }
            }
            drain_stream(source.open()).await?
        }
        Some(SignedRequestPayload::Stream(stream)) => drain_stream(stream).await?,
    };

    request.remove_header("Content-Length");
    request.add_header("Content-Length", &buffered.len().to_string());
    if needs_md5 {
        let digest = md5::compute(&buffered);
        request.remove_header("Content-MD5");
        request.add_header("Content-MD5", &base64::encode(*digest));
    }
    request.payload = Some(SignedRequestPayload::Buffer(buffered));
    Ok(())
}

async fn drain_stream(stream: ByteStream) -> Result<Bytes, SignAndDispatchError> {
    let mut stream = stream;
    let mut buf = Vec::new();
    while let Some(chunk) = stream.try_next().await.map_err(|e| {
        SignAndDispatchError::Dispatch(HttpDispatchError::new(format!(
            "failed to read request body: {}",
            e
        )))
    })? {
        buf.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buf))
}

/// Materializes one attempt: opens a fresh body stream, installs the digest
/// tap and the send-side progress, rate-limit and cancellation hooks.
fn build_http_request(
    request: &mut SignedRequest,
    crc_enabled: bool,
    config: &ClientConfig,
    tap_out: &mut Option<Arc<BodyTap>>,
) -> HttpRequest {
    // One-shot streams are handed out once; buffered and re-openable
    // payloads produce a fresh stream per attempt.
    let raw = if matches!(request.payload, Some(SignedRequestPayload::Stream(_))) {
        match request.payload.take() {
            Some(SignedRequestPayload::Stream(stream)) => Some(stream),
            _ => None,
        }
    } else {
        match &request.payload {
            None => None,
            Some(SignedRequestPayload::Buffer(bytes)) => Some(ByteStream::from(bytes.clone())),
            Some(SignedRequestPayload::Source(source)) => Some(source.open()),
            Some(SignedRequestPayload::Stream(_)) => None,
        }
    };

    let body = raw.map(|stream| {
        let mut wrapped = DigestStream::new(stream);
        if crc_enabled {
            let tap = BodyTap::new(true, false);
            *tap_out = Some(tap.clone());
            wrapped = wrapped.with_tap(tap);
        }
        if let Some(progress) = &request.progress {
            wrapped = wrapped.with_progress(progress.clone());
        }
        let limiter = request
            .rate_limiter
            .clone()
            .or_else(|| config.send_rate_limiter.clone());
        if let Some(limiter) = limiter {
            wrapped = wrapped.with_rate_limit(limiter);
        }
        if let Some(token) = &request.cancellation {
            wrapped = wrapped.with_cancellation(token.clone());
        }
        wrapped.into_byte_stream()
    });

    HttpRequest {
        method: request.method.clone(),
        url: request.wire_url(),
        headers: request.headers.clone(),
        body,
    }
}
