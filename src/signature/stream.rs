use bytes::{BufMut, Bytes, BytesMut};
use futures::{future, stream, Future, Stream, StreamExt};
use pin_project::pin_project;
use tokio::io::AsyncRead;

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use crate::core::executor::CancellationToken;
use crate::signature::checksum::Crc64;

/// Stream of bytes.
#[pin_project]
pub struct ByteStream {
    size_hint: Option<usize>,
    #[pin]
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, io::Error>> + Send + Sync + 'static>>,
}

impl ByteStream {
    /// Create a new `ByteStream` by wrapping a `futures` stream.
    pub fn new<S>(stream: S) -> ByteStream
    where
        S: Stream<Item = Result<Bytes, io::Error>> + Send + Sync + 'static,
    {
        ByteStream {
            size_hint: None,
            inner: Box::pin(stream),
        }
    }

    /// Creates a new `ByteStream` by wrapping a `futures` stream, with a size
    /// hint so `Content-Length` can be set without draining the body.
    pub fn new_with_size<S>(stream: S, size_hint: usize) -> ByteStream
    where
        S: Stream<Item = Result<Bytes, io::Error>> + Send + Sync + 'static,
    {
        ByteStream {
            size_hint: Some(size_hint),
            inner: Box::pin(stream),
        }
    }

    pub(crate) fn size_hint(&self) -> Option<usize> {
        self.size_hint
    }

    /// Return an implementation of `AsyncRead` that uses async i/o to consume the stream.
    pub fn into_async_read(self) -> impl AsyncRead + Send + Sync {
        ImplAsyncRead::new(self.inner)
    }

    /// Return an implementation of `Read` that uses blocking i/o to consume the stream.
    pub fn into_blocking_read(self) -> impl io::Read + Send + Sync {
        ImplBlockingRead::new(self.inner)
    }
}

impl From<Vec<u8>> for ByteStream {
    fn from(buf: Vec<u8>) -> ByteStream {
        ByteStream {
            size_hint: Some(buf.len()),
            inner: Box::pin(stream::once(async move { Ok(Bytes::from(buf)) })),
        }
    }
}

impl From<Bytes> for ByteStream {
    fn from(buf: Bytes) -> ByteStream {
        ByteStream {
            size_hint: Some(buf.len()),
            inner: Box::pin(stream::once(async move { Ok(buf) })),
        }
    }
}

impl fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<ByteStream size_hint={:?}>", self.size_hint)
    }
}

impl Stream for ByteStream {
    type Item = Result<Bytes, io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        this.inner.poll_next(cx)
    }
}

/// A request body that can be opened again from its first byte.
///
/// Buffered payloads are trivially re-openable; larger bodies (files and the
/// like) implement this so a failed attempt can be retried without the
/// pipeline buffering the data.
pub trait BodySource: Send + Sync {
    /// Total body length, when known without reading.
    fn len(&self) -> Option<u64>;

    fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Opens a fresh stream positioned at the first byte.
    fn open(&self) -> ByteStream;
}

impl BodySource for Bytes {
    fn len(&self) -> Option<u64> {
        Some(Bytes::len(self) as u64)
    }

    fn open(&self) -> ByteStream {
        ByteStream::from(self.clone())
    }
}

/// A boxed grant from a rate limiter. `Sync` so limited body streams can
/// keep flowing through the shared transport types.
pub type AcquireFuture = Pin<Box<dyn Future<Output = ()> + Send + Sync + 'static>>;

/// Grants bandwidth to a body stream; `acquire` resolves once `n` bytes of
/// budget are available. Implementations must be safe to share across
/// concurrent requests.
pub trait RateLimit: Send + Sync {
    fn acquire(&self, n: usize) -> AcquireFuture;
}

/// Invoked after each chunk with `(bytes_so_far, total_bytes)`; the total is
/// `-1` when the body size is unknown.
pub type ProgressCallback = Arc<dyn Fn(u64, i64) + Send + Sync>;

struct TapState {
    transferred: u64,
    crc: Option<Crc64>,
    md5: Option<md5::Context>,
    finished: bool,
}

/// Digest state shared between a [`DigestStream`] and whoever needs the final
/// values once the transport has drained the body.
pub struct BodyTap {
    state: Mutex<TapState>,
}

impl BodyTap {
    pub fn new(want_crc64: bool, want_md5: bool) -> Arc<BodyTap> {
        Arc::new(BodyTap {
            state: Mutex::new(TapState {
                transferred: 0,
                crc: if want_crc64 { Some(Crc64::new()) } else { None },
                md5: if want_md5 { Some(md5::Context::new()) } else { None },
                finished: false,
            }),
        })
    }

    fn update(&self, chunk: &[u8]) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.transferred += chunk.len() as u64;
        if let Some(crc) = state.crc.as_mut() {
            crc.update(chunk);
        }
        if let Some(md5) = state.md5.as_mut() {
            md5.consume(chunk);
        }
        state.transferred
    }

    fn finish(&self) {
        self.state.lock().unwrap().finished = true;
    }

    /// Bytes that have flowed through so far.
    pub fn transferred(&self) -> u64 {
        self.state.lock().unwrap().transferred
    }

    /// True once the underlying stream reached end-of-stream.
    pub fn is_finished(&self) -> bool {
        self.state.lock().unwrap().finished
    }

    /// The running CRC-64 value, if enabled.
    pub fn crc64(&self) -> Option<u64> {
        self.state.lock().unwrap().crc.as_ref().map(Crc64::sum)
    }

    /// The base64-encoded MD5 of everything seen so far, if enabled.
    pub fn md5_base64(&self) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .md5
            .as_ref()
            .map(|ctx| base64::encode(*ctx.clone().compute()))
    }
}

impl fmt::Debug for BodyTap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("BodyTap")
            .field("transferred", &state.transferred)
            .field("finished", &state.finished)
            .finish()
    }
}

struct ExpectedCrc64 {
    value: u64,
    request_id: String,
}

/// Single-pass adapter over a body stream.
///
/// As chunks flow through it feeds the attached [`BodyTap`], reports
/// progress, waits for rate-limiter grants before releasing each chunk, and
/// observes cancellation at chunk boundaries. When an expected CRC-64 is set
/// the stream fails at end-of-stream on mismatch instead of terminating
/// cleanly.
#[pin_project]
pub struct DigestStream {
    #[pin]
    inner: ByteStream,
    tap: Option<Arc<BodyTap>>,
    progress: Option<ProgressCallback>,
    total: i64,
    transferred: u64,
    limiter: Option<Arc<dyn RateLimit>>,
    cancel: Option<CancellationToken>,
    expected: Option<ExpectedCrc64>,
    pending_grant: Option<AcquireFuture>,
    pending_chunk: Option<Bytes>,
}

impl DigestStream {
    pub fn new(inner: ByteStream) -> DigestStream {
        let total = inner.size_hint().map(|hint| hint as i64).unwrap_or(-1);
        DigestStream {
            inner,
            tap: None,
            progress: None,
            total,
            transferred: 0,
            limiter: None,
            cancel: None,
            expected: None,
            pending_grant: None,
            pending_chunk: None,
        }
    }

    pub fn with_tap(mut self, tap: Arc<BodyTap>) -> Self {
        self.tap = Some(tap);
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn with_rate_limit(mut self, limiter: Arc<dyn RateLimit>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Fails the stream at end-of-stream unless the computed CRC-64 matches.
    pub fn expect_crc64(mut self, value: u64, request_id: String) -> Self {
        self.expected = Some(ExpectedCrc64 { value, request_id });
        self
    }

    /// Repackages as a `ByteStream`, keeping the size hint.
    pub fn into_byte_stream(self) -> ByteStream {
        match self.inner.size_hint() {
            Some(hint) => ByteStream::new_with_size(self, hint),
            None => ByteStream::new(self),
        }
    }
}

impl Stream for DigestStream {
    type Item = Result<Bytes, io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(token) = this.cancel.as_ref() {
                if token.is_cancelled() {
                    return Poll::Ready(Some(Err(io::Error::new(
                        io::ErrorKind::Interrupted,
                        "request cancelled",
                    ))));
                }
            }

            if let Some(grant) = this.pending_grant.as_mut() {
                futures::ready!(grant.as_mut().poll(cx));
                *this.pending_grant = None;
                let chunk = this.pending_chunk.take().expect("grant without a chunk");
                return Poll::Ready(Some(Ok(chunk)));
            }

            match futures::ready!(this.inner.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) => {
                    *this.transferred += chunk.len() as u64;
                    let seen = if let Some(tap) = this.tap.as_ref() {
                        tap.update(&chunk)
                    } else {
                        *this.transferred
                    };
                    if let Some(progress) = this.progress.as_ref() {
                        progress(seen, *this.total);
                    }
                    match this.limiter.as_ref() {
                        Some(limiter) => {
                            *this.pending_grant = Some(limiter.acquire(chunk.len()));
                            *this.pending_chunk = Some(chunk);
                        }
                        None => return Poll::Ready(Some(Ok(chunk))),
                    }
                }
                Some(Err(e)) => return Poll::Ready(Some(Err(e))),
                None => {
                    if let Some(tap) = this.tap.as_ref() {
                        tap.finish();
                    }
                    if let Some(expected) = this.expected.as_ref() {
                        let actual = this
                            .tap
                            .as_ref()
                            .and_then(|tap| tap.crc64())
                            .unwrap_or_default();
                        if actual != expected.value {
                            return Poll::Ready(Some(Err(io::Error::new(
                                io::ErrorKind::InvalidData,
                                format!(
                                    "CRC-64 mismatch: server reported {}, client computed {} \
                                     over {} bytes, request id: {}",
                                    expected.value, actual, this.transferred, expected.request_id
                                ),
                            ))));
                        }
                    }
                    return Poll::Ready(None);
                }
            }
        }
    }
}

#[pin_project]
struct ImplAsyncRead {
    buffer: BytesMut,
    #[pin]
    stream:
        futures::stream::Fuse<Pin<Box<dyn Stream<Item = Result<Bytes, io::Error>> + Send + Sync>>>,
}

impl ImplAsyncRead {
    fn new(stream: Pin<Box<dyn Stream<Item = Result<Bytes, io::Error>> + Send + Sync>>) -> Self {
        ImplAsyncRead {
            buffer: BytesMut::new(),
            stream: stream.fuse(),
        }
    }
}

impl AsyncRead for ImplAsyncRead {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        if this.buffer.is_empty() {
            match futures::ready!(this.stream.poll_next(cx)) {
                None => return Poll::Ready(Ok(0)),
                Some(Err(e)) => return Poll::Ready(Err(e)),
                Some(Ok(bytes)) => {
                    this.buffer.put(bytes);
                }
            }
        }
        let available = std::cmp::min(buf.len(), this.buffer.len());
        let bytes = this.buffer.split_to(available);
        let (left, _) = buf.split_at_mut(available);
        left.copy_from_slice(&bytes[..available]);
        Poll::Ready(Ok(available))
    }
}

#[pin_project]
struct ImplBlockingRead {
    #[pin]
    inner: ImplAsyncRead,
}

impl ImplBlockingRead {
    fn new(stream: Pin<Box<dyn Stream<Item = Result<Bytes, io::Error>> + Send + Sync>>) -> Self {
        ImplBlockingRead {
            inner: ImplAsyncRead::new(stream),
        }
    }
}

impl io::Read for ImplBlockingRead {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut rt = tokio::runtime::Runtime::new()?;
        rt.block_on(future::poll_fn(|cx| {
            tokio::io::AsyncRead::poll_read(Pin::new(&mut self.inner), cx, buf)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::checksum::crc64;
    use futures::TryStreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn chunked(parts: Vec<&'static [u8]>) -> ByteStream {
        ByteStream::new(stream::iter(
            parts.into_iter().map(|p| Ok(Bytes::from_static(p))),
        ))
    }

    async fn drain(stream: DigestStream) -> io::Result<Vec<u8>> {
        let chunks: Vec<Bytes> = stream.try_collect().await?;
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    #[tokio::test]
    async fn tap_computes_length_md5_and_crc() {
        let tap = BodyTap::new(true, true);
        let body = chunked(vec![b"hello ", b"world"]);
        let out = drain(DigestStream::new(body).with_tap(tap.clone()))
            .await
            .unwrap();

        assert_eq!(out, b"hello world");
        assert_eq!(tap.transferred(), 11);
        assert!(tap.is_finished());
        assert_eq!(tap.crc64(), Some(crc64(b"hello world")));
        assert_eq!(tap.md5_base64().unwrap(), "XrY7u+Ae7tCTyyK7j1rNww==");
    }

    #[tokio::test]
    async fn progress_reports_running_totals() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = seen.clone();
        let callback: ProgressCallback = Arc::new(move |done, total| {
            record.lock().unwrap().push((done, total));
        });

        let body = ByteStream::new_with_size(
            stream::iter(vec![
                Ok(Bytes::from_static(b"abc")),
                Ok(Bytes::from_static(b"de")),
            ]),
            5,
        );
        drain(
            DigestStream::new(body)
                .with_tap(BodyTap::new(false, false))
                .with_progress(callback),
        )
        .await
        .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![(3, 5), (5, 5)]);
    }

    #[tokio::test]
    async fn unknown_size_reports_negative_total() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = seen.clone();
        let callback: ProgressCallback = Arc::new(move |done, total| {
            record.lock().unwrap().push((done, total));
        });

        drain(DigestStream::new(chunked(vec![b"xyz"])).with_progress(callback))
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![(3, -1)]);
    }

    #[tokio::test]
    async fn rate_limiter_is_consulted_per_chunk() {
        struct CountingLimit(AtomicUsize);
        impl RateLimit for CountingLimit {
            fn acquire(&self, n: usize) -> AcquireFuture {
                self.0.fetch_add(n, Ordering::SeqCst);
                Box::pin(future::ready(()))
            }
        }

        let limiter = Arc::new(CountingLimit(AtomicUsize::new(0)));
        let out = drain(
            DigestStream::new(chunked(vec![b"aa", b"bbb"])).with_rate_limit(limiter.clone()),
        )
        .await
        .unwrap();

        assert_eq!(out, b"aabbb");
        assert_eq!(limiter.0.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn cancellation_stops_at_chunk_boundary() {
        let token = CancellationToken::new();
        token.cancel();
        let err = drain(DigestStream::new(chunked(vec![b"never"])).with_cancellation(token))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
    }

    #[tokio::test]
    async fn crc_mismatch_fails_at_end_of_stream() {
        let tap = BodyTap::new(true, false);
        let err = drain(
            DigestStream::new(chunked(vec![b"payload"]))
                .with_tap(tap)
                .expect_crc64(12345, "req-1".to_owned()),
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        let message = err.to_string();
        assert!(message.contains("12345"));
        assert!(message.contains(&crc64(b"payload").to_string()));
        assert!(message.contains("req-1"));
    }

    #[tokio::test]
    async fn crc_match_ends_cleanly() {
        let tap = BodyTap::new(true, false);
        let out = drain(
            DigestStream::new(chunked(vec![b"pay", b"load"]))
                .with_tap(tap)
                .expect_crc64(crc64(b"payload"), String::new()),
        )
        .await
        .unwrap();
        assert_eq!(out, b"payload");
    }

    #[test]
    fn bytes_are_a_reopenable_source() {
        let source = Bytes::from_static(b"again and again");
        assert_eq!(BodySource::len(&source), Some(15));
        assert_eq!(source.open().size_hint(), Some(15));
        assert_eq!(source.open().size_hint(), Some(15));
    }
}
