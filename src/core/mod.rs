pub mod client;
pub mod error;
pub mod executor;
#[doc(hidden)]
pub mod proto;
pub mod request;
pub mod retry;

pub use crate::core::client::{Client, ClientConfig, SignAndDispatchError};
pub use crate::core::error::{ChecksumMismatch, OssError, OssResult};
pub use crate::core::executor::{CancellationToken, TaskExecutor};
pub use crate::core::request::HttpClient;
pub use crate::core::request::{
    BufferedHttpResponse, DispatchSignedRequest, HttpConfig, HttpRequest, HttpResponse, TlsError,
};
pub use crate::core::retry::{ExponentialBackoff, RetryPolicy};
