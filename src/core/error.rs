use std::error::Error;
use std::fmt;
use std::io;

use crate::core::client::SignAndDispatchError;
use crate::core::proto::xml::util::XmlParseError;
use crate::core::request::BufferedHttpResponse;
use crate::core::request::HttpDispatchError;
use crate::credential::CredentialsError;

/// Generic error type returned by all requests.
#[derive(Debug, PartialEq)]
pub enum OssError<E> {
    /// A service-specific error occurred.
    Service(E),
    /// An error occurred dispatching the HTTP request.
    HttpDispatch(HttpDispatchError),
    /// An error was encountered with OSS credentials.
    Credentials(CredentialsError),
    /// The request failed its local invariants; nothing was sent.
    Validation(String),
    /// An error occurred parsing the response payload.
    ParseError(String),
    /// The body that arrived does not match the checksum the peer reported.
    Checksum(ChecksumMismatch),
    /// The client was disabled before the request could be dispatched.
    Disabled,
    /// The request was cancelled cooperatively.
    Cancelled,
    /// An unknown error occurred. The raw HTTP response is provided.
    Unknown(BufferedHttpResponse),
}

/// Result carrying a generic `OssError`.
pub type OssResult<T, E> = Result<T, OssError<E>>;

/// Header used by the service on responses to identify the request.
pub const OSS_REQUEST_ID_HEADER: &str = "x-oss-request-id";

/// Header carrying the service-computed CRC-64 of the stored content.
pub const OSS_CRC64_HEADER: &str = "x-oss-hash-crc64ecma";

/// A CRC-64 disagreement between the two ends of a transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct ChecksumMismatch {
    /// What the service reported.
    pub expected: u64,
    /// What this client computed while streaming.
    pub actual: u64,
    /// How many body bytes flowed through the client.
    pub transferred_bytes: u64,
    /// The service-assigned request id, for support tickets.
    pub request_id: String,
}

impl fmt::Display for ChecksumMismatch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "CRC-64 mismatch: server reported {}, client computed {} over {} bytes, \
             request id: {}",
            self.expected, self.actual, self.transferred_bytes, self.request_id
        )
    }
}

impl<E> From<XmlParseError> for OssError<E> {
    fn from(err: XmlParseError) -> Self {
        let XmlParseError(message) = err;
        OssError::ParseError(message)
    }
}

impl<E> From<CredentialsError> for OssError<E> {
    fn from(err: CredentialsError) -> Self {
        OssError::Credentials(err)
    }
}

impl<E> From<HttpDispatchError> for OssError<E> {
    fn from(err: HttpDispatchError) -> Self {
        OssError::HttpDispatch(err)
    }
}

impl<E> From<SignAndDispatchError> for OssError<E> {
    fn from(err: SignAndDispatchError) -> Self {
        match err {
            SignAndDispatchError::Credentials(e) => Self::from(e),
            SignAndDispatchError::Dispatch(e) => Self::from(e),
            SignAndDispatchError::Validation(message) => OssError::Validation(message),
            SignAndDispatchError::Checksum(mismatch) => OssError::Checksum(mismatch),
            SignAndDispatchError::Disabled => OssError::Disabled,
            SignAndDispatchError::Cancelled => OssError::Cancelled,
        }
    }
}

impl<E> From<io::Error> for OssError<E> {
    fn from(err: io::Error) -> Self {
        OssError::HttpDispatch(HttpDispatchError::from(err))
    }
}

impl<E: Error + 'static> fmt::Display for OssError<E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            OssError::Service(ref err) => write!(f, "{}", err),
            OssError::HttpDispatch(ref dispatch_error) => write!(f, "{}", dispatch_error),
            OssError::Credentials(ref err) => write!(f, "{}", err),
            OssError::Validation(ref cause) => write!(f, "{}", cause),
            OssError::ParseError(ref cause) => write!(f, "{}", cause),
            OssError::Checksum(ref mismatch) => write!(f, "{}", mismatch),
            OssError::Disabled => write!(f, "Client has been disabled"),
            OssError::Cancelled => write!(f, "Request was cancelled"),
            OssError::Unknown(ref cause) => write!(
                f,
                "Request ID: {:?} Body: {}",
                cause.headers.get(OSS_REQUEST_ID_HEADER),
                cause.body_as_str()
            ),
        }
    }
}

impl<E: Error + 'static> Error for OssError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match *self {
            OssError::Service(ref err) => Some(err),
            OssError::HttpDispatch(ref err) => Some(err),
            OssError::Credentials(ref err) => Some(err),
            _ => None,
        }
    }
}
