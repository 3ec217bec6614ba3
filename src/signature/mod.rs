pub mod checksum;
pub mod endpoint;
pub mod signer;
pub mod stream;

pub use endpoint::Endpoint;
pub use signer::{SignatureVersion, SignedRequest, SignedRequestPayload};
pub use stream::{
    AcquireFuture, BodySource, BodyTap, ByteStream, DigestStream, ProgressCallback, RateLimit,
};

mod oss_time;
