//! A client library for Alibaba Cloud OSS and other S3-compatible object
//! storage services speaking the OSS wire protocol.
//!
//! The heart of the crate is the request pipeline in [`core::Client`]: a
//! typed request is validated, signed with HMAC-SHA1 over the OSS canonical
//! string, dispatched with retries, checked end-to-end with CRC-64, and
//! classified into a typed result or a typed error. [`OssClient`] layers the
//! operation catalog on top, and [`SignedRequest::presigned_url`] produces
//! URLs that verify against the same canonical form.
//!
//! [`SignedRequest::presigned_url`]: signature::SignedRequest::presigned_url

pub mod core;
pub mod credential;
mod oss;
mod request;
pub mod signature;

pub use crate::oss::{Oss, OssClient};
pub use crate::request::*;
