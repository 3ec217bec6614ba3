//! Types for OSS credentials and the providers that produce them.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;

use std::env::var as env_var;
use std::error::Error;
use std::fmt;

mod environment;
mod static_provider;

pub use environment::EnvironmentProvider;
pub use static_provider::StaticProvider;

/// OSS access credentials: access key id, access key secret, and the session
/// token issued with temporary (STS) credentials.
///
/// # Anonymous example
///
/// Public-read buckets can be used without authenticated credentials; for
/// those cases use `OssCredentials::default` with `StaticProvider`.
#[derive(Clone, Deserialize, Default)]
pub struct OssCredentials {
    #[serde(rename = "AccessKeyId")]
    key: String,
    #[serde(rename = "AccessKeySecret", alias = "SecretAccessKey")]
    secret: String,
    #[serde(rename = "SecurityToken", alias = "SessionToken")]
    token: Option<String>,
    #[serde(rename = "Expiration")]
    expires_at: Option<DateTime<Utc>>,
}

impl OssCredentials {
    /// Create a new `OssCredentials` from a key id, secret, optional session
    /// token, and expiry time.
    pub fn new<K, S>(
        key: K,
        secret: S,
        token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> OssCredentials
    where
        K: Into<String>,
        S: Into<String>,
    {
        OssCredentials {
            key: key.into(),
            secret: secret.into(),
            token,
            expires_at,
        }
    }

    /// Get a reference to the access key id.
    pub fn access_key_id(&self) -> &str {
        &self.key
    }

    /// Get a reference to the access key secret.
    pub fn access_key_secret(&self) -> &str {
        &self.secret
    }

    /// Get a reference to the session token.
    pub fn session_token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Get a reference to the expiry time.
    pub fn expires_at(&self) -> &Option<DateTime<Utc>> {
        &self.expires_at
    }

    /// Whether any credential material is present at all.
    pub fn is_anonymous(&self) -> bool {
        self.key.is_empty() && self.secret.is_empty()
    }

    /// Determine whether or not the credentials are expired.
    pub fn credentials_are_expired(&self) -> bool {
        match self.expires_at {
            Some(ref e) =>
            // This is a rough hack to hopefully avoid someone requesting creds then sitting on them
            // before issuing the request:
            {
                *e < Utc::now() + ChronoDuration::seconds(20)
            }
            None => false,
        }
    }
}

impl fmt::Debug for OssCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OssCredentials")
            .field("key", &self.key)
            .field("secret", &"**********")
            .field("token", &self.token.as_ref().map(|_| "**********"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// A trait for types that produce `OssCredentials`.
///
/// The request pipeline calls this once per attempt and never caches the
/// result, so rotating providers take effect immediately. Implementations
/// must be safe to share across concurrent requests.
#[async_trait]
pub trait ProvideOssCredentials {
    /// Produce a new set of credentials.
    async fn credentials(&self) -> Result<OssCredentials, CredentialsError>;
}

/// Represents an error that occurred while retrieving credentials.
#[derive(Debug, PartialEq, Clone)]
pub struct CredentialsError {
    /// The underlying error message for the credentials error.
    pub message: String,
}

impl CredentialsError {
    /// Creates a new Credentials Error.
    pub fn new<S>(message: S) -> CredentialsError
    where
        S: ToString,
    {
        CredentialsError {
            message: message.to_string(),
        }
    }
}

impl fmt::Display for CredentialsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for CredentialsError {}

/// Reads the given env var; empty values count as unset.
fn non_empty_env_var(name: &str) -> Option<String> {
    match env_var(name) {
        Ok(value) => {
            if value.is_empty() {
                None
            } else {
                Some(value)
            }
        }
        Err(_) => None,
    }
}
