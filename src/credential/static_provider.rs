//! Provides a way to create static/programmatically generated OSS credentials,
//! for those who can't get them from the environment.
use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::credential::{CredentialsError, OssCredentials, ProvideOssCredentials};

/// Provides OSS credentials from statically/programmatically provided strings.
#[derive(Clone, Debug)]
pub struct StaticProvider {
    /// OSS credentials.
    credentials: OssCredentials,

    /// The time in seconds for which each issued token is valid.
    valid_for: Option<i64>,
}

impl StaticProvider {
    /// Creates a new static provider. This should be used when you want to
    /// statically, or programmatically, provide access to OSS.
    ///
    /// `valid_for` is the number of seconds for which issued tokens are valid.
    pub fn new(
        access_key_id: String,
        access_key_secret: String,
        token: Option<String>,
        valid_for: Option<i64>,
    ) -> StaticProvider {
        StaticProvider {
            credentials: OssCredentials::new(access_key_id, access_key_secret, token, None),
            valid_for,
        }
    }

    /// Creates a new minimal static provider, without a session token.
    pub fn new_minimal(access_key_id: String, access_key_secret: String) -> StaticProvider {
        StaticProvider {
            credentials: OssCredentials::new(access_key_id, access_key_secret, None, None),
            valid_for: None,
        }
    }

    /// Gets the access key id for this static provider.
    pub fn get_access_key_id(&self) -> &str {
        &self.credentials.key
    }

    /// Gets the access key secret for this static provider.
    pub fn get_access_key_secret(&self) -> &str {
        &self.credentials.secret
    }

    /// Determines if this static provider was given a session token.
    pub fn has_token(&self) -> bool {
        self.credentials.token.is_some()
    }

    /// Gets the session token this static provider was given.
    pub fn get_token(&self) -> &Option<String> {
        &self.credentials.token
    }

    /// Returns the length in seconds this static provider will be valid for.
    pub fn is_valid_for(&self) -> &Option<i64> {
        &self.valid_for
    }
}

#[async_trait]
impl ProvideOssCredentials for StaticProvider {
    async fn credentials(&self) -> Result<OssCredentials, CredentialsError> {
        let mut creds = self.credentials.clone();
        creds.expires_at = self.valid_for.map(|v| Utc::now() + Duration::seconds(v));
        Ok(creds)
    }
}

impl From<OssCredentials> for StaticProvider {
    fn from(credentials: OssCredentials) -> Self {
        StaticProvider {
            credentials,
            valid_for: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_the_configured_credentials() {
        let provider = StaticProvider::new(
            "id".to_owned(),
            "secret".to_owned(),
            Some("token".to_owned()),
            None,
        );
        let creds = provider.credentials().await.unwrap();
        assert_eq!(creds.access_key_id(), "id");
        assert_eq!(creds.access_key_secret(), "secret");
        assert_eq!(creds.session_token(), Some("token"));
        assert!(creds.expires_at().is_none());
    }

    #[tokio::test]
    async fn stamps_an_expiry_when_valid_for_is_set() {
        let provider = StaticProvider::new("id".to_owned(), "secret".to_owned(), None, Some(60));
        let creds = provider.credentials().await.unwrap();
        assert!(creds.expires_at().is_some());
    }
}
