//! The credentials provider that reads from environment variables.
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};

use crate::credential::{
    non_empty_env_var, CredentialsError, OssCredentials, ProvideOssCredentials,
};

/// Provides OSS credentials from environment variables.
///
/// # Available environment variables
///
/// * `OSS_ACCESS_KEY_ID`: the access key id
/// * `OSS_ACCESS_KEY_SECRET`: the access key secret
/// * `OSS_SESSION_TOKEN`: the STS session token, when using temporary
///   credentials
/// * `OSS_CREDENTIAL_EXPIRATION`: expiration time in RFC 3339 format
///   (e.g. `1996-12-19T16:39:57-08:00`). If unset, credentials won't expire.
#[derive(Debug, Clone)]
pub struct EnvironmentProvider {
    prefix: String,
}

impl Default for EnvironmentProvider {
    fn default() -> Self {
        EnvironmentProvider {
            prefix: "OSS".to_owned(),
        }
    }
}

impl EnvironmentProvider {
    /// Create an EnvironmentProvider with a non-standard variable prefix,
    /// e.g. `EnvironmentProvider::with_prefix("MYAPP")` reads
    /// `MYAPP_ACCESS_KEY_ID` and friends.
    pub fn with_prefix(prefix: &str) -> Self {
        EnvironmentProvider {
            prefix: prefix.to_owned(),
        }
    }
}

/// A private trait for building the environment variable names based
/// on a provided prefix. Smallest subset of functionality needed for
/// credentials building.
trait EnvironmentVariableProvider {
    fn prefix(&self) -> &str;

    fn access_key_id_var(&self) -> String {
        format!("{}_ACCESS_KEY_ID", self.prefix())
    }

    fn access_key_secret_var(&self) -> String {
        format!("{}_ACCESS_KEY_SECRET", self.prefix())
    }

    fn session_token_var(&self) -> String {
        format!("{}_SESSION_TOKEN", self.prefix())
    }

    fn credential_expiration_var(&self) -> String {
        format!("{}_CREDENTIAL_EXPIRATION", self.prefix())
    }
}

impl EnvironmentVariableProvider for EnvironmentProvider {
    fn prefix(&self) -> &str {
        self.prefix.as_str()
    }
}

#[async_trait]
impl ProvideOssCredentials for EnvironmentProvider {
    async fn credentials(&self) -> Result<OssCredentials, CredentialsError> {
        let env_key = get_critical_variable(self.access_key_id_var())?;
        let env_secret = get_critical_variable(self.access_key_secret_var())?;
        // Present when using temporary STS credentials.
        let token = non_empty_env_var(&self.session_token_var());
        let var_name = self.credential_expiration_var();
        let expires_at = match non_empty_env_var(&var_name) {
            Some(val) => Some(
                DateTime::<FixedOffset>::parse_from_rfc3339(&val)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| {
                        CredentialsError::new(format!(
                            "Invalid {} in environment '{}': {}",
                            var_name, val, e
                        ))
                    })?,
            ),
            _ => None,
        };
        Ok(OssCredentials::new(env_key, env_secret, token, expires_at))
    }
}

/// Force an error if we do not see the particular variable name in the env.
fn get_critical_variable(var_name: String) -> Result<String, CredentialsError> {
    non_empty_env_var(&var_name)
        .ok_or_else(|| CredentialsError::new(format!("No (or empty) {} in environment", var_name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[tokio::test]
    async fn reads_prefixed_variables() {
        env::set_var("TESTOSS_ACCESS_KEY_ID", "env-id");
        env::set_var("TESTOSS_ACCESS_KEY_SECRET", "env-secret");
        env::set_var("TESTOSS_SESSION_TOKEN", "env-token");

        let creds = EnvironmentProvider::with_prefix("TESTOSS")
            .credentials()
            .await
            .unwrap();
        assert_eq!(creds.access_key_id(), "env-id");
        assert_eq!(creds.access_key_secret(), "env-secret");
        assert_eq!(creds.session_token(), Some("env-token"));

        env::remove_var("TESTOSS_ACCESS_KEY_ID");
        env::remove_var("TESTOSS_ACCESS_KEY_SECRET");
        env::remove_var("TESTOSS_SESSION_TOKEN");
    }

    #[tokio::test]
    async fn missing_key_is_an_error() {
        let result = EnvironmentProvider::with_prefix("TESTOSS_UNSET")
            .credentials()
            .await;
        assert!(result.is_err());
    }
}
