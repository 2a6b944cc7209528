use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::http::DEFAULT_REQUEST_TIMEOUT;

/// Origin every endpoint path is resolved against.
pub const DEFAULT_BASE_URL: &str = "https://lesliespool.com";

/// Account credentials and the pool profile to read tests for.
///
/// Supplied once when the client is built and never changed afterwards.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub pool_profile_id: String,
    pub pool_name: String,
}

impl Credentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        pool_profile_id: impl Into<String>,
        pool_name: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            pool_profile_id: pool_profile_id.into(),
            pool_name: pool_name.into(),
        }
    }

    /// Every field must be non-empty.
    pub fn validate(&self) -> Result<(), ClientError> {
        let fields = [
            ("username", &self.username),
            ("password", &self.password),
            ("pool_profile_id", &self.pool_profile_id),
            ("pool_name", &self.pool_name),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(ClientError::InvalidConfig(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("pool_profile_id", &self.pool_profile_id)
            .field("pool_name", &self.pool_name)
            .finish()
    }
}

/// Transport settings for [`LesliesPoolApi`](crate::LesliesPoolApi).
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Bound on each request round trip. Zero disables the bound.
    pub request_timeout: Duration,
    /// Scheme and host the fixed endpoint paths are resolved against.
    pub base_url: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl ClientOptions {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}
