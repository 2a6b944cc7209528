use std::sync::OnceLock;
use std::time::Duration;

use reqwest::{Client, ClientBuilder, redirect};
use tracing::debug;

use crate::error::ClientError;

pub(crate) const DEFAULT_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Default bound on a single request round trip.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Can happen if another crate installed it first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Client builder used by the session.
///
/// Redirects are not followed by reqwest: the session follows them itself so
/// that `Set-Cookie` headers on intermediate hops end up in its cookie jar.
pub fn create_client_builder(request_timeout: Duration) -> ClientBuilder {
    install_rustls_provider();

    let mut builder = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(redirect::Policy::none());

    if request_timeout > Duration::ZERO {
        builder = builder.timeout(request_timeout);
    }

    builder
}

pub fn default_client(request_timeout: Duration) -> Result<Client, ClientError> {
    Ok(create_client_builder(request_timeout).build()?)
}
