//! Remote tile retrieval.
//!
//! The cache fetches packed tiles through the [`Fetcher`] trait. With the
//! `download` feature enabled, [`HttpFetcher`] provides a blocking HTTP
//! implementation with optional NASA Earthdata credentials.
//!
//! # Credentials and Redirects
//!
//! Earthdata downloads bounce through the login host before landing on the
//! data server. Redirects are followed manually so the `Authorization`
//! header can be kept on a hop only when the hop stays on the same host or
//! starts or ends at the auth host. Any other cross-host hop drops the
//! header for the rest of the chain.

use crate::error::Result;

/// Login host trusted with credentials across redirects.
pub const AUTH_HOST: &str = "urs.earthdata.nasa.gov";

/// Redirect hops followed before giving up.
pub const MAX_REDIRECTS: usize = 10;

/// Default timeout for HTTP requests in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Retrieves remote tile archives.
pub trait Fetcher: Send + Sync {
    /// Full response body for `url`.
    ///
    /// Transport failures (timeouts, connection errors, non-success status)
    /// are returned as errors for which
    /// [`is_transport`](crate::ElevationError::is_transport) holds.
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Whether credentials may follow a redirect from `original` to `redirect`.
///
/// ```
/// use hgtcache::fetch::{should_keep_auth, AUTH_HOST};
///
/// assert!(should_keep_auth(Some("e4ftl01.cr.usgs.gov"), Some(AUTH_HOST), AUTH_HOST));
/// assert!(!should_keep_auth(Some("e4ftl01.cr.usgs.gov"), Some("cdn.example.com"), AUTH_HOST));
/// ```
pub fn should_keep_auth(original: Option<&str>, redirect: Option<&str>, auth_host: &str) -> bool {
    original == redirect || original == Some(auth_host) || redirect == Some(auth_host)
}

#[cfg(feature = "download")]
pub use self::http::{Credentials, DownloadConfig, HttpFetcher};

#[cfg(feature = "download")]
mod http {
    use std::time::Duration;

    use reqwest::blocking::Client;
    use reqwest::header::LOCATION;
    use reqwest::redirect::Policy;
    use reqwest::Url;

    use super::{should_keep_auth, Fetcher, AUTH_HOST, DEFAULT_TIMEOUT_SECS, MAX_REDIRECTS};
    use crate::error::{ElevationError, Result};

    /// Username and password for basic authentication.
    #[derive(Clone)]
    pub struct Credentials {
        pub username: String,
        pub password: String,
    }

    impl std::fmt::Debug for Credentials {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("Credentials")
                .field("username", &self.username)
                .field("password", &"***")
                .finish()
        }
    }

    /// Configuration for downloading tiles.
    #[derive(Debug, Clone)]
    pub struct DownloadConfig {
        /// Request timeout in seconds, per hop.
        pub timeout_secs: u64,
        /// Optional basic-auth credentials.
        pub credentials: Option<Credentials>,
        /// Host allowed to receive credentials across redirects.
        pub auth_host: String,
        /// Redirect hops followed before failing.
        pub max_redirects: usize,
    }

    impl Default for DownloadConfig {
        fn default() -> Self {
            Self {
                timeout_secs: DEFAULT_TIMEOUT_SECS,
                credentials: None,
                auth_host: AUTH_HOST.to_string(),
                max_redirects: MAX_REDIRECTS,
            }
        }
    }

    impl DownloadConfig {
        /// Anonymous downloads with default settings.
        pub fn new() -> Self {
            Self::default()
        }

        /// Create a configuration for NASA Earthdata.
        ///
        /// Requires a NASA Earthdata account: <https://urs.earthdata.nasa.gov/>
        pub fn nasa_earthdata(username: impl Into<String>, password: impl Into<String>) -> Self {
            Self::default().with_credentials(username, password)
        }

        /// Set basic-auth credentials.
        pub fn with_credentials(
            mut self,
            username: impl Into<String>,
            password: impl Into<String>,
        ) -> Self {
            self.credentials = Some(Credentials {
                username: username.into(),
                password: password.into(),
            });
            self
        }

        /// Set the request timeout.
        pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
            self.timeout_secs = timeout_secs;
            self
        }

        /// Set the host trusted with credentials across redirects.
        pub fn with_auth_host(mut self, host: impl Into<String>) -> Self {
            self.auth_host = host.into();
            self
        }
    }

    /// Blocking HTTP fetcher keeping session cookies across requests.
    pub struct HttpFetcher {
        client: Client,
        config: DownloadConfig,
    }

    impl HttpFetcher {
        /// Create a new fetcher with the given configuration.
        pub fn new(config: DownloadConfig) -> Result<Self> {
            let client = Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .redirect(Policy::none())
                .cookie_store(true)
                .build()
                .map_err(|e| ElevationError::DownloadFailed {
                    url: String::new(),
                    reason: format!("Failed to create HTTP client: {}", e),
                })?;

            Ok(Self { client, config })
        }

        /// Configuration in use.
        pub fn config(&self) -> &DownloadConfig {
            &self.config
        }

        fn failed(url: &str, reason: String) -> ElevationError {
            ElevationError::DownloadFailed {
                url: url.to_string(),
                reason,
            }
        }
    }

    impl Fetcher for HttpFetcher {
        fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            let mut current =
                Url::parse(url).map_err(|e| Self::failed(url, format!("invalid URL: {}", e)))?;
            let mut send_auth = self.config.credentials.is_some();

            for _ in 0..=self.config.max_redirects {
                let mut request = self.client.get(current.clone());
                if let (true, Some(credentials)) = (send_auth, &self.config.credentials) {
                    request = request.basic_auth(&credentials.username, Some(&credentials.password));
                }

                let response = request.send()?;
                let status = response.status();

                if status.is_redirection() {
                    let location = response
                        .headers()
                        .get(LOCATION)
                        .and_then(|value| value.to_str().ok())
                        .ok_or_else(|| {
                            Self::failed(url, format!("HTTP {} without Location", status))
                        })?;
                    let next = current
                        .join(location)
                        .map_err(|e| Self::failed(url, format!("bad redirect: {}", e)))?;

                    send_auth = send_auth
                        && should_keep_auth(
                            current.host_str(),
                            next.host_str(),
                            &self.config.auth_host,
                        );
                    tracing::debug!(from = %current, to = %next, auth = send_auth, "following redirect");

                    current = next;
                    continue;
                }

                if !status.is_success() {
                    return Err(Self::failed(url, format!("HTTP {}", status)));
                }

                let bytes = response.bytes()?;
                return Ok(bytes.to_vec());
            }

            Err(Self::failed(
                url,
                format!("more than {} redirects", self.config.max_redirects),
            ))
        }
    }
}
