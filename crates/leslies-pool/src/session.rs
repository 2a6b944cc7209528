use chrono::{DateTime, Utc};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response};
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::http::DEFAULT_UA;

const MAX_REDIRECTS: usize = 10;

/// HTTP session with its own cookie store.
///
/// Every request built through the session carries the stored cookies in a
/// manually assembled `Cookie` header, and every response sent through
/// [`Session::send`] has its `Set-Cookie` headers folded back into the store.
/// The store is never shared: one session belongs to one client, and callers
/// must not run two request flows against it at the same time.
///
/// # Example Usage
///
/// ```rust,ignore
/// let mut session = Session::new(reqwest::Client::new());
/// session.add_cookie("dwsid", "abc123");
/// let response = session.send(session.get("https://example.com/page")).await?;
/// assert!(session.has_cookie("dwsid"));
/// ```
#[derive(Debug, Clone)]
pub struct Session {
    client: Client,
    default_headers: HeaderMap,
    cookies: FxHashMap<String, String>,
    authenticated: bool,
}

impl Session {
    pub fn new(client: Client) -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(header::USER_AGENT, HeaderValue::from_static(DEFAULT_UA));
        default_headers.insert(
            header::ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        default_headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.5"),
        );

        Self {
            client,
            default_headers,
            cookies: FxHashMap::default(),
            authenticated: false,
        }
    }

    pub fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }

    /// Whether the last login attempt succeeded and no expiry was seen since.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn mark_authenticated(&mut self) {
        self.authenticated = true;
    }

    pub fn mark_expired(&mut self) {
        self.authenticated = false;
    }

    pub fn add_cookie<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        self.cookies.insert(name.into(), value.into());
    }

    pub fn clear_cookies(&mut self) {
        self.cookies.clear();
    }

    pub fn get_cookies(&self) -> &FxHashMap<String, String> {
        &self.cookies
    }

    pub fn get_cookie(&self, name: &str) -> Option<&String> {
        self.cookies.get(name)
    }

    pub fn has_cookie(&self, name: &str) -> bool {
        self.cookies.contains_key(name)
    }

    /// Serialize the cookie store into a `Cookie` header value.
    ///
    /// Returns `None` when no cookies are stored.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }

        let mut cookie_string = String::with_capacity(
            self.cookies
                .iter()
                .map(|(k, v)| k.len() + 1 + v.len() + 2)
                .sum(),
        );

        for (name, value) in &self.cookies {
            if !cookie_string.is_empty() {
                cookie_string.push_str("; ");
            }
            cookie_string.push_str(name);
            cookie_string.push('=');
            cookie_string.push_str(value);
        }

        Some(cookie_string)
    }

    /// Parse and store cookies from HTTP response headers.
    ///
    /// A cookie with an empty value, a non-positive `Max-Age` or an `Expires`
    /// in the past is removed from the store.
    pub fn parse_and_store_cookies(&mut self, headers: &HeaderMap) {
        for value in headers.get_all(header::SET_COOKIE).iter() {
            let Ok(cookie_str) = value.to_str() else {
                continue;
            };
            let mut parts = cookie_str.split(';');
            let Some((name, value)) = parts.next().and_then(|p| p.split_once('=')) else {
                continue;
            };
            let name = name.trim();
            let value = value.trim();
            if name.is_empty() {
                continue;
            }

            if value.is_empty() || parts.any(is_expiring_attribute) {
                if self.cookies.remove(name).is_some() {
                    debug!(cookie = name, "Removing cookie");
                }
                continue;
            }
            debug!(cookie = name, "Storing cookie");
            self.cookies.insert(name.to_owned(), value.to_owned());
        }
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    /// Create a request carrying the session's default headers and cookies.
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let mut headers = self.default_headers.clone();

        if let Some(cookie_header) = self.cookie_header() {
            match HeaderValue::from_str(&cookie_header) {
                Ok(value) => {
                    headers.insert(header::COOKIE, value);
                }
                Err(e) => {
                    // Skip a malformed Cookie header rather than sending an invalid one.
                    debug!(error = %e, "Failed to build Cookie header");
                }
            }
        }

        self.client.request(method, url).headers(headers)
    }

    /// Execute a request, store its cookies and follow redirects.
    ///
    /// Redirect targets are always fetched with `GET`, the way browsers treat
    /// a redirected form submission. The returned response's `url()` is the
    /// final location.
    pub async fn send(&mut self, builder: RequestBuilder) -> Result<Response, reqwest::Error> {
        let mut response = builder.send().await?;
        self.parse_and_store_cookies(response.headers());

        let mut hops = 0;
        while response.status().is_redirection() {
            let Some(location) = response
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
            else {
                break;
            };

            let next = match response.url().join(location) {
                Ok(url) => url,
                Err(e) => {
                    debug!(error = %e, location, "Invalid redirect location");
                    break;
                }
            };

            hops += 1;
            if hops > MAX_REDIRECTS {
                warn!(url = %next, "Too many redirects; returning last response");
                break;
            }

            debug!(from = %response.url(), to = %next, status = %response.status(), "Following redirect");
            response = self.request(Method::GET, next.as_str()).send().await?;
            self.parse_and_store_cookies(response.headers());
        }

        Ok(response)
    }
}

fn is_expiring_attribute(attribute: &str) -> bool {
    let Some((key, value)) = attribute.split_once('=') else {
        return false;
    };
    let value = value.trim();
    match key.trim().to_ascii_lowercase().as_str() {
        "max-age" => value.parse::<i64>().is_ok_and(|age| age <= 0),
        "expires" => DateTime::parse_from_rfc2822(value).is_ok_and(|at| at < Utc::now()),
        _ => false,
    }
}
