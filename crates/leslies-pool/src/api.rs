//! Session client for the Leslie's Pool storefront.
//!
//! Login is a CSRF-protected form post. Test results are served by an AJAX
//! endpoint that only answers after the pool's landing page has been visited
//! in the same session, and that silently falls back to a login redirect or
//! page once the session expires.

use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderValue};
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cache::LastKnownGood;
use crate::config::{ClientOptions, Credentials};
use crate::error::ClientError;
use crate::http::default_client;
use crate::parser::extract_reading;
use crate::reading::FetchOutcome;
use crate::session::Session;

const SITE_PATH: &str = "/on/demandware.store/Sites-lpm_site-Site/en_US/";

const AJAX_ACCEPT: &str = "application/json, text/javascript, */*; q=0.01";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

// The endpoint wants a profile name and sanitizer, but neither is derived
// from the configured pool yet: every request claims a salt pool named "Pool".
const WATER_TEST_PAYLOAD: &str = "poolProfileName=Pool&poolSanitizer=Salt+3000-4000";

const MAX_ATTEMPTS: u32 = 2;

const PREVIEW_LEN: usize = 200;
const ERROR_PREVIEW_LEN: usize = 500;

const LOGIN_MARKERS: [&str; 4] = ["login", "sign in", "password", "username"];

#[derive(Debug, Clone)]
struct Endpoints {
    login_page: Url,
    login: Url,
    landing: Url,
    water_test: Url,
}

impl Endpoints {
    fn new(base_url: &str) -> Result<Self, ClientError> {
        let base = Url::parse(base_url)?;
        let endpoint = |name: &str| base.join(&format!("{SITE_PATH}{name}"));
        Ok(Self {
            login_page: endpoint("Account-Show")?,
            login: endpoint("Account-Login")?,
            landing: endpoint("WaterTest-Landing")?,
            water_test: endpoint("WaterTest-GetWaterTest")?,
        })
    }
}

/// What a single pass through landing page and results endpoint produced.
enum Attempt {
    /// A JSON body worth handing to the parser.
    Payload(Value),
    /// The server no longer recognizes the session.
    SessionExpired,
    /// The results endpoint answered with an unexpected status.
    BadStatus(StatusCode),
    /// Unusable response that re-authenticating would not fix.
    Abort,
}

/// Client for one account and one pool profile.
///
/// Holds the session cookies and the last-known-good reading. Fetches take
/// `&mut self`, so a single instance can never run two flows at once.
#[derive(Debug)]
pub struct LesliesPoolApi {
    credentials: Credentials,
    session: Session,
    endpoints: Endpoints,
    cache: LastKnownGood,
}

impl LesliesPoolApi {
    pub fn new(credentials: Credentials, options: ClientOptions) -> Result<Self, ClientError> {
        credentials.validate()?;
        let client = default_client(options.request_timeout)?;
        Ok(Self {
            credentials,
            session: Session::new(client),
            endpoints: Endpoints::new(&options.base_url)?,
            cache: LastKnownGood::new(),
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn last_known_good(&self) -> &LastKnownGood {
        &self.cache
    }

    /// Log in with the stored credentials.
    ///
    /// Returns `Ok(false)` when the login page carries no CSRF token or the
    /// login post does not answer 200. A 200 is taken as success without
    /// looking at the body. Only transport failures are errors.
    pub async fn authenticate(&mut self) -> Result<bool, ClientError> {
        debug!(url = %self.endpoints.login_page, "Loading login page");
        let page = self
            .session
            .send(self.session.get(self.endpoints.login_page.as_str()))
            .await?;
        let body = page.text().await?;

        let Some(csrf_token) = extract_csrf_token(&body) else {
            error!("CSRF token not found on login page");
            self.session.mark_expired();
            return Ok(false);
        };

        let form = [
            ("loginEmail", self.credentials.username.as_str()),
            ("loginPassword", self.credentials.password.as_str()),
            ("csrf_token", csrf_token.as_str()),
        ];
        let request = self
            .session
            .post(self.endpoints.login.as_str())
            .form(&form)
            .headers(ajax_headers());
        let response = self.session.send(request).await?;

        let status = response.status();
        if status != StatusCode::OK {
            error!(%status, "Login rejected");
            self.session.mark_expired();
            return Ok(false);
        }

        debug!(cookies = self.session.get_cookies().len(), "Logged in");
        self.session.mark_authenticated();
        Ok(true)
    }

    /// Fetch and parse the most recent water test.
    ///
    /// Makes at most two attempts; the second one logs in again first. Row
    /// level problems give [`FetchOutcome::Empty`], a missing table or
    /// payload serves the last-known-good reading when there is one. Only a
    /// transport failure on the last attempt is returned as an error.
    pub async fn fetch_water_test_data(&mut self) -> Result<FetchOutcome, ClientError> {
        debug!("Fetching water test data");

        let mut payload = None;
        for attempt in 1..=MAX_ATTEMPTS {
            let is_last = attempt == MAX_ATTEMPTS;

            if attempt > 1 {
                info!(attempt, "Re-authenticating");
                if !self.authenticate().await? {
                    error!("Authentication failed");
                    return Ok(FetchOutcome::Empty);
                }
            }

            match self.attempt(is_last).await {
                Ok(Attempt::Payload(value)) => {
                    payload = Some(value);
                    break;
                }
                Ok(Attempt::SessionExpired) if !is_last => {
                    warn!(attempt, "Session expired, re-authenticating");
                }
                Ok(Attempt::SessionExpired) => {
                    error!(attempt, "Failed to maintain authenticated session");
                    return Ok(FetchOutcome::Empty);
                }
                Ok(Attempt::BadStatus(status)) if !is_last => {
                    warn!(attempt, %status, "Unexpected status, retrying");
                }
                Ok(Attempt::BadStatus(status)) => {
                    error!(attempt, %status, "Unexpected status");
                    return Ok(FetchOutcome::Empty);
                }
                Ok(Attempt::Abort) => return Ok(FetchOutcome::Empty),
                Err(e) if !is_last => {
                    warn!(attempt, error = %e, "Request failed, retrying");
                }
                Err(e) => {
                    error!(attempt, error = %e, "Request failed");
                    return Err(e);
                }
            }
        }

        let Some(payload) = payload else {
            error!("Failed to fetch data after all retries");
            return Ok(self.fallback());
        };

        let Some(fragment) = payload.get("response").and_then(Value::as_str) else {
            error!("Missing 'response' field in water test payload");
            return Ok(self.fallback());
        };
        debug!(len = fragment.len(), "Parsing water test fragment");

        match extract_reading(fragment) {
            Ok(reading) => {
                self.cache.store(reading.clone());
                debug!("Updated last-known-good reading");
                Ok(FetchOutcome::Fresh { reading })
            }
            Err(e) if e.falls_back_to_cache() => {
                warn!(error = %e, "Water test table unusable");
                Ok(self.fallback())
            }
            Err(e) => {
                warn!(error = %e, "Malformed water test row");
                Ok(FetchOutcome::Empty)
            }
        }
    }

    async fn attempt(&mut self, is_last: bool) -> Result<Attempt, ClientError> {
        let landing = self
            .session
            .get(self.endpoints.landing.as_str())
            .query(&[
                ("poolProfileId", self.credentials.pool_profile_id.as_str()),
                ("poolName", self.credentials.pool_name.as_str()),
            ]);
        let landing = self.session.send(landing).await?;

        let landed_at = landing.url().as_str();
        if is_login_redirect(landed_at) {
            debug!(url = landed_at, "Landing page redirected to login");
            self.session.mark_expired();
            return Ok(Attempt::SessionExpired);
        }
        drop(landing);

        debug!(url = %self.endpoints.water_test, "Requesting water test results");
        let request = self
            .session
            .post(self.endpoints.water_test.as_str())
            .headers(ajax_headers())
            .body(WATER_TEST_PAYLOAD);
        let response = self.session.send(request).await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Ok(Attempt::BadStatus(status));
        }

        let text = response.text().await?;
        debug!(preview = preview(&text, PREVIEW_LEN), "Water test response");

        let value = match serde_json::from_str::<Value>(&text) {
            Ok(value) => value,
            Err(e) => {
                error!(error = %e, "Water test response is not JSON");
                debug!(preview = preview(&text, ERROR_PREVIEW_LEN), "Response content");
                if looks_like_login_page(&text) {
                    warn!("Login page returned instead of JSON");
                    self.session.mark_expired();
                    return Ok(Attempt::SessionExpired);
                }
                return Ok(Attempt::Abort);
            }
        };

        if let Some(message) = value.get("errorMsg") {
            let message = match message {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            error!(error_msg = %message, "Water test endpoint returned an error");
            if !is_last && message.to_lowercase().contains("login") {
                self.session.mark_expired();
                return Ok(Attempt::SessionExpired);
            }
        }

        Ok(Attempt::Payload(value))
    }

    fn fallback(&self) -> FetchOutcome {
        match self.cache.get() {
            Some((reading, fetched_at)) => {
                info!(%fetched_at, "Serving last-known-good reading");
                FetchOutcome::Cached {
                    reading: reading.clone(),
                    fetched_at,
                }
            }
            None => FetchOutcome::Empty,
        }
    }
}

fn ajax_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static(AJAX_ACCEPT));
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(FORM_CONTENT_TYPE),
    );
    headers
}

fn extract_csrf_token(html: &str) -> Option<String> {
    let selector = match Selector::parse(r#"input[name="csrf_token"]"#) {
        Ok(selector) => selector,
        Err(e) => {
            error!(error = %e, "Invalid CSRF selector");
            return None;
        }
    };
    Html::parse_document(html)
        .select(&selector)
        .next()
        .and_then(|input| input.value().attr("value"))
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

fn is_login_redirect(url: &str) -> bool {
    url.contains("Account-Show") || url.contains("login?rurl=1")
}

fn looks_like_login_page(text: &str) -> bool {
    if !preview(text, 100).to_lowercase().contains("<html") {
        return false;
    }
    let lower = text.to_lowercase();
    LOGIN_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Leading `max` characters of `text`.
fn preview(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
