//! End-to-end fetch flows against a local stand-in for the storefront.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Form, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use leslies_pool::{
    ClientError, ClientOptions, Coordinator, Credentials, FetchOutcome, LesliesPoolApi,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

const SITE: &str = "/on/demandware.store/Sites-lpm_site-Site/en_US";
const CSRF_TOKEN: &str = "tok-7f3a";
const USERNAME: &str = "owner@example.com";
const PASSWORD: &str = "correct horse";

enum Reply {
    Json(Value),
    Html(String),
    Status(StatusCode),
    /// Hold the request open past the client's timeout.
    Stall(Duration),
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self {
            Reply::Json(value) => Json(value).into_response(),
            Reply::Html(body) => Html(body).into_response(),
            Reply::Status(status) => status.into_response(),
            Reply::Stall(_) => StatusCode::OK.into_response(),
        }
    }
}

#[derive(Default)]
struct FakeSite {
    omit_csrf: AtomicBool,
    /// Landing redirects to the login page until someone logs in.
    expire_until_login: bool,
    /// Landing always redirects to the login page.
    always_expired: AtomicBool,
    authenticated: AtomicBool,

    login_page_hits: AtomicUsize,
    login_posts: AtomicUsize,
    landing_hits: AtomicUsize,
    water_test_hits: AtomicUsize,

    landing_query: Mutex<Option<HashMap<String, String>>>,
    water_test_cookies: Mutex<Option<String>>,
    water_test_body: Mutex<Option<String>>,
    /// Served in order by the results endpoint, then the default table.
    water_test_replies: Mutex<VecDeque<Reply>>,
}

impl FakeSite {
    fn queue(&self, reply: Reply) {
        self.water_test_replies.lock().unwrap().push_back(reply);
    }

    fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

fn results_table(cells: usize, not_in_store: bool) -> String {
    let values = [
        "3.0", "3.2", "7.4", "90", "250", "50", "0", "0", "100", "3400",
    ];
    let mut row = String::from(
        r#"<tr><th class="text-center align-middle p-1"><span class="badge badge-secondary p-2">05/21/2025</span></th>"#,
    );
    for i in 0..cells {
        let content = match i {
            0 => "Pool".to_string(),
            i if i <= values.len() => format!(" {} ", values[i - 1]),
            i if i == cells - 1 && not_in_store => {
                r#"<i class="fa fa-times-circle text-danger"></i>"#.to_string()
            }
            _ => String::new(),
        };
        row.push_str(&format!("<td>{content}</td>"));
    }
    row.push_str("</tr>");
    format!(
        r#"<table class="table table-striped table-bordered table-hover table-sm"><tbody>{row}</tbody></table>"#
    )
}

fn results_payload(cells: usize, not_in_store: bool) -> Value {
    json!({ "response": results_table(cells, not_in_store) })
}

async fn login_page(State(site): State<Arc<FakeSite>>) -> Response {
    site.login_page_hits.fetch_add(1, Ordering::SeqCst);
    let csrf = if site.omit_csrf.load(Ordering::SeqCst) {
        String::new()
    } else {
        format!(r#"<input type="hidden" name="csrf_token" value="{CSRF_TOKEN}"/>"#)
    };
    (
        [(header::SET_COOKIE, "dwanonymous=anon-1; Path=/")],
        Html(format!(
            "<html><body><form>{csrf}<input name=\"loginEmail\"/><input name=\"loginPassword\" type=\"password\"/></form></body></html>"
        )),
    )
        .into_response()
}

async fn login(
    State(site): State<Arc<FakeSite>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    site.login_posts.fetch_add(1, Ordering::SeqCst);
    let field = |name: &str| form.get(name).map(String::as_str);
    if field("csrf_token") != Some(CSRF_TOKEN)
        || field("loginEmail") != Some(USERNAME)
        || field("loginPassword") != Some(PASSWORD)
    {
        return StatusCode::FORBIDDEN.into_response();
    }

    site.authenticated.store(true, Ordering::SeqCst);
    (
        [(header::SET_COOKIE, "dwsid=authed-1; Path=/; HttpOnly")],
        Json(json!({ "success": true })),
    )
        .into_response()
}

async fn landing(
    State(site): State<Arc<FakeSite>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    site.landing_hits.fetch_add(1, Ordering::SeqCst);
    *site.landing_query.lock().unwrap() = Some(query);

    let expired = site.always_expired.load(Ordering::SeqCst)
        || (site.expire_until_login && !site.authenticated.load(Ordering::SeqCst));
    if expired {
        return Redirect::to(&format!("{SITE}/Account-Show")).into_response();
    }

    (
        [(header::SET_COOKIE, "__cq_seg=pool-1; Path=/")],
        Html("<html><body>Water tests</body></html>"),
    )
        .into_response()
}

async fn water_test(State(site): State<Arc<FakeSite>>, headers: HeaderMap, body: String) -> Response {
    site.water_test_hits.fetch_add(1, Ordering::SeqCst);
    *site.water_test_cookies.lock().unwrap() = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    *site.water_test_body.lock().unwrap() = Some(body);

    let reply = site.water_test_replies.lock().unwrap().pop_front();
    let reply = reply.unwrap_or_else(|| Reply::Json(results_payload(12, false)));
    if let Reply::Stall(delay) = reply {
        tokio::time::sleep(delay).await;
    }
    reply.into_response()
}

async fn spawn_site(site: FakeSite) -> (Arc<FakeSite>, String) {
    let site = Arc::new(site);
    let app = Router::new()
        .route(&format!("{SITE}/Account-Show"), get(login_page))
        .route(&format!("{SITE}/Account-Login"), post(login))
        .route(&format!("{SITE}/WaterTest-Landing"), get(landing))
        .route(&format!("{SITE}/WaterTest-GetWaterTest"), post(water_test))
        .with_state(site.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (site, format!("http://{addr}"))
}

fn client(base_url: &str) -> LesliesPoolApi {
    client_with_timeout(base_url, Duration::from_secs(5))
}

fn client_with_timeout(base_url: &str, timeout: Duration) -> LesliesPoolApi {
    LesliesPoolApi::new(
        Credentials::new(USERNAME, PASSWORD, "12345", "Back Yard"),
        ClientOptions::default()
            .with_base_url(base_url)
            .with_request_timeout(timeout),
    )
    .unwrap()
}

#[tokio::test]
async fn fetch_returns_fresh_reading() {
    let (site, base_url) = spawn_site(FakeSite::default()).await;
    let mut api = client(&base_url);

    let reading = match api.fetch_water_test_data().await.unwrap() {
        FetchOutcome::Fresh { reading } => reading,
        other => panic!("expected a fresh reading, got {other:?}"),
    };
    assert_eq!(reading.free_chlorine, "3.0");
    assert_eq!(reading.ph, "7.4");
    assert_eq!(reading.salt, "3400");
    assert_eq!(reading.test_date.as_deref(), Some("05/21/2025"));
    assert!(reading.in_store);

    assert_eq!(FakeSite::count(&site.login_posts), 0);
    assert_eq!(FakeSite::count(&site.water_test_hits), 1);

    let query = site.landing_query.lock().unwrap().clone().unwrap();
    assert_eq!(query["poolProfileId"], "12345");
    assert_eq!(query["poolName"], "Back Yard");

    let cookies = site.water_test_cookies.lock().unwrap().clone().unwrap();
    assert!(cookies.contains("__cq_seg=pool-1"), "cookies: {cookies}");
    assert_eq!(
        site.water_test_body.lock().unwrap().as_deref(),
        Some("poolProfileName=Pool&poolSanitizer=Salt+3000-4000")
    );

    assert!(api.last_known_good().get().is_some());
}

#[tokio::test]
async fn not_in_store_icon_clears_flag() {
    let (site, base_url) = spawn_site(FakeSite::default()).await;
    site.queue(Reply::Json(results_payload(11, true)));
    let mut api = client(&base_url);

    let outcome = api.fetch_water_test_data().await.unwrap();
    let reading = outcome.reading().unwrap();
    assert!(!reading.in_store);
    assert_eq!(reading.salt, "3400");
}

#[tokio::test]
async fn landing_redirect_reauthenticates_once() {
    let (site, base_url) = spawn_site(FakeSite {
        expire_until_login: true,
        ..Default::default()
    })
    .await;
    let mut api = client(&base_url);

    let outcome = api.fetch_water_test_data().await.unwrap();
    assert!(matches!(outcome, FetchOutcome::Fresh { .. }));

    assert_eq!(FakeSite::count(&site.login_posts), 1);
    assert_eq!(FakeSite::count(&site.landing_hits), 2);
    assert_eq!(FakeSite::count(&site.water_test_hits), 1);
    assert!(api.is_authenticated());
    assert!(api.session().has_cookie("dwsid"));

    let cookies = site.water_test_cookies.lock().unwrap().clone().unwrap();
    assert!(cookies.contains("dwsid=authed-1"), "cookies: {cookies}");

    // The session is reused on the next fetch.
    api.fetch_water_test_data().await.unwrap();
    assert_eq!(FakeSite::count(&site.login_posts), 1);
    assert_eq!(FakeSite::count(&site.landing_hits), 3);
}

#[tokio::test]
async fn persistent_redirect_gives_up_after_one_login() {
    let (site, base_url) = spawn_site(FakeSite {
        always_expired: AtomicBool::new(true),
        ..Default::default()
    })
    .await;
    let mut api = client(&base_url);

    let outcome = api.fetch_water_test_data().await.unwrap();
    assert_eq!(outcome, FetchOutcome::Empty);
    assert_eq!(FakeSite::count(&site.login_posts), 1);
    assert_eq!(FakeSite::count(&site.landing_hits), 2);
    assert_eq!(FakeSite::count(&site.water_test_hits), 0);
    assert!(!api.is_authenticated());
}

#[tokio::test]
async fn error_msg_mentioning_login_retries() {
    let (site, base_url) = spawn_site(FakeSite::default()).await;
    site.queue(Reply::Json(json!({ "errorMsg": "Please Login to continue" })));
    let mut api = client(&base_url);

    let outcome = api.fetch_water_test_data().await.unwrap();
    assert!(matches!(outcome, FetchOutcome::Fresh { .. }));
    assert_eq!(FakeSite::count(&site.login_posts), 1);
    assert_eq!(FakeSite::count(&site.water_test_hits), 2);
}

#[tokio::test]
async fn html_login_page_instead_of_json_retries() {
    let (site, base_url) = spawn_site(FakeSite::default()).await;
    site.queue(Reply::Html(
        "<html><head><title>Sign In</title></head><body>Password</body></html>".to_string(),
    ));
    let mut api = client(&base_url);

    let outcome = api.fetch_water_test_data().await.unwrap();
    assert!(matches!(outcome, FetchOutcome::Fresh { .. }));
    assert_eq!(FakeSite::count(&site.login_posts), 1);
    assert_eq!(FakeSite::count(&site.water_test_hits), 2);
}

#[tokio::test]
async fn unrelated_non_json_body_aborts() {
    let (site, base_url) = spawn_site(FakeSite::default()).await;
    site.queue(Reply::Html("service unavailable".to_string()));
    let mut api = client(&base_url);

    let outcome = api.fetch_water_test_data().await.unwrap();
    assert_eq!(outcome, FetchOutcome::Empty);
    assert_eq!(FakeSite::count(&site.login_posts), 0);
    assert_eq!(FakeSite::count(&site.water_test_hits), 1);
}

#[tokio::test]
async fn repeated_bad_status_gives_empty() {
    let (site, base_url) = spawn_site(FakeSite::default()).await;
    site.queue(Reply::Status(StatusCode::INTERNAL_SERVER_ERROR));
    site.queue(Reply::Status(StatusCode::BAD_GATEWAY));
    let mut api = client(&base_url);

    let outcome = api.fetch_water_test_data().await.unwrap();
    assert_eq!(outcome, FetchOutcome::Empty);
    assert_eq!(FakeSite::count(&site.login_posts), 1);
    assert_eq!(FakeSite::count(&site.water_test_hits), 2);
}

#[tokio::test]
async fn missing_csrf_token_fails_authentication() {
    let (site, base_url) = spawn_site(FakeSite {
        omit_csrf: AtomicBool::new(true),
        expire_until_login: true,
        ..Default::default()
    })
    .await;
    let mut api = client(&base_url);

    assert!(!api.authenticate().await.unwrap());

    let outcome = api.fetch_water_test_data().await.unwrap();
    assert_eq!(outcome, FetchOutcome::Empty);
    assert_eq!(FakeSite::count(&site.login_posts), 0);
    assert_eq!(FakeSite::count(&site.water_test_hits), 0);
}

#[tokio::test]
async fn wrong_password_fails_authentication() {
    let (site, base_url) = spawn_site(FakeSite::default()).await;
    let mut api = LesliesPoolApi::new(
        Credentials::new(USERNAME, "wrong", "12345", "Back Yard"),
        ClientOptions::default().with_base_url(&base_url),
    )
    .unwrap();

    assert!(!api.authenticate().await.unwrap());
    assert_eq!(FakeSite::count(&site.login_posts), 1);
    assert!(!api.is_authenticated());
}

#[tokio::test]
async fn missing_table_serves_last_known_good() {
    let (site, base_url) = spawn_site(FakeSite::default()).await;
    let mut api = client(&base_url);

    // Nothing cached yet.
    site.queue(Reply::Json(json!({ "response": "<div>No tests</div>" })));
    assert_eq!(
        api.fetch_water_test_data().await.unwrap(),
        FetchOutcome::Empty
    );

    let fresh = api.fetch_water_test_data().await.unwrap();
    let fresh_reading = fresh.reading().unwrap().clone();
    let cached_at = api.last_known_good().fetched_at().unwrap();

    site.queue(Reply::Json(json!({ "response": "<div>No tests</div>" })));
    let outcome = api.fetch_water_test_data().await.unwrap();
    assert_eq!(
        outcome,
        FetchOutcome::Cached {
            reading: fresh_reading.clone(),
            fetched_at: cached_at,
        }
    );

    // A payload without the `response` field also falls back.
    site.queue(Reply::Json(json!({ "success": true })));
    let outcome = api.fetch_water_test_data().await.unwrap();
    assert!(outcome.is_cached());
    assert_eq!(outcome.reading(), Some(&fresh_reading));
}

#[tokio::test]
async fn auth_failure_and_persistent_expiry_skip_cache() {
    let (site, base_url) = spawn_site(FakeSite::default()).await;
    let mut api = client(&base_url);

    let fresh = api.fetch_water_test_data().await.unwrap();
    assert!(matches!(fresh, FetchOutcome::Fresh { .. }));
    assert!(api.last_known_good().get().is_some());

    // Session expired and the login page no longer offers a CSRF token.
    site.always_expired.store(true, Ordering::SeqCst);
    site.omit_csrf.store(true, Ordering::SeqCst);
    let outcome = api.fetch_water_test_data().await.unwrap();
    assert_eq!(outcome, FetchOutcome::Empty);
    assert_eq!(FakeSite::count(&site.login_posts), 0);

    // Login succeeds but the landing page keeps redirecting.
    site.omit_csrf.store(false, Ordering::SeqCst);
    let outcome = api.fetch_water_test_data().await.unwrap();
    assert_eq!(outcome, FetchOutcome::Empty);
    assert_eq!(FakeSite::count(&site.login_posts), 1);

    assert_eq!(FakeSite::count(&site.water_test_hits), 1);
    assert!(api.last_known_good().get().is_some());
}

#[tokio::test]
async fn short_row_does_not_fall_back() {
    let (site, base_url) = spawn_site(FakeSite::default()).await;
    let mut api = client(&base_url);

    assert!(matches!(
        api.fetch_water_test_data().await.unwrap(),
        FetchOutcome::Fresh { .. }
    ));

    site.queue(Reply::Json(results_payload(10, false)));
    let outcome = api.fetch_water_test_data().await.unwrap();
    assert_eq!(outcome, FetchOutcome::Empty);
    assert!(outcome.to_fields().is_empty());
    // The cache is untouched by the failed parse.
    assert!(api.last_known_good().get().is_some());
}

#[tokio::test]
async fn transport_failure_surfaces_as_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut api = client(&format!("http://{addr}"));
    let err = api.fetch_water_test_data().await.unwrap_err();
    assert!(matches!(err, ClientError::Network(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn coordinator_publishes_refreshes() {
    let (site, base_url) = spawn_site(FakeSite::default()).await;
    let mut coordinator = Coordinator::new(client(&base_url), Duration::from_secs(3600));

    let state = coordinator.refresh().await;
    assert!(state.last_update_success);
    assert!(state.last_updated.is_some());
    let data = state.data.unwrap();
    assert_eq!(data.last_tested.as_deref(), Some("05/21/2025"));
    assert!(data.test_timestamp.is_some());

    let mut rx = coordinator.subscribe();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(coordinator.run(cancel.clone()));

    // The first tick fires immediately.
    tokio::time::timeout(Duration::from_secs(10), rx.changed())
        .await
        .unwrap()
        .unwrap();
    assert!(rx.borrow().last_update_success);
    assert_eq!(FakeSite::count(&site.water_test_hits), 2);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn timeouts_on_both_attempts_surface_as_error() {
    let (site, base_url) = spawn_site(FakeSite::default()).await;
    site.queue(Reply::Stall(Duration::from_secs(3)));
    site.queue(Reply::Stall(Duration::from_secs(3)));
    let mut api = client_with_timeout(&base_url, Duration::from_millis(500));

    let err = api.fetch_water_test_data().await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(FakeSite::count(&site.water_test_hits), 2);
    assert_eq!(FakeSite::count(&site.login_posts), 1);
}

#[tokio::test]
async fn coordinator_keeps_data_on_transport_failure() {
    let (site, base_url) = spawn_site(FakeSite::default()).await;
    let api = client_with_timeout(&base_url, Duration::from_millis(500));
    let mut coordinator = Coordinator::new(api, Duration::from_secs(3600));

    let first = coordinator.refresh().await;
    assert!(first.last_update_success);
    let first_data = first.data.clone().unwrap();

    site.queue(Reply::Stall(Duration::from_secs(3)));
    site.queue(Reply::Stall(Duration::from_secs(3)));
    let state = coordinator.refresh().await;
    assert!(!state.last_update_success);
    assert_eq!(state.data, Some(first_data));
    assert!(state.last_error.unwrap().contains("Error fetching data"));
    assert!(state.last_updated >= first.last_updated);
}
