//! Stateful browser.
//!
//! One browser holds at most one current page. Every navigation goes through
//! the same pipeline: URL checks, request building (default headers, cookies,
//! referrer), transport with retries, manual redirect walking and status
//! mapping. Only [`Browser::location`] resolves the final response into a page
//! and moves the browser there.

use crate::error::{BrowserError, Result};
use crate::page::{Page, PageKind};
use crate::resolver::PageResolver;
use crate::state::{BrowserSession, Restored, StateMap};
use crate::transport::{
    header_pair, HeaderMap, HeaderName, HeaderValue, HttpRequest, HttpResponse, HttpTransport,
    Method, RequestBody,
};
use crate::url::UrlParams;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use trawl_core::BrowserConfig;
use url::Url;

/// Classifies a response as a block page; returns the reason.
pub type BlockDetector = Arc<dyn Fn(&HttpResponse) -> Option<String> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserStatus {
    /// No page loaded yet
    Anonymous,
    /// A request is in flight
    Navigating,
    OnPage,
    /// On a logged page, or marked logged by the auth layer
    LoggedIn,
}

#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub user_agent: String,
    pub max_retries: u32,
    /// Base delay; attempt `n` waits `n * retry_backoff`
    pub retry_backoff: Duration,
    pub max_redirects: u32,
    pub allow_https_downgrade: bool,
    /// URL prefixes the browser may visit; empty allows everything
    pub restrict_urls: Vec<String>,
    pub state_duration: Option<chrono::Duration>,
    /// Extra session fields persisted by `dump_state`
    pub state_fields: Vec<String>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self::from_config(&BrowserConfig::default())
    }
}

impl BrowserOptions {
    pub fn from_config(config: &BrowserConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_secs(1),
            max_redirects: config.max_redirects,
            allow_https_downgrade: config.allow_https_downgrade,
            restrict_urls: Vec::new(),
            state_duration: config
                .state_duration_minutes
                .and_then(|m| i64::try_from(m).ok())
                .map(chrono::Duration::minutes),
            state_fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn restrict_to<S: AsRef<str>>(mut self, prefixes: &[S]) -> Self {
        self.restrict_urls = prefixes.iter().map(|p| p.as_ref().to_string()).collect();
        self
    }

    #[must_use]
    pub fn persist_fields<S: AsRef<str>>(mut self, fields: &[S]) -> Self {
        self.state_fields = fields.iter().map(|f| f.as_ref().to_string()).collect();
        self
    }
}

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    method: Option<Method>,
    body: Option<RequestBody>,
    headers: HeaderMap,
    query: Vec<(String, String)>,
    no_redirects: bool,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force the method; without it, requests carrying data are POSTs.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    #[must_use]
    pub fn form<K: Into<String>, V: Into<String>>(mut self, data: impl IntoIterator<Item = (K, V)>) -> Self {
        self.body = Some(RequestBody::Form(
            data.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        ));
        self
    }

    #[must_use]
    pub fn json(mut self, value: Value) -> Self {
        self.body = Some(RequestBody::Json(value));
        self
    }

    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn query<K: Into<String>, V: Into<String>>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        self.query
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Return redirect responses as they are.
    #[must_use]
    pub fn no_redirects(mut self) -> Self {
        self.no_redirects = true;
        self
    }
}

pub struct Browser<K> {
    resolver: Arc<PageResolver<K>>,
    transport: Arc<dyn HttpTransport>,
    options: BrowserOptions,
    session: BrowserSession,
    page: Option<Page<K>>,
    navigating: Arc<AtomicBool>,
    logged: bool,
    block_detector: Option<BlockDetector>,
}

impl<K: PageKind> Browser<K> {
    pub fn new(
        resolver: Arc<PageResolver<K>>,
        transport: Arc<dyn HttpTransport>,
        options: BrowserOptions,
    ) -> Self {
        let session = BrowserSession::new(&options.state_fields);
        Self {
            resolver,
            transport,
            options,
            session,
            page: None,
            navigating: Arc::new(AtomicBool::new(false)),
            logged: false,
            block_detector: None,
        }
    }

    /// Classify responses as block pages before status mapping.
    pub fn set_block_detector<F>(&mut self, detector: F)
    where
        F: Fn(&HttpResponse) -> Option<String> + Send + Sync + 'static,
    {
        self.block_detector = Some(Arc::new(detector));
    }

    pub fn status(&self) -> BrowserStatus {
        if self.navigating.load(Ordering::Relaxed) {
            return BrowserStatus::Navigating;
        }
        match &self.page {
            None if self.logged => BrowserStatus::LoggedIn,
            None => BrowserStatus::Anonymous,
            Some(page) if page.is_logged() || self.logged => BrowserStatus::LoggedIn,
            Some(_) => BrowserStatus::OnPage,
        }
    }

    pub fn page(&self) -> Option<&Page<K>> {
        self.page.as_ref()
    }

    /// Current URL.
    pub fn url(&self) -> Option<&str> {
        self.session.url.as_deref()
    }

    pub fn resolver(&self) -> &PageResolver<K> {
        &self.resolver
    }

    pub fn options(&self) -> &BrowserOptions {
        &self.options
    }

    pub fn session(&self) -> &BrowserSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut BrowserSession {
        &mut self.session
    }

    /// Record that the auth layer established a session.
    pub fn mark_logged(&mut self, logged: bool) {
        self.logged = logged;
    }

    pub fn is_on(&self, kind: K) -> bool {
        self.page.as_ref().is_some_and(|p| p.kind() == kind)
    }

    /// Join a relative URL to the base URL, or to the current URL when the
    /// resolver has no base.
    pub fn absurl(&self, url: &str) -> Result<String> {
        if let Ok(parsed) = Url::parse(url) {
            return Ok(parsed.to_string());
        }
        let base = self
            .resolver
            .base()
            .or(self.session.url.as_deref())
            .ok_or_else(|| BrowserError::InvalidUrl {
                url: url.to_string(),
                reason: "relative URL without a base".to_string(),
            })?;
        join(base, url)
    }

    pub fn url_allowed(&self, url: &str) -> Result<()> {
        if self.options.restrict_urls.is_empty()
            || self
                .options
                .restrict_urls
                .iter()
                .any(|prefix| url.starts_with(prefix.as_str()))
        {
            Ok(())
        } else {
            Err(BrowserError::UrlNotAllowed {
                url: url.to_string(),
            })
        }
    }

    /// Navigate to `url` and make the resolved page current.
    ///
    /// The current URL follows each redirect hop. On any failure the current
    /// URL and page are left as they were.
    pub async fn location(&mut self, url: &str, options: RequestOptions) -> Result<&Page<K>> {
        let previous = self.session.url.clone();
        let outcome = {
            let _navigating = NavigatingGuard::enter(&self.navigating);
            self.fetch(url, options, true).await
        };

        let page = match outcome.and_then(|response| self.resolver.resolve(response)) {
            Ok(page) => page,
            Err(e) => {
                self.session.url = previous;
                return Err(e);
            }
        };
        tracing::info!(url = %page.url(), kind = ?page.kind(), "on page");
        self.session.url = Some(page.url().to_string());
        let page: &Page<K> = self.page.insert(page);
        Ok(page)
    }

    /// Send a request without moving the browser.
    pub async fn open(&mut self, url: &str, options: RequestOptions) -> Result<HttpResponse> {
        self.fetch(url, options, false).await
    }

    /// Navigate to the page of `kind` built from `params`.
    pub async fn go(&mut self, kind: K, params: &UrlParams) -> Result<&Page<K>> {
        let url = self.resolver.url_for(kind, params)?;
        self.location(&url, RequestOptions::new()).await
    }

    /// Like [`Browser::go`], without a request when already on that page.
    pub async fn stay_or_go(&mut self, kind: K, params: &UrlParams) -> Result<&Page<K>> {
        let here = self.page.as_ref().is_some_and(|page| {
            page.kind() == kind && params.iter().all(|(k, v)| page.param(k) == Some(v.as_str()))
        });
        if here {
            tracing::debug!(kind = ?kind, "staying on current page");
            return self
                .page
                .as_ref()
                .ok_or_else(|| BrowserError::State("current page vanished".to_string()));
        }
        self.go(kind, params).await
    }

    /// Collect items over a chain of pages.
    ///
    /// `extract` returns the items of a page and the URL of the next one.
    /// Stops when there is no next URL or it was already visited.
    pub async fn pagination<T, E, F>(&mut self, first_url: &str, mut extract: F) -> std::result::Result<Vec<T>, E>
    where
        F: FnMut(&Page<K>) -> std::result::Result<(Vec<T>, Option<String>), E>,
        E: From<BrowserError>,
    {
        let mut items = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(self.absurl(first_url)?);

        while let Some(url) = next.take() {
            if !visited.insert(url.clone()) {
                tracing::debug!(url = %url, "pagination loop detected, stopping");
                break;
            }
            let page = self.location(&url, RequestOptions::new()).await?;
            let (batch, following) = extract(page)?;
            items.extend(batch);
            next = following.map(|u| self.absurl(&u)).transpose()?;
        }

        Ok(items)
    }

    pub fn dump_state(&self) -> StateMap {
        self.session.dump(self.options.state_duration)
    }

    /// Restore a dumped state and go back to its URL.
    ///
    /// HTTP and resolution failures on the way back are logged and ignored;
    /// the restored cookies still apply to later requests.
    pub async fn load_state(&mut self, state: &StateMap) -> Result<()> {
        let Restored::Loaded { url } = self.session.restore(state)? else {
            return Ok(());
        };
        let Some(url) = url else {
            return Ok(());
        };

        match self.location(&url, RequestOptions::new()).await {
            Ok(_) => Ok(()),
            Err(e @ (BrowserError::Http { .. }
            | BrowserError::PageNotFound { .. }
            | BrowserError::Parse { .. }
            | BrowserError::TooManyRedirects { .. })) => {
                tracing::debug!(url = %url, error = %e, "could not return to saved location");
                self.session.url = Some(url);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Drop cookies, persisted fields, page and location.
    pub fn logout(&mut self) {
        tracing::debug!("clearing browser session");
        self.session.clear();
        self.page = None;
        self.logged = false;
    }

    /// Send `url` and walk its redirects. With `moves`, the current URL is
    /// updated at every hop.
    async fn fetch(&mut self, url: &str, options: RequestOptions, moves: bool) -> Result<HttpResponse> {
        let mut current = self.absurl(url)?;
        if !options.query.is_empty() {
            let mut parsed = parse(&current)?;
            parsed.query_pairs_mut().extend_pairs(&options.query);
            current = parsed.to_string();
        }
        self.url_allowed(&current)?;

        let mut method = options.method.unwrap_or(if options.body.is_some() {
            Method::Post
        } else {
            Method::Get
        });
        let mut body = options.body;
        let mut referrer = self.session.url.clone();
        let mut hops = 0u32;

        loop {
            if moves {
                self.session.url = Some(current.clone());
            }
            let request = self.build_request(method, &current, &options.headers, body.clone(), referrer.as_deref())?;
            let response = self.send_with_retries(request).await?;
            self.session
                .cookies
                .store(&response.url, response.header_all("set-cookie"));

            if options.no_redirects || !response.is_redirect() {
                return self.check_response(response);
            }

            hops += 1;
            if hops > self.options.max_redirects {
                return Err(BrowserError::TooManyRedirects {
                    url: url.to_string(),
                    max: self.options.max_redirects,
                });
            }

            let location = response.header("location").unwrap_or_default();
            let target = join(&current, location)?;
            if !self.options.allow_https_downgrade
                && current.starts_with("https://")
                && target.starts_with("http://")
            {
                return Err(BrowserError::HttpsDowngrade {
                    from: current,
                    to: target,
                });
            }
            self.url_allowed(&target)?;

            match (response.status, method) {
                (303, m) if m != Method::Head => {
                    method = Method::Get;
                    body = None;
                }
                (301 | 302, Method::Post) => {
                    method = Method::Get;
                    body = None;
                }
                _ => {}
            }
            tracing::debug!(status = response.status, from = %current, to = %target, "following redirect");
            referrer = Some(std::mem::replace(&mut current, target));
        }
    }

    fn build_request(
        &self,
        method: Method,
        url: &str,
        extra: &HeaderMap,
        body: Option<RequestBody>,
        referrer: Option<&str>,
    ) -> Result<HttpRequest> {
        let mut headers = HeaderMap::new();
        let (name, value) = header_pair("User-Agent", &self.options.user_agent)?;
        headers.insert(name, value);
        headers.extend(self.session.headers.clone());
        if let Some(referrer) = referrer {
            // no referrer from an https page to a plain http one
            if !(referrer.starts_with("https://") && url.starts_with("http://")) {
                let (name, value) = header_pair("Referer", referrer)?;
                headers.insert(name, value);
            }
        }
        if let Some(cookies) = self.session.cookies.header_for(url) {
            let (name, value) = header_pair("Cookie", &cookies)?;
            headers.insert(name, value);
        }
        headers.extend(extra.clone());

        Ok(HttpRequest {
            method,
            url: url.to_string(),
            headers,
            body,
        })
    }

    async fn send_with_retries(&self, request: HttpRequest) -> Result<HttpResponse> {
        let retries = if request.method.is_idempotent() {
            self.options.max_retries
        } else {
            0
        };
        let mut attempt = 0u32;

        loop {
            match self.transport.send(request.clone()).await {
                Err(e) if e.is_unavailable() && attempt < retries => {
                    attempt += 1;
                    let delay = self.options.retry_backoff * attempt;
                    tracing::warn!(
                        url = %request.url,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    fn check_response(&self, response: HttpResponse) -> Result<HttpResponse> {
        if let Some(detector) = &self.block_detector {
            if let Some(reason) = detector(&response) {
                return Err(BrowserError::ScrapingBlocked {
                    url: response.url,
                    reason,
                });
            }
        }

        match response.status {
            429 => Err(BrowserError::ScrapingBlocked {
                url: response.url,
                reason: "HTTP 429 Too Many Requests".to_string(),
            }),
            status if status >= 400 => Err(BrowserError::Http {
                status,
                body: response.text(),
                url: response.url,
            }),
            _ => Ok(response),
        }
    }
}

/// Marks a browser as navigating until dropped, including when the
/// navigation future is cancelled.
struct NavigatingGuard(Arc<AtomicBool>);

impl NavigatingGuard {
    fn enter(flag: &Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::Relaxed);
        Self(flag.clone())
    }
}

impl Drop for NavigatingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

impl<K: PageKind> fmt::Debug for Browser<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Browser")
            .field("url", &self.session.url)
            .field("page", &self.page.as_ref().map(|p| (p.route().to_string(), p.url().to_string())))
            .field("logged", &self.logged)
            .finish_non_exhaustive()
    }
}

fn parse(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| BrowserError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

fn join(base: &str, url: &str) -> Result<String> {
    parse(base)?
        .join(url)
        .map(|u| u.to_string())
        .map_err(|e| BrowserError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockResponse, MockTransport};
    use crate::resolver::PageDescriptor;
    use serde_json::json;

    const BASE: &str = "https://bank.example";

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Kind {
        Home,
        Login,
        Accounts,
        History,
    }

    fn resolver() -> Arc<PageResolver<Kind>> {
        let resolver = PageResolver::with_base(BASE)
            .page(PageDescriptor::new("home", Kind::Home, &["/"]))
            .and_then(|r| r.page(PageDescriptor::new("login", Kind::Login, &["/login"])))
            .and_then(|r| {
                r.page(
                    PageDescriptor::new("accounts", Kind::Accounts, &["/accounts"])
                        .json()
                        .logged(),
                )
            })
            .and_then(|r| {
                r.page(
                    PageDescriptor::new("history", Kind::History, &[r"/history\?page=(?P<page>\d+)"])
                        .json()
                        .logged(),
                )
            })
            .expect("valid descriptors");
        Arc::new(resolver)
    }

    fn browser(mock: &Arc<MockTransport>) -> Browser<Kind> {
        let options = BrowserOptions {
            retry_backoff: Duration::from_millis(100),
            ..BrowserOptions::default()
        }
        .persist_fields(&["token"]);
        Browser::new(resolver(), mock.clone(), options)
    }

    fn url(path: &str) -> String {
        format!("{BASE}{path}")
    }

    #[tokio::test]
    async fn test_location_moves_browser() {
        let mock = MockTransport::shared();
        mock.on_get(&url("/"), MockResponse::text("<p>home</p>"));
        mock.on_get(&url("/accounts"), MockResponse::json(&json!([])));
        let mut browser = browser(&mock);
        assert_eq!(browser.status(), BrowserStatus::Anonymous);

        browser.location("/", RequestOptions::new()).await.expect("home");
        assert_eq!(browser.status(), BrowserStatus::OnPage);
        assert!(browser.is_on(Kind::Home));
        assert_eq!(browser.url(), Some(url("/").as_str()));

        browser.go(Kind::Accounts, &UrlParams::new()).await.expect("accounts");
        assert_eq!(browser.status(), BrowserStatus::LoggedIn);

        let sent = mock.last_request().expect("request");
        assert_eq!(sent.header("referer"), Some(url("/").as_str()));
        assert!(sent.header("user-agent").is_some_and(|ua| ua.starts_with("trawl/")));
    }

    #[tokio::test]
    async fn test_unresolved_response_keeps_current_page() {
        let mock = MockTransport::shared();
        mock.on_get(&url("/"), MockResponse::text("home"));
        mock.on_get(&url("/unknown"), MockResponse::text("?"));
        let mut browser = browser(&mock);
        browser.location("/", RequestOptions::new()).await.expect("home");

        let err = browser
            .location("/unknown", RequestOptions::new())
            .await
            .expect_err("no page");
        assert!(matches!(err, BrowserError::PageNotFound { .. }));
        assert!(browser.is_on(Kind::Home));
        assert_eq!(browser.url(), Some(url("/").as_str()));
        assert_eq!(browser.status(), BrowserStatus::OnPage);
    }

    #[tokio::test]
    async fn test_post_redirect_switches_to_get_and_keeps_cookies() {
        let mock = MockTransport::shared();
        mock.on_post(
            &url("/login"),
            MockResponse::redirect(302, "/accounts").with_header("Set-Cookie", "sid=s3cr3t; Path=/"),
        );
        mock.on_get(&url("/accounts"), MockResponse::json(&json!([])));
        let mut browser = browser(&mock);

        let page = browser
            .location("/login", RequestOptions::new().form([("user", "jane")]))
            .await
            .expect("login");
        assert_eq!(page.kind(), Kind::Accounts);

        let requests = mock.requests();
        assert_eq!(requests[0].method, Method::Post);
        assert_eq!(requests[1].method, Method::Get);
        assert!(requests[1].body.is_none());
        assert_eq!(requests[1].header("cookie"), Some("sid=s3cr3t"));
    }

    #[tokio::test]
    async fn test_redirect_hops_move_current_url() {
        let mock = MockTransport::shared();
        mock.on_get(&url("/old/start"), MockResponse::redirect(302, "next"));
        mock.on_get(&url("/old/next"), MockResponse::redirect(301, "/accounts"));
        mock.on_get(&url("/accounts"), MockResponse::json(&json!([])));
        let mut browser = browser(&mock);

        browser.location("/old/start", RequestOptions::new()).await.expect("accounts");
        assert_eq!(browser.url(), Some(url("/accounts").as_str()));

        let requests = mock.requests();
        let urls: Vec<&str> = requests.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, [url("/old/start"), url("/old/next"), url("/accounts")]);
        assert_eq!(requests[0].header("referer"), None);
        assert_eq!(requests[1].header("referer"), Some(url("/old/start").as_str()));
        assert_eq!(requests[2].header("referer"), Some(url("/old/next").as_str()));
    }

    #[tokio::test]
    async fn test_failed_redirect_chain_keeps_current_url() {
        let mock = MockTransport::shared();
        mock.on_get(&url("/"), MockResponse::text("home"));
        mock.on_get(&url("/moved"), MockResponse::redirect(302, "/unknown"));
        mock.on_get(&url("/unknown"), MockResponse::text("?"));
        let mut browser = browser(&mock);
        browser.location("/", RequestOptions::new()).await.expect("home");

        let err = browser
            .location("/moved", RequestOptions::new())
            .await
            .expect_err("no page");
        assert!(matches!(err, BrowserError::PageNotFound { .. }));
        assert_eq!(browser.url(), Some(url("/").as_str()));
        assert!(browser.is_on(Kind::Home));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_navigation_is_not_left_navigating() {
        let mock = MockTransport::shared();
        mock.fail(Method::Get, &url("/"), "connection reset")
            .on_get(&url("/"), MockResponse::text("home"));
        let mut browser = browser(&mock);

        // the retry backoff outlasts the timeout, so the navigation is dropped mid-flight
        let navigation = browser.location("/", RequestOptions::new());
        assert!(tokio::time::timeout(Duration::from_millis(10), navigation)
            .await
            .is_err());
        assert_eq!(browser.status(), BrowserStatus::Anonymous);
    }

    #[tokio::test]
    async fn test_https_downgrade_is_refused() {
        let mock = MockTransport::shared();
        mock.on_get(&url("/"), MockResponse::redirect(301, "http://bank.example/"));
        let mut browser = browser(&mock);

        let err = browser
            .location("/", RequestOptions::new())
            .await
            .expect_err("downgrade");
        assert!(matches!(err, BrowserError::HttpsDowngrade { .. }));
        assert_eq!(browser.status(), BrowserStatus::Anonymous);
    }

    #[tokio::test]
    async fn test_redirect_loop_is_bounded() {
        let mock = MockTransport::shared();
        mock.on_get(&url("/"), MockResponse::redirect(302, "/"));
        let mut browser = browser(&mock);

        let err = browser
            .location("/", RequestOptions::new())
            .await
            .expect_err("loop");
        assert!(matches!(err, BrowserError::TooManyRedirects { max: 10, .. }));
        assert_eq!(mock.request_count(Method::Get, &url("/")), 11);
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let mock = MockTransport::shared();
        mock.on_get(&url("/"), MockResponse::status(429));
        mock.on_get(&url("/login"), MockResponse::status(503));
        let mut browser = browser(&mock);

        let blocked = browser.location("/", RequestOptions::new()).await.expect_err("429");
        assert!(matches!(blocked, BrowserError::ScrapingBlocked { .. }));
        let server = browser.location("/login", RequestOptions::new()).await.expect_err("503");
        assert_eq!(server.status(), Some(503));
    }

    #[tokio::test]
    async fn test_block_detector() {
        let mock = MockTransport::shared();
        mock.on_get(&url("/"), MockResponse::text("<h1>Access denied by WAF</h1>"));
        let mut browser = browser(&mock);
        browser.set_block_detector(|response| {
            response
                .text()
                .contains("WAF")
                .then(|| "web application firewall".to_string())
        });

        let err = browser.location("/", RequestOptions::new()).await.expect_err("blocked");
        assert!(matches!(err, BrowserError::ScrapingBlocked { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failures_are_retried() {
        let mock = MockTransport::shared();
        mock.fail(Method::Get, &url("/"), "connection reset")
            .fail(Method::Get, &url("/"), "connection reset")
            .on_get(&url("/"), MockResponse::text("home"));
        let mut browser = browser(&mock);

        browser.location("/", RequestOptions::new()).await.expect("third attempt");
        assert_eq!(mock.request_count(Method::Get, &url("/")), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_surface_unavailable() {
        let mock = MockTransport::shared();
        mock.fail(Method::Get, &url("/"), "timeout");
        mock.fail(Method::Post, &url("/login"), "timeout");
        let mut browser = browser(&mock);

        let err = browser.location("/", RequestOptions::new()).await.expect_err("down");
        assert!(matches!(err, BrowserError::Unavailable { .. }));
        assert_eq!(mock.request_count(Method::Get, &url("/")), 3);

        // POST is never replayed
        let err = browser
            .location("/login", RequestOptions::new().form([("a", "b")]))
            .await
            .expect_err("down");
        assert!(err.is_unavailable());
        assert_eq!(mock.request_count(Method::Post, &url("/login")), 1);
    }

    #[tokio::test]
    async fn test_stay_or_go_skips_request() {
        let mock = MockTransport::shared();
        mock.on_get(&url("/accounts"), MockResponse::json(&json!([])));
        let mut browser = browser(&mock);

        browser.stay_or_go(Kind::Accounts, &UrlParams::new()).await.expect("go");
        browser.stay_or_go(Kind::Accounts, &UrlParams::new()).await.expect("stay");
        assert_eq!(mock.request_count(Method::Get, &url("/accounts")), 1);
    }

    #[tokio::test]
    async fn test_pagination_follows_next_and_stops_on_repeat() {
        let mock = MockTransport::shared();
        mock.on_get(
            &url("/history?page=1"),
            MockResponse::json(&json!({"items": [1, 2], "next": "/history?page=2"})),
        );
        mock.on_get(
            &url("/history?page=2"),
            MockResponse::json(&json!({"items": [3], "next": "/history?page=1"})),
        );
        let mut browser = browser(&mock);

        let items: Vec<u64> = browser
            .pagination("/history?page=1", |page| {
                let items: Vec<u64> = page.json()["items"]
                    .as_array()
                    .map(|a| a.iter().filter_map(Value::as_u64).collect())
                    .unwrap_or_default();
                let next = page.json()["next"].as_str().map(ToString::to_string);
                Ok::<_, BrowserError>((items, next))
            })
            .await
            .expect("paginate");

        assert_eq!(items, vec![1, 2, 3]);
        assert_eq!(mock.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_state_round_trip_is_stable() {
        let mock = MockTransport::shared();
        mock.on_get(
            &url("/accounts"),
            MockResponse::json(&json!([])).with_header("Set-Cookie", "sid=1; Path=/"),
        );
        let mut browser = browser(&mock);
        browser.location("/accounts", RequestOptions::new()).await.expect("accounts");
        browser
            .session_mut()
            .set_field("token", json!("abc"))
            .expect("field");
        let state = browser.dump_state();

        let mut restored = self::browser(&mock);
        restored.load_state(&state).await.expect("first load");
        let first = restored.dump_state();
        restored.load_state(&state).await.expect("second load");

        assert_eq!(restored.dump_state(), first);
        assert_eq!(first, state);
        assert!(restored.is_on(Kind::Accounts));
        assert_eq!(
            mock.last_request().and_then(|r| r.header("cookie").map(ToString::to_string)),
            Some("sid=1".to_string())
        );
    }

    #[tokio::test]
    async fn test_load_state_swallows_http_errors() {
        let mock = MockTransport::shared();
        mock.on_get(&url("/accounts"), MockResponse::status(401));
        let mut browser = browser(&mock);

        let mut state = StateMap::new();
        state.insert("url".to_string(), json!(url("/accounts")));
        browser.load_state(&state).await.expect("session stays usable");
        assert!(browser.page().is_none());
        assert_eq!(browser.url(), Some(url("/accounts").as_str()));
    }

    #[tokio::test]
    async fn test_restricted_urls() {
        let mock = MockTransport::shared();
        let options = BrowserOptions::default().restrict_to(&[BASE]);
        let mut browser = Browser::new(resolver(), mock.clone(), options);

        let err = browser
            .location("https://tracker.example/pixel", RequestOptions::new())
            .await
            .expect_err("restricted");
        assert!(matches!(err, BrowserError::UrlNotAllowed { .. }));
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_logout_clears_everything() {
        let mock = MockTransport::shared();
        mock.on_get(
            &url("/accounts"),
            MockResponse::json(&json!([])).with_header("Set-Cookie", "sid=1; Path=/"),
        );
        let mut browser = browser(&mock);
        browser.location("/accounts", RequestOptions::new()).await.expect("accounts");
        browser.mark_logged(true);

        browser.logout();
        assert_eq!(browser.status(), BrowserStatus::Anonymous);
        assert!(browser.session().cookies.is_empty());
        assert!(browser.url().is_none());
    }
}
