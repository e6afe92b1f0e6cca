//! In-memory transport for tests.
//!
//! Replies are queued per `(method, url)`; the last queued reply of a route is
//! repeated once the queue is drained. Unknown URLs answer `404`.

use crate::error::{BrowserError, Result};
use crate::transport::{header_pair, HeaderMap, HttpRequest, HttpResponse, HttpTransport, Method};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

type Handler = Arc<dyn Fn(&HttpRequest) -> MockResponse + Send + Sync>;

/// Canned response.
#[derive(Debug, Clone, PartialEq)]
pub struct MockResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl MockResponse {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self::status(200)
            .with_header("Content-Type", "text/html; charset=utf-8")
            .with_body(body.into().into_bytes())
    }

    pub fn json(value: &Value) -> Self {
        Self::status(200)
            .with_header("Content-Type", "application/json")
            .with_body(value.to_string().into_bytes())
    }

    pub fn redirect(status: u16, location: &str) -> Self {
        Self::status(status).with_header("Location", location)
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Add a header value, keeping earlier values of the same name.
    ///
    /// # Panics
    /// On a header name or value that is not valid HTTP.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        let (name, value) = header_pair(name, value).expect("valid mock header");
        self.headers.append(name, value);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }
}

#[derive(Clone)]
enum Reply {
    Response(MockResponse),
    Handler(Handler),
    Fail(String),
}

struct Route {
    method: Method,
    url: String,
    replies: VecDeque<Reply>,
}

#[derive(Default)]
struct Inner {
    routes: Vec<Route>,
    requests: Vec<HttpRequest>,
}

/// [`HttpTransport`] answering from queued replies and recording every request.
#[derive(Default)]
pub struct MockTransport {
    inner: Mutex<Inner>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle, ready to pass to a browser.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // a panicking test thread must not hide the recorded requests
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn push(&self, method: Method, url: &str, reply: Reply) {
        let mut inner = self.lock();
        if let Some(route) = inner
            .routes
            .iter_mut()
            .find(|r| r.method == method && r.url == url)
        {
            route.replies.push_back(reply);
            return;
        }
        inner.routes.push(Route {
            method,
            url: url.to_string(),
            replies: VecDeque::from([reply]),
        });
    }

    pub fn on(&self, method: Method, url: &str, response: MockResponse) -> &Self {
        self.push(method, url, Reply::Response(response));
        self
    }

    pub fn on_get(&self, url: &str, response: MockResponse) -> &Self {
        self.on(Method::Get, url, response)
    }

    pub fn on_post(&self, url: &str, response: MockResponse) -> &Self {
        self.on(Method::Post, url, response)
    }

    /// Compute the reply from the request.
    pub fn on_request<F>(&self, method: Method, url: &str, handler: F) -> &Self
    where
        F: Fn(&HttpRequest) -> MockResponse + Send + Sync + 'static,
    {
        self.push(method, url, Reply::Handler(Arc::new(handler)));
        self
    }

    /// Fail the request as a network error.
    pub fn fail(&self, method: Method, url: &str, reason: &str) -> &Self {
        self.push(method, url, Reply::Fail(reason.to_string()));
        self
    }

    /// Every request sent so far, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.lock().requests.clone()
    }

    pub fn request_count(&self, method: Method, url: &str) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.method == method && r.url == url)
            .count()
    }

    pub fn last_request(&self) -> Option<HttpRequest> {
        self.lock().requests.last().cloned()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let reply = {
            let mut inner = self.lock();
            inner.requests.push(request.clone());
            inner
                .routes
                .iter_mut()
                .find(|r| r.method == request.method && r.url == request.url)
                .and_then(|route| {
                    if route.replies.len() > 1 {
                        route.replies.pop_front()
                    } else {
                        route.replies.front().cloned()
                    }
                })
        };

        let response = match reply {
            Some(Reply::Response(response)) => response,
            Some(Reply::Handler(handler)) => handler(&request),
            Some(Reply::Fail(reason)) => {
                return Err(BrowserError::Unavailable {
                    url: request.url,
                    reason,
                })
            }
            None => MockResponse::status(404).with_body(b"not mocked".to_vec()),
        };

        Ok(HttpResponse {
            url: request.url,
            method: request.method,
            status: response.status,
            headers: response.headers,
            body: response.body,
        })
    }
}
