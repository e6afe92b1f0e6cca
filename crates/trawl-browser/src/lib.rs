//! Stateful HTTP browser for scraping modules.
//!
//! Modules declare their pages once (URL templates, content kind, optional
//! `is_here` check) in a [`PageResolver`]; a [`Browser`] then navigates,
//! keeps cookies and persisted fields, and hands back typed pages.

pub mod browser;
pub mod cookies;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod page;
pub mod resolver;
pub mod state;
pub mod transport;
pub mod url;

pub use browser::{BlockDetector, Browser, BrowserOptions, BrowserStatus, RequestOptions};
pub use cookies::CookieJar;
pub use error::{BrowserError, Result};
pub use page::{ContentKind, CsvTable, Document, Page, PageKind};
pub use resolver::{PageDescriptor, PageResolver};
pub use state::{BrowserSession, Restored, StateMap};
pub use transport::{
    header_pair, header_str, HeaderMap, HeaderName, HeaderValue, HttpRequest, HttpResponse,
    HttpTransport, Method, RequestBody, ReqwestTransport,
};
pub use crate::url::{normalize_url, UrlMatcher, UrlParams, UrlPattern};
