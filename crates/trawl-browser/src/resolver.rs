//! Maps responses onto declared page kinds.

use crate::error::{BrowserError, Result};
use crate::page::{ContentKind, Document, Page, PageKind};
use crate::transport::{HttpResponse, Method};
use crate::url::{UrlMatcher, UrlParams};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Extra check run after the URL matched and the body parsed.
pub type IsHere = Arc<dyn Fn(&Document, &UrlParams) -> bool + Send + Sync>;

/// Declaration of one page kind.
pub struct PageDescriptor<K> {
    name: String,
    kind: K,
    templates: Vec<String>,
    content: ContentKind,
    is_here: Option<IsHere>,
    logged: bool,
}

impl<K: PageKind> PageDescriptor<K> {
    /// HTML page of `kind` reachable at `templates`.
    pub fn new<S: AsRef<str>>(name: &str, kind: K, templates: &[S]) -> Self {
        Self {
            name: name.to_string(),
            kind,
            templates: templates.iter().map(|t| t.as_ref().to_string()).collect(),
            content: ContentKind::Html,
            is_here: None,
            logged: false,
        }
    }

    #[must_use]
    pub fn content(mut self, content: ContentKind) -> Self {
        self.content = content;
        self
    }

    #[must_use]
    pub fn json(self) -> Self {
        self.content(ContentKind::Json)
    }

    #[must_use]
    pub fn csv(self) -> Self {
        self.content(ContentKind::Csv)
    }

    #[must_use]
    pub fn raw(self) -> Self {
        self.content(ContentKind::Raw)
    }

    /// Only reachable inside an authenticated session.
    #[must_use]
    pub fn logged(mut self) -> Self {
        self.logged = true;
        self
    }

    #[must_use]
    pub fn is_here<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Document, &UrlParams) -> bool + Send + Sync + 'static,
    {
        self.is_here = Some(Arc::new(predicate));
        self
    }
}

impl<K: fmt::Debug> fmt::Debug for PageDescriptor<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("templates", &self.templates)
            .field("content", &self.content)
            .field("is_here", &self.is_here.is_some())
            .field("logged", &self.logged)
            .finish()
    }
}

#[derive(Clone)]
struct PageSpec {
    content: ContentKind,
    is_here: Option<IsHere>,
    logged: bool,
}

/// Ordered set of page descriptors sharing one base URL.
///
/// Immutable once built; browsers of the same module share it through `Arc`.
#[derive(Clone)]
pub struct PageResolver<K> {
    matcher: UrlMatcher<K>,
    specs: HashMap<String, PageSpec>,
}

impl<K: PageKind> PageResolver<K> {
    pub fn new() -> Self {
        Self {
            matcher: UrlMatcher::new(),
            specs: HashMap::new(),
        }
    }

    pub fn with_base(base: impl Into<String>) -> Self {
        Self {
            matcher: UrlMatcher::with_base(base),
            specs: HashMap::new(),
        }
    }

    pub fn base(&self) -> Option<&str> {
        self.matcher.base()
    }

    pub fn matcher(&self) -> &UrlMatcher<K> {
        &self.matcher
    }

    /// Append a page descriptor.
    pub fn register(&mut self, descriptor: PageDescriptor<K>) -> Result<()> {
        self.matcher.register(
            &descriptor.name,
            &descriptor.templates,
            Some(descriptor.kind),
        )?;
        self.specs.insert(
            descriptor.name,
            PageSpec {
                content: descriptor.content,
                is_here: descriptor.is_here,
                logged: descriptor.logged,
            },
        );
        Ok(())
    }

    /// Builder form of [`PageResolver::register`].
    pub fn page(mut self, descriptor: PageDescriptor<K>) -> Result<Self> {
        self.register(descriptor)?;
        Ok(self)
    }

    /// Register a location that is only ever opened, never resolved.
    pub fn register_unmodeled<S: AsRef<str>>(&mut self, name: &str, templates: &[S]) -> Result<()> {
        self.matcher.register(name, templates, None).map(|_| ())
    }

    /// Build the page object for `response`.
    ///
    /// Descriptors are tried in declaration order; the first one whose pattern
    /// matches the whole URL, whose body parses and whose `is_here` accepts
    /// the document wins.
    ///
    /// # Errors
    /// [`BrowserError::Parse`] when the only matching descriptors failed to
    /// parse the body, [`BrowserError::PageNotFound`] otherwise.
    pub fn resolve(&self, response: HttpResponse) -> Result<Page<K>> {
        if response.method == Method::Head {
            return Err(BrowserError::PageNotFound { url: response.url });
        }

        let mut parse_error = None;
        for route in self.matcher.routes() {
            let Some(kind) = route.kind else { continue };
            let Some(params) = route.pattern.matches(&response.url) else {
                continue;
            };
            let Some(spec) = self.specs.get(&route.name) else {
                continue;
            };

            let document = match Document::parse(spec.content, &response.url, &response.body) {
                Ok(document) => document,
                Err(e) => {
                    tracing::debug!(route = %route.name, error = %e, "page body did not parse");
                    parse_error.get_or_insert(e);
                    continue;
                }
            };

            if let Some(is_here) = &spec.is_here {
                if !is_here(&document, &params) {
                    tracing::trace!(route = %route.name, "is_here rejected page");
                    continue;
                }
            }

            tracing::debug!(route = %route.name, kind = ?kind, url = %response.url, "resolved page");
            return Ok(Page::new(kind, &route.name, response, document, params, spec.logged));
        }

        Err(parse_error.unwrap_or(BrowserError::PageNotFound { url: response.url }))
    }

    /// URL of the first descriptor of `kind` that can be built from `params`.
    pub fn url_for(&self, kind: K, params: &UrlParams) -> Result<String> {
        let mut last_error = None;
        for route in self.matcher.routes().filter(|r| r.kind == Some(kind)) {
            match route.pattern.build(params) {
                Ok(url) => return Ok(url),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| BrowserError::UrlNotResolvable {
            params: format!("{params:?}"),
            available: format!("no page of kind {kind:?}"),
        }))
    }

    /// URL of the route called `name`, modelled or not.
    pub fn url_for_route(&self, name: &str, params: &UrlParams) -> Result<String> {
        self.matcher.build(name, params)
    }
}

impl<K: PageKind> Default for PageResolver<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: fmt::Debug> fmt::Debug for PageResolver<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageResolver")
            .field("matcher", &self.matcher)
            .field("pages", &self.specs.len())
            .finish()
    }
}
