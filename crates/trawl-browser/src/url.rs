//! Declarative URL patterns.
//!
//! A [`UrlPattern`] is an ordered list of regex templates. Matching is always
//! against the entire URL and stops at the first template that matches.
//! Building goes the other way: each template is turned into a literal
//! template with `{name}` placeholders in place of its named groups, and the
//! first template whose placeholders are exactly the supplied parameters is
//! filled in.
//!
//! Relative templates (no `scheme://` prefix) are joined to the pattern's base
//! URL, both when matching and when building.

use crate::error::{BrowserError, Result};
use crate::page::PageKind;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;
use url::Url;

/// Named parameters captured from, or substituted into, a URL.
pub type UrlParams = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Param(String),
}

#[derive(Debug, Clone)]
struct Template {
    source: String,
    regex: Regex,
    /// `None` when the regex uses constructs with no single literal expansion.
    build: Option<Vec<Part>>,
}

impl Template {
    fn compile(source: &str, base: Option<&str>) -> Result<Self> {
        let body = strip_anchors(source);
        let joined = match base {
            Some(base) if !is_absolute(body) => format!(
                "{}/{}",
                regex::escape(base.trim_end_matches('/')),
                body.trim_start_matches('/')
            ),
            _ => body.to_string(),
        };

        let regex = Regex::new(&format!("^(?:{joined})$")).map_err(|e| {
            BrowserError::InvalidPattern {
                pattern: source.to_string(),
                reason: e.to_string(),
            }
        })?;

        // a named group the expansion dropped (inside an optional group) has
        // no single literal form: such a template only matches
        let build = derive_build_template(body).filter(|parts| {
            let declared: BTreeSet<&str> = regex.capture_names().flatten().collect();
            let placeholders: BTreeSet<&str> = parts
                .iter()
                .filter_map(|p| match p {
                    Part::Param(name) => Some(name.as_str()),
                    Part::Literal(_) => None,
                })
                .collect();
            declared == placeholders
        });
        if build.is_none() {
            tracing::trace!(template = source, "template is match-only");
        }

        Ok(Self {
            source: source.to_string(),
            regex,
            build,
        })
    }

    fn placeholders(&self) -> Option<BTreeSet<&str>> {
        self.build.as_ref().map(|parts| {
            parts
                .iter()
                .filter_map(|p| match p {
                    Part::Param(name) => Some(name.as_str()),
                    Part::Literal(_) => None,
                })
                .collect()
        })
    }

    fn fill(&self, params: &UrlParams) -> Option<String> {
        let parts = self.build.as_ref()?;
        let mut out = String::new();
        for part in parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Param(name) => out.push_str(params.get(name)?),
            }
        }
        Some(out)
    }
}

/// Ordered regex templates addressing one logical location.
#[derive(Debug, Clone)]
pub struct UrlPattern {
    templates: Vec<Template>,
    base: Option<String>,
}

impl UrlPattern {
    /// Compile templates with no base URL; relative templates then match
    /// relative URLs only.
    ///
    /// # Errors
    /// [`BrowserError::InvalidPattern`] if a template does not compile.
    /// Templates with no literal expansion still match but never build.
    pub fn new<S: AsRef<str>>(templates: &[S]) -> Result<Self> {
        Self::compile(templates, None)
    }

    /// Compile templates, joining relative ones to `base`.
    pub fn with_base<S: AsRef<str>>(templates: &[S], base: &str) -> Result<Self> {
        Self::compile(templates, Some(base))
    }

    fn compile<S: AsRef<str>>(templates: &[S], base: Option<&str>) -> Result<Self> {
        if templates.is_empty() {
            return Err(BrowserError::InvalidPattern {
                pattern: String::new(),
                reason: "a URL pattern needs at least one template".to_string(),
            });
        }

        let templates = templates
            .iter()
            .map(|t| Template::compile(t.as_ref(), base))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            templates,
            base: base.map(ToString::to_string),
        })
    }

    /// Source templates in declaration order.
    pub fn templates(&self) -> impl Iterator<Item = &str> {
        self.templates.iter().map(|t| t.source.as_str())
    }

    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    /// Match `url` in full against the templates, in order.
    ///
    /// Returns the named groups of the first matching template.
    pub fn matches(&self, url: &str) -> Option<UrlParams> {
        self.templates.iter().find_map(|template| {
            let captures = template.regex.captures(url)?;
            Some(
                template
                    .regex
                    .capture_names()
                    .flatten()
                    .filter_map(|name| {
                        captures
                            .name(name)
                            .map(|m| (name.to_string(), m.as_str().to_string()))
                    })
                    .collect(),
            )
        })
    }

    pub fn is_match(&self, url: &str) -> bool {
        self.templates.iter().any(|t| t.regex.is_match(url))
    }

    /// Build a URL from the first template declaring exactly `params`.
    ///
    /// # Errors
    /// [`BrowserError::UrlNotResolvable`] if no template fits.
    pub fn build(&self, params: &UrlParams) -> Result<String> {
        let supplied: BTreeSet<&str> = params.keys().map(String::as_str).collect();

        for template in &self.templates {
            if template.placeholders().as_ref() != Some(&supplied) {
                continue;
            }
            if let Some(path) = template.fill(params) {
                return Ok(self.absolutize(&path));
            }
        }

        Err(BrowserError::UrlNotResolvable {
            params: format!("{params:?}"),
            available: self
                .templates
                .iter()
                .map(|t| t.source.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    /// Build a URL and append `query` as an urlencoded query string.
    pub fn build_with_query(&self, params: &UrlParams, query: &[(&str, &str)]) -> Result<String> {
        let url = self.build(params)?;
        if query.is_empty() {
            return Ok(url);
        }

        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(query)
            .finish();
        let separator = if url.contains('?') { '&' } else { '?' };
        Ok(format!("{url}{separator}{encoded}"))
    }

    fn absolutize(&self, path: &str) -> String {
        match &self.base {
            Some(base) if !is_absolute(path) => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                path.trim_start_matches('/')
            ),
            _ => path.to_string(),
        }
    }
}

/// A pattern registered in a [`UrlMatcher`].
#[derive(Debug, Clone)]
pub struct Route<K> {
    pub name: String,
    pub pattern: UrlPattern,
    /// `None` for locations that are visited but never modelled as a page.
    pub kind: Option<K>,
}

/// Result of [`UrlMatcher::match_url`].
#[derive(Debug)]
pub struct RouteMatch<'a, K> {
    pub route: &'a Route<K>,
    pub params: UrlParams,
}

/// Ordered registry of URL patterns.
///
/// Ties are broken by registration order: the first pattern that matches the
/// entire URL wins, never the "best" one.
#[derive(Debug, Clone)]
pub struct UrlMatcher<K> {
    base: Option<String>,
    routes: Vec<Route<K>>,
}

impl<K: PageKind> UrlMatcher<K> {
    pub fn new() -> Self {
        Self {
            base: None,
            routes: Vec::new(),
        }
    }

    /// Registry whose relative templates are joined to `base`.
    pub fn with_base(base: impl Into<String>) -> Self {
        Self {
            base: Some(base.into()),
            routes: Vec::new(),
        }
    }

    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    /// Compile and append a pattern.
    ///
    /// # Errors
    /// [`BrowserError::InvalidPattern`] on a bad template or a duplicate name.
    pub fn register<S: AsRef<str>>(
        &mut self,
        name: &str,
        templates: &[S],
        kind: Option<K>,
    ) -> Result<&Route<K>> {
        if self.route(name).is_some() {
            return Err(BrowserError::InvalidPattern {
                pattern: name.to_string(),
                reason: "a route with this name is already registered".to_string(),
            });
        }

        let pattern = UrlPattern::compile(templates, self.base.as_deref())?;
        tracing::trace!(route = name, kind = ?kind, "registered URL pattern");
        self.routes.push(Route {
            name: name.to_string(),
            pattern,
            kind,
        });
        let index = self.routes.len() - 1;
        Ok(&self.routes[index])
    }

    pub fn route(&self, name: &str) -> Option<&Route<K>> {
        self.routes.iter().find(|r| r.name == name)
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route<K>> {
        self.routes.iter()
    }

    /// First route, in registration order, matching the entire URL.
    pub fn match_url(&self, url: &str) -> Option<RouteMatch<'_, K>> {
        self.routes.iter().find_map(|route| {
            route
                .pattern
                .matches(url)
                .map(|params| RouteMatch { route, params })
        })
    }

    /// Build the URL of the route called `name`.
    pub fn build(&self, name: &str, params: &UrlParams) -> Result<String> {
        self.route(name)
            .ok_or_else(|| BrowserError::UrlNotResolvable {
                params: format!("{params:?}"),
                available: format!("no route named '{name}'"),
            })?
            .pattern
            .build(params)
    }
}

impl<K: PageKind> Default for UrlMatcher<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Canonical form of an absolute URL: lowercase host without trailing dot,
/// no default port.
pub fn normalize_url(url: &str) -> Result<String> {
    let mut parsed = Url::parse(url).map_err(|e| BrowserError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    if let Some(host) = parsed.host_str() {
        let trimmed = host.trim_end_matches('.').to_ascii_lowercase();
        if trimmed != host {
            parsed
                .set_host(Some(&trimmed))
                .map_err(|e| BrowserError::InvalidUrl {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
        }
    }

    Ok(parsed.to_string())
}

fn is_absolute(template: &str) -> bool {
    static ABSOLUTE: OnceLock<Regex> = OnceLock::new();
    ABSOLUTE
        .get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-?]*://").expect("valid regex"))
        .is_match(template)
}

fn strip_anchors(template: &str) -> &str {
    let body = template.strip_prefix('^').unwrap_or(template);
    match body.strip_suffix('$') {
        Some(stripped) if !stripped.ends_with('\\') => stripped,
        _ => body,
    }
}

/// Literal expansion of a regex template, or `None` if it is ambiguous.
///
/// Named groups become placeholders, escaped characters become literals,
/// `?`/`*` quantifiers drop what they apply to and `+` keeps one occurrence.
/// Character classes, alternations and counted repetitions are ambiguous.
fn derive_build_template(body: &str) -> Option<Vec<Part>> {
    let chars: Vec<char> = body.chars().collect();
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                let next = *chars.get(i + 1)?;
                if next.is_ascii_alphanumeric() {
                    return None;
                }
                literal.push(next);
                i += 2;
            }
            '(' => {
                let end = group_end(&chars, i)?;
                let quantifier = chars.get(end + 1).copied();
                if let Some(name) = group_name(&chars[i..=end]) {
                    if matches!(quantifier, Some('?' | '*' | '+' | '{')) {
                        return None;
                    }
                    if !literal.is_empty() {
                        parts.push(Part::Literal(std::mem::take(&mut literal)));
                    }
                    parts.push(Part::Param(name));
                    i = end + 1;
                } else if matches!(quantifier, Some('?' | '*')) {
                    i = end + 2;
                } else {
                    return None;
                }
            }
            '?' | '*' => {
                literal.pop()?;
                i += 1;
            }
            '+' => {
                if literal.is_empty() {
                    return None;
                }
                i += 1;
            }
            '[' | ']' | '{' | '}' | '|' | ')' | '^' | '$' => return None,
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }

    if !literal.is_empty() {
        parts.push(Part::Literal(literal));
    }
    Some(parts)
}

/// Index of the `)` closing the group opened at `start`.
fn group_end(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_class = false;
    let mut i = start;

    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            '(' if !in_class => depth += 1,
            ')' if !in_class => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn group_name(group: &[char]) -> Option<String> {
    let text: String = group.iter().collect();
    let rest = text
        .strip_prefix("(?P<")
        .or_else(|| text.strip_prefix("(?<"))?;
    let end = rest.find('>')?;
    Some(rest[..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Kind {
        Account,
        Accounts,
    }

    fn params(pairs: &[(&str, &str)]) -> UrlParams {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_account_pattern_round_trip() {
        let pattern = UrlPattern::new(&[r"/account/(?P<id>\d+)"]).expect("compile");
        let url = pattern.build(&params(&[("id", "42")])).expect("build");
        assert_eq!(url, "/account/42");
        assert_eq!(pattern.matches("/account/42"), Some(params(&[("id", "42")])));
    }

    #[test]
    fn test_match_is_full_string() {
        let pattern = UrlPattern::new(&[r"/account/(?P<id>\d+)"]).expect("compile");
        assert!(pattern.matches("/account/42/history").is_none());
        assert!(pattern.matches("/prefix/account/42").is_none());
        assert!(pattern.matches("/account/abc").is_none());
    }

    #[test]
    fn test_relative_templates_join_base() {
        let pattern = UrlPattern::with_base(&[r"/accounts/(?P<id>\w+)/history"], "https://bank.example/")
            .expect("compile");
        let url = pattern.build(&params(&[("id", "CC-1")])).expect("build");
        assert_eq!(url, "https://bank.example/accounts/CC-1/history");
        assert_eq!(pattern.matches(&url), Some(params(&[("id", "CC-1")])));
        assert!(pattern.matches("https://evil.example/accounts/CC-1/history").is_none());
    }

    #[test]
    fn test_absolute_template_ignores_base() {
        let pattern = UrlPattern::with_base(&[r"https://auth\.example/login"], "https://bank.example")
            .expect("compile");
        assert!(pattern.is_match("https://auth.example/login"));
        assert_eq!(
            pattern.build(&UrlParams::new()).expect("build"),
            "https://auth.example/login"
        );
    }

    #[test]
    fn test_build_picks_template_with_exact_params() {
        let pattern = UrlPattern::new(&[
            r"/history\?account=(?P<account>\d+)&page=(?P<page>\d+)",
            r"/history\?account=(?P<account>\d+)",
            r"/history",
        ])
        .expect("compile");

        assert_eq!(pattern.build(&UrlParams::new()).expect("build"), "/history");
        assert_eq!(
            pattern.build(&params(&[("account", "7")])).expect("build"),
            "/history?account=7"
        );
        assert_eq!(
            pattern
                .build(&params(&[("account", "7"), ("page", "2")]))
                .expect("build"),
            "/history?account=7&page=2"
        );
    }

    #[test]
    fn test_build_rejects_unknown_params() {
        let pattern = UrlPattern::new(&[r"/account/(?P<id>\d+)"]).expect("compile");
        let err = pattern
            .build(&params(&[("id", "1"), ("extra", "x")]))
            .expect_err("extra param must not resolve");
        assert!(matches!(err, BrowserError::UrlNotResolvable { .. }));
        assert!(pattern.build(&UrlParams::new()).is_err());
    }

    #[test]
    fn test_optional_suffix_is_dropped_when_building() {
        let pattern = UrlPattern::new(&[r"/accounts(\?.*)?", r"/login/?"]).expect("compile");
        assert_eq!(pattern.build(&UrlParams::new()).expect("build"), "/accounts");
        assert!(pattern.is_match("/accounts?sort=asc"));
        assert!(pattern.is_match("/login/"));
    }

    #[test]
    fn test_ambiguous_template_is_skipped() {
        let pattern = UrlPattern::new(&[r"/(en|fr)/home", r"/home"]).expect("compile");
        assert_eq!(pattern.build(&UrlParams::new()).expect("build"), "/home");
        assert!(pattern.is_match("/fr/home"));
    }

    #[test]
    fn test_named_group_in_optional_group_is_match_only() {
        let pattern = UrlPattern::new(&[r"/history(/(?P<page>\d+))?"]).expect("compile");
        assert_eq!(pattern.matches("/history/3"), Some(params(&[("page", "3")])));
        assert!(pattern.is_match("/history"));

        let err = pattern
            .build(&params(&[("page", "3")]))
            .expect_err("no buildable template");
        assert!(matches!(err, BrowserError::UrlNotResolvable { .. }));

        let pattern = UrlPattern::new(&[r"/history(/(?P<page>\d+))?", r"/history/(?P<page>\d+)"])
            .expect("compile");
        assert_eq!(pattern.build(&params(&[("page", "3")])).expect("build"), "/history/3");
    }

    #[test]
    fn test_build_with_query() {
        let pattern = UrlPattern::with_base(&["/search"], "https://bank.example").expect("compile");
        let url = pattern
            .build_with_query(&UrlParams::new(), &[("q", "rent & bills")])
            .expect("build");
        assert_eq!(url, "https://bank.example/search?q=rent+%26+bills");
    }

    #[test]
    fn test_invalid_regex_is_rejected() {
        let err = UrlPattern::new(&[r"/account/(?P<id>\d+"]).expect_err("unbalanced group");
        assert!(matches!(err, BrowserError::InvalidPattern { .. }));
        assert!(UrlPattern::new::<&str>(&[]).is_err());
    }

    #[test]
    fn test_matcher_first_registered_wins() {
        let mut matcher = UrlMatcher::with_base("https://bank.example");
        matcher
            .register("account", &[r"/accounts/(?P<id>\d+)"], Some(Kind::Account))
            .expect("register");
        matcher
            .register("accounts", &[r"/accounts/.*"], Some(Kind::Accounts))
            .expect("register");

        let found = matcher
            .match_url("https://bank.example/accounts/12")
            .expect("match");
        assert_eq!(found.route.name, "account");
        assert_eq!(found.route.kind, Some(Kind::Account));
        assert_eq!(found.params, params(&[("id", "12")]));

        let found = matcher
            .match_url("https://bank.example/accounts/all")
            .expect("match");
        assert_eq!(found.route.kind, Some(Kind::Accounts));
        assert!(matcher.match_url("https://bank.example/other").is_none());
    }

    #[test]
    fn test_matcher_rejects_duplicate_names() {
        let mut matcher: UrlMatcher<Kind> = UrlMatcher::new();
        matcher.register("home", &["/"], None).expect("register");
        assert!(matcher.register("home", &["/index"], None).is_err());
        assert_eq!(matcher.build("home", &UrlParams::new()).expect("build"), "/");
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url("HTTPS://Bank.Example.:443/Path?x=1").expect("normalize"),
            "https://bank.example/Path?x=1"
        );
        assert_eq!(
            normalize_url("http://bank.example:8080/").expect("normalize"),
            "http://bank.example:8080/"
        );
        assert!(normalize_url("not a url").is_err());
    }
}
