//! Pages and their parsed documents.
//!
//! A [`Page`] wraps exactly one fetched response. Its body is parsed according
//! to the content kind declared by the matching page descriptor.

use crate::error::{BrowserError, Result};
use crate::transport::{header_str, HeaderMap, HttpResponse};
use crate::url::UrlParams;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;
use std::hash::Hash;

/// Marker for the page-role enums modules declare.
///
/// Implemented for every small `Copy` enum that can be hashed and shared
/// between tasks.
pub trait PageKind: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

impl<T> PageKind for T where T: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

/// How a page body is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    #[default]
    Html,
    Json,
    Raw,
    /// Comma separated values with an optional header row
    Csv,
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Html => "HTML",
            Self::Json => "JSON",
            Self::Raw => "raw",
            Self::Csv => "CSV",
        })
    }
}

/// Parsed page body.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    /// HTML source; parsed into a DOM on demand because the DOM is not `Send`.
    Html(String),
    Json(Value),
    Raw(Vec<u8>),
    Csv(CsvTable),
}

impl Document {
    /// Parse `body` fetched from `url` as `kind`.
    ///
    /// # Errors
    /// [`BrowserError::Parse`] on invalid UTF-8 for text kinds, malformed JSON
    /// or an unterminated CSV quote.
    pub fn parse(kind: ContentKind, url: &str, body: &[u8]) -> Result<Self> {
        let parse_error = |reason: String| BrowserError::Parse {
            url: url.to_string(),
            kind,
            reason,
        };

        match kind {
            ContentKind::Raw => Ok(Self::Raw(body.to_vec())),
            ContentKind::Json => serde_json::from_slice(body)
                .map(Self::Json)
                .map_err(|e| parse_error(e.to_string())),
            ContentKind::Html => std::str::from_utf8(body)
                .map(|text| Self::Html(text.to_string()))
                .map_err(|e| parse_error(e.to_string())),
            ContentKind::Csv => {
                let text = std::str::from_utf8(body).map_err(|e| parse_error(e.to_string()))?;
                CsvTable::parse(text, ',').map(Self::Csv).map_err(parse_error)
            }
        }
    }

    pub fn content_kind(&self) -> ContentKind {
        match self {
            Self::Html(_) => ContentKind::Html,
            Self::Json(_) => ContentKind::Json,
            Self::Raw(_) => ContentKind::Raw,
            Self::Csv(_) => ContentKind::Csv,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_csv(&self) -> Option<&CsvTable> {
        match self {
            Self::Csv(table) => Some(table),
            _ => None,
        }
    }

    /// Parse the HTML source into a DOM.
    pub fn html(&self) -> Option<scraper::Html> {
        match self {
            Self::Html(source) => Some(scraper::Html::parse_document(source)),
            _ => None,
        }
    }

    /// Trimmed text of every element matching a CSS selector.
    ///
    /// Returns an empty list for non-HTML documents.
    pub fn select_text(&self, selector: &str) -> Result<Vec<String>> {
        let Some(html) = self.html() else {
            return Ok(Vec::new());
        };
        let selector =
            scraper::Selector::parse(selector).map_err(|e| BrowserError::InvalidPattern {
                pattern: selector.to_string(),
                reason: e.to_string(),
            })?;

        Ok(html
            .select(&selector)
            .map(|element| element.text().collect::<String>().trim().to_string())
            .collect())
    }
}

/// Rows of a CSV document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvTable {
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    /// Parse separated values (quotes and CRLF tolerant).
    ///
    /// Blank lines are skipped. An unterminated quoted field is an error.
    pub fn parse(text: &str, sep: char) -> std::result::Result<Self, String> {
        let mut rows = Vec::new();
        let mut row = Vec::new();
        let mut field = String::new();
        let mut in_quotes = false;
        let mut chars = text.chars().peekable();

        while let Some(ch) = chars.next() {
            match ch {
                '"' if in_quotes => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                '"' if field.is_empty() => in_quotes = true,
                c if c == sep && !in_quotes => row.push(std::mem::take(&mut field)),
                '\n' | '\r' if !in_quotes => {
                    if ch == '\r' && chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    row.push(std::mem::take(&mut field));
                    if row.len() == 1 && row[0].is_empty() {
                        row.clear();
                    } else {
                        rows.push(std::mem::take(&mut row));
                    }
                }
                c => field.push(c),
            }
        }

        if in_quotes {
            return Err("unterminated quoted field".to_string());
        }
        if !field.is_empty() || !row.is_empty() {
            row.push(field);
            rows.push(row);
        }

        Ok(Self { rows })
    }

    /// First row, taken as column names.
    pub fn header(&self) -> Option<&[String]> {
        self.rows.first().map(Vec::as_slice)
    }

    /// Rows after the header.
    pub fn records(&self) -> &[Vec<String>] {
        self.rows.get(1..).unwrap_or(&[])
    }

    /// Value of `column` in `record`, looked up through the header.
    pub fn get<'a>(&self, record: &'a [String], column: &str) -> Option<&'a str> {
        let index = self.header()?.iter().position(|h| h == column)?;
        record.get(index).map(String::as_str)
    }
}

/// One fetched response, bound to the page kind that claimed it.
#[derive(Debug, Clone)]
pub struct Page<K> {
    kind: K,
    route: String,
    url: String,
    status: u16,
    headers: HeaderMap,
    body: Vec<u8>,
    document: Document,
    params: UrlParams,
    logged: bool,
}

impl<K: Copy> Page<K> {
    pub(crate) fn new(
        kind: K,
        route: &str,
        response: HttpResponse,
        document: Document,
        params: UrlParams,
        logged: bool,
    ) -> Self {
        Self {
            kind,
            route: route.to_string(),
            url: response.url,
            status: response.status,
            headers: response.headers,
            body: response.body,
            document,
            params,
            logged,
        }
    }

    pub fn kind(&self) -> K {
        self.kind
    }

    /// Name of the route that matched.
    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header_str(&self.headers, name)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn doc(&self) -> &Document {
        &self.document
    }

    /// JSON document, or `Null` for other content kinds.
    pub fn json(&self) -> &Value {
        static NULL: Value = Value::Null;
        self.document.as_json().unwrap_or(&NULL)
    }

    /// Named groups captured from the URL.
    pub fn params(&self) -> &UrlParams {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Whether this page only exists inside an authenticated session.
    pub fn is_logged(&self) -> bool {
        self.logged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_json() {
        let doc = Document::parse(ContentKind::Json, "https://x/api", br#"{"ok": true}"#)
            .expect("parse json");
        assert_eq!(doc.as_json(), Some(&json!({"ok": true})));
        assert_eq!(doc.content_kind(), ContentKind::Json);
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let err = Document::parse(ContentKind::Json, "https://x/api", b"{not json")
            .expect_err("malformed json");
        assert!(matches!(
            err,
            BrowserError::Parse {
                kind: ContentKind::Json,
                ..
            }
        ));
    }

    #[test]
    fn test_html_requires_utf8() {
        assert!(Document::parse(ContentKind::Html, "https://x/", &[0xff, 0xfe]).is_err());
        assert!(Document::parse(ContentKind::Raw, "https://x/", &[0xff, 0xfe]).is_ok());
    }

    #[test]
    fn test_select_text() {
        let doc = Document::parse(
            ContentKind::Html,
            "https://x/",
            b"<ul><li class='acc'> Checking </li><li class='acc'>Savings</li></ul>",
        )
        .expect("parse html");
        assert_eq!(
            doc.select_text("li.acc").expect("select"),
            vec!["Checking".to_string(), "Savings".to_string()]
        );
        assert!(doc.select_text("li[").is_err());
    }

    #[test]
    fn test_csv_parse() {
        let table = CsvTable::parse("date,label,amount\r\n2024-01-02,\"Rent, March\",-800\n\n2024-01-03,\"Say \"\"hi\"\"\",5", ',')
            .expect("parse csv");
        assert_eq!(table.header().map(<[String]>::len), Some(3));
        assert_eq!(table.records().len(), 2);
        assert_eq!(table.get(&table.records()[0], "label"), Some("Rent, March"));
        assert_eq!(table.get(&table.records()[1], "label"), Some("Say \"hi\""));
        assert_eq!(table.get(&table.records()[1], "missing"), None);
    }

    #[test]
    fn test_csv_unterminated_quote() {
        let err = Document::parse(ContentKind::Csv, "https://x/export.csv", b"a,\"b\n")
            .expect_err("unterminated quote");
        assert!(matches!(err, BrowserError::Parse { kind: ContentKind::Csv, .. }));
    }
}
