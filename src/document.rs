//! Fetched pages.

use scraper::{Html, Selector};

use crate::error::{Error, Result};
use crate::transport::FetchResponse;

/// A successfully fetched page.
///
/// The raw body is kept so the document can move between tasks; the
/// parsed tree from [`Document::html`] cannot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl Document {
    pub fn html(&self) -> Html {
        Html::parse_document(&self.body)
    }

    /// Trimmed text of every element matching `css`, in document order.
    pub fn select_text(&self, css: &str) -> Result<Vec<String>> {
        let selector =
            Selector::parse(css).map_err(|e| Error::InvalidSelector(format!("{}: {}", css, e)))?;
        let html = self.html();
        Ok(html
            .select(&selector)
            .map(|element| element.text().collect::<String>().trim().to_string())
            .collect())
    }

    pub fn title(&self) -> Option<String> {
        self.select_text("title")
            .ok()
            .and_then(|titles| titles.into_iter().next())
            .filter(|t| !t.is_empty())
    }
}

impl From<FetchResponse> for Document {
    fn from(response: FetchResponse) -> Self {
        Self {
            url: response.url,
            status: response.status,
            body: response.body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(body: &str) -> Document {
        Document {
            url: "http://target.test/".into(),
            status: 200,
            body: body.into(),
        }
    }

    #[test]
    fn test_select_text() {
        let doc = page(
            r#"<html><head><title> Offers </title></head>
            <body><a class="offer">  First </a><a class="offer">Second</a></body></html>"#,
        );
        assert_eq!(doc.select_text("a.offer").unwrap(), vec!["First", "Second"]);
        assert_eq!(doc.title().as_deref(), Some("Offers"));
    }

    #[test]
    fn test_invalid_selector_is_an_error() {
        let doc = page("<p>x</p>");
        assert!(matches!(
            doc.select_text("a[").unwrap_err(),
            Error::InvalidSelector(_)
        ));
    }

    #[test]
    fn test_missing_title() {
        assert_eq!(page("<p>no title</p>").title(), None);
    }
}
