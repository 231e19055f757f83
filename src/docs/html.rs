//! Link collection and text extraction from documentation pages.

use std::collections::HashSet;

use regex::Regex;
use scraper::node::Element;
use scraper::{Html, Node, Selector};
use serde::Serialize;
use url::Url;

/// Extracted page text plus where it came from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub page_content: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentMetadata {
    pub source: String,
    /// Trimmed text of every `h1` and `h2`, in document order
    pub headers: Vec<String>,
}

/// Links on `html` that look like further documentation pages.
///
/// Keeps absolute links on the same host as `base` that carry no query or
/// fragment and do not point at an asset. Order is first-seen, without
/// duplicates.
pub fn collect_doc_links(html: &str, base: &Url) -> Vec<String> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let Ok(asset) = Regex::new(r"(?i)\.(png|jpg|jpeg|svg|webp|pdf|zip|js|css)$") else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let domain = base.host_str();
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for anchor in document.select(&selector) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Ok(full) = base.join(href) else {
            continue;
        };

        if full.host_str() != domain
            || full.query().is_some_and(|q| !q.is_empty())
            || full.fragment().is_some_and(|f| !f.is_empty())
            || asset.is_match(full.path())
        {
            continue;
        }

        let link = full.to_string();
        if seen.insert(link.clone()) {
            urls.push(link);
        }
    }

    urls
}

fn is_excluded(element: &Element) -> bool {
    match element.name() {
        "script" | "style" | "noscript" | "template" | "svg" | "head" | "meta" => true,
        "link" => element
            .attr("rel")
            .is_some_and(|rel| rel.split_whitespace().any(|t| t.eq_ignore_ascii_case("stylesheet"))),
        _ => false,
    }
}

/// Headers and visible body text of a page
pub fn extract_document(html: &str, source: &str) -> Document {
    let document = Html::parse_document(html);

    let headers = match Selector::parse("h1, h2") {
        Ok(selector) => document
            .select(&selector)
            .map(|h| h.text().collect::<String>().trim().to_string())
            .collect(),
        Err(_) => Vec::new(),
    };

    let mut page_content = String::new();
    let body = Selector::parse("body")
        .ok()
        .and_then(|selector| document.select(&selector).next());

    if let Some(body) = body {
        for node in body.descendants() {
            let Node::Text(text) = node.value() else {
                continue;
            };
            let hidden = node
                .ancestors()
                .take_while(|ancestor| ancestor.id() != body.id())
                .any(|ancestor| matches!(ancestor.value(), Node::Element(e) if is_excluded(e)));
            if !hidden {
                page_content.push_str(&text.text);
            }
        }
    }

    Document {
        page_content,
        metadata: DocumentMetadata {
            source: source.to_string(),
            headers,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Docs</title><style>body { color: red; }</style></head>
<body>
  <h1> Getting Started </h1>
  <p>Install the package.</p>
  <script>console.log("hidden")</script>
  <noscript>Enable JavaScript</noscript>
  <h2>API</h2>
  <svg><text>icon</text></svg>
  <a href="/docs/intro">Intro</a>
  <a href="/docs/intro">Intro again</a>
  <a href="https://docs.example.com/docs/api">API</a>
  <a href="/docs/search?q=1">Search</a>
  <a href="/docs/api#section">Anchor</a>
  <a href="/logo.PNG">Logo</a>
  <a href="/bundle.js">Bundle</a>
  <a href="https://other.example.org/docs">Elsewhere</a>
  <a href="mailto:team@example.com">Mail</a>
</body>
</html>"#;

    #[test]
    fn test_collect_doc_links() {
        let base = Url::parse("https://docs.example.com/docs/").unwrap();
        let links = collect_doc_links(PAGE, &base);
        assert_eq!(
            links,
            vec![
                "https://docs.example.com/docs/intro",
                "https://docs.example.com/docs/api",
            ]
        );
    }

    #[test]
    fn test_collect_doc_links_empty_page() {
        let base = Url::parse("https://docs.example.com/").unwrap();
        assert!(collect_doc_links("<html></html>", &base).is_empty());
    }

    #[test]
    fn test_extract_document() {
        let doc = extract_document(PAGE, "https://docs.example.com/docs/");

        assert_eq!(doc.metadata.source, "https://docs.example.com/docs/");
        assert_eq!(doc.metadata.headers, vec!["Getting Started", "API"]);
        assert!(doc.page_content.contains("Install the package."));
        assert!(doc.page_content.contains("Getting Started"));
        assert!(!doc.page_content.contains("hidden"));
        assert!(!doc.page_content.contains("Enable JavaScript"));
        assert!(!doc.page_content.contains("icon"));
        assert!(!doc.page_content.contains("color: red"));
    }

    #[test]
    fn test_document_serializes_camel_case() {
        let doc = extract_document("<body>hi</body>", "https://a.test/");
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["pageContent"], "hi");
        assert_eq!(value["metadata"]["source"], "https://a.test/");
    }
}
