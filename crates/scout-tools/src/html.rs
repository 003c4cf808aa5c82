//! HTML helpers shared by the page-reading tools.

use scraper::{ElementRef, Html, Selector};

/// Elements whose text is never part of a page's readable content.
const STRIPPED_TAGS: &[&str] = &[
    "script", "style", "nav", "footer", "header", "aside", "noscript",
];

pub(crate) fn select_first<'a>(doc: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    doc.select(&selector).next()
}

pub(crate) fn select_all<'a>(doc: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => doc.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

pub(crate) fn select_within<'a>(el: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    el.select(&selector).next()
}

/// Content of the first `<meta>` matching `css`.
pub(crate) fn meta_content(doc: &Html, css: &str) -> Option<String> {
    select_first(doc, css)
        .and_then(|el| el.value().attr("content"))
        .map(collapse_whitespace)
        .filter(|s| !s.is_empty())
}

/// Element text with whitespace runs collapsed.
pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}

/// Readable text of an element, one line per text node, skipping
/// scripts, styles and page chrome.
pub(crate) fn visible_text(root: ElementRef<'_>) -> String {
    root.descendants()
        .filter_map(|node| node.value().as_text().map(|text| (node, text)))
        .filter(|(node, _)| {
            !node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .is_some_and(|el| STRIPPED_TAGS.contains(&el.name()))
            })
        })
        .map(|(_, text)| collapse_whitespace(text))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Readable text of a whole document, preferring `<body>`.
pub(crate) fn document_text(doc: &Html) -> String {
    match select_first(doc, "body") {
        Some(body) => visible_text(body),
        None => visible_text(doc.root_element()),
    }
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visible_text_skips_chrome() {
        let doc = Html::parse_document(
            "<html><head><title>T</title><style>p{}</style></head><body>\
             <header><a>Home</a></header><nav>Menu</nav>\
             <p>Hello   <b>bold</b>\n world</p><script>evil()</script>\
             <aside>Ad</aside><noscript>Enable JS</noscript>\
             <footer>Copyright</footer></body></html>",
        );
        let text = document_text(&doc);
        assert_eq!(text, "Hello\nbold\nworld");
    }

    #[test]
    fn test_meta_content() {
        let doc = Html::parse_document(
            r#"<html><head><meta property="og:title" content="  A   Title "></head></html>"#,
        );
        assert_eq!(
            meta_content(&doc, r#"meta[property="og:title"]"#).as_deref(),
            Some("A Title")
        );
        assert!(meta_content(&doc, r#"meta[name="author"]"#).is_none());
    }
}
