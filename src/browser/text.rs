//! Rendered-text and visibility rules for static HTML documents.
//!
//! Approximates what a browser's `innerText` would return: hidden subtrees
//! are skipped, block elements start new lines, and runs of whitespace are
//! collapsed.

use scraper::node::Element;
use scraper::ElementRef;

/// Elements whose content never renders.
const NON_RENDERED: &[&str] = &[
    "head", "script", "style", "template", "noscript", "title", "meta", "link",
];

const BLOCK: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "hr", "li", "main", "nav", "ol", "p", "pre", "section", "table", "tbody", "thead",
    "tfoot", "tr", "ul", "caption",
];

/// True when the element itself is hidden by markup or inline style.
pub(super) fn element_hidden(element: &Element) -> bool {
    if NON_RENDERED.contains(&element.name()) {
        return true;
    }
    if element.attr("hidden").is_some() {
        return true;
    }
    if element.name() == "input" && element.attr("type") == Some("hidden") {
        return true;
    }
    if let Some(style) = element.attr("style") {
        let style: String = style
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        if style.contains("display:none") || style.contains("visibility:hidden") {
            return true;
        }
    }
    false
}

/// True when neither the element nor any ancestor is hidden.
pub(super) fn is_visible(element: ElementRef<'_>) -> bool {
    if element_hidden(element.value()) {
        return false;
    }
    !element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| element_hidden(ancestor.value()))
}

/// Rendered text of an element and its visible descendants.
pub(super) fn rendered_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    collect(element, &mut raw);
    normalize_lines(&raw)
}

/// Text of the element's direct text children only (XPath `text()`).
pub(super) fn own_text(element: ElementRef<'_>) -> String {
    let raw: String = element
        .children()
        .filter_map(|child| child.value().as_text().map(|t| t.to_string()))
        .collect();
    normalize_lines(&raw)
}

fn collect(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            continue;
        }
        let Some(child) = ElementRef::wrap(child) else {
            continue;
        };
        let name = child.value().name();
        if element_hidden(child.value()) {
            continue;
        }
        if name == "br" {
            out.push('\n');
            continue;
        }
        let block = BLOCK.contains(&name);
        if block {
            out.push('\n');
        }
        collect(child, out);
        if block {
            out.push('\n');
        } else if name == "td" || name == "th" {
            out.push(' ');
        }
    }
}

/// Collapse whitespace inside lines and drop blank lines.
pub(super) fn normalize_lines(raw: &str) -> String {
    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    fn first<'a>(doc: &'a Html, css: &str) -> ElementRef<'a> {
        doc.select(&Selector::parse(css).unwrap()).next().unwrap()
    }

    #[test]
    fn test_block_elements_break_lines() {
        let doc = Html::parse_document(
            "<body><div><p>Lincoln   Elementary</p><p>123 Main St<br>Austin, TX</p></div></body>",
        );
        assert_eq!(
            rendered_text(first(&doc, "body")),
            "Lincoln Elementary\n123 Main St\nAustin, TX"
        );
    }

    #[test]
    fn test_hidden_subtrees_are_skipped() {
        let doc = Html::parse_document(
            r#"<body><div style="display: none">secret</div><span hidden>x</span><script>var a;</script><b>shown</b></body>"#,
        );
        assert_eq!(rendered_text(first(&doc, "body")), "shown");
    }

    #[test]
    fn test_visibility_inherits_from_ancestors() {
        let doc = Html::parse_document(
            r#"<body><div style="visibility:hidden"><a id="inner" href="/x">x</a></div><a id="outer" href="/y">y</a></body>"#,
        );
        assert!(!is_visible(first(&doc, "#inner")));
        assert!(is_visible(first(&doc, "#outer")));
    }

    #[test]
    fn test_own_text_ignores_descendants() {
        let doc = Html::parse_document("<div id=\"d\">Phone: <span>ignored</span></div>");
        assert_eq!(own_text(first(&doc, "#d")), "Phone:");
    }
}
