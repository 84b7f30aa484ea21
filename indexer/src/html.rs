use lazy_static::lazy_static;
use scraper::{Html, Node, Selector};

lazy_static! {
    static ref IMPORTANT: Selector =
        Selector::parse("title, h1, h2, h3, b, strong").expect("valid selector");
}

/// Visible text of a page, split by emphasis.
#[derive(Debug, Default, PartialEq)]
pub struct PageText {
    /// All visible text, emphasized runs included.
    pub normal: String,
    /// Text inside title, h1-h3, b and strong.
    pub important: String,
}

pub fn extract(html: &str) -> PageText {
    let doc = Html::parse_document(html);
    let mut out = PageText::default();

    for node in doc.tree.nodes() {
        if let Node::Text(text) = node.value() {
            let hidden = node.ancestors().any(|a| {
                matches!(a.value(), Node::Element(e) if matches!(e.name(), "script" | "style" | "noscript"))
            });
            if !hidden {
                out.normal.push_str(text);
                out.normal.push(' ');
            }
        }
    }
    for el in doc.select(&IMPORTANT) {
        for t in el.text() {
            out.important.push_str(t);
        }
        out.important.push(' ');
    }
    out
}
