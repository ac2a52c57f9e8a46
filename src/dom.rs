//! Thin helpers over the html5ever rcdom tree.

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};

pub fn html5_parse(input: &str) -> RcDom {
    parse_document(RcDom::default(), Default::default()).one(input)
}

pub fn tag_lower(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.to_string().to_ascii_lowercase()),
        _ => None,
    }
}

pub fn is_element(node: &Handle) -> bool {
    matches!(node.data, NodeData::Element { .. })
}

pub fn attr_get(node: &Handle, name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|a| a.name.local.to_string().eq_ignore_ascii_case(name))
            .map(|a| a.value.to_string()),
        _ => None,
    }
}

/// Whitespace-separated entries of the `class` attribute.
pub fn classes(node: &Handle) -> Vec<String> {
    attr_get(node, "class")
        .map(|c| c.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

pub fn has_class(node: &Handle, class: &str) -> bool {
    classes(node).iter().any(|c| c == class)
}

/// The parent element, if any. The document node itself is not an element and
/// ends the walk.
pub fn parent_element(node: &Handle) -> Option<Handle> {
    let weak = node.parent.take()?;
    let parent = weak.upgrade();
    node.parent.set(Some(weak));
    parent.filter(is_element)
}

pub fn element_children(node: &Handle) -> Vec<Handle> {
    node.children
        .borrow()
        .iter()
        .filter(|c| is_element(c))
        .cloned()
        .collect()
}

/// All descendants (not the node itself) whose tag is one of `names`, in
/// document order.
pub fn find_descendants(node: &Handle, names: &[&str]) -> Vec<Handle> {
    fn walk(node: &Handle, names: &[&str], out: &mut Vec<Handle>) {
        for c in node.children.borrow().iter() {
            if let Some(tag) = tag_lower(c) {
                if names.contains(&tag.as_str()) {
                    out.push(c.clone());
                }
            }
            walk(c, names, out);
        }
    }
    let mut out = Vec::new();
    walk(node, names, &mut out);
    out
}

pub fn find_element(node: &Handle, name: &str) -> Option<Handle> {
    if tag_lower(node).as_deref() == Some(name) {
        return Some(node.clone());
    }
    for c in node.children.borrow().iter() {
        if let Some(found) = find_element(c, name) {
            return Some(found);
        }
    }
    None
}

/// Concatenated text of every descendant text node.
pub fn raw_text(node: &Handle) -> String {
    fn walk(node: &Handle, out: &mut String) {
        match &node.data {
            NodeData::Text { contents } => out.push_str(&contents.borrow()),
            _ => {
                for c in node.children.borrow().iter() {
                    walk(c, out);
                }
            }
        }
    }
    let mut out = String::new();
    walk(node, &mut out);
    out
}

/// Text content with source-formatting whitespace collapsed and trimmed.
pub fn text_content(node: &Handle) -> String {
    collapse_ws(&raw_text(node)).trim().to_string()
}

/// Collapses runs of layout whitespace into a single space. Non-breaking spaces
/// are content and survive.
pub fn collapse_ws(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_ws = false;
    for ch in s.chars() {
        if ch.is_whitespace() && ch != '\u{a0}' {
            if !in_ws {
                out.push(' ');
                in_ws = true;
            }
        } else {
            out.push(ch);
            in_ws = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_of(html: &str) -> (RcDom, Handle) {
        let dom = html5_parse(html);
        let body = find_element(&dom.document, "body").unwrap();
        (dom, body)
    }

    #[test]
    fn parent_walk_stops_at_document() {
        let (_dom, body) = body_of("<div class=\"a b\"><p>hi</p></div>");
        let p = find_descendants(&body, &["p"]).remove(0);
        let div = parent_element(&p).unwrap();
        assert_eq!(tag_lower(&div).as_deref(), Some("div"));
        assert_eq!(classes(&div), vec!["a".to_string(), "b".to_string()]);
        let html = parent_element(&body).unwrap();
        assert_eq!(tag_lower(&html).as_deref(), Some("html"));
        assert!(parent_element(&html).is_none());
    }

    #[test]
    fn text_content_collapses_layout_whitespace() {
        let (_dom, body) = body_of("<p>\n   one\n  <b>two</b>\tthree  </p>");
        let p = find_descendants(&body, &["p"]).remove(0);
        assert_eq!(text_content(&p), "one two three");
    }

    #[test]
    fn keeps_non_breaking_spaces() {
        assert_eq!(collapse_ws("a\u{a0}\u{a0}b  c"), "a\u{a0}\u{a0}b c");
    }
}
