//! A small selector matcher: type, class, `type.class`, and the
//! descendant combinator built from those. Anything else never matches.

use crate::dom::{classes, parent_element, tag_lower};
use markup5ever_rcdom::Handle;

/// Rank of a selector by its shape. Variants are declared in ascending
/// priority; descendant selectors rank further by their number of compound
/// parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Specificity {
    Type,
    Class,
    TypeClass,
    Descendant(usize),
}

/// One compound part of a selector.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Simple<'a> {
    Type(&'a str),
    Class(&'a str),
    TypeClass(&'a str, &'a str),
}

fn parse_simple(token: &str) -> Option<Simple<'_>> {
    if token.is_empty()
        || token
            .chars()
            .any(|c| matches!(c, '+' | '~' | '>' | '[' | ']' | ':' | '#' | '*' | '(' | ')'))
    {
        return None;
    }
    if let Some(class) = token.strip_prefix('.') {
        return (!class.is_empty()).then_some(Simple::Class(class));
    }
    match token.split_once('.') {
        Some((tag, class)) if !class.is_empty() => Some(Simple::TypeClass(tag, class)),
        Some(_) => None,
        None => Some(Simple::Type(token)),
    }
}

fn simple_matches(simple: &Simple<'_>, node: &Handle) -> bool {
    let Some(tag) = tag_lower(node) else {
        return false;
    };
    match simple {
        Simple::Type(t) => t.eq_ignore_ascii_case(&tag),
        Simple::Class(c) => classes(node).iter().any(|x| x == c),
        Simple::TypeClass(t, c) => {
            t.eq_ignore_ascii_case(&tag) && classes(node).iter().any(|x| x == c)
        }
    }
}

/// Shape-derived rank of `selector`, or `None` for selectors this matcher
/// does not support.
pub fn specificity(selector: &str) -> Option<Specificity> {
    let tokens: Vec<&str> = selector.split_whitespace().collect();
    match tokens.as_slice() {
        [] => None,
        [single] => match parse_simple(single)? {
            Simple::Type(_) => Some(Specificity::Type),
            Simple::Class(_) => Some(Specificity::Class),
            Simple::TypeClass(..) => Some(Specificity::TypeClass),
        },
        many => {
            for t in many {
                parse_simple(t)?;
            }
            Some(Specificity::Descendant(many.len()))
        }
    }
}

/// Whether `selector` matches `node`.
///
/// For descendant selectors the last part must match the node itself and the
/// remaining parts, right to left, must each match some strict ancestor in
/// order; non-matching ancestors are skipped.
pub fn matches(selector: &str, node: &Handle) -> bool {
    let tokens: Vec<&str> = selector.split_whitespace().collect();
    let Some((last, ancestors)) = tokens.split_last() else {
        return false;
    };
    let Some(last) = parse_simple(last) else {
        return false;
    };
    if !simple_matches(&last, node) {
        return false;
    }

    let mut pending = Vec::with_capacity(ancestors.len());
    for t in ancestors {
        match parse_simple(t) {
            Some(s) => pending.push(s),
            None => return false,
        }
    }

    let mut current = parent_element(node);
    while let Some(target) = pending.last() {
        let Some(ancestor) = current else {
            break;
        };
        if simple_matches(target, &ancestor) {
            pending.pop();
        }
        current = parent_element(&ancestor);
    }
    pending.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{find_descendants, find_element, html5_parse};
    use markup5ever_rcdom::RcDom;

    // The dom is returned alongside the node: parent links are weak.
    fn node(html: &str, tag: &str) -> (RcDom, Handle) {
        let dom = html5_parse(html);
        let body = find_element(&dom.document, "body").unwrap();
        let found = find_descendants(&body, &[tag]).remove(0);
        (dom, found)
    }

    #[test]
    fn simple_shapes() {
        let (_dom, p) = node(r#"<p class="english lead">x</p>"#, "p");
        assert!(matches("p", &p));
        assert!(matches(".english", &p));
        assert!(matches("p.lead", &p));
        assert!(!matches("h1", &p));
        assert!(!matches(".summary-title", &p));
        assert!(!matches("h1.english", &p));
    }

    #[test]
    fn descendant_skips_non_matching_ancestors() {
        let (_dom, strong) = node(
            r#"<div class="keywords"><section><p><strong class="keyword-title">K</strong></p></section></div>"#,
            "strong",
        );
        assert!(matches(".keywords .keyword-title", &strong));
        assert!(matches("div p strong", &strong));
        assert!(matches("body .keywords p .keyword-title", &strong));
        assert!(!matches(".abstract .keyword-title", &strong));
        assert!(!matches("p div strong", &strong));
    }

    #[test]
    fn descendant_requires_strict_ancestor() {
        let (_dom, div) = node(r#"<div class="abstract">x</div>"#, "div");
        assert!(!matches(".abstract .abstract", &div));
        assert!(matches("body .abstract", &div));
    }

    #[test]
    fn unsupported_selectors_never_match() {
        let (_dom, p) = node(r#"<div><p id="a" class="c">x</p></div>"#, "p");
        for sel in ["p:first-child", "div > p", "div + p", "p[id]", "#a", "*", "p.c:hover", ".", "p."] {
            assert!(!matches(sel, &p), "{sel} should not match");
            assert!(specificity(sel).is_none(), "{sel} should have no rank");
        }
    }

    #[test]
    fn specificity_order_follows_shape() {
        let p = specificity("p").unwrap();
        let cls = specificity(".cls").unwrap();
        let p_cls = specificity("p.cls").unwrap();
        let desc = specificity(".outer .cls").unwrap();
        assert!(p < cls && cls < p_cls && p_cls < desc);
        assert!(specificity("a b c").unwrap() > desc);
        assert_eq!(desc, Specificity::Descendant(2));
    }
}
