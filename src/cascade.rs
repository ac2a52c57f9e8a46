//! Cascade resolution: matched rules in specificity order, then the inline `style`.

use crate::dom::{attr_get, tag_lower};
use crate::selector::{self, Specificity};
use crate::stylesheet::{parse_declarations, Declarations, StyleSheet};
use markup5ever_rcdom::Handle;
use tracing::debug;

/// Effective declarations for one element after cascade and inline override.
pub type ElementStyle = Declarations;

/// Computes [`ElementStyle`]s against one extracted stylesheet.
#[derive(Debug, Clone, Copy)]
pub struct StyleResolver<'a> {
    sheet: &'a StyleSheet,
}

impl<'a> StyleResolver<'a> {
    pub fn new(sheet: &'a StyleSheet) -> Self {
        Self { sheet }
    }

    pub fn resolve(&self, node: &Handle) -> ElementStyle {
        let mut matched: Vec<(Specificity, &str, &Declarations)> = Vec::new();
        for rule in self.sheet.rules() {
            let Some(rank) = selector::specificity(&rule.selector) else {
                continue;
            };
            if selector::matches(&rule.selector, node) {
                matched.push((rank, rule.selector.as_str(), &rule.declarations));
            }
        }
        // Stable: equal ranks keep stylesheet order.
        matched.sort_by_key(|(rank, _, _)| *rank);

        let mut style = ElementStyle::new();
        for (rank, sel, decls) in &matched {
            debug!(selector = %sel, ?rank, declarations = %decls.to_css(), "applying rule");
            style.merge_from(decls);
        }

        if let Some(inline) = attr_get(node, "style") {
            let inline = parse_declarations(&inline);
            if !inline.is_empty() {
                debug!(declarations = %inline.to_css(), "applying inline style");
                style.merge_from(&inline);
            }
        }

        if style.is_empty() {
            debug!(tag = ?tag_lower(node), "no style matched");
        }
        style
    }
}
