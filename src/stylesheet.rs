//! Extraction of embedded `<style>` blocks into a selector → declarations table.
//!
//! The parser is forgiving: comments are stripped, rules are split
//! by brace matching, and anything that does not look like `name: value` is
//! dropped without failing the extraction.

use crate::dom::{find_descendants, raw_text};
use markup5ever_rcdom::Handle;
use tracing::{debug, info, warn};

/// Ordered `property -> value` map. Re-setting a property keeps its original
/// position and replaces the value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Declarations {
    entries: Vec<(String, String)>,
}

impl Declarations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: &str) {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| k == name) {
            slot.1 = value.to_string();
        } else {
            self.entries.push((name.to_string(), value.to_string()));
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Overwrites every key of `self` that `other` declares.
    pub fn merge_from(&mut self, other: &Declarations) {
        for (k, v) in &other.entries {
            self.set(k, v);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializes back to `name: value; ...` form.
    pub fn to_css(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{k}: {v};"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleRule {
    pub selector: String,
    pub declarations: Declarations,
}

/// Selector-keyed rule table. Registering a selector a second time replaces
/// its declarations but keeps its first-seen position, so iteration order is
/// stable.
#[derive(Debug, Clone, Default)]
pub struct StyleSheet {
    rules: Vec<StyleRule>,
}

impl StyleSheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, selector: &str, declarations: Declarations) {
        if let Some(rule) = self.rules.iter_mut().find(|r| r.selector == selector) {
            rule.declarations = declarations;
        } else {
            self.rules.push(StyleRule {
                selector: selector.to_string(),
                declarations,
            });
        }
    }

    pub fn get(&self, selector: &str) -> Option<&Declarations> {
        self.rules
            .iter()
            .find(|r| r.selector == selector)
            .map(|r| &r.declarations)
    }

    pub fn rules(&self) -> &[StyleRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Parses one CSS text block and registers its rules.
    pub fn add_css(&mut self, css: &str) {
        let css = strip_comments(css);
        let rules = split_rules(&css);
        debug!(count = rules.len(), "css rules found");
        for (selector_list, body) in rules {
            let declarations = parse_declarations(body);
            for selector in selector_list.split(',') {
                let selector = selector.split_whitespace().collect::<Vec<_>>().join(" ");
                if selector.is_empty() {
                    continue;
                }
                debug!(selector = %selector, declarations = %declarations.to_css(), "registered rule");
                self.insert(&selector, declarations.clone());
            }
        }
    }

    /// Serializes the table back to CSS text.
    pub fn to_css(&self) -> String {
        self.rules
            .iter()
            .map(|r| format!("{} {{ {} }}", r.selector, r.declarations.to_css()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Collects every `<style>` element under `root` into one sheet.
pub fn extract_stylesheet(root: &Handle) -> StyleSheet {
    let mut sheet = StyleSheet::new();
    let styles = find_descendants(root, &["style"]);
    info!(count = styles.len(), "style blocks found");
    for style in styles {
        let css = raw_text(&style);
        if css.trim().is_empty() {
            warn!("empty style block");
            continue;
        }
        sheet.add_css(&css);
    }
    info!(selectors = sheet.len(), "stylesheet extracted");
    sheet
}

/// Parses a declaration list such as `color: red; font-size: 12pt`.
///
/// Splits on `;`, then on the first `:`. Values lose stray quotes and
/// backslashes. Entries without a colon or with an empty name or value are
/// skipped.
pub fn parse_declarations(text: &str) -> Declarations {
    let mut out = Declarations::new();
    for item in text.split(';') {
        let Some((name, value)) = item.split_once(':') else {
            if !item.trim().is_empty() {
                debug!(declaration = %item.trim(), "dropped declaration without colon");
            }
            continue;
        };
        let name = name.trim();
        let value: String = value
            .trim()
            .chars()
            .filter(|c| !matches!(c, '\\' | '"' | '\''))
            .collect();
        if name.is_empty() || value.is_empty() {
            continue;
        }
        out.set(name, &value);
    }
    out
}

fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => {
                // Unterminated comment swallows the remainder.
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Splits CSS text into `(selector_list, body)` pairs by brace matching.
/// Nested blocks (e.g. `@media`) are kept whole and later fail to match any
/// element; an unbalanced trailing block is dropped.
fn split_rules(css: &str) -> Vec<(&str, &str)> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut prelude_start = 0usize;
    let mut body_start = 0usize;
    for (i, ch) in css.char_indices() {
        match ch {
            '{' => {
                if depth == 0 {
                    body_start = i + 1;
                }
                depth += 1;
            }
            '}' => {
                if depth == 0 {
                    // Stray closing brace: restart after it.
                    prelude_start = i + 1;
                    continue;
                }
                depth -= 1;
                if depth == 0 {
                    let selector = css[prelude_start..body_start - 1].trim();
                    let body = &css[body_start..i];
                    if !selector.is_empty() && !selector.starts_with('@') {
                        out.push((selector, body));
                    }
                    prelude_start = i + 1;
                }
            }
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_selector_lists_and_strips_comments() {
        let mut sheet = StyleSheet::new();
        sheet.add_css(
            r#"
            /* 摘要 */
            .abstract h1,
            .abstract .summary-title {
                font-family: "SimHei";
                font-size: 16pt;
            }
            "#,
        );
        assert_eq!(sheet.len(), 2);
        let h1 = sheet.get(".abstract h1").unwrap();
        assert_eq!(h1.get("font-family"), Some("SimHei"));
        assert_eq!(h1.get("font-size"), Some("16pt"));
        assert_eq!(sheet.get(".abstract .summary-title"), Some(h1));
    }

    #[test]
    fn drops_property_without_colon_but_keeps_the_rest() {
        let mut sheet = StyleSheet::new();
        sheet.add_css("p { color red; font-weight: bold; text-align: center }");
        let p = sheet.get("p").unwrap();
        assert_eq!(p.get("color"), None);
        assert_eq!(p.get("font-weight"), Some("bold"));
        assert_eq!(p.get("text-align"), Some("center"));
    }

    #[test]
    fn later_rule_for_same_selector_replaces_earlier() {
        let mut sheet = StyleSheet::new();
        sheet.add_css("p { color: #111111; font-size: 10pt } h1 { color: #222222 } p { color: #333333 }");
        assert_eq!(sheet.rules()[0].selector, "p");
        let p = sheet.get("p").unwrap();
        assert_eq!(p.get("color"), Some("#333333"));
        assert_eq!(p.get("font-size"), None);
    }

    #[test]
    fn first_colon_splits_and_url_values_survive() {
        let d = parse_declarations("background: url(http://x/y.png); font-family: 'Times New Roman'");
        assert_eq!(d.get("background"), Some("url(http://x/y.png)"));
        assert_eq!(d.get("font-family"), Some("Times New Roman"));
    }

    #[test]
    fn tolerates_garbage_and_unbalanced_braces() {
        let mut sheet = StyleSheet::new();
        sheet.add_css("} p { color: #000000 } @media print { p { color: #ffffff } } h2 { font-size: 14pt");
        assert_eq!(sheet.get("p").unwrap().get("color"), Some("#000000"));
        assert!(sheet.get("h2").is_none());
        assert_eq!(sheet.len(), 1);
    }

    #[test]
    fn reextracting_serialized_sheet_is_stable() {
        let mut sheet = StyleSheet::new();
        sheet.add_css("body { font-family: SimSun; line-height: 1.5 } .keywords .keyword-title { font-weight: bold }");
        let mut again = StyleSheet::new();
        again.add_css(&sheet.to_css());
        assert_eq!(sheet.rules(), again.rules());
    }

    #[test]
    fn collects_every_style_element() {
        let dom = crate::dom::html5_parse(
            "<html><head><style>p { color: #010203 }</style></head><body><style>h1 { font-size: 20pt }</style></body></html>",
        );
        let sheet = extract_stylesheet(&dom.document);
        assert_eq!(sheet.len(), 2);
        assert_eq!(sheet.get("h1").unwrap().get("font-size"), Some("20pt"));
    }
}
