//! Addresses split across inline elements, padded with invisible characters
//! or interleaved with hidden decoys.

use scraper::{ElementRef, Node};
use scraper::node::Element;

use crate::extractor::PageView;
use crate::extractor::model::{ObfuscationMatch, Technique};
use crate::fetcher::decode::{BLOCK_ELEMENTS, INVISIBLE_ELEMENTS, MAX_TEXT_DEPTH, separate_address};
use crate::patterns::{EMAIL_REGEX, strip_invisible};

const HIDDEN_CLASSES: &[&str] = &["hidden", "hide", "d-none", "invisible", "display-none"];
const HIDDEN_STYLES: &[&str] = &["display:none", "visibility:hidden", "font-size:0", "opacity:0"];

pub fn find(page: &PageView<'_>) -> Vec<ObfuscationMatch> {
    let mut flat = String::new();
    flatten(page.document.root_element(), &mut flat, 0);
    let flat = strip_invisible(&flat);

    EMAIL_REGEX
        .find_iter(&flat)
        .map(|m| ObfuscationMatch::verbatim(m.as_str(), Technique::TextSplit))
        .collect()
}

/// Rendered text with decoys removed and right-to-left overrides undone.
fn flatten(element: ElementRef<'_>, out: &mut String, depth: usize) {
    if depth > MAX_TEXT_DEPTH {
        return;
    }
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if INVISIBLE_ELEMENTS.contains(&name) || is_decoy(el) {
                    continue;
                }
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                let block = BLOCK_ELEMENTS.contains(&name);
                if block {
                    out.push('\n');
                }
                separate_address(out);
                if is_reversed(el) {
                    let mut inner = String::new();
                    flatten(child_el, &mut inner, depth + 1);
                    out.extend(inner.chars().rev());
                } else {
                    flatten(child_el, out, depth + 1);
                }
                separate_address(out);
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

fn compact_style(el: &Element) -> String {
    el.attr("style")
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn is_decoy(el: &Element) -> bool {
    if el.attr("hidden").is_some() {
        return true;
    }
    if el.classes().any(|class| HIDDEN_CLASSES.contains(&class.to_ascii_lowercase().as_str())) {
        return true;
    }
    let style = compact_style(el);
    HIDDEN_STYLES.iter().any(|rule| {
        style
            .split(';')
            .any(|decl| decl.trim_end_matches("!important") == *rule)
    })
}

/// `<bdo dir="rtl">` or a CSS bidi override that renders stored text backwards.
fn is_reversed(el: &Element) -> bool {
    let rtl = el.attr("dir").is_some_and(|dir| dir.eq_ignore_ascii_case("rtl"));
    if el.name() == "bdo" && rtl {
        return true;
    }
    let style = compact_style(el);
    style.contains("unicode-bidi:bidi-override") && (style.contains("direction:rtl") || rtl)
}
