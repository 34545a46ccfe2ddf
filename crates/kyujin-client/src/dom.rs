//! Small text helpers over `scraper` elements.

use scraper::{ElementRef, Selector};
use url::Url;

/// Concatenated text with each text node trimmed, no separators.
///
/// `<td> 株式会社 <b>テスト</b> </td>` → `"株式会社テスト"`.
pub fn compact_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .concat()
}

/// All descendant text joined by single spaces.
pub fn full_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn select_first<'a>(element: ElementRef<'a>, selector: &Selector) -> Option<ElementRef<'a>> {
    element.select(selector).next()
}

/// Compact text of the first match, `None` if absent or empty.
pub fn select_text(element: ElementRef<'_>, selector: &Selector) -> Option<String> {
    select_first(element, selector)
        .map(compact_text)
        .filter(|t| !t.is_empty())
}

pub fn has_class(element: ElementRef<'_>, class: &str) -> bool {
    element.value().classes().any(|c| c == class)
}

/// Resolve an `href` against `base`. Empty and fragment-only hrefs have no target.
pub fn resolve_href(base: &Url, href: &str) -> Result<Option<String>, url::ParseError> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return Ok(None);
    }
    base.join(href).map(|u| Some(u.to_string()))
}
