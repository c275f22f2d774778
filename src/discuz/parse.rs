//! Markup queries over Discuz pages.
//!
//! Everything here is synchronous and returns owned data: `scraper::Html`
//! is not `Send` and must never live across an `.await`.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

use crate::http::FormParams;

static CREDIT_NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&#13;|<em>|</em>|\(前往兌換商城\)|<[^>]+>|\r?\n").expect("valid regex")
});

static UID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"uid[=-]([0-9]+)").expect("valid regex"));

fn select_first<'a>(root: ElementRef<'a>, selector: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(selector).ok()?;
    root.select(&selector).next()
}

/// Every named `input` inside the first element matching `form_selector`.
///
/// Hidden fields (form hashes, referers) come back verbatim; a missing
/// `value` is an empty string and unnamed inputs are skipped. No form, no
/// params.
pub fn extract_form_params(document: &Html, form_selector: &str) -> FormParams {
    let mut params = FormParams::new();
    let Some(form) = select_first(document.root_element(), form_selector) else {
        return params;
    };
    let Ok(inputs) = Selector::parse("input") else {
        return params;
    };
    for input in form.select(&inputs) {
        if let Some(name) = input.value().attr("name") {
            let value = input.value().attr("value").unwrap_or_default();
            params.insert(name.to_string(), value.to_string());
        }
    }
    params
}

/// Form params plus the form's `action` attribute (empty when absent).
pub fn form(html: &str, form_selector: &str) -> (FormParams, String) {
    let document = Html::parse_document(html);
    let params = extract_form_params(&document, form_selector);
    let action = select_first(document.root_element(), form_selector)
        .and_then(|form| form.value().attr("action"))
        .unwrap_or_default()
        .to_string();
    (params, action)
}

/// Credit summary text, squashed to a single whitespace-free line.
pub fn credit_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let Some(region) = select_first(document.root_element(), ".creditl") else {
        return String::new();
    };
    let text: String = region.text().collect();
    let cleaned = CREDIT_NOISE.replace_all(&text, "");
    cleaned.split_whitespace().collect()
}

/// UIDs linked from the member search listing, in page order.
pub fn user_ids(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(entries) = Selector::parse("ul.buddy li.bbda") else {
        return Vec::new();
    };
    document
        .select(&entries)
        .filter_map(|entry| select_first(entry, "div.avt a"))
        .filter_map(|link| link.value().attr("href"))
        .filter_map(|href| UID.captures(href))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}
