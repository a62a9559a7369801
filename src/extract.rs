use regex::Regex;
use scraper::{Html, Selector};

use crate::error::{AppError, Result};

pub const UNKNOWN: &str = "Unknown";

pub fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| AppError::InvalidDefinition(format!("bad selector `{}`: {}", selector, e)))
}

/// Collapsed text of the first element matching `selector`.
pub fn select_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .map(|element| collapse_whitespace(&element.text().collect::<String>()))
        .find(|text| !text.is_empty())
}

pub fn select_attr(document: &Html, selector: &Selector, attr: &str) -> Option<String> {
    document
        .select(selector)
        .filter_map(|element| element.value().attr(attr))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

/// Content of `<meta property=key>` or `<meta name=key>`.
pub fn meta_content(document: &Html, key: &str) -> Option<String> {
    let query = format!(
        r#"meta[property="{key}"], meta[name="{key}"], meta[itemprop="{key}"]"#
    );
    let selector = Selector::parse(&query).ok()?;
    select_attr(document, &selector, "content")
}

/// Group 1 when the pattern has one, else the whole match.
pub fn capture(re: &Regex, haystack: &str) -> Option<String> {
    let caps = re.captures(haystack)?;
    caps.get(1)
        .or_else(|| caps.get(0))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn collapse_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !result.is_empty() {
            result.push(' ');
        }
        result.push_str(word);
    }
    result
}

pub fn or_unknown(value: Option<String>) -> String {
    value.unwrap_or_else(|| UNKNOWN.to_string())
}

/// Parses counts the way sites print them: `1,234`, `1.2K`, `3.4M`, `1B`.
pub fn parse_count(text: &str) -> Option<u64> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let (number, multiplier) = match cleaned.chars().last()?.to_ascii_uppercase() {
        'K' => (&cleaned[..cleaned.len() - 1], 1_000f64),
        'M' => (&cleaned[..cleaned.len() - 1], 1_000_000f64),
        'B' => (&cleaned[..cleaned.len() - 1], 1_000_000_000f64),
        _ => (cleaned.as_str(), 1f64),
    };

    if multiplier == 1f64 {
        return number.parse::<u64>().ok();
    }
    let value = number.parse::<f64>().ok()?;
    if value.is_sign_negative() || !value.is_finite() {
        return None;
    }
    Some((value * multiplier).round() as u64)
}
