use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Serialize;
use serde_json::Value;

use super::{EndpointInfo, Params, Site, builtin_info, required, site_url, to_data};
use crate::error::{AppError, Result};
use crate::extract::{collapse_whitespace, meta_content, or_unknown, select_attr, select_text};

static DOWNLOAD_BUTTON: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a#downloadButton").expect("Failed to parse download selector"));
static FILE_LABEL: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.dl-btn-label, div.filename").expect("Failed to parse filename selector")
});
static DETAILS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("ul.details li").expect("Failed to parse details selector"));
static DETAIL_VALUE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span").expect("Failed to parse span selector"));
static SIZE_IN_BUTTON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\s*([\d.,]+\s*[KMGT]?B)\s*\)").expect("Failed to compile size regex"));

#[derive(Serialize, Debug)]
pub struct MediafireFile {
    pub file_name: String,
    pub file_size: String,
    pub uploaded: String,
    pub download_url: String,
}

pub struct Mediafire;

impl Site for Mediafire {
    fn name(&self) -> &str {
        "mediafire"
    }

    fn info(&self) -> EndpointInfo {
        builtin_info(
            self.name(),
            "Direct download link and metadata for a MediaFire file",
            &["url"],
        )
    }

    fn target(&self, params: &Params) -> Result<String> {
        let raw = required(params, "url")?;
        Ok(site_url(raw, &["mediafire.com"], "MediaFire")?.to_string())
    }

    fn extract(&self, html: &str) -> Result<Value> {
        let document = Html::parse_document(html);

        let download_url = download_link(&document).ok_or_else(|| {
            AppError::ParseError("MediaFire download button not found".to_string())
        })?;

        let file_name = select_attr(&document, &FILE_LABEL, "title")
            .or_else(|| select_text(&document, &FILE_LABEL))
            .or_else(|| meta_content(&document, "og:title"))
            .or_else(|| file_name_from_link(&download_url));

        let file_size = select_text(&document, &DOWNLOAD_BUTTON)
            .and_then(|text| {
                SIZE_IN_BUTTON
                    .captures(&text)
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().to_string())
            })
            .or_else(|| detail(&document, "size"));

        to_data(MediafireFile {
            file_name: or_unknown(file_name),
            file_size: or_unknown(file_size),
            uploaded: or_unknown(detail(&document, "uploaded")),
            download_url,
        })
    }
}

/// The real link lives in `href`, or base64-encoded in `data-scrambled-url`
/// on newer pages.
fn download_link(document: &Html) -> Option<String> {
    let button = document.select(&DOWNLOAD_BUTTON).next()?;
    let value = button.value();

    if let Some(href) = value.attr("href").map(str::trim)
        && href.starts_with("http")
    {
        return Some(href.to_string());
    }

    let scrambled = value.attr("data-scrambled-url")?;
    let decoded = STANDARD.decode(scrambled.trim()).ok()?;
    let link = String::from_utf8(decoded).ok()?;
    link.starts_with("http").then_some(link)
}

fn detail(document: &Html, label: &str) -> Option<String> {
    document.select(&DETAILS).find_map(|item| {
        let text = item.text().collect::<String>();
        if !text.to_ascii_lowercase().contains(label) {
            return None;
        }
        item.select(&DETAIL_VALUE)
            .next()
            .map(|span| collapse_whitespace(&span.text().collect::<String>()))
            .filter(|v| !v.is_empty())
    })
}

fn file_name_from_link(link: &str) -> Option<String> {
    url::Url::parse(link)
        .ok()?
        .path_segments()?
        .next_back()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}
