use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use serde::Serialize;
use serde_json::Value;

use super::{EndpointInfo, Params, Site, builtin_info, required, to_data};
use crate::error::{AppError, Result};
use crate::extract::{meta_content, or_unknown, parse_count};

static COUNTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([\d.,]+[KMB]?)\s+Followers?,\s*([\d.,]+[KMB]?)\s+Following,\s*([\d.,]+[KMB]?)\s+Posts?")
        .expect("Failed to compile counts regex")
});
/// `og:title` reads `Full Name (@handle) • Instagram photos and videos`.
static TITLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.*?)\s*\(@([A-Za-z0-9._]+)\)").expect("Failed to compile title regex")
});

#[derive(Serialize, Debug)]
pub struct InstagramProfile {
    pub username: String,
    pub full_name: String,
    pub followers: Option<u64>,
    pub following: Option<u64>,
    pub posts: Option<u64>,
    pub avatar: Option<String>,
}

pub struct Instagram;

fn valid_username(name: &str) -> bool {
    (1..=30).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
}

impl Site for Instagram {
    fn name(&self) -> &str {
        "instagram"
    }

    fn info(&self) -> EndpointInfo {
        builtin_info(self.name(), "Follower, following and post counts of an Instagram profile", &["username"])
    }

    fn target(&self, params: &Params) -> Result<String> {
        let username = required(params, "username")?.trim_start_matches('@');
        if !valid_username(username) {
            return Err(AppError::InvalidParam("Invalid Instagram username".to_string()));
        }
        Ok(format!("https://www.instagram.com/{}/", username))
    }

    fn extract(&self, html: &str) -> Result<Value> {
        let document = Html::parse_document(html);

        let summary = meta_content(&document, "og:description")
            .or_else(|| meta_content(&document, "description"))
            .unwrap_or_default();
        let counts = COUNTS
            .captures(&summary)
            .ok_or_else(|| AppError::ParseError("Instagram profile counts not found".to_string()))?;

        let title = meta_content(&document, "og:title").unwrap_or_default();
        let (full_name, username) = match TITLE.captures(&title) {
            Some(caps) => (
                caps.get(1).map(|m| m.as_str().trim().to_string()).filter(|s| !s.is_empty()),
                caps.get(2).map(|m| m.as_str().to_string()),
            ),
            None => (None, None),
        };

        to_data(InstagramProfile {
            username: or_unknown(username),
            full_name: or_unknown(full_name),
            followers: parse_count(&counts[1]),
            following: parse_count(&counts[2]),
            posts: parse_count(&counts[3]),
            avatar: meta_content(&document, "og:image"),
        })
    }
}
