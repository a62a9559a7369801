use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Serialize;
use serde_json::Value;

use super::{EndpointInfo, Params, Site, builtin_info, required, site_url, to_data};
use crate::error::{AppError, Result};
use crate::extract::{capture, meta_content, or_unknown, select_attr};

const HOSTS: &[&str] = &["youtube.com", "youtu.be"];

static CHANNEL_NAME: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"span[itemprop="author"] link[itemprop="name"]"#)
        .expect("Failed to parse channel selector")
});
static VIEW_COUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""viewCount":"(\d+)""#).expect("Failed to compile views regex"));
static LENGTH_SECONDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""lengthSeconds":"(\d+)""#).expect("Failed to compile length regex")
});
static OWNER_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""ownerChannelName":"((?:[^"\\]|\\.)*)""#).expect("Failed to compile owner regex")
});

#[derive(Serialize, Debug)]
pub struct YoutubeVideo {
    pub title: String,
    pub channel: String,
    pub views: Option<u64>,
    pub duration_seconds: Option<u64>,
    pub published: String,
    pub thumbnail: Option<String>,
}

pub struct Youtube;

impl Site for Youtube {
    fn name(&self) -> &str {
        "youtube"
    }

    fn info(&self) -> EndpointInfo {
        builtin_info(self.name(), "Title, channel and view count of a YouTube video", &["url"])
    }

    fn target(&self, params: &Params) -> Result<String> {
        let url = site_url(required(params, "url")?, HOSTS, "YouTube")?;
        let is_short_link = url
            .host_str()
            .is_some_and(|host| super::host_matches(host, "youtu.be"));
        let has_video = if is_short_link {
            url.path().len() > 1
        } else {
            url.query_pairs().any(|(k, v)| k == "v" && !v.is_empty())
                || url.path().starts_with("/shorts/")
                || url.path().starts_with("/live/")
        };
        if !has_video {
            return Err(AppError::InvalidParam(
                "YouTube URL does not point at a video".to_string(),
            ));
        }
        Ok(url.to_string())
    }

    fn extract(&self, html: &str) -> Result<Value> {
        let document = Html::parse_document(html);

        let title = meta_content(&document, "og:title")
            .or_else(|| meta_content(&document, "title"))
            .ok_or_else(|| AppError::ParseError("YouTube video title not found".to_string()))?;

        let channel = select_attr(&document, &CHANNEL_NAME, "content")
            .or_else(|| capture(&OWNER_NAME, html).map(|name| unescape_json(&name)));

        to_data(YoutubeVideo {
            title,
            channel: or_unknown(channel),
            views: capture(&VIEW_COUNT, html).and_then(|v| v.parse().ok()),
            duration_seconds: capture(&LENGTH_SECONDS, html).and_then(|v| v.parse().ok()),
            published: or_unknown(
                meta_content(&document, "datePublished")
                    .or_else(|| meta_content(&document, "uploadDate")),
            ),
            thumbnail: meta_content(&document, "og:image"),
        })
    }
}

fn unescape_json(raw: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{}\"", raw)).unwrap_or_else(|_| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><head>
          <meta property="og:title" content="Never Gonna Give You Up">
          <meta property="og:image" content="https://i.ytimg.com/vi/dQw4w9WgXcQ/maxresdefault.jpg">
          <meta itemprop="datePublished" content="2009-10-24T23:57:33-07:00">
        </head><body>
          <span itemprop="author" itemscope><link itemprop="name" content="Rick Astley"></span>
          <script>var ytInitialPlayerResponse = {"videoDetails":{"lengthSeconds":"213","viewCount":"1500000000"}};</script>
        </body></html>
    "#;

    fn params(url: &str) -> Params {
        let mut params = Params::new();
        params.insert("url".into(), url.into());
        params
    }

    #[test]
    fn accepts_video_links_only() {
        assert!(Youtube.target(&params("https://www.youtube.com/watch?v=dQw4w9WgXcQ")).is_ok());
        assert!(Youtube.target(&params("https://youtu.be/dQw4w9WgXcQ")).is_ok());
        assert!(Youtube.target(&params("https://www.youtube.com/shorts/abc123")).is_ok());
        assert!(matches!(
            Youtube.target(&params("https://www.youtube.com/")),
            Err(AppError::InvalidParam(_))
        ));
        assert!(matches!(
            Youtube.target(&params("https://vimeo.com/123")),
            Err(AppError::InvalidParam(_))
        ));
    }

    #[test]
    fn extracts_video_details() {
        let data = Youtube.extract(PAGE).unwrap();
        assert_eq!(data["title"], "Never Gonna Give You Up");
        assert_eq!(data["channel"], "Rick Astley");
        assert_eq!(data["views"], 1_500_000_000u64);
        assert_eq!(data["duration_seconds"], 213);
        assert_eq!(data["published"], "2009-10-24T23:57:33-07:00");
    }

    #[test]
    fn falls_back_to_player_owner_name() {
        let page = r#"<meta property="og:title" content="Clip"><script>{"ownerChannelName":"Café Talk"}</script>"#;
        let data = Youtube.extract(page).unwrap();
        assert_eq!(data["channel"], "Café Talk");
        assert_eq!(data["views"], Value::Null);
        assert_eq!(data["published"], "Unknown");
    }

    #[test]
    fn consent_page_without_title_fails() {
        assert!(matches!(
            Youtube.extract("<html><body>Before you continue</body></html>"),
            Err(AppError::ParseError(_))
        ));
    }
}
