use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::Serialize;
use serde_json::Value;

use super::{EndpointInfo, Params, Site, builtin_info, required, site_url, to_data};
use crate::error::{AppError, Result};
use crate::extract::or_unknown;

static REHYDRATION: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("script#__UNIVERSAL_DATA_FOR_REHYDRATION__, script#SIGI_STATE")
        .expect("Failed to parse rehydration selector")
});

#[derive(Serialize, Debug)]
pub struct TiktokVideo {
    pub description: String,
    pub author: String,
    pub author_name: String,
    pub plays: Option<u64>,
    pub likes: Option<u64>,
    pub comments: Option<u64>,
    pub shares: Option<u64>,
    pub cover: Option<String>,
    pub music: String,
}

pub struct Tiktok;

impl Site for Tiktok {
    fn name(&self) -> &str {
        "tiktok"
    }

    fn info(&self) -> EndpointInfo {
        builtin_info(self.name(), "Author and engagement stats of a TikTok video", &["url"])
    }

    fn target(&self, params: &Params) -> Result<String> {
        let url = site_url(required(params, "url")?, &["tiktok.com"], "TikTok")?;
        Ok(url.to_string())
    }

    fn extract(&self, html: &str) -> Result<Value> {
        let document = Html::parse_document(html);
        let item = document
            .select(&REHYDRATION)
            .filter_map(|script| serde_json::from_str::<Value>(&script.text().collect::<String>()).ok())
            .find_map(|state| item_struct(&state).cloned())
            .ok_or_else(|| AppError::ParseError("TikTok video data not found".to_string()))?;

        let text = |pointer: &str| {
            item.pointer(pointer)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let count = |pointer: &str| item.pointer(pointer).and_then(as_count);

        to_data(TiktokVideo {
            description: text("/desc").unwrap_or_default(),
            author: or_unknown(text("/author/uniqueId")),
            author_name: or_unknown(text("/author/nickname")),
            plays: count("/stats/playCount"),
            likes: count("/stats/diggCount"),
            comments: count("/stats/commentCount"),
            shares: count("/stats/shareCount"),
            cover: text("/video/cover"),
            music: or_unknown(text("/music/title")),
        })
    }
}

/// Current pages nest the item under the default scope; older ones keep an
/// `ItemModule` keyed by video id.
fn item_struct(state: &Value) -> Option<&Value> {
    if let Some(item) = state.pointer("/__DEFAULT_SCOPE__/webapp.video-detail/itemInfo/itemStruct") {
        return Some(item);
    }
    state
        .get("ItemModule")
        .and_then(Value::as_object)
        .and_then(|items| items.values().next())
}

fn as_count(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
        <script id="__UNIVERSAL_DATA_FOR_REHYDRATION__" type="application/json">
        {"__DEFAULT_SCOPE__":{"webapp.video-detail":{"itemInfo":{"itemStruct":{
            "id":"7300000000000000000","desc":"sunset timelapse",
            "author":{"uniqueId":"skywatcher","nickname":"Sky Watcher"},
            "stats":{"playCount":120400,"diggCount":9800,"commentCount":312,"shareCount":"77"},
            "video":{"cover":"https://p16.tiktokcdn.com/cover.jpg"},
            "music":{"title":"original sound"}
        }}}}}
        </script>
        </body></html>
    "#;

    #[test]
    fn extracts_from_rehydration_state() {
        let data = Tiktok.extract(PAGE).unwrap();
        assert_eq!(data["author"], "skywatcher");
        assert_eq!(data["author_name"], "Sky Watcher");
        assert_eq!(data["plays"], 120400);
        assert_eq!(data["shares"], 77);
        assert_eq!(data["music"], "original sound");
        assert_eq!(data["description"], "sunset timelapse");
    }

    #[test]
    fn reads_legacy_item_module() {
        let page = r#"<script id="SIGI_STATE" type="application/json">
            {"ItemModule":{"123":{"desc":"old","author":"legacy_user","stats":{"playCount":5}}}}
        </script>"#;
        let data = Tiktok.extract(page).unwrap();
        assert_eq!(data["description"], "old");
        assert_eq!(data["plays"], 5);
        // author is a bare string in this layout
        assert_eq!(data["author"], "Unknown");
    }

    #[test]
    fn rejects_other_hosts() {
        let mut params = Params::new();
        params.insert("url".into(), "https://tiktok.com.example/@a/video/1".into());
        assert!(matches!(Tiktok.target(&params), Err(AppError::InvalidParam(_))));
    }

    #[test]
    fn missing_state_is_parse_error() {
        assert!(matches!(
            Tiktok.extract("<html></html>"),
            Err(AppError::ParseError(_))
        ));
    }
}
