use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::Serialize;
use serde_json::Value;

use super::{EndpointInfo, Params, Site, builtin_info, required, to_data};
use crate::error::{AppError, Result};
use crate::extract::{or_unknown, select_attr, select_text};

macro_rules! selector {
    ($name:ident, $css:literal) => {
        static $name: Lazy<Selector> =
            Lazy::new(|| Selector::parse($css).expect(concat!("Failed to parse ", $css)));
    };
}

selector!(PERSONA, "span.actual_persona_name");
selector!(REAL_NAME, "div.header_real_name bdi");
selector!(LEVEL, "span.friendPlayerLevelNum");
selector!(STATUS, "div.profile_in_game_header");
selector!(AVATAR, "div.playerAvatarAutoSizeInner > img");
selector!(RECENT_PLAYTIME, "div.recentgame_quicklinks, div.recentgame_recentplaytime > div");
selector!(ERROR_PAGE, "div.error_ctn");
selector!(PRIVATE_PROFILE, "div.profile_private_info");

#[derive(Serialize, Debug)]
pub struct SteamProfile {
    pub persona_name: String,
    pub real_name: Option<String>,
    pub level: Option<u32>,
    pub status: String,
    pub avatar: Option<String>,
    pub recent_playtime: Option<String>,
    pub private: bool,
}

pub struct Steam;

fn is_steam_id64(id: &str) -> bool {
    id.len() == 17 && id.starts_with("7656") && id.bytes().all(|b| b.is_ascii_digit())
}

fn is_vanity(id: &str) -> bool {
    (2..=32).contains(&id.len())
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl Site for Steam {
    fn name(&self) -> &str {
        "steam"
    }

    fn info(&self) -> EndpointInfo {
        builtin_info(self.name(), "Level and status of a Steam community profile", &["id"])
    }

    fn target(&self, params: &Params) -> Result<String> {
        let id = required(params, "id")?;
        if is_steam_id64(id) {
            Ok(format!("https://steamcommunity.com/profiles/{}/", id))
        } else if is_vanity(id) {
            Ok(format!("https://steamcommunity.com/id/{}/", id))
        } else {
            Err(AppError::InvalidParam("Invalid Steam ID".to_string()))
        }
    }

    fn extract(&self, html: &str) -> Result<Value> {
        let document = Html::parse_document(html);

        // Steam answers unknown profiles with 200 and an error box.
        if let Some(message) = select_text(&document, &ERROR_PAGE) {
            return Err(AppError::NotFound(format!("Steam profile: {}", message)));
        }

        let persona_name = select_text(&document, &PERSONA)
            .ok_or_else(|| AppError::ParseError("Steam persona name not found".to_string()))?;

        to_data(SteamProfile {
            persona_name,
            real_name: select_text(&document, &REAL_NAME),
            level: select_text(&document, &LEVEL).and_then(|l| l.parse().ok()),
            status: or_unknown(select_text(&document, &STATUS)),
            avatar: select_attr(&document, &AVATAR, "src"),
            recent_playtime: select_text(&document, &RECENT_PLAYTIME),
            private: document.select(&PRIVATE_PROFILE).next().is_some(),
        })
    }
}
