use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::Serialize;
use serde_json::Value;

use super::{EndpointInfo, Params, Site, builtin_info, required, to_data};
use crate::error::{AppError, Result};
use crate::extract::{parse_count, select_attr, select_text};

struct ProfileSelectors {
    login: Selector,
    name: Selector,
    bio: Selector,
    followers: Selector,
    following: Selector,
    repositories: Selector,
    avatar: Selector,
}

static SELECTORS: Lazy<ProfileSelectors> = Lazy::new(|| {
    let parse = |css: &str| Selector::parse(css).expect("Failed to parse GitHub selector");
    ProfileSelectors {
        login: parse("span.p-nickname"),
        name: parse("span.p-name"),
        bio: parse("div.p-note"),
        followers: parse(r#"a[href$="?tab=followers"] span.text-bold"#),
        following: parse(r#"a[href$="?tab=following"] span.text-bold"#),
        repositories: parse(r#"a[href$="?tab=repositories"] span.Counter"#),
        avatar: parse("img.avatar-user"),
    }
});

#[derive(Serialize, Debug)]
pub struct GithubProfile {
    pub login: String,
    pub name: Option<String>,
    pub bio: Option<String>,
    pub followers: Option<u64>,
    pub following: Option<u64>,
    pub repositories: Option<u64>,
    pub avatar: Option<String>,
}

pub struct Github;

fn valid_login(login: &str) -> bool {
    (1..=39).contains(&login.len())
        && !login.starts_with('-')
        && !login.ends_with('-')
        && login.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

impl Site for Github {
    fn name(&self) -> &str {
        "github"
    }

    fn info(&self) -> EndpointInfo {
        builtin_info(self.name(), "Public profile counters of a GitHub user", &["username"])
    }

    fn target(&self, params: &Params) -> Result<String> {
        let login = required(params, "username")?;
        if !valid_login(login) {
            return Err(AppError::InvalidParam("Invalid GitHub username".to_string()));
        }
        Ok(format!("https://github.com/{}", login))
    }

    fn extract(&self, html: &str) -> Result<Value> {
        let document = Html::parse_document(html);
        let s = &*SELECTORS;

        let login = select_text(&document, &s.login)
            .ok_or_else(|| AppError::ParseError("GitHub profile header not found".to_string()))?;
        let count = |selector: &Selector| {
            select_text(&document, selector).and_then(|text| parse_count(&text))
        };

        to_data(GithubProfile {
            login,
            name: select_text(&document, &s.name),
            bio: select_text(&document, &s.bio),
            followers: count(&s.followers),
            following: count(&s.following),
            repositories: count(&s.repositories),
            avatar: select_attr(&document, &s.avatar, "src"),
        })
    }
}
