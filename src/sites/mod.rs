//! Built-in endpoints, one module per target site, plus the rule-driven
//! endpoint backing admin-registered definitions.

pub mod github;
pub mod instagram;
pub mod mediafire;
pub mod rules;
pub mod steam;
pub mod tiktok;
pub mod youtube;

use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

use crate::error::{AppError, Result};

pub type Params = HashMap<String, String>;

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    Builtin,
    Custom,
}

#[derive(Serialize, Clone, Debug)]
pub struct EndpointInfo {
    pub name: String,
    pub description: String,
    pub params: Vec<String>,
    pub kind: EndpointKind,
}

/// One scraping endpoint.
pub trait Site: Send + Sync {
    fn name(&self) -> &str;

    fn info(&self) -> EndpointInfo;

    /// Validates the request parameters and returns the page to fetch.
    /// Runs before any network traffic.
    fn target(&self, params: &Params) -> Result<String>;

    /// Pulls fields out of a fetched page. Returns `ParseError` when the
    /// markup the site depends on is missing, which lets the caller try a
    /// heavier fetch strategy.
    fn extract(&self, html: &str) -> Result<Value>;
}

static BUILTINS: Lazy<Vec<Arc<dyn Site>>> = Lazy::new(|| {
    let sites: Vec<Arc<dyn Site>> = vec![
        Arc::new(mediafire::Mediafire),
        Arc::new(youtube::Youtube),
        Arc::new(tiktok::Tiktok),
        Arc::new(instagram::Instagram),
        Arc::new(steam::Steam),
        Arc::new(github::Github),
    ];
    sites
});

pub fn builtins() -> &'static [Arc<dyn Site>] {
    &BUILTINS
}

pub fn builtin(name: &str) -> Option<Arc<dyn Site>> {
    BUILTINS.iter().find(|site| site.name() == name).cloned()
}

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.iter().any(|site| site.name() == name)
}

pub(crate) fn builtin_info(name: &str, description: &str, params: &[&str]) -> EndpointInfo {
    EndpointInfo {
        name: name.to_string(),
        description: description.to_string(),
        params: params.iter().map(|p| p.to_string()).collect(),
        kind: EndpointKind::Builtin,
    }
}

/// The trimmed, non-empty value of `key`.
pub fn required<'a>(params: &'a Params, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::MissingParam(key.to_string()))
}

/// Parses an http(s) URL whose host is one of `domains` or a subdomain of one.
pub fn site_url(raw: &str, domains: &[&str], label: &str) -> Result<Url> {
    let invalid = || AppError::InvalidParam(format!("Invalid {} URL", label));
    let url = Url::parse(raw).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid());
    }
    let host = url.host_str().ok_or_else(invalid)?;
    if domains.iter().any(|domain| host_matches(host, domain)) {
        Ok(url)
    } else {
        Err(invalid())
    }
}

pub fn host_matches(host: &str, domain: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let domain = domain.to_ascii_lowercase();
    host == domain || host.ends_with(&format!(".{}", domain))
}

pub(crate) fn to_data<T: Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| AppError::ParseError(e.to_string()))
}
