use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use url::Url;

use super::{EndpointInfo, EndpointKind, Params, Site, host_matches, required};
use crate::error::{AppError, Result};
use crate::extract::{capture, collapse_whitespace, parse_selector};
use crate::registry::is_valid_name;

fn default_url_param() -> String {
    "url".to_string()
}

/// How to pull one output field out of a page.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct FieldRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(default)]
    pub required: bool,
}

/// An admin-registered endpoint, stored as `<name>.json`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EndpointDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_url_param")]
    pub url_param: String,
    #[serde(default)]
    pub allowed_hosts: Vec<String>,
    pub fields: BTreeMap<String, FieldRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl EndpointDefinition {
    pub fn info(&self) -> EndpointInfo {
        EndpointInfo {
            name: self.name.clone(),
            description: self.description.clone(),
            params: vec![self.url_param.clone()],
            kind: EndpointKind::Custom,
        }
    }
}

struct CompiledField {
    name: String,
    selector: Option<Selector>,
    attr: Option<String>,
    regex: Option<Regex>,
    required: bool,
}

/// Executes an [`EndpointDefinition`].
pub struct RuleSite {
    definition: EndpointDefinition,
    fields: Vec<CompiledField>,
}

impl RuleSite {
    pub fn compile(definition: EndpointDefinition) -> Result<Self> {
        if !is_valid_name(&definition.name) {
            return Err(AppError::InvalidParam(
                "Endpoint name may only contain letters, digits and underscores".to_string(),
            ));
        }
        if !is_valid_name(&definition.url_param) {
            return Err(AppError::InvalidDefinition(format!(
                "bad url_param `{}`",
                definition.url_param
            )));
        }
        if definition.fields.is_empty() {
            return Err(AppError::InvalidDefinition("no fields defined".to_string()));
        }

        let mut fields = Vec::with_capacity(definition.fields.len());
        for (name, rule) in &definition.fields {
            if rule.selector.is_none() && rule.regex.is_none() {
                return Err(AppError::InvalidDefinition(format!(
                    "field `{}` needs a selector or a regex",
                    name
                )));
            }
            let selector = rule.selector.as_deref().map(parse_selector).transpose()?;
            let regex = rule
                .regex
                .as_deref()
                .map(|pattern| {
                    Regex::new(pattern).map_err(|e| {
                        AppError::InvalidDefinition(format!("bad regex for `{}`: {}", name, e))
                    })
                })
                .transpose()?;
            fields.push(CompiledField {
                name: name.clone(),
                selector,
                attr: rule.attr.clone(),
                regex,
                required: rule.required,
            });
        }

        Ok(Self { definition, fields })
    }

    pub fn definition(&self) -> &EndpointDefinition {
        &self.definition
    }

    fn field_value(field: &CompiledField, document: &Html, html: &str) -> Option<String> {
        let source = match &field.selector {
            Some(selector) => {
                let element = document.select(selector).next()?;
                match &field.attr {
                    Some(attr) => element.value().attr(attr)?.trim().to_string(),
                    None => collapse_whitespace(&element.text().collect::<String>()),
                }
            }
            None => html.to_string(),
        };

        let value = match &field.regex {
            Some(re) => capture(re, &source)?,
            None => source,
        };
        (!value.is_empty()).then_some(value)
    }
}

impl Site for RuleSite {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn info(&self) -> EndpointInfo {
        self.definition.info()
    }

    fn target(&self, params: &Params) -> Result<String> {
        let raw = required(params, &self.definition.url_param)?;
        let invalid = || AppError::InvalidParam("Invalid URL format for this endpoint".to_string());
        let url = Url::parse(raw).map_err(|_| invalid())?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid());
        }
        let host = url.host_str().ok_or_else(invalid)?;
        let allowed = &self.definition.allowed_hosts;
        if !allowed.is_empty() && !allowed.iter().any(|domain| host_matches(host, domain)) {
            return Err(invalid());
        }
        Ok(url.to_string())
    }

    fn extract(&self, html: &str) -> Result<Value> {
        let document = Html::parse_document(html);
        let mut data = Map::new();

        for field in &self.fields {
            let value = Self::field_value(field, &document, html);
            if value.is_none() && field.required {
                return Err(AppError::ParseError(format!("field `{}` not found", field.name)));
            }
            data.insert(
                field.name.clone(),
                value.map(Value::String).unwrap_or(Value::Null),
            );
        }

        Ok(Value::Object(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition() -> EndpointDefinition {
        serde_json::from_value(serde_json::json!({
            "name": "blog_post",
            "description": "Title and author of a blog post",
            "allowed_hosts": ["blog.example.com"],
            "fields": {
                "title": { "selector": "h1.title", "required": true },
                "author": { "selector": "a[rel=author]", "attr": "href", "regex": "/authors/([a-z]+)" },
                "views": { "regex": "data-views=\"(\\d+)\"" }
            }
        }))
        .unwrap()
    }

    #[test]
    fn defaults_url_param() {
        let def = definition();
        assert_eq!(def.url_param, "url");
        assert_eq!(def.info().params, vec!["url".to_string()]);
        assert_eq!(def.info().kind, EndpointKind::Custom);
    }

    #[test]
    fn enforces_allowed_hosts() {
        let site = RuleSite::compile(definition()).unwrap();
        let mut params = Params::new();
        params.insert("url".into(), "https://blog.example.com/p/1".into());
        assert!(site.target(&params).is_ok());
        params.insert("url".into(), "https://evil.test/p/1".into());
        assert!(matches!(site.target(&params), Err(AppError::InvalidParam(_))));
    }

    #[test]
    fn extracts_fields_with_null_defaults() {
        let site = RuleSite::compile(definition()).unwrap();
        let data = site
            .extract(r#"<h1 class="title"> Hello
                World </h1><a rel="author" href="/authors/ada">Ada</a>"#)
            .unwrap();
        assert_eq!(data["title"], "Hello World");
        assert_eq!(data["author"], "ada");
        assert_eq!(data["views"], Value::Null);
    }

    #[test]
    fn missing_required_field_is_parse_error() {
        let site = RuleSite::compile(definition()).unwrap();
        assert!(matches!(
            site.extract("<p>nothing</p>"),
            Err(AppError::ParseError(_))
        ));
    }

    #[test]
    fn rejects_broken_rules() {
        let mut def = definition();
        def.fields.insert("bad".into(), FieldRule::default());
        assert!(matches!(RuleSite::compile(def), Err(AppError::InvalidDefinition(_))));

        let mut def = definition();
        def.fields.insert(
            "bad".into(),
            FieldRule {
                regex: Some("(unclosed".into()),
                ..FieldRule::default()
            },
        );
        assert!(matches!(RuleSite::compile(def), Err(AppError::InvalidDefinition(_))));

        let mut def = definition();
        def.name = "no-dashes".into();
        assert!(matches!(RuleSite::compile(def), Err(AppError::InvalidParam(_))));
    }
}
