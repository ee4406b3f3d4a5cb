use std::{
    fs,
    path::Path,
    str::FromStr,
    sync::{Arc, RwLock},
};

use anyhow::{anyhow, Context};
use axum::response::{Html, IntoResponse, Response};
use bigdecimal::{BigDecimal, RoundingMode};
use handlebars::handlebars_helper;
use serde::Serialize;

use crate::models;

const LAYOUT: &str = "base.layout.hbs";

/// Formats an amount with two decimals; anything unparsable is shown as is.
pub fn normalize_amount(v: &str) -> String {
    BigDecimal::from_str(v.trim())
        .map(|d| d.with_scale_round(2, RoundingMode::HalfUp).to_string())
        .unwrap_or_else(|_| v.to_string())
}

#[derive(Clone)]
pub struct Template {
    r: Arc<RwLock<handlebars::Handlebars<'static>>>,
}

#[derive(Serialize)]
struct Layout<'a> {
    title: &'a str,
    user: Option<&'a models::User>,
    content: String,
}

impl Template {
    /// Registers every file of `dir` under its file name.
    pub fn new(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        let mut handlebars = handlebars::Handlebars::new();
        for entity in fs::read_dir(dir).with_context(|| format!("cannot read templates from {}", dir.display()))? {
            let entity = entity?;
            let name = entity
                .file_name()
                .to_str()
                .ok_or_else(|| anyhow!("template name is not valid UTF-8"))?
                .to_string();
            if !name.ends_with(".hbs") {
                continue;
            }
            handlebars
                .register_template_file(&name, entity.path())
                .with_context(|| format!("cannot register template {name}"))?;
            log::debug!("template '{}' registered", name);
        }

        handlebars_helper!(nor_amt: |v: Json| normalize_amount(&match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }));
        handlebars.register_helper("nor_amt", Box::new(nor_amt));
        handlebars_helper!(json: |v: Json| v.to_string());
        handlebars.register_helper("json", Box::new(json));

        Ok(Self {
            r: Arc::new(RwLock::new(handlebars)),
        })
    }

    pub fn render_string<T>(&self, name: &str, data: &T) -> anyhow::Result<String>
    where
        T: Serialize,
    {
        let r = self.r.read().map_err(|_| anyhow!("template registry is poisoned"))?;
        r.render(name, data)
            .with_context(|| format!("failed to render template '{name}'"))
    }

    /// Renders a bare fragment, such as a table loaded into a page.
    pub fn render<T>(&self, name: &str, data: &T) -> anyhow::Result<Response>
    where
        T: Serialize,
    {
        Ok(Html(self.render_string(name, data)?).into_response())
    }

    /// Renders `name` inside the site layout.
    pub fn page<T>(&self, name: &str, title: &str, user: Option<&models::User>, data: &T) -> anyhow::Result<Response>
    where
        T: Serialize,
    {
        let content = self.render_string(name, data)?;
        let html = self.render_string(LAYOUT, &Layout { title, user, content })?;
        Ok(Html(html).into_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_get_two_decimals() {
        assert_eq!(normalize_amount("12.5"), "12.50");
        assert_eq!(normalize_amount("0.005"), "0.01");
        assert_eq!(normalize_amount("-3"), "-3.00");
        assert_eq!(normalize_amount("n/a"), "n/a");
    }
}
