use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::Config;

pub const CITATIONS_LABEL: &str = "citations";
pub const REVIEWS_LABEL: &str = "peer reviews";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Badge {
    pub label: String,
    pub value: String,
    pub color: String,
}

impl Badge {
    pub fn new(label: &str, value: impl ToString, color: &str) -> Self {
        Self {
            label: label.to_string(),
            value: value.to_string(),
            color: color.to_string(),
        }
    }
}

#[async_trait]
pub trait BadgeRenderer: Send + Sync {
    async fn render(&self, badge: &Badge) -> Result<Vec<u8>>;
}

/// Renders badges through the shields.io static badge endpoint.
#[derive(Clone)]
pub struct ShieldsClient {
    http: Client,
    base_url: Url,
    style: String,
}

impl fmt::Debug for ShieldsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShieldsClient")
            .field("base_url", &self.base_url)
            .field("style", &self.style)
            .finish_non_exhaustive()
    }
}

impl ShieldsClient {
    pub fn new(http: Client, base_url: Url, style: String) -> Self {
        Self {
            http,
            base_url,
            style,
        }
    }

    pub fn from_config(http: Client, cfg: &Config) -> Result<Self> {
        let base_url = Url::parse(&cfg.badges.base_url).context("invalid badges.base_url")?;
        Ok(Self::new(http, base_url, cfg.badges.style.clone()))
    }

    /// `badge/<label>-<value>-_.svg?color=<color>&style=<style>`
    pub fn badge_url(&self, badge: &Badge) -> Result<Url> {
        let mut url = self.base_url.join("badge/").context("invalid badge base URL")?;
        let segment = format!("{}-{}-_.svg", escape(&badge.label), escape(&badge.value));
        url.path_segments_mut()
            .map_err(|_| anyhow!("badge base URL cannot have path segments"))?
            .pop_if_empty()
            .push(&segment);
        url.query_pairs_mut()
            .append_pair("color", &badge.color)
            .append_pair("style", &self.style);
        Ok(url)
    }
}

/// Dashes and underscores are separators in the badge path grammar.
fn escape(part: &str) -> String {
    part.replace('-', "--").replace('_', "__")
}

#[async_trait]
impl BadgeRenderer for ShieldsClient {
    async fn render(&self, badge: &Badge) -> Result<Vec<u8>> {
        let url = self.badge_url(badge)?;
        debug!(%url, "rendering badge");
        let res = self
            .http
            .get(url)
            .send()
            .await
            .context("failed to reach badge service")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("badge service error {}: {}", status, body));
        }
        let bytes = res.bytes().await.context("failed to read badge body")?;
        Ok(bytes.to_vec())
    }
}

/// Render every badge first, then write them, so a failed render leaves no
/// partial set on disk. Returns the written paths in input order.
pub async fn render_all(
    renderer: &dyn BadgeRenderer,
    out_dir: &Path,
    badges: &[(String, Badge)],
) -> Result<Vec<PathBuf>> {
    let mut rendered = Vec::with_capacity(badges.len());
    for (key, badge) in badges {
        let bytes = renderer
            .render(badge)
            .await
            .with_context(|| format!("failed to render badge {}", key))?;
        rendered.push((out_dir.join(format!("{}.svg", key)), bytes));
    }

    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("failed to create output dir: {}", out_dir.display()))?;
    let mut paths = Vec::with_capacity(rendered.len());
    for (path, bytes) in rendered {
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("failed to write badge: {}", path.display()))?;
        paths.push(path);
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ShieldsClient {
        ShieldsClient::new(
            Client::new(),
            Url::parse("https://img.shields.io/").unwrap(),
            "flat-square".into(),
        )
    }

    #[test]
    fn badge_url_matches_static_badge_format() {
        let url = client()
            .badge_url(&Badge::new(CITATIONS_LABEL, 42, "3388ee"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://img.shields.io/badge/citations-42-_.svg?color=3388ee&style=flat-square"
        );
    }

    #[test]
    fn badge_url_escapes_separators_and_spaces() {
        let url = client()
            .badge_url(&Badge::new(REVIEWS_LABEL, "n-a_b", "8A2BE2"))
            .unwrap();
        assert_eq!(url.path(), "/badge/peer%20reviews-n--a__b-_.svg");
        assert_eq!(url.query(), Some("color=8A2BE2&style=flat-square"));
    }
}
