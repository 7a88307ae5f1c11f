//! Google Scholar connector: author search and profile fill.
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, StatusCode, Url};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::error::FetchError;
use crate::model::{AuthorRecord, PublicationRecord, ScholarData};

const PAGE_SIZE: usize = 100;
const MAX_PAGES: usize = 20;

static SEARCH_HIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)class="gs_ai_name"><a href="[^"]*?user=([A-Za-z0-9_-]+)[^"]*">(.*?)</a>"#)
        .unwrap()
});
static PROFILE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)<div id="gsc_prf_in">(.*?)</div>"#).unwrap());
static AFFILIATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)<div class="gsc_prf_il">(.*?)</div>"#).unwrap());
static INTEREST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)<a[^>]*class="gsc_prf_inta[^"]*"[^>]*>(.*?)</a>"#).unwrap());
static CITED_BY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<td class="gsc_rsb_std">(\d+)</td>"#).unwrap());
static PUB_ROW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)<tr class="gsc_a_tr">(.*?)</tr>"#).unwrap());
static PUB_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"citation_for_view=([^"&]+)"#).unwrap());
static PUB_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)class="gsc_a_at">(.*?)</a>"#).unwrap());
static PUB_CITES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"class="gsc_a_ac gs_ibl">(\d*)</a>"#).unwrap());
static PUB_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"class="gsc_a_h gsc_a_hc gs_ibl">(\d*)</span>"#).unwrap());
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

#[async_trait]
pub trait ScholarSource: Send + Sync {
    /// First author matching `name`, or `None` when the search is empty.
    async fn search_author(&self, name: &str) -> Result<Option<AuthorRecord>, FetchError>;

    /// Fetch totals and publications for `author.scholar_id`.
    async fn fill(&self, author: AuthorRecord) -> Result<ScholarData, FetchError>;
}

/// Capped exponential backoff: `base * 2^attempt`, at most `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            max_attempts: cfg.scholar.max_attempts,
            base: Duration::from_millis(cfg.scholar.base_backoff_ms),
            max: Duration::from_secs(cfg.scholar.max_backoff_seconds),
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let delay = self.base.saturating_mul(1_u32 << attempt.min(10));
        if self.max.is_zero() {
            delay
        } else {
            delay.min(self.max)
        }
    }
}

#[derive(Clone)]
pub struct ScholarClient {
    http: Client,
    base_url: Url,
    retry: RetryPolicy,
}

impl fmt::Debug for ScholarClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScholarClient")
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ScholarClient {
    pub fn new(http: Client, base_url: Url, retry: RetryPolicy) -> Self {
        Self {
            http,
            base_url,
            retry,
        }
    }

    pub fn from_config(http: Client, cfg: &Config) -> Result<Self, FetchError> {
        let base_url = Url::parse(&cfg.scholar.base_url)
            .map_err(|e| FetchError::Unexpected(format!("invalid scholar.base_url: {}", e)))?;
        Ok(Self::new(http, base_url, RetryPolicy::from_config(cfg)))
    }

    pub fn search_url(&self, name: &str) -> Result<Url, FetchError> {
        let mut url = self
            .base_url
            .join("citations")
            .map_err(|e| FetchError::Unexpected(format!("invalid Scholar base URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("view_op", "search_authors")
            .append_pair("hl", "en")
            .append_pair("mauthors", name);
        Ok(url)
    }

    pub fn profile_url(&self, scholar_id: &str, cstart: usize) -> Result<Url, FetchError> {
        let mut url = self
            .base_url
            .join("citations")
            .map_err(|e| FetchError::Unexpected(format!("invalid Scholar base URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("user", scholar_id)
            .append_pair("hl", "en")
            .append_pair("cstart", &cstart.to_string())
            .append_pair("pagesize", &PAGE_SIZE.to_string());
        Ok(url)
    }

    /// GET with the retry budget. Throttling, server errors, transport errors
    /// and captcha pages are retried; any other status fails immediately.
    async fn get_with_retry(&self, url: &Url) -> Result<String, FetchError> {
        let mut last_error = String::new();
        for attempt in 0..self.retry.max_attempts {
            match self.http.get(url.clone()).send().await {
                Ok(res) if res.status().is_success() => {
                    let body = res.text().await?;
                    if is_captcha(&body) {
                        last_error = "captcha challenge".into();
                    } else {
                        return Ok(body);
                    }
                }
                Ok(res) if is_retryable(res.status()) => {
                    last_error = format!("status {}", res.status());
                }
                Ok(res) => {
                    let status = res.status();
                    let body = res.text().await.unwrap_or_default();
                    return Err(FetchError::Unexpected(format!(
                        "scholar error {}: {}",
                        status,
                        body.chars().take(200).collect::<String>()
                    )));
                }
                Err(err) => last_error = err.to_string(),
            }

            if attempt + 1 < self.retry.max_attempts {
                let delay = self.retry.delay(attempt);
                warn!(%url, attempt, ?delay, last_error = %last_error, "scholar request failed; backoff");
                tokio::time::sleep(delay).await;
            }
        }
        Err(FetchError::RetryBudgetExceeded {
            attempts: self.retry.max_attempts,
            last_error,
        })
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_captcha(body: &str) -> bool {
    body.contains("gs_captcha_f") || body.contains("not a robot")
}

#[async_trait]
impl ScholarSource for ScholarClient {
    #[instrument(skip(self))]
    async fn search_author(&self, name: &str) -> Result<Option<AuthorRecord>, FetchError> {
        let url = self.search_url(name)?;
        let body = self.get_with_retry(&url).await?;
        Ok(parse_search(&body))
    }

    #[instrument(skip_all, fields(scholar_id = %author.scholar_id))]
    async fn fill(&self, author: AuthorRecord) -> Result<ScholarData, FetchError> {
        let mut filled = author;
        let mut publications = Vec::new();
        let mut seen = HashSet::new();

        for page in 0..MAX_PAGES {
            let url = self.profile_url(&filled.scholar_id, page * PAGE_SIZE)?;
            let body = self.get_with_retry(&url).await?;
            if page == 0 {
                parse_profile(&body, &mut filled)?;
            }
            let rows = parse_publications(&body);
            let count = rows.len();
            debug!(page, count, "parsed publication page");
            publications.extend(rows.into_iter().filter(|p| seen.insert(p.author_pub_id.clone())));
            if count < PAGE_SIZE {
                break;
            }
        }

        info!(
            citedby = filled.citedby,
            publications = publications.len(),
            "filled author"
        );
        Ok(ScholarData {
            author: filled,
            publications,
        })
    }
}

pub fn parse_search(body: &str) -> Option<AuthorRecord> {
    SEARCH_HIT.captures(body).map(|caps| AuthorRecord {
        scholar_id: caps[1].to_string(),
        name: clean_text(&caps[2]),
        ..Default::default()
    })
}

/// Fails on pages without the profile name and citation cells, such as
/// consent or interstitial pages served with a 200.
pub fn parse_profile(body: &str, author: &mut AuthorRecord) -> Result<(), FetchError> {
    let (Some(name), Some(cited)) = (PROFILE_NAME.captures(body), CITED_BY.captures(body)) else {
        return Err(FetchError::Unexpected(
            "unrecognized Scholar profile page".to_string(),
        ));
    };
    author.name = clean_text(&name[1]);
    author.citedby = cited[1]
        .parse()
        .map_err(|err| FetchError::Unexpected(format!("bad citation count: {}", err)))?;
    if let Some(caps) = AFFILIATION.captures(body) {
        author.affiliation = clean_text(&caps[1]);
    }
    author.interests = INTEREST
        .captures_iter(body)
        .map(|caps| clean_text(&caps[1]))
        .filter(|s| !s.is_empty())
        .collect();
    Ok(())
}

pub fn parse_publications(body: &str) -> Vec<PublicationRecord> {
    PUB_ROW
        .captures_iter(body)
        .filter_map(|row| {
            let row = row.get(1)?.as_str();
            let author_pub_id = PUB_ID.captures(row)?[1].to_string();
            let title = PUB_TITLE
                .captures(row)
                .map(|c| clean_text(&c[1]))
                .unwrap_or_default();
            let num_citations = PUB_CITES
                .captures(row)
                .and_then(|c| c[1].parse().ok())
                .unwrap_or(0);
            let year = PUB_YEAR.captures(row).and_then(|c| c[1].parse().ok());
            Some(PublicationRecord {
                author_pub_id,
                title,
                year,
                num_citations,
            })
        })
        .collect()
}

fn clean_text(raw: &str) -> String {
    let text = TAG.replace_all(raw, "");
    html_escape::decode_html_entities(&text).trim().to_string()
}
