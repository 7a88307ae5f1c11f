//! Acquisition pipeline: fetch each source, write its badges and turn every
//! failure into a `Failed` status so reconciliation always runs.
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use crate::badge::{render_all, Badge, BadgeRenderer, CITATIONS_LABEL, REVIEWS_LABEL};
use crate::config::Config;
use crate::error::FetchError;
use crate::model::{
    AuthorRecord, ReviewCount, ReviewData, ReviewStatus, ScholarData, ScholarStatus, SourceStatus,
};
use crate::scholar::ScholarSource;
use crate::webdriver::{BrowserLauncher, BrowserSession};

pub const PEER_REVIEW_LABEL: &str = "Verified peer reviews";
pub const TOTAL_BADGE_KEY: &str = "all";
pub const REVIEW_BADGE_KEY: &str = "review";

/// How Source A should locate the author. An identifier always wins over a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorQuery {
    Id(String),
    Name(String),
    Missing,
}

impl AuthorQuery {
    pub fn from_args(name: Option<&str>, scholar_id: Option<&str>) -> Self {
        let non_empty = |s: &&str| !s.trim().is_empty();
        match (scholar_id.filter(non_empty), name.filter(non_empty)) {
            (Some(id), name) => {
                if name.is_some() {
                    info!(scholar_id = id, "both name and identifier given; using identifier");
                }
                AuthorQuery::Id(id.trim().to_string())
            }
            (None, Some(name)) => AuthorQuery::Name(name.trim().to_string()),
            (None, None) => AuthorQuery::Missing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub author: AuthorQuery,
    pub wos_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub scholar: ScholarStatus,
    pub wos: ReviewStatus,
}

pub struct Pipeline<'a> {
    scholar: &'a dyn ScholarSource,
    browser: &'a dyn BrowserLauncher,
    badges: &'a dyn BadgeRenderer,
    out_dir: PathBuf,
    wos_base_url: String,
    citation_color: String,
    review_color: String,
    poll: PollPolicy,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        cfg: &Config,
        scholar: &'a dyn ScholarSource,
        browser: &'a dyn BrowserLauncher,
        badges: &'a dyn BadgeRenderer,
    ) -> Self {
        Self {
            scholar,
            browser,
            badges,
            out_dir: cfg.app.output_path(),
            wos_base_url: cfg.web_of_science.base_url.clone(),
            citation_color: cfg.badges.citation_color.clone(),
            review_color: cfg.badges.review_color.clone(),
            poll: PollPolicy {
                attempts: cfg.web_of_science.poll_attempts,
                interval: cfg.web_of_science.poll_interval(),
            },
        }
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Runs Source A to completion, then Source B. Neither can stop the other.
    #[instrument(skip_all)]
    pub async fn run(&self, request: &RunRequest) -> RunOutcome {
        let scholar = self.fetch_source_a(&request.author).await;
        let wos = match request.wos_id.as_deref().filter(|id| !id.trim().is_empty()) {
            Some(id) => self.fetch_source_b(id.trim()).await,
            None => SourceStatus::Skipped {
                reason: "not provided".into(),
            },
        };
        RunOutcome { scholar, wos }
    }

    #[instrument(skip_all)]
    pub async fn fetch_source_a(&self, query: &AuthorQuery) -> ScholarStatus {
        info!(?query, "fetching Google Scholar");
        match self.try_fetch_source_a(query).await {
            Ok(data) => {
                let message = format!(
                    "{} citations across {} publications",
                    data.author.citedby,
                    data.publications.len()
                );
                info!(citedby = data.author.citedby, "Google Scholar succeeded");
                SourceStatus::Success { message, data }
            }
            Err(err) => {
                warn!(kind = err.kind(), %err, "Google Scholar failed");
                SourceStatus::Failed {
                    error: err.to_string(),
                }
            }
        }
    }

    async fn try_fetch_source_a(&self, query: &AuthorQuery) -> Result<ScholarData, FetchError> {
        let author = match query {
            AuthorQuery::Id(id) => AuthorRecord::placeholder(id),
            AuthorQuery::Name(name) => self
                .scholar
                .search_author(name)
                .await?
                .ok_or_else(|| FetchError::AuthorNotFound(name.clone()))?,
            AuthorQuery::Missing => {
                return Err(FetchError::Unexpected(
                    "no author name or identifier given".into(),
                ))
            }
        };

        let data = self.scholar.fill(author).await?;

        let mut badges = Vec::with_capacity(data.publications.len() + 1);
        badges.push((
            TOTAL_BADGE_KEY.to_string(),
            Badge::new(CITATIONS_LABEL, data.author.citedby, &self.citation_color),
        ));
        for publication in &data.publications {
            badges.push((
                publication.file_key(),
                Badge::new(CITATIONS_LABEL, publication.num_citations, &self.citation_color),
            ));
        }
        let written = render_all(self.badges, &self.out_dir, &badges).await?;
        info!(badges = written.len(), "citation badges written");
        Ok(data)
    }

    #[instrument(skip_all, fields(wos_id = record_id))]
    pub async fn fetch_source_b(&self, record_id: &str) -> ReviewStatus {
        info!("fetching Web of Science");
        let mut session = match self.browser.launch().await {
            Ok(session) => session,
            Err(err) => {
                warn!(?err, "failed to launch browser");
                return SourceStatus::Failed {
                    error: format!("{:#}", err),
                };
            }
        };

        let result = self.drive_source_b(session.as_mut(), record_id).await;
        if let Err(err) = session.close().await {
            error!(?err, "failed to close browser session");
        }

        match result {
            Ok(count) => {
                info!(%count, "Web of Science succeeded");
                SourceStatus::Success {
                    message: format!("{} verified peer reviews", count),
                    data: ReviewData {
                        review_count: count,
                    },
                }
            }
            Err(err) => {
                warn!(kind = err.kind(), %err, "Web of Science failed");
                SourceStatus::Failed {
                    error: err.to_string(),
                }
            }
        }
    }

    async fn drive_source_b(
        &self,
        session: &mut dyn BrowserSession,
        record_id: &str,
    ) -> Result<ReviewCount, FetchError> {
        let url = format!(
            "{}/wos/author/record/{}",
            self.wos_base_url.trim_end_matches('/'),
            record_id
        );
        session.navigate(&url).await?;

        let text = poll_labeled_count(session, PEER_REVIEW_LABEL, self.poll).await?;
        let count = ReviewCount::parse(&text);

        let badge = Badge::new(REVIEWS_LABEL, &count, &self.review_color);
        render_all(
            self.badges,
            &self.out_dir,
            &[(REVIEW_BADGE_KEY.to_string(), badge)],
        )
        .await?;
        Ok(count)
    }
}

/// Polls for `label` at most `poll.attempts` times, sleeping `poll.interval`
/// between attempts. Lookup errors count as a missed attempt; the last one
/// is kept in the timeout reason.
pub async fn poll_labeled_count(
    session: &mut dyn BrowserSession,
    label: &str,
    poll: PollPolicy,
) -> Result<String, FetchError> {
    let mut last_error = String::from("no attempt made");
    for attempt in 1..=poll.attempts {
        match session.labeled_count(label).await {
            Ok(text) => return Ok(text),
            Err(err) => {
                info!(attempt, max = poll.attempts, %err, "waiting for page to render");
                last_error = format!("{:#}", err);
            }
        }
        if attempt < poll.attempts {
            tokio::time::sleep(poll.interval).await;
        }
    }
    Err(FetchError::Timeout {
        label: label.to_string(),
        attempts: poll.attempts,
        last_error,
    })
}
