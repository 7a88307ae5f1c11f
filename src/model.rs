use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Replace the `:` separator used in raw Scholar ids so the id can be used as
/// a file name.
pub fn sanitize_id(raw: &str) -> String {
    raw.replace(':', "_")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorRecord {
    pub scholar_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub affiliation: String,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub citedby: u64,
}

impl AuthorRecord {
    /// Zero-valued record for a bare identifier; `fill` replaces every field.
    pub fn placeholder(scholar_id: &str) -> Self {
        Self {
            scholar_id: scholar_id.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicationRecord {
    pub author_pub_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub year: Option<u32>,
    #[serde(default)]
    pub num_citations: u64,
}

impl PublicationRecord {
    pub fn file_key(&self) -> String {
        sanitize_id(&self.author_pub_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScholarData {
    pub author: AuthorRecord,
    #[serde(default)]
    pub publications: Vec<PublicationRecord>,
}

/// Peer review count as shown on the profile. Non-numeric text is kept verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ReviewCount {
    Count(u64),
    Raw(String),
}

impl ReviewCount {
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        let digits: String = trimmed.chars().filter(|c| *c != ',').collect();
        match digits.parse::<u64>() {
            Ok(n) => ReviewCount::Count(n),
            Err(_) => ReviewCount::Raw(trimmed.to_string()),
        }
    }
}

impl std::fmt::Display for ReviewCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReviewCount::Count(n) => write!(f, "{}", n),
            ReviewCount::Raw(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReviewData {
    pub review_count: ReviewCount,
}

/// Outcome of one source in one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus<P> {
    NotAttempted,
    Processing,
    Success {
        message: String,
        data: P,
    },
    Failed {
        error: String,
    },
    Skipped {
        reason: String,
    },
}

impl<P> Default for SourceStatus<P> {
    fn default() -> Self {
        SourceStatus::NotAttempted
    }
}

impl<P> SourceStatus<P> {
    pub fn is_success(&self) -> bool {
        matches!(self, SourceStatus::Success { .. })
    }

    pub fn data(&self) -> Option<&P> {
        match self {
            SourceStatus::Success { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::NotAttempted => "not_attempted",
            SourceStatus::Processing => "processing",
            SourceStatus::Success { .. } => "success",
            SourceStatus::Failed { .. } => "failed",
            SourceStatus::Skipped { .. } => "skipped",
        }
    }

    /// Human readable message, error or skip reason.
    pub fn detail(&self) -> &str {
        match self {
            SourceStatus::Success { message, .. } => message,
            SourceStatus::Failed { error } => error,
            SourceStatus::Skipped { reason } => reason,
            SourceStatus::NotAttempted | SourceStatus::Processing => "",
        }
    }
}

pub type ScholarStatus = SourceStatus<ScholarData>;
pub type ReviewStatus = SourceStatus<ReviewData>;

/// Latest known-good data per source, as persisted between runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconciledSnapshot {
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub google_scholar: ScholarStatus,
    #[serde(default)]
    pub web_of_science: ReviewStatus,
}
