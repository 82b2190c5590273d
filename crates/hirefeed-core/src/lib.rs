//! Core domain model for HireFeed: profiles, canonical feed jobs and per-user links.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod scoring;

pub use scoring::{score_match, ScoringWeights};

pub const CRATE_NAME: &str = "hirefeed-core";

/// Label written to the refresh log for a combined multi-provider refresh.
pub const MULTI_SOURCE_LABEL: &str = "multi-source";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkStyle {
    Remote,
    Onsite,
    Hybrid,
}

impl WorkStyle {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "remote" => Some(Self::Remote),
            "onsite" | "on-site" | "office" => Some(Self::Onsite),
            "hybrid" => Some(Self::Hybrid),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Onsite => "onsite",
            Self::Hybrid => "hybrid",
        }
    }
}

/// Scoring and planning view of a user's profile. Owned by the profile subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: Uuid,
    #[serde(default)]
    pub target_roles: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub work_style: Option<WorkStyle>,
    /// Yearly salary floor; 0 when unset.
    #[serde(default)]
    pub salary_min: i64,
    #[serde(default)]
    pub salary_max: i64,
    /// Past role titles, most recent first.
    #[serde(default)]
    pub experience_titles: Vec<String>,
}

impl Profile {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            ..Default::default()
        }
    }

    pub fn is_remote(&self) -> bool {
        self.work_style == Some(WorkStyle::Remote)
    }

    pub fn is_onsite_only(&self) -> bool {
        self.work_style == Some(WorkStyle::Onsite)
    }

    /// True when a field that feeds the match score or the query plan differs.
    pub fn scoring_fields_changed(&self, other: &Profile) -> bool {
        self.target_roles != other.target_roles
            || self.skills != other.skills
            || self.location != other.location
            || self.work_style != other.work_style
            || self.salary_min != other.salary_min
            || self.salary_max != other.salary_max
            || self.experience_titles != other.experience_titles
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmploymentType {
    #[default]
    FullTime,
    PartTime,
    Contract,
    Internship,
}

impl EmploymentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FullTime => "full-time",
            Self::PartTime => "part-time",
            Self::Contract => "contract",
            Self::Internship => "internship",
        }
    }

    /// Reads a stored canonical value, falling back to full-time.
    pub fn from_canonical(value: &str) -> Self {
        match value {
            "part-time" => Self::PartTime,
            "contract" => Self::Contract,
            "internship" => Self::Internship,
            _ => Self::FullTime,
        }
    }
}

/// Normalized listing produced by an adapter, before the cache assigns identity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NewFeedJob {
    pub source: String,
    pub external_id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub salary_min: i64,
    pub salary_max: i64,
    pub salary_text: String,
    pub job_type: EmploymentType,
    pub description: String,
    pub required_skills: Vec<String>,
    pub apply_url: String,
    pub company_logo: String,
    pub posted_at: Option<DateTime<Utc>>,
}

impl NewFeedJob {
    /// Strips characters the relational store rejects from every text field.
    pub fn sanitized(mut self) -> Self {
        for field in [
            &mut self.source,
            &mut self.external_id,
            &mut self.title,
            &mut self.company,
            &mut self.location,
            &mut self.salary_text,
            &mut self.description,
            &mut self.apply_url,
            &mut self.company_logo,
        ] {
            *field = sanitize_text(field);
        }
        self.required_skills = self
            .required_skills
            .iter()
            .map(|s| sanitize_text(s))
            .filter(|s| !s.is_empty())
            .collect();
        self
    }
}

/// Canonical job shared by every user; identity is `(source, external_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedJob {
    pub id: Uuid,
    pub source: String,
    pub external_id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub salary_min: i64,
    pub salary_max: i64,
    pub salary_text: String,
    pub job_type: EmploymentType,
    pub description: String,
    pub required_skills: Vec<String>,
    pub apply_url: String,
    pub company_logo: String,
    pub posted_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl FeedJob {
    pub fn from_new(
        id: Uuid,
        job: NewFeedJob,
        fetched_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            source: job.source,
            external_id: job.external_id,
            title: job.title,
            company: job.company,
            location: job.location,
            salary_min: job.salary_min,
            salary_max: job.salary_max,
            salary_text: job.salary_text,
            job_type: job.job_type,
            description: job.description,
            required_skills: job.required_skills,
            apply_url: job.apply_url,
            company_logo: job.company_logo,
            posted_at: job.posted_at,
            fetched_at,
            expires_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Display salary: provider text, else a "$Xk - $Yk" range from the bounds.
    pub fn salary_range_text(&self) -> String {
        if !self.salary_text.is_empty() {
            return self.salary_text.clone();
        }
        if self.salary_min > 0 {
            return format!("${}k - ${}k", self.salary_min / 1000, self.salary_max / 1000);
        }
        String::new()
    }
}

/// Per-user relationship to a canonical job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFeedLink {
    pub user_id: Uuid,
    pub feed_job_id: Uuid,
    pub match_score: u8,
    pub dismissed: bool,
    pub saved: bool,
    pub saved_job_id: Option<Uuid>,
}

impl UserFeedLink {
    pub fn new(user_id: Uuid, feed_job_id: Uuid, match_score: u8) -> Self {
        Self {
            user_id,
            feed_job_id,
            match_score,
            dismissed: false,
            saved: false,
            saved_job_id: None,
        }
    }
}

/// A feed job joined with the requesting user's link fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub job: FeedJob,
    pub link: UserFeedLink,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshLogEntry {
    pub user_id: Uuid,
    pub label: String,
    pub jobs_fetched: usize,
    pub jobs_new: usize,
    pub refreshed_at: DateTime<Utc>,
}

/// User-owned tracker record copied from a feed job by the save action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedJob {
    pub id: Uuid,
    pub user_id: Uuid,
    pub feed_job_id: Uuid,
    pub external_id: String,
    pub source: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub salary_range: String,
    pub job_type: EmploymentType,
    pub description: String,
    pub required_skills: Vec<String>,
    pub apply_url: String,
    pub company_logo: String,
    pub match_score: u8,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl TrackedJob {
    pub fn copy_of(
        job: &FeedJob,
        user_id: Uuid,
        match_score: u8,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            feed_job_id: job.id,
            external_id: job.external_id.clone(),
            source: job.source.clone(),
            title: job.title.clone(),
            company: job.company.clone(),
            location: job.location.clone(),
            salary_range: job.salary_range_text(),
            job_type: job.job_type,
            description: job.description.clone(),
            required_skills: job.required_skills.clone(),
            apply_url: job.apply_url.clone(),
            company_logo: job.company_logo.clone(),
            match_score,
            status: "saved".to_string(),
            created_at,
        }
    }
}

/// Removes NUL and other control characters, keeping newlines and tabs.
pub fn sanitize_text(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}
