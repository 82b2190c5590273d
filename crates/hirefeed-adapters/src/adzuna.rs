//! Adzuna adapter. Needs an app id and key.

use std::sync::Arc;

use async_trait::async_trait;
use hirefeed_core::{EmploymentType, NewFeedJob, Profile};
use hirefeed_storage::HttpFetcher;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::planner::{self, PlanBuilder, FALLBACK_QUERY};
use crate::text::{self, id_string, null_as_default};
use crate::{
    non_blank, wrong_query, AdapterContext, AdapterError, ProviderQuery, RawListing,
    SourceAdapter, Source,
};

const API_BASE: &str = "https://api.adzuna.com/v1/api/jobs";

pub const MAX_QUERIES: usize = 6;
const MAX_RESULTS_PER_PAGE: u32 = 50;
const DEFAULT_RESULTS_PER_PAGE: u32 = 25;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdzunaQuery {
    /// Sent as `what`.
    pub keywords: String,
    /// Sent as `where`; empty for remote searches.
    pub location: String,
    pub country: String,
    pub results_per_page: u32,
    pub max_days_old: u32,
    pub full_time: bool,
    pub salary_min: i64,
}

impl AdzunaQuery {
    pub fn new(keywords: &str, location: &str) -> Self {
        Self {
            keywords: keywords.to_string(),
            location: location.to_string(),
            country: "us".to_string(),
            results_per_page: MAX_RESULTS_PER_PAGE,
            max_days_old: 30,
            full_time: true,
            salary_min: 0,
        }
    }

    fn params(&self, app_id: &str, app_key: &str) -> Vec<(&'static str, String)> {
        let per_page = if self.results_per_page == 0 || self.results_per_page > MAX_RESULTS_PER_PAGE
        {
            DEFAULT_RESULTS_PER_PAGE
        } else {
            self.results_per_page
        };
        let mut params = vec![
            ("app_id", app_id.to_string()),
            ("app_key", app_key.to_string()),
            ("results_per_page", per_page.to_string()),
            ("sort_by", "date".to_string()),
            ("content-type", "application/json".to_string()),
        ];
        if !self.keywords.is_empty() {
            params.push(("what", self.keywords.clone()));
        }
        if !self.location.is_empty() {
            params.push(("where", self.location.clone()));
        }
        if self.max_days_old > 0 {
            params.push(("max_days_old", self.max_days_old.to_string()));
        }
        if self.full_time {
            params.push(("full_time", "1".to_string()));
        }
        if self.salary_min > 0 {
            params.push(("salary_min", self.salary_min.to_string()));
        }
        params
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdzunaCompany {
    #[serde(default, deserialize_with = "null_as_default")]
    pub display_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdzunaLocation {
    #[serde(default, deserialize_with = "null_as_default")]
    pub display_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub area: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdzunaJob {
    #[serde(default, deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub company: AdzunaCompany,
    #[serde(default, deserialize_with = "null_as_default")]
    pub location: AdzunaLocation,
    #[serde(default)]
    pub salary_min: Option<f64>,
    #[serde(default)]
    pub salary_max: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub redirect_url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub contract_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub contract_time: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    results: Vec<AdzunaJob>,
}

pub fn parse_response(body: &[u8]) -> Result<Vec<AdzunaJob>, AdapterError> {
    let text = String::from_utf8_lossy(body);
    let response: SearchResponse =
        serde_json::from_str(&text).map_err(|e| AdapterError::Payload(Source::Adzuna, e))?;
    Ok(response.results)
}

/// Remote users search "<keywords> remote" nationwide; others search their location.
pub fn plan(profile: &Profile) -> Vec<AdzunaQuery> {
    let remote = profile.is_remote();
    let location = profile.location.trim().to_string();
    let salary_min = profile.salary_min.max(0);
    let query = |keywords: &str| {
        let mut q = if remote {
            AdzunaQuery::new(&format!("{keywords} remote"), "")
        } else {
            AdzunaQuery::new(keywords, &location)
        };
        q.salary_min = salary_min;
        q
    };

    let mut plan = PlanBuilder::new(MAX_QUERIES);
    for role in planner::target_roles(profile) {
        plan.push(role, query);
    }
    plan.fill_below(4, planner::skill_chunk(profile, 0, 3), query);
    plan.fill_below(5, planner::recent_titles(profile, 1), query);
    if plan.is_empty() {
        plan.push(FALLBACK_QUERY, query);
        plan.push("developer", query);
    }
    plan.finish()
}

fn location_text(location: &AdzunaLocation) -> String {
    let display = location.display_name.trim();
    if !display.is_empty() {
        return display.to_string();
    }
    location
        .area
        .iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

fn employment_type(job: &AdzunaJob) -> EmploymentType {
    if job.contract_type.eq_ignore_ascii_case("contract") {
        EmploymentType::Contract
    } else if job.contract_time.eq_ignore_ascii_case("part_time") {
        EmploymentType::PartTime
    } else {
        EmploymentType::FullTime
    }
}

pub fn normalize(job: AdzunaJob) -> NewFeedJob {
    let salary_min = job.salary_min.unwrap_or(0.0).max(0.0).round() as i64;
    let salary_max = job.salary_max.unwrap_or(0.0).max(0.0).round() as i64;
    let salary_text = if salary_min > 0 || salary_max > 0 {
        format!("${}k - ${}k/yr", salary_min / 1000, salary_max / 1000)
    } else {
        String::new()
    };
    NewFeedJob {
        source: Source::Adzuna.as_str().to_string(),
        external_id: text::namespace_id(Source::Adzuna, &job.id),
        title: text::strip_markup(&job.title),
        company: job.company.display_name.trim().to_string(),
        location: location_text(&job.location),
        salary_min,
        salary_max,
        salary_text,
        job_type: employment_type(&job),
        description: text::clean_description(&job.description),
        required_skills: Vec::new(),
        apply_url: job.redirect_url,
        company_logo: String::new(),
        posted_at: text::parse_posted_at(&job.created),
    }
}

pub struct AdzunaAdapter {
    http: Arc<HttpFetcher>,
    app_id: Option<String>,
    app_key: Option<String>,
}

impl AdzunaAdapter {
    pub fn new(http: Arc<HttpFetcher>, app_id: Option<String>, app_key: Option<String>) -> Self {
        Self {
            http,
            app_id: non_blank(app_id),
            app_key: non_blank(app_key),
        }
    }
}

#[async_trait]
impl SourceAdapter for AdzunaAdapter {
    fn source(&self) -> Source {
        Source::Adzuna
    }

    fn enabled(&self) -> bool {
        self.app_id.is_some() && self.app_key.is_some()
    }

    fn plan(&self, profile: &Profile) -> Vec<ProviderQuery> {
        plan(profile).into_iter().map(ProviderQuery::Adzuna).collect()
    }

    async fn search(
        &self,
        query: &ProviderQuery,
        ctx: &AdapterContext,
    ) -> Result<Vec<RawListing>, AdapterError> {
        let ProviderQuery::Adzuna(query) = query else {
            return Err(wrong_query(Source::Adzuna, query));
        };
        let (Some(app_id), Some(app_key)) = (self.app_id.as_deref(), self.app_key.as_deref())
        else {
            return Err(AdapterError::NotConfigured(Source::Adzuna));
        };

        let country = if query.country.trim().is_empty() {
            "us"
        } else {
            query.country.trim()
        };
        let url = Url::parse_with_params(
            &format!("{API_BASE}/{country}/search/1"),
            &query.params(app_id, app_key),
        )
        .map_err(|e| AdapterError::Url(e.to_string()))?;
        let response = self
            .http
            .get(Source::Adzuna.as_str(), url, &[], Some(ctx.deadline))
            .await?;
        let jobs = parse_response(&response.body)?;

        info!(
            source = "adzuna",
            keywords = %query.keywords,
            country,
            results = jobs.len(),
            "search complete"
        );
        Ok(jobs.into_iter().map(RawListing::Adzuna).collect())
    }
}
