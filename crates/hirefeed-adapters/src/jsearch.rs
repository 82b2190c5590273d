//! JSearch (RapidAPI) adapter.

use std::sync::Arc;

use async_trait::async_trait;
use hirefeed_core::{EmploymentType, NewFeedJob, Profile};
use hirefeed_storage::HttpFetcher;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::planner::{self, PlanBuilder, FALLBACK_QUERY};
use crate::text::{self, null_as_default, HOURS_PER_YEAR};
use crate::{
    non_blank, wrong_query, AdapterContext, AdapterError, ProviderQuery, RawListing,
    SourceAdapter, Source,
};

const ENDPOINT: &str = "https://jsearch.p.rapidapi.com/search";
const API_HOST: &str = "jsearch.p.rapidapi.com";

pub const MAX_QUERIES: usize = 8;
pub const MAX_PAGES: u32 = 5;
/// A page shorter than this is the last one.
const FULL_PAGE: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JSearchQuery {
    pub query: String,
    pub location: String,
    pub remote_only: bool,
    pub num_pages: u32,
}

impl JSearchQuery {
    /// Free-text query as sent to the API.
    pub fn search_text(&self) -> String {
        if self.remote_only {
            format!("{} remote", self.query)
        } else if !self.location.trim().is_empty() {
            format!("{} in {}", self.query, self.location.trim())
        } else {
            self.query.clone()
        }
    }

    fn page_budget(&self) -> u32 {
        if self.num_pages == 0 || self.num_pages > MAX_PAGES {
            1
        } else {
            self.num_pages
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JSearchJob {
    #[serde(default, deserialize_with = "null_as_default")]
    pub job_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub job_title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub employer_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub employer_logo: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub job_city: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub job_state: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub job_country: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub job_is_remote: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub job_description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub job_employment_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub job_apply_link: String,
    #[serde(default)]
    pub job_min_salary: Option<f64>,
    #[serde(default)]
    pub job_max_salary: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub job_salary_period: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub job_posted_at_datetime_utc: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub job_required_skills: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    data: Vec<JSearchJob>,
}

pub fn parse_response(body: &[u8]) -> Result<Vec<JSearchJob>, AdapterError> {
    let text = String::from_utf8_lossy(body);
    let response: SearchResponse =
        serde_json::from_str(&text).map_err(|e| AdapterError::Payload(Source::JSearch, e))?;
    Ok(response.data)
}

/// Roles get three pages each; skill and title queries two.
pub fn plan(profile: &Profile) -> Vec<JSearchQuery> {
    let location = profile.location.trim().to_string();
    let remote_only = profile.is_remote();
    let query = |pages: u32| {
        let location = location.clone();
        move |text: &str| JSearchQuery {
            query: text.to_string(),
            location: location.clone(),
            remote_only,
            num_pages: pages,
        }
    };

    let mut plan = PlanBuilder::new(MAX_QUERIES);
    for role in planner::target_roles(profile) {
        plan.push(role, query(3));
    }
    if let Some(skills) = planner::skill_chunk(profile, 0, 3) {
        plan.fill_below(4, [format!("{skills} developer")], query(2));
    }
    if let Some(skills) = planner::skill_chunk(profile, 3, 3) {
        plan.fill_below(5, [format!("{skills} engineer")], query(2));
    }
    plan.fill_below(6, planner::recent_titles(profile, 2), query(2));
    if plan.is_empty() {
        plan.push(FALLBACK_QUERY, query(2));
    }
    plan.finish()
}

fn location_text(job: &JSearchJob) -> String {
    let mut parts = Vec::new();
    if job.job_is_remote {
        parts.push("Remote".to_string());
    }
    let city = job.job_city.trim();
    let state = job.job_state.trim();
    if !city.is_empty() {
        if state.is_empty() {
            parts.push(city.to_string());
        } else {
            parts.push(format!("{city}, {state}"));
        }
    }
    if parts.is_empty() {
        return [state, job.job_country.trim()]
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(", ");
    }
    parts.join(" / ")
}

/// Numeric yearly bounds plus display text in the provider's unit.
fn salary(job: &JSearchJob) -> (i64, i64, String) {
    let min = job.job_min_salary.unwrap_or(0.0).max(0.0).round() as i64;
    let max = job.job_max_salary.unwrap_or(0.0).max(0.0).round() as i64;
    if min == 0 && max == 0 {
        return (0, 0, String::new());
    }
    match job.job_salary_period.trim().to_ascii_uppercase().as_str() {
        "HOUR" => (
            min.saturating_mul(HOURS_PER_YEAR),
            max.saturating_mul(HOURS_PER_YEAR),
            format!("${min} - ${max}/hr"),
        ),
        "MONTH" => (
            min.saturating_mul(12),
            max.saturating_mul(12),
            format!("${min} - ${max}/mo"),
        ),
        "YEAR" => (min, max, format!("${}k - ${}k/yr", min / 1000, max / 1000)),
        _ => (min, max, String::new()),
    }
}

fn employment_type(raw: &str) -> EmploymentType {
    let compact: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_uppercase();
    match compact.as_str() {
        "PARTTIME" => EmploymentType::PartTime,
        "CONTRACTOR" | "CONTRACT" => EmploymentType::Contract,
        "INTERN" | "INTERNSHIP" => EmploymentType::Internship,
        _ => EmploymentType::FullTime,
    }
}

pub fn normalize(job: JSearchJob) -> NewFeedJob {
    let location = location_text(&job);
    let (salary_min, salary_max, salary_text) = salary(&job);
    NewFeedJob {
        source: Source::JSearch.as_str().to_string(),
        external_id: text::namespace_id(Source::JSearch, &job.job_id),
        title: job.job_title.trim().to_string(),
        company: job.employer_name.trim().to_string(),
        location,
        salary_min,
        salary_max,
        salary_text,
        job_type: employment_type(&job.job_employment_type),
        description: text::clean_description(&job.job_description),
        required_skills: job.job_required_skills,
        apply_url: job.job_apply_link,
        company_logo: job.employer_logo,
        posted_at: text::parse_posted_at(&job.job_posted_at_datetime_utc),
    }
}

pub struct JSearchAdapter {
    http: Arc<HttpFetcher>,
    api_key: Option<String>,
}

impl JSearchAdapter {
    pub fn new(http: Arc<HttpFetcher>, api_key: Option<String>) -> Self {
        Self {
            http,
            api_key: non_blank(api_key),
        }
    }

    async fn fetch_page(
        &self,
        api_key: &str,
        query: &JSearchQuery,
        page: u32,
        ctx: &AdapterContext,
    ) -> Result<Vec<JSearchJob>, AdapterError> {
        let mut params = vec![
            ("query", query.search_text()),
            ("page", page.to_string()),
            ("num_pages", "1".to_string()),
            ("date_posted", "month".to_string()),
        ];
        if query.remote_only {
            params.push(("remote_jobs_only", "true".to_string()));
        }
        let url = Url::parse_with_params(ENDPOINT, &params)
            .map_err(|e| AdapterError::Url(e.to_string()))?;
        let headers = [
            ("x-rapidapi-host", API_HOST.to_string()),
            ("x-rapidapi-key", api_key.to_string()),
        ];
        let response = self
            .http
            .get(Source::JSearch.as_str(), url, &headers, Some(ctx.deadline))
            .await?;
        parse_response(&response.body)
    }
}

#[async_trait]
impl SourceAdapter for JSearchAdapter {
    fn source(&self) -> Source {
        Source::JSearch
    }

    fn enabled(&self) -> bool {
        self.api_key.is_some()
    }

    fn plan(&self, profile: &Profile) -> Vec<ProviderQuery> {
        plan(profile).into_iter().map(ProviderQuery::JSearch).collect()
    }

    /// Fetches one page at a time, stopping at the first short page. A failure
    /// after the first page keeps what was already collected.
    async fn search(
        &self,
        query: &ProviderQuery,
        ctx: &AdapterContext,
    ) -> Result<Vec<RawListing>, AdapterError> {
        let ProviderQuery::JSearch(query) = query else {
            return Err(wrong_query(Source::JSearch, query));
        };
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(AdapterError::NotConfigured(Source::JSearch))?;

        let pages = query.page_budget();
        let mut results = Vec::new();
        for page in 1..=pages {
            let jobs = match self.fetch_page(api_key, query, page, ctx).await {
                Ok(jobs) => jobs,
                Err(err) if page == 1 => return Err(err),
                Err(err) => {
                    warn!(source = "jsearch", query = %query.query, page, error = %err, "page fetch failed, keeping earlier pages");
                    break;
                }
            };
            let short_page = jobs.len() < FULL_PAGE;
            results.extend(jobs.into_iter().map(RawListing::JSearch));
            if short_page {
                break;
            }
        }

        info!(source = "jsearch", query = %query.query, results = results.len(), pages, "search complete");
        Ok(results)
    }
}
