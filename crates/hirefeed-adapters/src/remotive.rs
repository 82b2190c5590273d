//! Remotive adapter. Keyless; every listing is remote.

use std::sync::Arc;

use async_trait::async_trait;
use hirefeed_core::{EmploymentType, NewFeedJob, Profile};
use hirefeed_storage::HttpFetcher;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::planner::{self, PlanBuilder, FALLBACK_QUERY};
use crate::text::{self, id_string, null_as_default};
use crate::{wrong_query, AdapterContext, AdapterError, ProviderQuery, RawListing, SourceAdapter, Source};

const ENDPOINT: &str = "https://remotive.com/api/remote-jobs";

pub const MAX_QUERIES: usize = 6;
const SEARCH_LIMIT: u32 = 50;
const TITLE_LIMIT: u32 = 30;
const DEFAULT_LIMIT: u32 = 20;

/// Either a keyword search or a category filter.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemotiveQuery {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub category: String,
    pub limit: u32,
}

impl RemotiveQuery {
    pub fn search(text: &str, limit: u32) -> Self {
        Self {
            search: text.to_string(),
            limit,
            ..Default::default()
        }
    }

    pub fn category(slug: &str) -> Self {
        Self {
            category: slug.to_string(),
            limit: SEARCH_LIMIT,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemotiveJob {
    #[serde(default, deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub company_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub company_logo: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub category: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub job_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub publication_date: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub candidate_required_location: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub salary: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    jobs: Vec<RemotiveJob>,
}

pub fn parse_response(body: &[u8]) -> Result<Vec<RemotiveJob>, AdapterError> {
    let text = String::from_utf8_lossy(body);
    let response: SearchResponse =
        serde_json::from_str(&text).map_err(|e| AdapterError::Payload(Source::Remotive, e))?;
    Ok(response.jobs)
}

/// Plans nothing for onsite-only users.
pub fn plan(profile: &Profile) -> Vec<RemotiveQuery> {
    if profile.is_onsite_only() {
        return Vec::new();
    }

    let mut plan = PlanBuilder::new(MAX_QUERIES);
    for role in planner::target_roles(profile) {
        plan.push(role, |text| RemotiveQuery::search(text, SEARCH_LIMIT));
    }
    plan.fill_below(3, planner::skill_chunk(profile, 0, 3), |text| {
        RemotiveQuery::search(text, SEARCH_LIMIT)
    });
    let categories = planner::skill_categories(profile)
        .into_iter()
        .map(|slug| format!("category:{slug}"));
    plan.fill_below(5, categories, |key| {
        RemotiveQuery::category(key.trim_start_matches("category:"))
    });
    plan.fill_below(6, planner::recent_titles(profile, 1), |text| {
        RemotiveQuery::search(text, TITLE_LIMIT)
    });
    if plan.is_empty() {
        plan.push(FALLBACK_QUERY, |text| RemotiveQuery::search(text, SEARCH_LIMIT));
    }
    plan.finish()
}

fn location_text(required: &str) -> String {
    let required = required.trim();
    if required.is_empty()
        || required.eq_ignore_ascii_case("anywhere")
        || required.eq_ignore_ascii_case("worldwide")
    {
        "Remote".to_string()
    } else {
        format!("Remote / {required}")
    }
}

fn employment_type(raw: &str) -> EmploymentType {
    match raw.trim().to_ascii_lowercase().as_str() {
        "part_time" | "part-time" => EmploymentType::PartTime,
        "contract" | "freelance" => EmploymentType::Contract,
        "internship" => EmploymentType::Internship,
        _ => EmploymentType::FullTime,
    }
}

pub fn normalize(job: RemotiveJob) -> NewFeedJob {
    let salary_text = job.salary.trim().to_string();
    let (salary_min, salary_max) = text::parse_salary_text(&salary_text).unwrap_or((0, 0));
    NewFeedJob {
        source: Source::Remotive.as_str().to_string(),
        external_id: text::namespace_id(Source::Remotive, &job.id),
        title: job.title.trim().to_string(),
        company: job.company_name.trim().to_string(),
        location: location_text(&job.candidate_required_location),
        salary_min,
        salary_max,
        salary_text,
        job_type: employment_type(&job.job_type),
        description: text::clean_description(&job.description),
        required_skills: job.tags,
        apply_url: job.url,
        company_logo: job.company_logo,
        posted_at: text::parse_posted_at(&job.publication_date),
    }
}

pub struct RemotiveAdapter {
    http: Arc<HttpFetcher>,
}

impl RemotiveAdapter {
    pub fn new(http: Arc<HttpFetcher>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl SourceAdapter for RemotiveAdapter {
    fn source(&self) -> Source {
        Source::Remotive
    }

    fn plan(&self, profile: &Profile) -> Vec<ProviderQuery> {
        plan(profile).into_iter().map(ProviderQuery::Remotive).collect()
    }

    async fn search(
        &self,
        query: &ProviderQuery,
        ctx: &AdapterContext,
    ) -> Result<Vec<RawListing>, AdapterError> {
        let ProviderQuery::Remotive(query) = query else {
            return Err(wrong_query(Source::Remotive, query));
        };

        let mut params = Vec::new();
        if !query.search.is_empty() {
            params.push(("search", query.search.clone()));
        }
        if !query.category.is_empty() {
            params.push(("category", query.category.clone()));
        }
        let limit = if query.limit == 0 { DEFAULT_LIMIT } else { query.limit };
        params.push(("limit", limit.to_string()));

        let url = Url::parse_with_params(ENDPOINT, &params)
            .map_err(|e| AdapterError::Url(e.to_string()))?;
        let response = self
            .http
            .get(Source::Remotive.as_str(), url, &[], Some(ctx.deadline))
            .await?;
        let jobs = parse_response(&response.body)?;

        info!(
            source = "remotive",
            search = %query.search,
            category = %query.category,
            results = jobs.len(),
            "search complete"
        );
        Ok(jobs.into_iter().map(RawListing::Remotive).collect())
    }
}
