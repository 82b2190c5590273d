//! Postgres-backed feed and profile stores.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use hirefeed_core::{
    EmploymentType, FeedEntry, FeedJob, NewFeedJob, Profile, TrackedJob, UserFeedLink, WorkStyle,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

use crate::store::{
    default_job_ttl, effective_limit, FeedStore, ProfileStore, StoreError, UpsertOutcome,
};

const FEED_JOB_COLUMNS: &str = r#"
    fj.id, fj.external_id, fj.source, fj.title, fj.company, fj.location,
    fj.salary_min, fj.salary_max, fj.salary_text, fj.job_type,
    fj.description, fj.required_skills, fj.apply_url, fj.company_logo,
    fj.posted_at, fj.fetched_at, fj.expires_at
"#;

const LINK_COLUMNS: &str = "uf.user_id, uf.match_score, uf.dismissed, uf.saved, uf.saved_job_id";

pub async fn connect_pool(database_url: &str) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    info!("database migrations applied");
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PgFeedStore {
    pool: PgPool,
    ttl: Duration,
}

impl PgFeedStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            ttl: default_job_ttl(),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

fn score_from_db(value: i32) -> u8 {
    value.clamp(0, 100) as u8
}

fn count_to_db(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn feed_job_from_row(row: &PgRow) -> Result<FeedJob, sqlx::Error> {
    let job_type: String = row.try_get("job_type")?;
    Ok(FeedJob {
        id: row.try_get("id")?,
        source: row.try_get("source")?,
        external_id: row.try_get("external_id")?,
        title: row.try_get("title")?,
        company: row.try_get("company")?,
        location: row.try_get("location")?,
        salary_min: row.try_get("salary_min")?,
        salary_max: row.try_get("salary_max")?,
        salary_text: row.try_get("salary_text")?,
        job_type: EmploymentType::from_canonical(&job_type),
        description: row.try_get("description")?,
        required_skills: row.try_get("required_skills")?,
        apply_url: row.try_get("apply_url")?,
        company_logo: row.try_get("company_logo")?,
        posted_at: row.try_get("posted_at")?,
        fetched_at: row.try_get("fetched_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

fn feed_entry_from_row(row: &PgRow) -> Result<FeedEntry, sqlx::Error> {
    let job = feed_job_from_row(row)?;
    let link = UserFeedLink {
        user_id: row.try_get("user_id")?,
        feed_job_id: job.id,
        match_score: score_from_db(row.try_get("match_score")?),
        dismissed: row.try_get("dismissed")?,
        saved: row.try_get("saved")?,
        saved_job_id: row.try_get("saved_job_id")?,
    };
    Ok(FeedEntry { job, link })
}

#[async_trait]
impl FeedStore for PgFeedStore {
    async fn upsert_feed_job(&self, job: &NewFeedJob) -> Result<UpsertOutcome, StoreError> {
        let expires_at = Utc::now() + self.ttl;
        // xmax is zero only for a row this statement inserted
        let sql = format!(
            r#"
            INSERT INTO feed_jobs AS fj (id, external_id, source, title, company, location,
                                         salary_min, salary_max, salary_text, job_type,
                                         description, required_skills, apply_url, company_logo,
                                         posted_at, fetched_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, now(), $16)
            ON CONFLICT (source, external_id) DO UPDATE SET
                title = EXCLUDED.title,
                fetched_at = now()
            RETURNING {FEED_JOB_COLUMNS}, (fj.xmax = 0) AS inserted
            "#
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(&job.external_id)
            .bind(&job.source)
            .bind(&job.title)
            .bind(&job.company)
            .bind(&job.location)
            .bind(job.salary_min)
            .bind(job.salary_max)
            .bind(&job.salary_text)
            .bind(job.job_type.as_str())
            .bind(&job.description)
            .bind(&job.required_skills)
            .bind(&job.apply_url)
            .bind(&job.company_logo)
            .bind(job.posted_at)
            .bind(expires_at)
            .fetch_one(&self.pool)
            .await?;

        Ok(UpsertOutcome {
            job: feed_job_from_row(&row)?,
            inserted: row.try_get("inserted")?,
        })
    }

    async fn link_job_to_user(
        &self,
        user_id: Uuid,
        feed_job_id: Uuid,
        match_score: u8,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO user_feed (user_id, feed_job_id, match_score)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, feed_job_id) DO UPDATE SET
                match_score = EXCLUDED.match_score
            "#,
        )
        .bind(user_id)
        .bind(feed_job_id)
        .bind(i32::from(match_score))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_user_feed(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<FeedEntry>, StoreError> {
        let sql = format!(
            r#"
            SELECT {FEED_JOB_COLUMNS}, {LINK_COLUMNS}
              FROM user_feed uf
              JOIN feed_jobs fj ON fj.id = uf.feed_job_id
             WHERE uf.user_id = $1
               AND uf.dismissed = false
               AND fj.expires_at > now()
             ORDER BY uf.match_score DESC, fj.posted_at DESC NULLS LAST
             LIMIT $2
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(i64::try_from(effective_limit(limit)).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| feed_entry_from_row(row).map_err(StoreError::from))
            .collect()
    }

    async fn get_links_for_rescore(&self, user_id: Uuid) -> Result<Vec<FeedEntry>, StoreError> {
        let sql = format!(
            r#"
            SELECT {FEED_JOB_COLUMNS}, {LINK_COLUMNS}
              FROM user_feed uf
              JOIN feed_jobs fj ON fj.id = uf.feed_job_id
             WHERE uf.user_id = $1
               AND uf.dismissed = false
            "#
        );
        let rows = sqlx::query(&sql).bind(user_id).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| feed_entry_from_row(row).map_err(StoreError::from))
            .collect()
    }

    async fn batch_update_scores(
        &self,
        user_id: Uuid,
        scores: &HashMap<Uuid, u8>,
    ) -> Result<(), StoreError> {
        if scores.is_empty() {
            return Ok(());
        }
        let (ids, values): (Vec<Uuid>, Vec<i32>) = scores
            .iter()
            .map(|(id, score)| (*id, i32::from(*score)))
            .unzip();
        let result = sqlx::query(
            r#"
            UPDATE user_feed uf
               SET match_score = s.score
              FROM UNNEST($2::uuid[], $3::int4[]) AS s(feed_job_id, score)
             WHERE uf.user_id = $1
               AND uf.feed_job_id = s.feed_job_id
            "#,
        )
        .bind(user_id)
        .bind(&ids)
        .bind(&values)
        .execute(&self.pool)
        .await?;
        debug!(%user_id, updated = result.rows_affected(), "batch score update");
        Ok(())
    }

    async fn get_last_refresh(&self, user_id: Uuid) -> Result<Option<DateTime<Utc>>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT MAX(refreshed_at) AS refreshed_at
              FROM feed_refresh_log
             WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("refreshed_at")?)
    }

    async fn log_refresh(
        &self,
        user_id: Uuid,
        label: &str,
        fetched: usize,
        new: usize,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO feed_refresh_log (user_id, query_used, jobs_fetched, jobs_new)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user_id)
        .bind(label)
        .bind(count_to_db(fetched))
        .bind(count_to_db(new))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn dismiss_feed_job(&self, user_id: Uuid, feed_job_id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE user_feed SET dismissed = true
             WHERE user_id = $1 AND feed_job_id = $2
            "#,
        )
        .bind(user_id)
        .bind(feed_job_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("feed link {feed_job_id}")));
        }
        Ok(())
    }

    async fn save_feed_job_to_tracker(
        &self,
        user_id: Uuid,
        feed_job_id: Uuid,
    ) -> Result<TrackedJob, StoreError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {FEED_JOB_COLUMNS} FROM feed_jobs fj WHERE fj.id = $1");
        let job = match sqlx::query(&sql)
            .bind(feed_job_id)
            .fetch_optional(&mut *tx)
            .await?
        {
            Some(row) => feed_job_from_row(&row)?,
            None => return Err(StoreError::NotFound(format!("feed job {feed_job_id}"))),
        };

        let score = sqlx::query(
            "SELECT match_score FROM user_feed WHERE user_id = $1 AND feed_job_id = $2",
        )
        .bind(user_id)
        .bind(feed_job_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(|row| row.try_get::<i32, _>("match_score"))
        .transpose()?
        .map(score_from_db)
        .unwrap_or(0);

        let tracked = TrackedJob::copy_of(&job, user_id, score, Utc::now());
        sqlx::query(
            r#"
            INSERT INTO tracked_jobs (id, user_id, feed_job_id, external_id, source, title,
                                      company, location, salary_range, job_type, description,
                                      required_skills, apply_url, company_logo, match_score,
                                      status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(tracked.id)
        .bind(tracked.user_id)
        .bind(tracked.feed_job_id)
        .bind(&tracked.external_id)
        .bind(&tracked.source)
        .bind(&tracked.title)
        .bind(&tracked.company)
        .bind(&tracked.location)
        .bind(&tracked.salary_range)
        .bind(tracked.job_type.as_str())
        .bind(&tracked.description)
        .bind(&tracked.required_skills)
        .bind(&tracked.apply_url)
        .bind(&tracked.company_logo)
        .bind(i32::from(tracked.match_score))
        .bind(&tracked.status)
        .bind(tracked.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE user_feed SET saved = true, saved_job_id = $3
             WHERE user_id = $1 AND feed_job_id = $2
            "#,
        )
        .bind(user_id)
        .bind(feed_job_id)
        .bind(tracked.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(tracked)
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM feed_jobs WHERE expires_at <= now()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone)]
pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Pulls `title` out of each experience object, skipping blanks.
fn experience_titles(value: &serde_json::Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("title").and_then(|t| t.as_str()))
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<Profile>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, location, work_style, salary_min, salary_max,
                   skills, target_roles, experience
              FROM users
             WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let work_style: String = row.try_get("work_style")?;
        let experience: serde_json::Value = row.try_get("experience")?;
        Ok(Some(Profile {
            user_id: row.try_get("id")?,
            target_roles: row.try_get("target_roles")?,
            skills: row.try_get("skills")?,
            location: row.try_get("location")?,
            work_style: WorkStyle::parse(&work_style),
            salary_min: row.try_get("salary_min")?,
            salary_max: row.try_get("salary_max")?,
            experience_titles: experience_titles(&experience),
        }))
    }
}
