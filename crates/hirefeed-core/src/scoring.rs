//! Profile-to-job match scoring. Pure and deterministic; no lookups.

use serde::{Deserialize, Serialize};

use crate::{FeedJob, Profile, WorkStyle};

/// Point weights for each match signal. Role match dominates, skill overlap is
/// second, location and salary are tie-breakers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub base: u32,
    pub role: u32,
    pub skill_overlap: u32,
    pub keyword_per_mention: u32,
    pub keyword_cap: u32,
    pub location: u32,
    pub salary: u32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            base: 30,
            role: 25,
            skill_overlap: 25,
            keyword_per_mention: 3,
            keyword_cap: 10,
            location: 5,
            salary: 5,
        }
    }
}

pub const MAX_SCORE: u32 = 100;

/// Scores `job` against `profile` in `[0, 100]`.
pub fn score_match(profile: &Profile, job: &FeedJob, weights: &ScoringWeights) -> u8 {
    let title = job.title.to_lowercase();
    let text = format!("{} {}", title, job.description.to_lowercase());

    let mut score = weights.base;
    score = score.saturating_add(scaled(
        role_match_ratio(&profile.target_roles, &title, &text),
        weights.role,
    ));

    if !profile.skills.is_empty() {
        score = score.saturating_add(scaled(
            skill_overlap_ratio(&profile.skills, &job.required_skills),
            weights.skill_overlap,
        ));
        let mentions = skill_mentions(&profile.skills, &text);
        score = score.saturating_add(
            mentions
                .saturating_mul(weights.keyword_per_mention)
                .min(weights.keyword_cap),
        );
    }

    if location_fits(profile, &job.location) {
        score = score.saturating_add(weights.location);
    }
    if profile.salary_min > 0 && job.salary_max > 0 && job.salary_max >= profile.salary_min {
        score = score.saturating_add(weights.salary);
    }

    score.min(MAX_SCORE) as u8
}

fn scaled(ratio: f64, weight: u32) -> u32 {
    (ratio.clamp(0.0, 1.0) * f64::from(weight)) as u32
}

/// Best role match across target roles: 1.0 for the phrase in the title, else the
/// fraction of role words in the title, with half credit for a phrase found only
/// in the description.
pub fn role_match_ratio(target_roles: &[String], title_lower: &str, text_lower: &str) -> f64 {
    let mut best = 0.0_f64;
    for role in target_roles {
        let role = role.trim().to_lowercase();
        if role.is_empty() {
            continue;
        }
        if title_lower.contains(&role) {
            return 1.0;
        }

        let words = role.split_whitespace().collect::<Vec<_>>();
        if !words.is_empty() {
            let matched = words.iter().filter(|w| title_lower.contains(*w)).count();
            best = best.max(matched as f64 / words.len() as f64);
        }

        if best < 0.5 && text_lower.contains(&role) {
            best = 0.5;
        }
    }
    best
}

/// Fraction of the job's required skills the user has, case-insensitive.
pub fn skill_overlap_ratio(user_skills: &[String], required_skills: &[String]) -> f64 {
    if user_skills.is_empty() || required_skills.is_empty() {
        return 0.0;
    }
    let owned = user_skills
        .iter()
        .map(|s| s.trim().to_lowercase())
        .collect::<std::collections::HashSet<_>>();
    let matches = required_skills
        .iter()
        .filter(|s| owned.contains(&s.trim().to_lowercase()))
        .count();
    matches as f64 / required_skills.len() as f64
}

fn skill_mentions(user_skills: &[String], text_lower: &str) -> u32 {
    user_skills
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty() && text_lower.contains(s.as_str()))
        .count() as u32
}

fn location_fits(profile: &Profile, job_location: &str) -> bool {
    if job_location.is_empty() {
        return false;
    }
    let job_location = job_location.to_lowercase();
    if profile.work_style == Some(WorkStyle::Remote) && job_location.contains("remote") {
        return true;
    }
    let wanted = profile.location.trim().to_lowercase();
    !wanted.is_empty() && job_location.contains(&wanted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EmploymentType, NewFeedJob};
    use chrono::Utc;
    use uuid::Uuid;

    fn job(title: &str, description: &str, skills: &[&str], location: &str, salary_max: i64) -> FeedJob {
        let now = Utc::now();
        FeedJob::from_new(
            Uuid::new_v4(),
            NewFeedJob {
                source: "jsearch".into(),
                external_id: "jsearch-1".into(),
                title: title.into(),
                description: description.into(),
                required_skills: skills.iter().map(|s| s.to_string()).collect(),
                location: location.into(),
                salary_max,
                job_type: EmploymentType::FullTime,
                ..Default::default()
            },
            now,
            now,
        )
    }

    fn profile(roles: &[&str], skills: &[&str]) -> Profile {
        Profile {
            target_roles: roles.iter().map(|s| s.to_string()).collect(),
            skills: skills.iter().map(|s| s.to_string()).collect(),
            ..Profile::new(Uuid::nil())
        }
    }

    #[test]
    fn backend_engineer_scenario_beats_empty_profile() {
        let weights = ScoringWeights::default();
        let feed_job = job("Senior Backend Engineer", "", &["Go", "Kubernetes"], "", 150_000);

        let mut rich = profile(&["Backend Engineer"], &["Go", "Postgres"]);
        rich.salary_min = 120_000;
        let mut empty = profile(&[], &[]);
        empty.salary_min = 120_000;

        let rich_score = score_match(&rich, &feed_job, &weights);
        let empty_score = score_match(&empty, &feed_job, &weights);
        assert_eq!(rich_score, 30 + 25 + 12 + 5);
        assert_eq!(empty_score, 35);
        assert!(rich_score > empty_score);
    }

    #[test]
    fn empty_profile_scores_base() {
        let score = score_match(
            &profile(&[], &[]),
            &job("Anything", "at all", &["Go"], "Remote", 0),
            &ScoringWeights::default(),
        );
        assert_eq!(score, 30);
    }

    #[test]
    fn score_is_capped_at_one_hundred() {
        let mut p = profile(&["rust engineer"], &["rust", "tokio", "sqlx", "serde", "axum"]);
        p.work_style = Some(WorkStyle::Remote);
        p.salary_min = 1;
        let j = job(
            "Rust Engineer",
            "rust tokio sqlx serde axum",
            &["rust", "tokio"],
            "Remote",
            10,
        );
        let weights = ScoringWeights {
            base: 90,
            ..Default::default()
        };
        assert_eq!(score_match(&p, &j, &weights), 100);
        assert_eq!(score_match(&p, &j, &ScoringWeights::default()), 100);
    }

    #[test]
    fn score_stays_in_bounds_and_is_deterministic() {
        let profiles = [
            profile(&[], &[]),
            profile(&["", "  "], &[""]),
            profile(&["data scientist", "ml engineer"], &["python", "SQL"]),
        ];
        let jobs = [
            job("", "", &[], "", 0),
            job("Data Scientist", "python sql", &["Python", "sql", "R"], "Berlin", 90_000),
        ];
        for p in &profiles {
            for j in &jobs {
                let a = score_match(p, j, &ScoringWeights::default());
                let b = score_match(p, j, &ScoringWeights::default());
                assert_eq!(a, b);
                assert!((30..=100).contains(&a));
            }
        }
    }

    #[test]
    fn role_words_give_partial_credit() {
        let ratio = role_match_ratio(&["staff platform engineer".into()], "platform engineer", "");
        assert!((ratio - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn role_in_description_gets_half_credit() {
        let ratio = role_match_ratio(
            &["site reliability".into()],
            "operations lead",
            "operations lead join our site reliability group",
        );
        assert_eq!(ratio, 0.5);
    }

    #[test]
    fn keyword_bonus_is_capped() {
        let p = profile(&[], &["a1", "b2", "c3", "d4", "e5"]);
        let j = job("t", "a1 b2 c3 d4 e5", &[], "", 0);
        // no required skills, so only the keyword bonus applies
        assert_eq!(score_match(&p, &j, &ScoringWeights::default()), 40);
    }

    #[test]
    fn location_matches_remote_or_city() {
        let mut p = profile(&[], &[]);
        p.work_style = Some(WorkStyle::Remote);
        assert!(location_fits(&p, "Remote / US"));
        assert!(!location_fits(&p, "Austin, TX"));
        p.location = "austin".into();
        assert!(location_fits(&p, "Austin, TX"));
        p.location = String::new();
        p.work_style = None;
        assert!(!location_fits(&p, "Remote"));
    }

    #[test]
    fn skill_overlap_is_case_insensitive() {
        let ratio = skill_overlap_ratio(
            &["go".into(), "POSTGRES".into()],
            &["Go".into(), "Postgres".into(), "Kafka".into(), "Redis".into()],
        );
        assert_eq!(ratio, 0.5);
    }
}
