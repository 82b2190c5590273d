//! Profile-driven query planning shared by the provider planners.
//!
//! Each provider planner is a list of rules applied in priority order into a
//! [`PlanBuilder`], which drops blank and case-insensitive duplicate keys and
//! refuses anything past its cap.

use std::collections::HashSet;

use hirefeed_core::Profile;

pub const FALLBACK_QUERY: &str = "software engineer";

#[derive(Debug)]
pub struct PlanBuilder<Q> {
    cap: usize,
    seen: HashSet<String>,
    queries: Vec<Q>,
}

impl<Q> PlanBuilder<Q> {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            seen: HashSet::new(),
            queries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queries.len() >= self.cap
    }

    /// Adds `build(key)` unless the key is blank, already planned or the plan is full.
    pub fn push(&mut self, key: &str, build: impl FnOnce(&str) -> Q) -> bool {
        let key = key.trim();
        if key.is_empty() || self.is_full() {
            return false;
        }
        if !self.seen.insert(key.to_lowercase()) {
            return false;
        }
        self.queries.push(build(key));
        true
    }

    /// Offers each candidate while the plan holds fewer than `below` queries.
    pub fn fill_below<I, S>(&mut self, below: usize, candidates: I, build: impl Fn(&str) -> Q)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for candidate in candidates {
            if self.len() >= below {
                break;
            }
            self.push(candidate.as_ref(), &build);
        }
    }

    pub fn finish(self) -> Vec<Q> {
        self.queries
    }
}

pub fn target_roles(profile: &Profile) -> impl Iterator<Item = &str> {
    profile
        .target_roles
        .iter()
        .map(|r| r.trim())
        .filter(|r| !r.is_empty())
}

/// Skills `[start, start + count)` joined with spaces, if any exist.
pub fn skill_chunk(profile: &Profile, start: usize, count: usize) -> Option<String> {
    let chunk: Vec<&str> = profile
        .skills
        .iter()
        .skip(start)
        .take(count)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    (!chunk.is_empty()).then(|| chunk.join(" "))
}

/// The `count` most recent experience titles.
pub fn recent_titles(profile: &Profile, count: usize) -> impl Iterator<Item = &str> {
    profile
        .experience_titles
        .iter()
        .take(count)
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
}

/// Maps a skill to a remote-job category slug.
pub fn skill_category(skill: &str) -> Option<&'static str> {
    let slug = match skill.trim().to_lowercase().as_str() {
        "react" | "javascript" | "python" | "go" | "golang" | "java" | "typescript" | "rust"
        | "node" | "node.js" | "ruby" | "swift" | "kotlin" | "c++" | "c#" | ".net" | "php"
        | "vue" | "angular" => "software-dev",
        "figma" | "ui/ux" | "design" => "design",
        "devops" | "kubernetes" | "docker" | "terraform" | "aws" | "azure" | "gcp" => {
            "devops-sysadmin"
        }
        "data science" | "machine learning" | "sql" | "analytics" => "data",
        "product" => "product",
        "qa" | "testing" => "qa",
        _ => return None,
    };
    Some(slug)
}

/// Distinct categories for the profile's skills, in skill order.
pub fn skill_categories(profile: &Profile) -> Vec<&'static str> {
    let mut out = Vec::new();
    for slug in profile.skills.iter().filter_map(|s| skill_category(s)) {
        if !out.contains(&slug) {
            out.push(slug);
        }
    }
    out
}
