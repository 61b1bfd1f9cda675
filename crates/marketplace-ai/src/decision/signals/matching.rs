use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{require_non_empty, ValidationError};
use crate::decision::aggregate::weighted_sum;
use crate::decision::analyzer::MalformedResponse;
use crate::decision::domain::{
    round_to, CompositeScore, Decision, DecisionKind, Factor, RequestRef, Verdict,
};
use crate::decision::orchestrator::DecisionEngine;
use crate::decision::tier::MATCH_BANDS;

pub const SKILL_WEIGHT: f64 = 0.35;
pub const RATE_WEIGHT: f64 = 0.20;
pub const EXPERIENCE_WEIGHT: f64 = 0.15;
pub const PROFILE_WEIGHT: f64 = 0.15;
pub const REPUTATION_WEIGHT: f64 = 0.15;

fn default_limit() -> usize {
    20
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FreelancerCandidate {
    pub freelancer_id: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub hourly_rate: Option<f64>,
    #[serde(default)]
    pub experience_years: Option<f64>,
    #[serde(default)]
    pub profile_completeness: Option<f64>,
    #[serde(default)]
    pub verification_level: Option<String>,
    #[serde(default)]
    pub avg_rating: Option<f64>,
    #[serde(default)]
    pub total_jobs_completed: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRequest {
    pub job_id: String,
    #[serde(default)]
    pub job_skills: Vec<String>,
    #[serde(default)]
    pub job_budget_min: Option<f64>,
    #[serde(default)]
    pub job_budget_max: Option<f64>,
    #[serde(default)]
    pub experience_level: Option<String>,
    #[serde(default)]
    pub candidates: Vec<FreelancerCandidate>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl MatchRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("job_id", &self.job_id)?;
        if let Some(candidate) = self
            .candidates
            .iter()
            .find(|candidate| candidate.freelancer_id.trim().is_empty())
        {
            return Err(ValidationError::new(
                "candidates",
                format!("candidate with skills {:?} has no freelancer_id", candidate.skills),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    #[serde(default)]
    pub skill_match: f64,
    #[serde(default)]
    pub rate_fit: f64,
    #[serde(default)]
    pub experience_fit: f64,
    #[serde(default)]
    pub profile_quality: f64,
    #[serde(default)]
    pub reputation: f64,
}

impl ScoreBreakdown {
    /// `(signal, value, weight)` in declaration order.
    fn weighted(&self) -> [(&'static str, f64, f64); 5] {
        [
            ("skill_match", self.skill_match, SKILL_WEIGHT),
            ("rate_fit", self.rate_fit, RATE_WEIGHT),
            ("experience_fit", self.experience_fit, EXPERIENCE_WEIGHT),
            ("profile_quality", self.profile_quality, PROFILE_WEIGHT),
            ("reputation", self.reputation, REPUTATION_WEIGHT),
        ]
    }

    pub fn total(&self) -> CompositeScore {
        let components: Vec<(f64, f64)> = self
            .weighted()
            .iter()
            .map(|(_, value, weight)| (*value, *weight))
            .collect();
        weighted_sum(&components)
    }

    /// Signal with the largest weighted contribution. Ties keep the earlier signal.
    pub fn top_signal(&self) -> &'static str {
        let mut best = ("skill_match", f64::MIN);
        for (name, value, weight) in self.weighted() {
            if value * weight > best.1 {
                best = (name, value * weight);
            }
        }
        best.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub freelancer_id: String,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    #[serde(default)]
    pub explanation: String,
}

/// Ranked candidates attached to a match decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchRanking {
    pub results: Vec<MatchResult>,
    pub total_candidates: usize,
}

/// Case-insensitive Jaccard overlap.
pub fn skill_match(job_skills: &[String], candidate_skills: &[String]) -> f64 {
    if job_skills.is_empty() || candidate_skills.is_empty() {
        return 0.0;
    }
    let job: HashSet<String> = job_skills.iter().map(|s| s.to_lowercase()).collect();
    let candidate: HashSet<String> = candidate_skills.iter().map(|s| s.to_lowercase()).collect();
    let union = job.union(&candidate).count();
    if union == 0 {
        return 0.0;
    }
    job.intersection(&candidate).count() as f64 / union as f64
}

pub fn rate_fit(rate: Option<f64>, budget_min: Option<f64>, budget_max: Option<f64>) -> f64 {
    // A zero budget bound counts as unset.
    let min = budget_min.filter(|value| *value != 0.0);
    let max = budget_max.filter(|value| *value != 0.0);
    let Some(rate) = rate else {
        return 0.5;
    };

    match (min, max) {
        (Some(min), Some(_)) if rate < min => (1.0 - (min - rate) / min).max(0.3),
        (Some(_), Some(max)) if rate > max => (1.0 - (rate - max) / max).max(0.1),
        (Some(_), Some(_)) => 1.0,
        (None, Some(max)) if rate <= max => 1.0,
        (None, Some(max)) => (1.0 - (rate - max) / max).max(0.2),
        (Some(min), None) if rate >= min => 1.0,
        (Some(min), None) => (rate / min).max(0.3),
        (None, None) => 0.5,
    }
}

fn experience_band(level: &str) -> (f64, f64) {
    match level {
        "entry" => (0.0, 2.0),
        "mid" => (2.0, 5.0),
        "senior" => (5.0, 10.0),
        "expert" => (10.0, 99.0),
        _ => (0.0, 99.0),
    }
}

/// Full credit inside the level's `[min, max)` band.
pub fn experience_fit(years: Option<f64>, level: Option<&str>) -> f64 {
    let (Some(years), Some(level)) = (years, level) else {
        return 0.5;
    };
    let (min, max) = experience_band(level);
    if years < min {
        (years / min.max(1.0)).max(0.2)
    } else if years < max {
        1.0
    } else {
        0.8
    }
}

pub fn profile_quality(completeness: Option<f64>, verification_level: Option<&str>) -> f64 {
    let mut score = completeness.unwrap_or(0.0) / 100.0;
    if verification_level == Some("verified") {
        score += 0.2;
    }
    score.clamp(0.0, 1.0)
}

pub fn reputation(rating: Option<f64>, jobs_completed: Option<u32>) -> f64 {
    let Some(rating) = rating else {
        return 0.3;
    };
    let mut score = rating / 5.0;
    if jobs_completed.map_or(false, |jobs| jobs > 10) {
        score += 0.1;
    }
    score.clamp(0.0, 1.0)
}

fn percent(value: f64) -> String {
    format!("{:.0}%", value * 100.0)
}

fn explain(breakdown: &ScoreBreakdown, total: f64) -> String {
    let reason = match breakdown.top_signal() {
        "skill_match" => format!(
            "Strong skill alignment ({} overlap)",
            percent(breakdown.skill_match)
        ),
        "rate_fit" => format!("Rate fits budget well ({})", percent(breakdown.rate_fit)),
        "experience_fit" => format!(
            "Experience level matches ({})",
            percent(breakdown.experience_fit)
        ),
        "profile_quality" => format!(
            "Well-maintained profile ({})",
            percent(breakdown.profile_quality)
        ),
        _ => format!("Good reputation ({})", percent(breakdown.reputation)),
    };
    format!("Score {total:.2}: {reason}")
}

pub fn score_candidate(request: &MatchRequest, candidate: &FreelancerCandidate) -> MatchResult {
    let breakdown = ScoreBreakdown {
        skill_match: skill_match(&request.job_skills, &candidate.skills),
        rate_fit: rate_fit(
            candidate.hourly_rate,
            request.job_budget_min,
            request.job_budget_max,
        ),
        experience_fit: experience_fit(
            candidate.experience_years,
            request.experience_level.as_deref(),
        ),
        profile_quality: profile_quality(
            candidate.profile_completeness,
            candidate.verification_level.as_deref(),
        ),
        reputation: reputation(candidate.avg_rating, candidate.total_jobs_completed),
    };
    let score = breakdown.total().rounded();
    MatchResult {
        freelancer_id: candidate.freelancer_id.clone(),
        score,
        explanation: explain(&breakdown, score),
        breakdown,
    }
}

/// Sorts by score (highest first, stable on ties) and keeps `limit` results.
pub fn rank(mut results: Vec<MatchResult>, limit: usize) -> Vec<MatchResult> {
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    results.truncate(limit);
    results
}

fn ranking_verdict(results: Vec<MatchResult>, total_candidates: usize) -> Verdict<MatchRanking> {
    let best = results.first();
    let score = CompositeScore::new(best.map_or(0.0, |result| result.score));
    let factors = best
        .map(|result| {
            result
                .breakdown
                .weighted()
                .iter()
                .map(|(name, value, weight)| {
                    Factor::new(
                        *name,
                        round_to(value * weight, 4),
                        format!("{} scored {}", result.freelancer_id, percent(*value)),
                    )
                })
                .collect()
        })
        .unwrap_or_default();
    let fit = MATCH_BANDS.classify(score);
    Verdict {
        composite_score: score,
        tier: fit.label(),
        action: fit.action(),
        factors,
        detail: MatchRanking {
            results,
            total_candidates,
        },
    }
}

/// Weighted five-signal candidate ranking.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchEngine;

impl DecisionEngine for MatchEngine {
    type Input = MatchRequest;
    type Detail = MatchRanking;

    fn kind(&self) -> DecisionKind {
        DecisionKind::MatchRank
    }

    fn request_ref(&self, input: &MatchRequest) -> RequestRef {
        RequestRef::new("job", input.job_id.clone())
    }

    fn evaluate(&self, input: &MatchRequest) -> Verdict<MatchRanking> {
        let scored = input
            .candidates
            .iter()
            .map(|candidate| score_candidate(input, candidate))
            .collect();
        ranking_verdict(rank(scored, input.limit), input.candidates.len())
    }

    fn interpret(
        &self,
        input: &MatchRequest,
        payload: &Value,
    ) -> Result<Verdict<MatchRanking>, MalformedResponse> {
        let rankings = payload
            .get("rankings")
            .cloned()
            .ok_or_else(|| MalformedResponse::missing("rankings"))?;
        let mut results: Vec<MatchResult> = serde_json::from_value(rankings)
            .map_err(|err| MalformedResponse::new(format!("rankings: {err}")))?;
        for result in &mut results {
            result.score = CompositeScore::new(result.score).rounded();
        }
        Ok(ranking_verdict(
            rank(results, input.limit),
            input.candidates.len(),
        ))
    }

    fn audit_output(&self, decision: &Decision<MatchRanking>) -> Value {
        json!({
            "results_count": decision.detail.results.len(),
            "top_score": decision.composite_score.rounded(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn skills(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn candidate(id: &str, candidate_skills: &[&str], rate: f64) -> FreelancerCandidate {
        FreelancerCandidate {
            freelancer_id: id.to_string(),
            skills: skills(candidate_skills),
            hourly_rate: Some(rate),
            experience_years: Some(6.0),
            profile_completeness: Some(80.0),
            verification_level: Some("verified".to_string()),
            avg_rating: Some(4.5),
            total_jobs_completed: Some(12),
        }
    }

    fn request(candidates: Vec<FreelancerCandidate>, limit: usize) -> MatchRequest {
        MatchRequest {
            job_id: "job-1".to_string(),
            job_skills: skills(&["Rust", "Postgres", "AWS"]),
            job_budget_min: Some(40.0),
            job_budget_max: Some(90.0),
            experience_level: Some("senior".to_string()),
            candidates,
            limit,
        }
    }

    #[test]
    fn rate_fit_graduates_outside_the_budget() {
        assert_eq!(rate_fit(None, Some(10.0), Some(20.0)), 0.5);
        assert_eq!(rate_fit(Some(15.0), None, None), 0.5);
        assert_eq!(rate_fit(Some(15.0), Some(10.0), Some(20.0)), 1.0);
        assert!((rate_fit(Some(8.0), Some(10.0), Some(20.0)) - 0.8).abs() < 1e-9);
        assert_eq!(rate_fit(Some(1.0), Some(10.0), Some(20.0)), 0.3);
        assert!((rate_fit(Some(25.0), Some(10.0), Some(20.0)) - 0.75).abs() < 1e-9);
        assert_eq!(rate_fit(Some(100.0), Some(10.0), Some(20.0)), 0.1);
        assert_eq!(rate_fit(Some(100.0), None, Some(20.0)), 0.2);
        assert!((rate_fit(Some(5.0), Some(10.0), None) - 0.5).abs() < 1e-9);
        assert_eq!(rate_fit(Some(15.0), Some(0.0), Some(0.0)), 0.5);
    }

    #[test]
    fn experience_band_is_half_open() {
        assert_eq!(experience_fit(Some(5.0), Some("senior")), 1.0);
        assert_eq!(experience_fit(Some(9.0), Some("senior")), 1.0);
        assert_eq!(experience_fit(Some(10.0), Some("senior")), 0.8);
        assert!((experience_fit(Some(3.0), Some("senior")) - 0.6).abs() < 1e-9);
        assert_eq!(experience_fit(Some(0.0), Some("mid")), 0.2);
        assert_eq!(experience_fit(None, Some("mid")), 0.5);
        assert_eq!(experience_fit(Some(4.0), Some("wizard")), 1.0);
    }

    #[test]
    fn profile_and_reputation_are_capped() {
        assert_eq!(profile_quality(Some(90.0), Some("verified")), 1.0);
        assert!((profile_quality(Some(50.0), None) - 0.5).abs() < 1e-9);
        assert_eq!(profile_quality(Some(180.0), None), 1.0);
        assert_eq!(reputation(None, Some(50)), 0.3);
        assert_eq!(reputation(Some(5.0), Some(11)), 1.0);
        assert!((reputation(Some(4.0), Some(10)) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn explanation_names_the_dominant_signal() {
        let result = score_candidate(
            &request(Vec::new(), 5),
            &candidate("f-1", &["rust", "postgres", "aws"], 60.0),
        );
        assert_eq!(result.breakdown.skill_match, 1.0);
        assert!(result
            .explanation
            .ends_with("Strong skill alignment (100% overlap)"));
        assert!(result.explanation.starts_with("Score "));
    }

    #[test]
    fn ranking_sorts_and_limits_results() {
        let verdict = MatchEngine.evaluate(&request(
            vec![
                candidate("weak", &["excel"], 300.0),
                candidate("strong", &["rust", "postgres", "aws"], 60.0),
                candidate("partial", &["rust"], 60.0),
            ],
            2,
        ));
        let ids: Vec<&str> = verdict
            .detail
            .results
            .iter()
            .map(|result| result.freelancer_id.as_str())
            .collect();
        assert_eq!(ids, vec!["strong", "partial"]);
        assert_eq!(verdict.detail.total_candidates, 3);
        assert_eq!(verdict.tier, "strong");
        assert_eq!(verdict.action, "shortlist");
        assert_eq!(verdict.factors.len(), 5);
    }

    #[test]
    fn empty_candidate_list_is_a_weak_match() {
        let verdict = MatchEngine.evaluate(&request(Vec::new(), 20));
        assert!(verdict.detail.results.is_empty());
        assert_eq!(verdict.composite_score, CompositeScore::ZERO);
        assert_eq!(verdict.tier, "weak");
    }

    #[test]
    fn analyzer_rankings_are_resorted_and_clamped() {
        let payload = json!({
            "rankings": [
                {"freelancer_id": "a", "score": 0.4, "breakdown": {"skill_match": 0.4}, "explanation": "ok"},
                {"freelancer_id": "b", "score": 1.7, "breakdown": {}, "explanation": "great"}
            ]
        });
        let verdict = MatchEngine
            .interpret(&request(Vec::new(), 20), &payload)
            .expect("valid rankings");
        assert_eq!(verdict.detail.results[0].freelancer_id, "b");
        assert_eq!(verdict.detail.results[0].score, 1.0);
        assert!(MatchEngine
            .interpret(&request(Vec::new(), 20), &json!({"rankings": "nope"}))
            .is_err());
    }

    fn skill_set() -> impl Strategy<Value = Vec<String>> {
        proptest::collection::vec("[a-dA-D]{1,2}", 0..6)
    }

    proptest! {
        #[test]
        fn jaccard_is_symmetric(a in skill_set(), b in skill_set()) {
            prop_assert_eq!(skill_match(&a, &b), skill_match(&b, &a));
        }

        #[test]
        fn results_are_sorted_and_bounded(
            rates in proptest::collection::vec(1.0f64..300.0, 0..12),
            limit in 0usize..8,
        ) {
            let candidates = rates
                .iter()
                .enumerate()
                .map(|(i, rate)| candidate(&format!("f-{i}"), &["rust"], *rate))
                .collect();
            let verdict = MatchEngine.evaluate(&request(candidates, limit));
            let results = &verdict.detail.results;
            prop_assert!(results.len() <= limit);
            prop_assert!(results.windows(2).all(|pair| pair[0].score >= pair[1].score));
            prop_assert!(results.iter().all(|r| (0.0..=1.0).contains(&r.score)));
        }
    }
}
