use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{number_field, require_non_empty, ValidationError};
use crate::decision::aggregate::argmax_votes;
use crate::decision::analyzer::MalformedResponse;
use crate::decision::domain::{
    round_to, CompositeScore, Decision, DecisionKind, Factor, RequestRef, Verdict,
};
use crate::decision::orchestrator::DecisionEngine;
use crate::decision::tier::ComplexityTier;

const DEFAULT_HOURLY_RATE: f64 = 50.0;

const SIMPLE_KEYWORDS: &[&str] = &[
    "landing page",
    "static",
    "simple",
    "basic",
    "single page",
    "template",
];
const MODERATE_KEYWORDS: &[&str] = &[
    "dashboard",
    "crud",
    "api",
    "database",
    "authentication",
    "responsive",
];
const COMPLEX_KEYWORDS: &[&str] = &[
    "real-time",
    "websocket",
    "microservice",
    "machine learning",
    "ai",
    "payment",
    "integration",
    "multi-tenant",
    "scalable",
];
const ENTERPRISE_KEYWORDS: &[&str] = &[
    "enterprise",
    "compliance",
    "hipaa",
    "gdpr",
    "distributed",
    "high-availability",
    "kubernetes",
    "blockchain",
];

fn keywords(tier: ComplexityTier) -> &'static [&'static str] {
    match tier {
        ComplexityTier::Simple => SIMPLE_KEYWORDS,
        ComplexityTier::Moderate => MODERATE_KEYWORDS,
        ComplexityTier::Complex => COMPLEX_KEYWORDS,
        ComplexityTier::Enterprise => ENTERPRISE_KEYWORDS,
    }
}

type MilestoneTemplate = (&'static str, &'static str, &'static [(&'static str, f64)]);

const SIMPLE_TEMPLATE: &[MilestoneTemplate] = &[
    (
        "Setup & Design",
        "Project setup, design system, and basic structure",
        &[
            ("Environment setup", 2.0),
            ("Design mockups", 4.0),
            ("Asset preparation", 2.0),
        ],
    ),
    (
        "Implementation",
        "Core feature development",
        &[("Core implementation", 8.0), ("Styling & polish", 4.0)],
    ),
    (
        "Testing & Delivery",
        "QA and handoff",
        &[("Testing", 3.0), ("Bug fixes", 2.0), ("Documentation", 1.0)],
    ),
];

const MODERATE_TEMPLATE: &[MilestoneTemplate] = &[
    (
        "Planning & Architecture",
        "Requirements analysis and system design",
        &[
            ("Requirements analysis", 4.0),
            ("Architecture design", 6.0),
            ("Database schema", 4.0),
        ],
    ),
    (
        "Backend Development",
        "API and business logic implementation",
        &[
            ("API endpoints", 12.0),
            ("Business logic", 10.0),
            ("Authentication", 6.0),
        ],
    ),
    (
        "Frontend Development",
        "UI components and integration",
        &[
            ("UI components", 12.0),
            ("API integration", 8.0),
            ("Responsive design", 4.0),
        ],
    ),
    (
        "Testing & Deployment",
        "QA, deployment, and documentation",
        &[
            ("Unit tests", 6.0),
            ("Integration tests", 4.0),
            ("Deployment setup", 4.0),
            ("Documentation", 3.0),
        ],
    ),
];

const COMPLEX_TEMPLATE: &[MilestoneTemplate] = &[
    (
        "Discovery & Planning",
        "Deep-dive into requirements and architecture",
        &[
            ("Requirements workshop", 8.0),
            ("Architecture design", 10.0),
            ("Technical spike/POC", 8.0),
            ("Database & API design", 6.0),
        ],
    ),
    (
        "Core Infrastructure",
        "Foundation systems and services",
        &[
            ("Core services setup", 12.0),
            ("Database implementation", 10.0),
            ("Authentication & authorization", 8.0),
            ("CI/CD pipeline", 6.0),
        ],
    ),
    (
        "Feature Development - Phase 1",
        "Primary feature set",
        &[
            ("Primary features", 20.0),
            ("API development", 12.0),
            ("Frontend components", 16.0),
        ],
    ),
    (
        "Feature Development - Phase 2",
        "Secondary features and integrations",
        &[
            ("Secondary features", 16.0),
            ("Third-party integrations", 12.0),
            ("Real-time features", 10.0),
        ],
    ),
    (
        "Testing & Optimization",
        "Comprehensive testing and performance",
        &[
            ("Unit & integration tests", 10.0),
            ("E2E testing", 8.0),
            ("Performance optimization", 6.0),
            ("Security audit", 4.0),
        ],
    ),
    (
        "Deployment & Handoff",
        "Production deployment and documentation",
        &[
            ("Production deployment", 6.0),
            ("Monitoring setup", 4.0),
            ("Documentation", 6.0),
            ("Knowledge transfer", 4.0),
        ],
    ),
];

const ENTERPRISE_TEMPLATE: &[MilestoneTemplate] = &[
    (
        "Discovery & Assessment",
        "Stakeholder interviews and requirements",
        &[
            ("Stakeholder workshops", 12.0),
            ("Requirements documentation", 10.0),
            ("Compliance assessment", 8.0),
            ("Risk analysis", 6.0),
        ],
    ),
    (
        "Architecture & Design",
        "System architecture and detailed design",
        &[
            ("System architecture", 16.0),
            ("Security architecture", 10.0),
            ("Data architecture", 10.0),
            ("API contracts", 8.0),
            ("Infrastructure planning", 8.0),
        ],
    ),
    (
        "Phase 1 - Foundation",
        "Core infrastructure and services",
        &[
            ("Core services", 24.0),
            ("Database layer", 16.0),
            ("Authentication/IAM", 12.0),
            ("CI/CD & DevOps", 10.0),
        ],
    ),
    (
        "Phase 2 - Features",
        "Primary feature development",
        &[
            ("Feature set A", 24.0),
            ("Feature set B", 20.0),
            ("Integration layer", 16.0),
            ("Admin panel", 12.0),
        ],
    ),
    (
        "Phase 3 - Advanced",
        "Advanced features and integrations",
        &[
            ("Advanced features", 20.0),
            ("Third-party integrations", 16.0),
            ("Analytics & reporting", 12.0),
            ("Notification system", 8.0),
        ],
    ),
    (
        "Testing & Compliance",
        "Comprehensive QA and compliance",
        &[
            ("Automated testing", 16.0),
            ("Security testing", 10.0),
            ("Compliance validation", 8.0),
            ("Performance testing", 8.0),
            ("UAT", 10.0),
        ],
    ),
    (
        "Deployment & Operations",
        "Production rollout and support",
        &[
            ("Staged deployment", 10.0),
            ("Monitoring & alerting", 8.0),
            ("Documentation", 10.0),
            ("Training & handoff", 8.0),
        ],
    ),
];

fn template(tier: ComplexityTier) -> &'static [MilestoneTemplate] {
    match tier {
        ComplexityTier::Simple => SIMPLE_TEMPLATE,
        ComplexityTier::Moderate => MODERATE_TEMPLATE,
        ComplexityTier::Complex => COMPLEX_TEMPLATE,
        ComplexityTier::Enterprise => ENTERPRISE_TEMPLATE,
    }
}

fn default_budget_type() -> String {
    "fixed".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeRequest {
    pub job_id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub skills_required: Vec<String>,
    #[serde(default = "default_budget_type")]
    pub budget_type: String,
    #[serde(default)]
    pub budget_min: Option<f64>,
    #[serde(default)]
    pub budget_max: Option<f64>,
}

impl ScopeRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("job_id", &self.job_id)?;
        require_non_empty("title", &self.title)?;
        Ok(())
    }

    /// Budget ceiling, with a zero ceiling treated as absent.
    fn budget_ceiling(&self) -> Option<f64> {
        self.budget_max.filter(|budget| *budget != 0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskItem {
    pub title: String,
    pub estimated_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub estimated_hours: f64,
    pub estimated_cost: f64,
    #[serde(default)]
    pub tasks: Vec<TaskItem>,
}

/// Milestone breakdown attached to a scope decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopePlan {
    pub milestones: Vec<Milestone>,
    pub total_estimated_hours: f64,
    pub total_estimated_cost: f64,
    pub complexity: ComplexityTier,
}

/// Keyword and heuristic votes per bucket, simplest first.
pub fn complexity_votes(
    description: &str,
    skills: &[String],
    budget_max: Option<f64>,
) -> [(ComplexityTier, u32); 4] {
    let text = description.to_lowercase();
    let mut votes = ComplexityTier::ALL.map(|tier| {
        let hits = keywords(tier)
            .iter()
            .filter(|keyword| text.contains(*keyword))
            .count() as u32;
        (tier, hits)
    });
    let mut bump = |tier: ComplexityTier, amount: u32| {
        if let Some(entry) = votes.iter_mut().find(|(bucket, _)| *bucket == tier) {
            entry.1 += amount;
        }
    };

    if skills.len() >= 8 {
        bump(ComplexityTier::Complex, 2);
    } else if skills.len() >= 5 {
        bump(ComplexityTier::Moderate, 1);
    }

    if let Some(budget) = budget_max.filter(|budget| *budget != 0.0) {
        if budget >= 50_000.0 {
            bump(ComplexityTier::Enterprise, 3);
        } else if budget >= 15_000.0 {
            bump(ComplexityTier::Complex, 2);
        } else if budget >= 5_000.0 {
            bump(ComplexityTier::Moderate, 1);
        }
    }

    let words = description.split_whitespace().count();
    if words > 500 {
        bump(ComplexityTier::Complex, 1);
    } else if words > 200 {
        bump(ComplexityTier::Moderate, 1);
    }

    votes
}

pub fn detect_complexity(
    description: &str,
    skills: &[String],
    budget_max: Option<f64>,
) -> ComplexityTier {
    argmax_votes(&complexity_votes(description, skills, budget_max))
        .unwrap_or(ComplexityTier::Simple)
}

/// Expands the tier's template, pricing hours at `budget_max / total hours`.
pub fn plan_milestones(tier: ComplexityTier, budget_max: Option<f64>) -> ScopePlan {
    let template = template(tier);
    let template_hours: f64 = template
        .iter()
        .flat_map(|(_, _, tasks)| tasks.iter().map(|(_, hours)| hours))
        .sum();
    let hourly_rate = match budget_max.filter(|budget| *budget != 0.0) {
        Some(budget) if template_hours > 0.0 => budget / template_hours,
        _ => DEFAULT_HOURLY_RATE,
    };

    let mut total_hours = 0.0;
    let mut total_cost = 0.0;
    let milestones = template
        .iter()
        .map(|(title, description, tasks)| {
            let hours: f64 = tasks.iter().map(|(_, hours)| hours).sum();
            let cost = hours * hourly_rate;
            total_hours += hours;
            total_cost += cost;
            Milestone {
                title: title.to_string(),
                description: description.to_string(),
                estimated_hours: hours,
                estimated_cost: round_to(cost, 2),
                tasks: tasks
                    .iter()
                    .map(|(title, hours)| TaskItem {
                        title: title.to_string(),
                        estimated_hours: *hours,
                    })
                    .collect(),
            }
        })
        .collect();

    ScopePlan {
        milestones,
        total_estimated_hours: total_hours,
        total_estimated_cost: round_to(total_cost, 2),
        complexity: tier,
    }
}

/// Confidence grows with how much of the job is described.
pub fn scope_confidence(request: &ScopeRequest) -> CompositeScore {
    let mut confidence = 0.5;
    if request.description.chars().count() > 100 {
        confidence += 0.15;
    }
    if !request.skills_required.is_empty() {
        confidence += 0.10;
    }
    if request.budget_ceiling().is_some() {
        confidence += 0.10;
    }
    if !request.category.is_empty() {
        confidence += 0.05;
    }
    CompositeScore::new(round_to(confidence, 4))
}

fn vote_factors(votes: &[(ComplexityTier, u32)]) -> Vec<Factor> {
    let total: u32 = votes.iter().map(|(_, count)| count).sum();
    if total == 0 {
        return Vec::new();
    }
    votes
        .iter()
        .filter(|(_, count)| *count > 0)
        .map(|(tier, count)| {
            Factor::new(
                format!("{}_signals", tier.label()),
                round_to(f64::from(*count) / f64::from(total), 4),
                format!("{count} {} complexity signal(s)", tier.label()),
            )
        })
        .collect()
}

/// Bucket-vote complexity detection plus templated milestone plans.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScopeEngine;

impl DecisionEngine for ScopeEngine {
    type Input = ScopeRequest;
    type Detail = ScopePlan;

    fn kind(&self) -> DecisionKind {
        DecisionKind::ScopeAnalysis
    }

    fn request_ref(&self, input: &ScopeRequest) -> RequestRef {
        RequestRef::new("job", input.job_id.clone())
    }

    fn evaluate(&self, input: &ScopeRequest) -> Verdict<ScopePlan> {
        let votes = complexity_votes(
            &input.description,
            &input.skills_required,
            input.budget_max,
        );
        let tier = argmax_votes(&votes).unwrap_or(ComplexityTier::Simple);
        Verdict {
            composite_score: scope_confidence(input),
            tier: tier.label(),
            action: "decompose",
            factors: vote_factors(&votes),
            detail: plan_milestones(tier, input.budget_ceiling()),
        }
    }

    fn interpret(
        &self,
        _input: &ScopeRequest,
        payload: &Value,
    ) -> Result<Verdict<ScopePlan>, MalformedResponse> {
        let tier = payload
            .get("complexity_tier")
            .and_then(Value::as_str)
            .and_then(ComplexityTier::from_label)
            .ok_or_else(|| MalformedResponse::missing("complexity_tier"))?;
        let milestones: Vec<Milestone> = payload
            .get("milestones")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|err| MalformedResponse::new(format!("milestones: {err}")))?
            .ok_or_else(|| MalformedResponse::missing("milestones"))?;
        let confidence = number_field(payload, "confidence_score")
            .ok_or_else(|| MalformedResponse::missing("confidence_score"))?;

        let total_hours = number_field(payload, "total_estimated_hours")
            .unwrap_or_else(|| milestones.iter().map(|m| m.estimated_hours).sum());
        let total_cost = number_field(payload, "total_estimated_cost")
            .unwrap_or_else(|| milestones.iter().map(|m| m.estimated_cost).sum());

        Ok(Verdict {
            composite_score: CompositeScore::new(confidence),
            tier: tier.label(),
            action: "decompose",
            factors: Vec::new(),
            detail: ScopePlan {
                milestones,
                total_estimated_hours: total_hours,
                total_estimated_cost: round_to(total_cost, 2),
                complexity: tier,
            },
        })
    }

    fn audit_output(&self, decision: &Decision<ScopePlan>) -> Value {
        json!({
            "complexity": decision.tier,
            "milestones_count": decision.detail.milestones.len(),
            "total_hours": decision.detail.total_estimated_hours,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn request(description: &str) -> ScopeRequest {
        ScopeRequest {
            job_id: "job-9".to_string(),
            title: "Build it".to_string(),
            description: description.to_string(),
            ..ScopeRequest::default()
        }
    }

    #[test]
    fn no_signals_defaults_to_simple() {
        assert_eq!(detect_complexity("", &[], None), ComplexityTier::Simple);
    }

    #[test]
    fn keywords_and_budget_vote_for_buckets() {
        assert_eq!(
            detect_complexity("A dashboard with a database and crud screens", &[], None),
            ComplexityTier::Moderate
        );
        assert_eq!(
            detect_complexity("HIPAA and GDPR compliance on kubernetes", &[], None),
            ComplexityTier::Enterprise
        );
        assert_eq!(
            detect_complexity("simple landing page", &[], Some(60_000.0)),
            ComplexityTier::Enterprise
        );
        let skills: Vec<String> = (0..8).map(|i| format!("skill-{i}")).collect();
        assert_eq!(
            detect_complexity("", &skills, None),
            ComplexityTier::Complex
        );
    }

    #[test]
    fn long_descriptions_lean_more_complex() {
        let long = "word ".repeat(250);
        assert_eq!(detect_complexity(&long, &[], None), ComplexityTier::Moderate);
        let longer = "word ".repeat(501);
        assert_eq!(detect_complexity(&longer, &[], None), ComplexityTier::Complex);
    }

    #[test]
    fn simple_plan_uses_default_rate_without_budget() {
        let plan = plan_milestones(ComplexityTier::Simple, None);
        assert_eq!(plan.milestones.len(), 3);
        assert_eq!(plan.total_estimated_hours, 26.0);
        assert_eq!(plan.total_estimated_cost, 1300.0);
        assert_eq!(plan.milestones[0].estimated_hours, 8.0);
        assert_eq!(plan.milestones[0].estimated_cost, 400.0);
        assert_eq!(plan.milestones[2].tasks[0].title, "Testing");
    }

    #[test]
    fn budget_spreads_across_template_hours() {
        let plan = plan_milestones(ComplexityTier::Moderate, Some(8_300.0));
        assert_eq!(plan.total_estimated_hours, 83.0);
        assert!((plan.total_estimated_cost - 8_300.0).abs() < 0.01);
        assert_eq!(plan.milestones[1].estimated_cost, 2_800.0);
        assert_eq!(plan_milestones(ComplexityTier::Enterprise, None).milestones.len(), 7);
        assert_eq!(plan_milestones(ComplexityTier::Complex, None).milestones.len(), 6);
    }

    #[test]
    fn confidence_accumulates_bonuses() {
        assert_eq!(scope_confidence(&request("short")).value(), 0.5);
        let full = ScopeRequest {
            category: "web".to_string(),
            skills_required: vec!["rust".to_string()],
            budget_max: Some(1_000.0),
            ..request(&"x".repeat(120))
        };
        assert_eq!(scope_confidence(&full).value(), 0.9);
    }

    #[test]
    fn engine_verdict_carries_tier_and_plan() {
        let verdict = ScopeEngine.evaluate(&request("Realtime websocket payment integration"));
        assert_eq!(verdict.tier, "complex");
        assert_eq!(verdict.detail.complexity, ComplexityTier::Complex);
        assert_eq!(verdict.detail.milestones.len(), 6);
        assert!(verdict.factors.iter().any(|f| f.name == "complex_signals"));
    }

    #[test]
    fn analyzer_plan_requires_known_tier() {
        let payload = json!({
            "complexity_tier": "moderate",
            "confidence_score": 0.7,
            "milestones": [
                {"title": "Build", "description": "", "estimated_hours": 10.0, "estimated_cost": 500.0, "tasks": []}
            ]
        });
        let verdict = ScopeEngine
            .interpret(&request("x"), &payload)
            .expect("valid plan");
        assert_eq!(verdict.tier, "moderate");
        assert_eq!(verdict.detail.total_estimated_hours, 10.0);

        let unknown = json!({"complexity_tier": "cosmic", "confidence_score": 0.7, "milestones": []});
        assert!(ScopeEngine.interpret(&request("x"), &unknown).is_err());
    }

    proptest! {
        #[test]
        fn complexity_detection_is_idempotent(
            description in "[a-z \\-]{0,200}",
            skill_count in 0usize..10,
            budget in proptest::option::of(0.0f64..80_000.0),
        ) {
            let skills: Vec<String> = (0..skill_count).map(|i| format!("s{i}")).collect();
            let first = detect_complexity(&description, &skills, budget);
            let second = detect_complexity(&description, &skills, budget);
            prop_assert_eq!(first, second);
        }
    }
}
