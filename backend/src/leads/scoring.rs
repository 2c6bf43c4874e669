//! Lead qualification scoring.
//!
//! A pure function over canonical fields plus the raw submission map.
//! Rules are additive and independent; none short-circuits another, so
//! the same input always reproduces the same score, reason and tags.

use serde_json::{Map, Value};
use std::collections::BTreeSet;

pub const QUALIFIED_THRESHOLD: i32 = 60;
const HIGH_INTEREST_THRESHOLD: i32 = 70;
const LOW_INTEREST_THRESHOLD: i32 = 30;

/// Common free mail providers; anything else counts as a corporate domain.
const FREE_EMAIL_PROVIDERS: &[&str] = &[
    "gmail.com",
    "hotmail.com",
    "outlook.com",
    "yahoo.com",
    "yahoo.com.br",
    "icloud.com",
    "live.com",
    "aol.com",
    "protonmail.com",
    "bol.com.br",
    "uol.com.br",
    "terra.com.br",
];

const DECISION_MAKER_KEYWORDS: &[&str] = &[
    "ceo", "founder", "director", "manager", "head", "vp", "president", "partner", "owner",
    "fundador", "fundadora", "diretor", "diretora", "gerente", "presidente", "socio", "sócio",
    "dono", "dona", "proprietario", "proprietário",
];

const BUDGET_KEYS: &[&str] = &["budget", "orcamento", "orçamento", "verba", "investimento"];

const LOW_INTENT_PHRASES: &[&str] = &[
    "none",
    "no budget",
    "zero",
    "n/a",
    "nenhum",
    "sem verba",
    "sem orcamento",
    "sem orçamento",
    "nao tenho",
    "não tenho",
];

const URGENCY_KEYS: &[&str] = &["urgency", "urgencia", "urgência", "timeline", "prazo", "quando"];

const HIGH_URGENCY_PHRASES: &[&str] = &[
    "immediately",
    "asap",
    "this week",
    "urgent",
    "imediato",
    "imediatamente",
    "urgente",
    "essa semana",
    "esta semana",
    "o quanto antes",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreResult {
    /// Clamped to [0, 100]
    pub score: i32,
    /// Deterministic, human-readable list of the rules that fired
    pub reason: String,
    pub tags: BTreeSet<String>,
}

/// Compute the qualification score for a lead.
pub fn score(
    email: Option<&str>,
    company: Option<&str>,
    job_title: Option<&str>,
    submission: &Map<String, Value>,
) -> ScoreResult {
    let mut total = 0i32;
    let mut reasons: Vec<&str> = Vec::new();
    let mut tags = BTreeSet::new();

    if email.map(is_corporate_email).unwrap_or(false) {
        total += 10;
        reasons.push("corporate email (+10)");
    }

    if is_filled(company) {
        total += 10;
        reasons.push("company provided (+10)");
    }

    if is_filled(job_title) {
        total += 10;
        reasons.push("job title provided (+10)");
    }

    if let Some(title) = job_title {
        let title = title.to_lowercase();
        if DECISION_MAKER_KEYWORDS.iter().any(|kw| title.contains(kw)) {
            total += 20;
            reasons.push("decision-maker title (+20)");
            tags.insert("decision-maker".to_string());
        }
    }

    if let Some(budget) = fuzzy_lookup(submission, BUDGET_KEYS) {
        let budget = budget.to_lowercase();
        if LOW_INTENT_PHRASES.iter().any(|p| budget.contains(p)) {
            tags.insert("no-budget".to_string());
        } else {
            total += 20;
            reasons.push("budget stated (+20)");
        }
    }

    if let Some(urgency) = fuzzy_lookup(submission, URGENCY_KEYS) {
        let urgency = urgency.to_lowercase();
        if HIGH_URGENCY_PHRASES.iter().any(|p| urgency.contains(p)) {
            total += 30;
            reasons.push("high urgency (+30)");
        }
    }

    // All terms are non-negative; only the upper clamp can apply.
    let score = total.min(100);

    if score >= HIGH_INTEREST_THRESHOLD {
        tags.insert("high-interest".to_string());
    } else if score < LOW_INTEREST_THRESHOLD {
        tags.insert("low-interest".to_string());
    }

    let reason = if reasons.is_empty() {
        "Base score: no qualification signals in submission.".to_string()
    } else {
        format!("Scored on: {}.", reasons.join(", "))
    };

    ScoreResult { score, reason, tags }
}

fn is_corporate_email(email: &str) -> bool {
    match email.rsplit_once('@') {
        Some((_, domain)) => {
            let domain = domain.trim().to_lowercase();
            !domain.is_empty() && !FREE_EMAIL_PROVIDERS.contains(&domain.as_str())
        }
        None => false,
    }
}

fn is_filled(value: Option<&str>) -> bool {
    value.map(|v| v.trim().len() > 1).unwrap_or(false)
}

/// Find a submission value whose key contains any of the given
/// synonyms, case-insensitively.
fn fuzzy_lookup(submission: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    for (key, value) in submission {
        let key = key.to_lowercase();
        if keys.iter().any(|k| key.contains(k)) {
            match value {
                Value::String(s) if !s.trim().is_empty() => return Some(s.trim().to_string()),
                Value::Number(n) => return Some(n.to_string()),
                _ => {}
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn submission(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn decision_maker_with_budget_scores_seventy() {
        let sub = submission(&[("budget", json!("R$50k"))]);
        let result = score(Some("ceo@bigcorp.com"), Some("BigCorp"), Some("CEO"), &sub);

        assert_eq!(result.score, 70);
        assert!(result.tags.contains("decision-maker"));
        assert!(result.tags.contains("high-interest"));
    }

    #[test]
    fn empty_submission_scores_zero_with_base_reason() {
        let sub = Map::new();
        let result = score(Some("joe@gmail.com"), None, None, &sub);

        assert_eq!(result.score, 0);
        assert!(result.tags.contains("low-interest"));
        assert_eq!(
            result.reason,
            "Base score: no qualification signals in submission."
        );
    }

    #[test]
    fn score_is_deterministic() {
        let sub = submission(&[("budget", json!("10k")), ("urgency", json!("asap"))]);
        let a = score(Some("x@corp.io"), Some("Corp"), Some("Head of Sales"), &sub);
        let b = score(Some("x@corp.io"), Some("Corp"), Some("Head of Sales"), &sub);
        assert_eq!(a, b);
    }

    #[test]
    fn score_never_exceeds_one_hundred() {
        let sub = submission(&[
            ("budget", json!("R$200k")),
            ("urgency", json!("immediately")),
        ]);
        let result = score(
            Some("founder@startup.dev"),
            Some("Startup"),
            Some("Founder & CEO"),
            &sub,
        );
        assert!(result.score <= 100);
        assert_eq!(result.score, 100);
    }

    #[test]
    fn low_intent_budget_tags_without_points() {
        let sub = submission(&[("budget", json!("none at the moment"))]);
        let result = score(None, None, None, &sub);

        assert_eq!(result.score, 0);
        assert!(result.tags.contains("no-budget"));
    }

    #[test]
    fn urgency_phrase_adds_thirty() {
        let sub = submission(&[("timeline", json!("we need this ASAP"))]);
        let result = score(None, None, None, &sub);
        assert_eq!(result.score, 30);
    }

    #[test]
    fn free_provider_email_earns_nothing() {
        let result = score(Some("a@hotmail.com"), None, None, &Map::new());
        assert_eq!(result.score, 0);
    }

    #[test]
    fn portuguese_titles_count_as_decision_maker() {
        let result = score(None, None, Some("Diretora de Marketing"), &Map::new());
        assert!(result.tags.contains("decision-maker"));
        assert_eq!(result.score, 30); // title filled +10, decision keyword +20
    }

    #[test]
    fn mid_range_score_gets_no_coarse_tag() {
        // corporate email + company + title = 30..70 band
        let result = score(Some("a@corp.com"), Some("Corp"), Some("Analyst"), &Map::new());
        assert_eq!(result.score, 30);
        assert!(!result.tags.contains("high-interest"));
        assert!(!result.tags.contains("low-interest"));
    }
}
