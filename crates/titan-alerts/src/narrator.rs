//! Narrator: a short operator-facing text from the structured reasons JSON.
//!
//! The LLM is optional and untrusted. Its output is accepted only when it is
//! non-empty, at least two sentences after trimming to three, and introduces
//! no number that is not literally present in the reasons JSON. Anything
//! else falls back to the deterministic template built from the same JSON.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Value};
use tracing::warn;

use titan_core::config::Settings;
use titan_core::http::HttpClient;

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("number regex"));
static SENTENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?]+").expect("sentence regex"));

const SENTENCE_LIMIT: usize = 3;
const MIN_SENTENCES: usize = 2;

fn format_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(_) | Value::Array(_) => value.to_string(),
        other => other.to_string(),
    }
}

fn format_list(value: Option<&Value>) -> String {
    let items: Vec<String> = match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter(|v| !v.is_null())
            .map(format_scalar)
            .collect(),
        Some(other) => vec![format_scalar(other)],
    };
    if items.is_empty() {
        "none provided".to_string()
    } else {
        items.join("; ")
    }
}

/// Two-sentence summary built purely from the reasons JSON.
pub fn deterministic_template(reasons: &Value) -> String {
    let mut parts = Vec::new();
    for key in [
        "conviction",
        "tss",
        "regime",
        "tier",
        "wallet_total_value",
        "total_value",
    ] {
        if let Some(value) = reasons.get(key).filter(|v| !v.is_null()) {
            parts.push(format!("{key} {}", format_scalar(value)));
        }
    }
    let summary = if parts.is_empty() {
        "Alert summary based on provided signals".to_string()
    } else {
        format!(
            "Alert summary based on provided signals: {}",
            parts.join(", ")
        )
    };
    format!(
        "{summary}. Reasons: {}. Risks: {}. Invalidation: {}.",
        format_list(reasons.get("reasons")),
        format_list(reasons.get("risks")),
        format_list(reasons.get("invalidation")),
    )
}

fn sentences(text: &str) -> Vec<String> {
    SENTENCE_RE
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn trim_to_sentences(text: &str, limit: usize) -> String {
    let mut parts = sentences(text);
    parts.truncate(limit);
    format!("{}.", parts.join(". "))
}

/// Every number token in the response must appear verbatim in the JSON.
pub fn has_only_known_numbers(response: &str, reasons_json: &str) -> bool {
    let allowed: HashSet<&str> = NUMBER_RE
        .find_iter(reasons_json)
        .map(|m| m.as_str())
        .collect();
    NUMBER_RE
        .find_iter(response)
        .all(|m| allowed.contains(m.as_str()))
}

/// Validation applied to a raw LLM response; `None` means "use the
/// template".
pub fn validate_narrative(raw: &str, reasons_json: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let narrative = trim_to_sentences(trimmed, SENTENCE_LIMIT);
    if sentences(&narrative).len() < MIN_SENTENCES {
        return None;
    }
    if !has_only_known_numbers(&narrative, reasons_json) {
        return None;
    }
    Some(narrative)
}

pub async fn narrate_alert(settings: &Settings, http: &HttpClient, reasons: &Value) -> String {
    let reasons_json =
        serde_json::to_string(reasons).unwrap_or_else(|_| "{}".to_string());
    let prompt = format!(
        "Write a 2-3 sentence narrative using only the exact values in the JSON. \
         Do not invent, infer, or calculate any numbers. \
         If you mention numbers, they must appear verbatim in the JSON. \
         JSON: {reasons_json}"
    );
    let body = json!({
        "model": settings.ollama_model,
        "prompt": prompt,
        "stream": false,
    });
    let url = format!("{}/api/generate", settings.ollama_url);

    let raw = match http.post_json(&url, &body).await {
        Ok(payload) => payload
            .get("response")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        Err(err) => {
            warn!(error = %err, "narrator request failed");
            return deterministic_template(reasons);
        }
    };

    validate_narrative(&raw, &reasons_json)
        .unwrap_or_else(|| deterministic_template(reasons))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reasons() -> Value {
        json!({
            "conviction": 71.5,
            "tss": 85.0,
            "tier": "shadow",
            "reasons": ["strong wallet", "deep liquidity"],
            "risks": ["new pair"],
        })
    }

    #[test]
    fn template_mentions_headline_fields() {
        let text = deterministic_template(&reasons());
        assert!(text.contains("conviction 71.5"));
        assert!(text.contains("tss 85"));
        assert!(text.contains("tier shadow"));
        assert!(text.contains("strong wallet; deep liquidity"));
        assert!(text.contains("Invalidation: none provided"));
    }

    #[test]
    fn hallucinated_numbers_are_rejected() {
        let reasons_json = serde_json::to_string(&reasons()).unwrap();
        assert!(validate_narrative(
            "Conviction looks strong for this shadow wallet. Liquidity depth supports an exit.",
            &reasons_json
        )
        .is_some());
        assert!(validate_narrative(
            "Conviction looks strong for this wallet. Expect a 300 percent move.",
            &reasons_json
        )
        .is_none());
    }

    #[test]
    fn short_or_empty_responses_are_rejected() {
        let reasons_json = serde_json::to_string(&reasons()).unwrap();
        assert!(validate_narrative("", &reasons_json).is_none());
        assert!(validate_narrative("One sentence only.", &reasons_json).is_none());
    }

    #[test]
    fn long_responses_trim_to_three_sentences() {
        let reasons_json = serde_json::to_string(&reasons()).unwrap();
        let narrative = validate_narrative(
            "First thing. Second thing. Third thing. Fourth thing.",
            &reasons_json,
        )
        .unwrap();
        assert_eq!(sentences(&narrative).len(), 3);
    }

    #[test]
    fn number_subset_check_is_verbatim() {
        assert!(has_only_known_numbers("value 85", r#"{"tss": 85.0, "x": "85"}"#));
        assert!(!has_only_known_numbers("value 850", r#"{"tss": 85}"#));
    }
}
