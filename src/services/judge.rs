//! The comparative judge: prompt construction, LLM invocation, response
//! parsing, and the content hash that keys cached judgments.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::id::{content_id, short_id};
use crate::domain::models::Attempt;
use crate::domain::ports::{ChatModel, ChatRequest};
use crate::services::narrative::NarrativeDiff;

pub const PROMPT_VERSION_V1: &str = "v1";

const SYSTEM_PROMPT: &str = "You are a strict comparative judge of two agent attempts. \
Respond with JSON only, no prose, exactly of the form \
{\"winner\":\"A\"|\"B\",\"confidence\":<number between 0 and 1>,\"rationale\":\"<one sentence>\"}.";

#[derive(Debug, Clone)]
pub struct JudgeOptions {
    pub model: String,
    pub prompt_version: String,
}

#[derive(Debug, Clone)]
pub struct JudgeVerdict {
    pub winner_attempt_id: String,
    pub confidence: f64,
    pub rationale: String,
    pub content_hash: String,
}

pub struct JudgeService {
    chat: Arc<dyn ChatModel>,
}

impl JudgeService {
    pub fn new(chat: Arc<dyn ChatModel>) -> Self {
        Self { chat }
    }

    pub async fn compare(
        &self,
        left: &Attempt,
        right: &Attempt,
        diff: &NarrativeDiff,
        options: &JudgeOptions,
    ) -> CoreResult<JudgeVerdict> {
        let content_hash = content_id(&json!({
            "left_attempt_id": left.id,
            "right_attempt_id": right.id,
            "prompt_version": options.prompt_version,
            "model": options.model,
        }))?;

        let prompt = build_prompt(&options.prompt_version, left, right, diff)?;
        let raw = self
            .chat
            .complete(ChatRequest {
                model: options.model.clone(),
                system: SYSTEM_PROMPT.to_string(),
                user: prompt,
                temperature: 0.0,
            })
            .await?;

        let verdict = parse_judge_response(&raw)?;
        let winner_attempt_id = match verdict.winner.as_str() {
            "A" => left.id.clone(),
            _ => right.id.clone(),
        };
        Ok(JudgeVerdict {
            winner_attempt_id,
            confidence: verdict.confidence,
            rationale: verdict.rationale,
            content_hash,
        })
    }
}

/// Build the judge prompt. Only version v1 is known.
pub fn build_prompt(
    version: &str,
    left: &Attempt,
    right: &Attempt,
    diff: &NarrativeDiff,
) -> CoreResult<String> {
    if version != PROMPT_VERSION_V1 {
        return Err(CoreError::InvalidInput(format!(
            "unknown prompt version: {version}"
        )));
    }

    let mut prompt = String::new();
    prompt.push_str("Two attempts at the same task are compared below.\n\n");
    prompt.push_str(&format!(
        "Attempt A: #{} (ordinal {}), status: {}\n",
        short_id(&left.id),
        left.ordinal,
        left.status.as_str()
    ));
    prompt.push_str(&format!("Result A: {}\n", left.result));
    prompt.push_str(&format!(
        "Attempt B: #{} (ordinal {}), status: {}\n",
        short_id(&right.id),
        right.ordinal,
        right.status.as_str()
    ));
    prompt.push_str(&format!("Result B: {}\n\n", right.result));

    prompt.push_str("Deltas:\n");
    if diff.deltas.is_empty() {
        prompt.push_str("- none\n");
    }
    for delta in &diff.deltas {
        prompt.push_str(&format!("- {delta}\n"));
    }

    prompt.push_str("\nPros and cons of A:\n");
    for pro in &diff.left.pros {
        prompt.push_str(&format!("+ {pro}\n"));
    }
    for con in &diff.left.cons {
        prompt.push_str(&format!("- {con}\n"));
    }
    prompt.push_str("\nPros and cons of B:\n");
    for pro in &diff.right.pros {
        prompt.push_str(&format!("+ {pro}\n"));
    }
    for con in &diff.right.cons {
        prompt.push_str(&format!("- {con}\n"));
    }

    prompt.push_str("\nWhich attempt is better? Answer with the JSON schema from the system message.\n");
    Ok(prompt)
}

#[derive(Debug, Deserialize)]
pub struct RawVerdict {
    pub winner: String,
    pub confidence: f64,
    pub rationale: String,
}

/// Extract the first fenced JSON block, or the first balanced `{...}` span.
fn extract_json_span(raw: &str) -> Option<&str> {
    if let Some(fence_start) = raw.find("```") {
        let after = &raw[fence_start + 3..];
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        if let Some(fence_end) = body.find("```") {
            let candidate = body[..fence_end].trim();
            if candidate.starts_with('{') {
                return Some(candidate);
            }
        }
    }

    let start = raw.find('{')?;
    let bytes = raw.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse and schema-check the judge response. Any failure is an external
/// error: the transport produced something the contract does not allow.
pub fn parse_judge_response(raw: &str) -> CoreResult<RawVerdict> {
    let span = extract_json_span(raw)
        .ok_or_else(|| CoreError::External("judge response contains no JSON object".into()))?;
    let verdict: RawVerdict = serde_json::from_str(span)
        .map_err(|e| CoreError::External(format!("judge response is not valid JSON: {e}")))?;

    if verdict.winner != "A" && verdict.winner != "B" {
        return Err(CoreError::External(format!(
            "judge winner must be \"A\" or \"B\", got {:?}",
            verdict.winner
        )));
    }
    if !verdict.confidence.is_finite() || !(0.0..=1.0).contains(&verdict.confidence) {
        return Err(CoreError::External(format!(
            "judge confidence out of range: {}",
            verdict.confidence
        )));
    }
    Ok(verdict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::AttemptStatus;
    use crate::services::narrative::build_narrative_diff;

    fn attempts() -> (Attempt, Attempt) {
        let mut left = Attempt::new("run-1", 0).unwrap();
        left.status = AttemptStatus::Completed;
        let mut right = Attempt::new("run-1", 1).unwrap();
        right.status = AttemptStatus::Completed;
        (left, right)
    }

    #[test]
    fn unknown_prompt_version_is_invalid_input() {
        let (left, right) = attempts();
        let diff = build_narrative_diff(&left, &[], &right, &[]);
        let err = build_prompt("v2", &left, &right, &diff).unwrap_err();
        assert_eq!(err.kind(), "InvalidInput");
    }

    #[test]
    fn v1_prompt_names_both_attempts_with_ordinals() {
        let (left, right) = attempts();
        let diff = build_narrative_diff(&left, &[], &right, &[]);
        let prompt = build_prompt("v1", &left, &right, &diff).unwrap();
        assert!(prompt.contains(&format!("Attempt A: #{} (ordinal 0)", short_id(&left.id))));
        assert!(prompt.contains(&format!("Attempt B: #{} (ordinal 1)", short_id(&right.id))));
    }

    #[test]
    fn parses_a_bare_json_object() {
        let verdict =
            parse_judge_response(r#"{"winner":"A","confidence":0.8,"rationale":"cleaner"}"#)
                .unwrap();
        assert_eq!(verdict.winner, "A");
        assert!((verdict.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn parses_a_fenced_json_block() {
        let raw = "Here is my verdict:\n```json\n{\"winner\":\"B\",\"confidence\":0.5,\"rationale\":\"fewer errors\"}\n```\n";
        let verdict = parse_judge_response(raw).unwrap();
        assert_eq!(verdict.winner, "B");
    }

    #[test]
    fn parses_an_embedded_object_with_braces_in_strings() {
        let raw = "prefix {\"winner\":\"A\",\"confidence\":1.0,\"rationale\":\"uses {braces} safely\"} suffix";
        let verdict = parse_judge_response(raw).unwrap();
        assert_eq!(verdict.rationale, "uses {braces} safely");
    }

    #[test]
    fn schema_violations_are_external_errors() {
        assert_eq!(
            parse_judge_response("no json at all").unwrap_err().kind(),
            "ExternalError"
        );
        assert_eq!(
            parse_judge_response(r#"{"winner":"C","confidence":0.5,"rationale":"x"}"#)
                .unwrap_err()
                .kind(),
            "ExternalError"
        );
        assert_eq!(
            parse_judge_response(r#"{"winner":"A","confidence":1.5,"rationale":"x"}"#)
                .unwrap_err()
                .kind(),
            "ExternalError"
        );
    }
}
