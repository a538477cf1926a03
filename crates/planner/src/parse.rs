//! Lenient extraction of plans and completion verdicts from planner replies.
//!
//! The planner is not trusted to produce well-formed output. The rules
//! here are deliberately forgiving: markdown fences are stripped, list
//! items that fail to parse are skipped, and anything uninterpretable
//! yields the neutral result -- an empty plan, or
//! [`CompletionCheck::InProgress`]. Parsing never returns an error.

use serde_json::Value;

use autopub_core::action::Action;
use autopub_core::plan::CompletionCheck;

/// Extract an ordered action list from a raw planner reply.
///
/// Accepts either a bare JSON array or an object with a `steps` array.
/// Items that are not valid actions are skipped; the result is truncated
/// to `max_steps`. Malformed input yields an empty plan.
pub fn parse_steps(raw: &str, max_steps: usize) -> Vec<Action> {
    let Some(value) = extract_json(raw) else {
        return Vec::new();
    };
    let items = match &value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("steps") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };
    items
        .iter()
        .filter_map(|item| serde_json::from_value::<Action>(item.clone()).ok())
        .take(max_steps)
        .collect()
}

/// Extract a completion verdict from a raw planner reply.
///
/// Expects `{"status": "...", "next_steps": [...]}`. Any unknown status,
/// missing field, or parse failure is `InProgress` -- never an error.
pub fn parse_completion(raw: &str) -> CompletionCheck {
    let Some(value) = extract_json(raw) else {
        return CompletionCheck::InProgress;
    };
    let status = value.get("status").and_then(Value::as_str).unwrap_or("");
    match status {
        "published" => CompletionCheck::Published,
        "ready_to_publish" => {
            let steps = match value.get("next_steps") {
                Some(Value::Array(items)) => items
                    .iter()
                    .filter_map(|item| serde_json::from_value::<Action>(item.clone()).ok())
                    .collect(),
                _ => Vec::new(),
            };
            CompletionCheck::ReadyToPublish(steps)
        }
        _ => CompletionCheck::InProgress,
    }
}

fn extract_json(raw: &str) -> Option<Value> {
    serde_json::from_str(strip_fences(raw.trim())).ok()
}

/// Strip a surrounding markdown code fence (```json ... ``` or ``` ... ```).
fn strip_fences(raw: &str) -> &str {
    let Some(rest) = raw.strip_prefix("```") else {
        return raw;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    match rest.rfind("```") {
        Some(end) => rest[..end].trim(),
        None => raw,
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use autopub_core::action::ActionKind;

    use super::*;

    #[test]
    fn parses_bare_array() {
        let steps = parse_steps(r#"[{"kind":"click","target":"save"}]"#, 5);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].kind, ActionKind::Click);
    }

    #[test]
    fn parses_steps_object_and_truncates() {
        let raw = r#"{"steps":[
            {"kind":"click","target":"a"},
            {"kind":"click","target":"b"},
            {"kind":"click","target":"c"}
        ]}"#;
        assert_eq!(parse_steps(raw, 2).len(), 2);
    }

    #[test]
    fn strips_markdown_fences() {
        let raw = "```json\n[{\"kind\":\"wait\"}]\n```";
        assert_eq!(parse_steps(raw, 5).len(), 1);
    }

    #[test]
    fn invalid_items_are_skipped() {
        let raw = r#"[{"kind":"click","target":"ok"}, {"kind":"teleport"}, 42]"#;
        let steps = parse_steps(raw, 5);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].target.as_deref(), Some("ok"));
    }

    #[test]
    fn garbage_yields_empty_plan() {
        assert!(parse_steps("the page looks fine to me", 5).is_empty());
        assert!(parse_steps("", 5).is_empty());
        assert!(parse_steps("{\"thoughts\": \"hmm\"}", 5).is_empty());
    }

    #[test]
    fn completion_published() {
        assert_matches!(
            parse_completion(r#"{"status":"published"}"#),
            CompletionCheck::Published
        );
    }

    #[test]
    fn completion_ready_with_final_steps() {
        let raw = r#"{"status":"ready_to_publish","next_steps":[{"kind":"click","target":"publish"}]}"#;
        let check = parse_completion(raw);
        assert_matches!(check, CompletionCheck::ReadyToPublish(ref steps) if steps.len() == 1);
    }

    #[test]
    fn completion_ready_without_steps_is_still_ready() {
        assert_matches!(
            parse_completion(r#"{"status":"ready_to_publish"}"#),
            CompletionCheck::ReadyToPublish(ref steps) if steps.is_empty()
        );
    }

    #[test]
    fn anything_else_is_in_progress() {
        for raw in [
            r#"{"status":"in_progress"}"#,
            r#"{"status":"definitely maybe"}"#,
            r#"{"verdict":"published"}"#,
            "not json at all",
            "",
        ] {
            assert_matches!(parse_completion(raw), CompletionCheck::InProgress, "{raw}");
        }
    }
}
