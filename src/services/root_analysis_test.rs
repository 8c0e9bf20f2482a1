use std::sync::Arc;

use serde_json::json;

use super::*;
use crate::llm::mock::{MockModel, Reply, quota_error};

const UNDERSTAND: &str = r#"{
  "viMeaning": "hiểu, nắm được",
  "prefixText": "under",
  "rootText": "stand",
  "connection": "under (dưới) + stand (đứng) -> đứng dưới để nắm bắt = hiểu",
  "sameRoot": [
    { "word": "standard", "viMeaning": "tiêu chuẩn", "prefixText": null, "rootText": "stand", "connection": "stand (đứng) -> cái để đứng làm chuẩn = tiêu chuẩn" },
    { "word": "outstanding", "viMeaning": "nổi bật", "prefixText": "out", "rootText": "stand", "connection": "out (ra ngoài) + stand (đứng) -> đứng ra ngoài = nổi bật" },
    { "word": "withstand", "viMeaning": "chịu đựng", "prefixText": "with", "rootText": "stand", "connection": "with (cùng) + stand (đứng) -> đứng cùng để chống lại = chịu đựng" },
    { "word": "grandstand", "viMeaning": "khán đài", "prefixText": "grand", "rootText": "stand", "connection": "grand (lớn) + stand (đứng) -> chỗ đứng lớn = khán đài" },
    { "word": "bandstand", "viMeaning": "sân khấu nhạc", "prefixText": "band", "rootText": "stand", "connection": "band (ban nhạc) + stand (đứng) -> chỗ đứng cho ban nhạc = sân khấu nhạc" }
  ]
}"#;

fn understand() -> RootAnalysis {
    validate(&serde_json::from_str(UNDERSTAND).unwrap()).unwrap()
}

fn related(word: &str, root: &str) -> RelatedWord {
    RelatedWord {
        word: word.into(),
        vi_meaning: "nghĩa".into(),
        prefix_text: None,
        root_text: root.into(),
        connection: "c".into(),
    }
}

// =============================================================================
// extract_json
// =============================================================================

#[test]
fn extract_plain_object() {
    let out = extract_json(UNDERSTAND).unwrap();
    let value: Value = serde_json::from_str(&out).unwrap();
    assert_eq!(value["rootText"], "stand");
}

#[test]
fn extract_from_code_fence_with_prose() {
    let raw = "Here you go:\n```json\n{\"a\": 1}\n```\nHope this helps!";
    assert_eq!(extract_json(raw).unwrap().trim(), "{\"a\": 1}");
}

#[test]
fn extract_from_single_line_fence() {
    let raw = "```json{\"a\": {\"b\": 2}}```";
    assert_eq!(extract_json(raw).unwrap(), "{\"a\": {\"b\": 2}}");
}

#[test]
fn extract_takes_first_balanced_object() {
    let raw = "{\"a\": 1} and later {\"b\": 2}";
    assert_eq!(extract_json(raw).unwrap(), "{\"a\": 1}");
}

#[test]
fn extract_ignores_braces_inside_strings() {
    let raw = r#"{"connection": "a } b { c \" }", "x": 1} trailing"#;
    let out = extract_json(raw).unwrap();
    let value: Value = serde_json::from_str(&out).unwrap();
    assert_eq!(value["x"], 1);
    assert_eq!(value["connection"], "a } b { c \" }");
}

#[test]
fn extract_removes_comments_outside_strings() {
    let raw = "{\n  // meaning\n  \"a\": \"http://x.y\", /* note } */\n  \"b\": 2\n}";
    let value: Value = serde_json::from_str(&extract_json(raw).unwrap()).unwrap();
    assert_eq!(value["a"], "http://x.y");
    assert_eq!(value["b"], 2);
}

#[test]
fn extract_removes_trailing_commas() {
    let raw = "{\"list\": [1, 2, ], \"o\": {\"k\": \"v\",\n},}";
    let value: Value = serde_json::from_str(&extract_json(raw).unwrap()).unwrap();
    assert_eq!(value["list"], json!([1, 2]));
    assert_eq!(value["o"]["k"], "v");
}

#[test]
fn extract_keeps_commas_inside_strings() {
    let raw = r#"{"a": "x, }"}"#;
    let value: Value = serde_json::from_str(&extract_json(raw).unwrap()).unwrap();
    assert_eq!(value["a"], "x, }");
}

#[test]
fn extract_falls_back_to_last_brace_when_unbalanced() {
    let raw = "{\"a\": {\"b\": 1}";
    assert_eq!(extract_json(raw).unwrap(), "{\"a\": {\"b\": 1}");
}

#[test]
fn extract_without_object_is_none() {
    assert!(extract_json("I cannot analyse that word.").is_none());
    assert!(extract_json("} only closing {").is_none());
    assert!(extract_json("").is_none());
}

// =============================================================================
// validate
// =============================================================================

#[test]
fn validate_accepts_well_formed_analysis() {
    let analysis = understand();
    assert_eq!(analysis.prefix_text.as_deref(), Some("under"));
    assert_eq!(analysis.same_root.len(), 5);
    assert_eq!(analysis.same_root[0].prefix_text, None);
}

#[test]
fn validate_lists_every_issue() {
    let value = json!({
        "viMeaning": "",
        "rootText": 5,
        "prefixText": 3,
        "sameRoot": [{ "word": "x", "viMeaning": "y", "rootText": "x" }, "nope"]
    });
    let failure = validate(&value).unwrap_err();
    assert_eq!(failure.error, "Root analysis validation failed");
    assert!(failure.details.contains(&"viMeaning: must not be empty".to_string()));
    assert!(failure.details.contains(&"rootText: expected string".to_string()));
    assert!(failure.details.contains(&"prefixText: expected string or null".to_string()));
    assert!(failure.details.contains(&"connection: required".to_string()));
    assert!(failure.details.contains(&"sameRoot.0.connection: required".to_string()));
    assert!(failure.details.contains(&"sameRoot.1: expected object".to_string()));
}

#[test]
fn validate_bounds_related_words() {
    let mut value: Value = serde_json::from_str(UNDERSTAND).unwrap();
    value["sameRoot"] = json!([]);
    assert!(validate(&value).unwrap_err().details.contains(&"sameRoot: must contain at least one word".to_string()));

    let entry = value_entry();
    value["sameRoot"] = Value::Array(vec![entry; MAX_RELATED_WORDS + 1]);
    assert!(validate(&value).unwrap_err().details.contains(&"sameRoot: must contain at most 10 words".to_string()));
}

fn value_entry() -> Value {
    json!({ "word": "standard", "viMeaning": "tiêu chuẩn", "prefixText": null, "rootText": "stand", "connection": "c" })
}

#[test]
fn validate_rejects_non_object_and_string_prefix_null() {
    assert_eq!(validate(&json!([1])).unwrap_err().details, vec!["root: expected object"]);

    let mut value: Value = serde_json::from_str(UNDERSTAND).unwrap();
    value["prefixText"] = json!("");
    assert!(validate(&value).is_err());
}

// =============================================================================
// attempt_fix
// =============================================================================

#[test]
fn fix_accepts_snake_case_and_wrapper() {
    let value = json!({
        "analysis": {
            "vi_meaning": " hiểu ",
            "prefix_text": "under",
            "root_text": "stand",
            "same_root": [{ "word": "standard", "vi_meaning": "tiêu chuẩn", "root_text": "stand" }]
        }
    });
    let fixed = attempt_fix(&value).unwrap();
    assert_eq!(fixed.vi_meaning, "hiểu");
    assert_eq!(fixed.connection, "under + stand -> hiểu");
    assert_eq!(fixed.same_root[0].connection, "stand -> tiêu chuẩn");
}

#[test]
fn fix_maps_placeholder_prefixes_to_none() {
    for placeholder in ["", "null", "None", "-"] {
        let value = json!({
            "viMeaning": "m", "prefixText": placeholder, "rootText": "r", "connection": "c",
            "sameRoot": [{ "word": "rr", "viMeaning": "m", "rootText": "r", "prefix": "NULL" }]
        });
        let fixed = attempt_fix(&value).unwrap();
        assert_eq!(fixed.prefix_text, None, "placeholder {placeholder:?}");
        assert_eq!(fixed.same_root[0].prefix_text, None);
    }
}

#[test]
fn fix_wraps_single_related_word() {
    let value = json!({
        "meaning": "m", "root": "r",
        "relatedWords": { "word": "rx", "meaning": "n", "root": "r" }
    });
    let fixed = attempt_fix(&value).unwrap();
    assert_eq!(fixed.same_root.len(), 1);
    assert_eq!(fixed.same_root[0].word, "rx");
}

#[test]
fn fix_drops_malformed_words_and_truncates() {
    let good = json!({ "word": "w", "viMeaning": "m", "rootText": "w" });
    let mut entries = vec![json!({ "word": "bad" }), json!(42)];
    entries.extend(std::iter::repeat_n(good, 7));
    let value = json!({ "viMeaning": "m", "rootText": "w", "sameRoot": entries });
    assert_eq!(attempt_fix(&value).unwrap().same_root.len(), EXPECTED_RELATED_WORDS);
}

#[test]
fn fix_gives_up_without_meaning_root_or_words() {
    assert!(attempt_fix(&json!({ "rootText": "r", "sameRoot": [value_entry()] })).is_none());
    assert!(attempt_fix(&json!({ "viMeaning": "m", "sameRoot": [value_entry()] })).is_none());
    assert!(attempt_fix(&json!({ "viMeaning": "m", "rootText": "r", "sameRoot": [{ "word": "x" }] })).is_none());
    assert!(attempt_fix(&json!({ "viMeaning": "m", "rootText": "r" })).is_none());
    assert!(attempt_fix(&json!("text")).is_none());
}

// =============================================================================
// validate_complete
// =============================================================================

#[test]
fn complete_accepts_understand_without_warnings() {
    assert_eq!(validate_complete(&understand(), "understand").unwrap(), Vec::<String>::new());
}

#[test]
fn complete_is_case_insensitive_and_trims() {
    assert!(validate_complete(&understand(), "  Understand ").unwrap().is_empty());
}

#[test]
fn complete_rejects_missing_root() {
    let err = validate_complete(&understand(), "underground").unwrap_err();
    assert_eq!(err, "Root \"stand\" does not appear in \"underground\"");
}

#[test]
fn complete_rejects_missing_prefix() {
    let mut analysis = understand();
    analysis.prefix_text = Some("over".into());
    assert!(validate_complete(&analysis, "understand").unwrap_err().starts_with("Prefix \"over\""));
}

#[test]
fn complete_rejects_prefix_after_root() {
    let mut analysis = understand();
    analysis.prefix_text = Some("ing".into());
    let err = validate_complete(&analysis, "standing").unwrap_err();
    assert_eq!(err, "Prefix \"ing\" must come before root \"stand\"");
}

#[test]
fn complete_warns_on_inner_prefix() {
    let mut analysis = understand();
    analysis.prefix_text = Some("der".into());
    let warnings = validate_complete(&analysis, "understand").unwrap();
    assert_eq!(warnings, vec!["Prefix \"der\" is not at the start of \"understand\""]);
}

#[test]
fn complete_warns_on_related_word_problems() {
    let mut analysis = understand();
    analysis.same_root = vec![
        related("standard", "stand"),
        related("Standard", "stand"),
        related("understand", "stand"),
        related("status", "stand"),
    ];
    let warnings = validate_complete(&analysis, "understand").unwrap();
    assert_eq!(
        warnings,
        vec![
            "Expected 5 related words, got 4",
            "Related word \"Standard\" is repeated",
            "Related words include the analyzed word \"understand\"",
            "Related word \"status\" does not contain its root \"stand\"",
        ]
    );
}

// =============================================================================
// interpret / run
// =============================================================================

#[test]
fn interpret_reports_each_failure_stage() {
    assert!(matches!(interpret("no json here", "understand"), Err(RootAnalysisError::NoJson)));
    assert!(matches!(interpret("{\"a\": tru}", "understand"), Err(RootAnalysisError::MalformedJson(_))));
    match interpret("{\"viMeaning\": 1}", "understand") {
        Err(RootAnalysisError::InvalidStructure(details)) => assert!(!details.is_empty()),
        other => panic!("expected invalid structure, got {other:?}"),
    }
    assert!(matches!(interpret(UNDERSTAND, "overground"), Err(RootAnalysisError::Logical(_))));
}

#[test]
fn interpret_uses_fix_when_validation_fails() {
    let raw = "```json\n{\"vi_meaning\": \"hiểu\", \"root\": \"stand\", \"prefix\": \"under\", \"related\": [{\"word\": \"standard\", \"meaning\": \"tiêu chuẩn\", \"root\": \"stand\"},]}\n```";
    let (analysis, warnings) = interpret(raw, "understand").unwrap();
    assert_eq!(analysis.root_text, "stand");
    assert_eq!(warnings, vec!["Expected 5 related words, got 1"]);
}

#[test]
fn error_details_match_client_contract() {
    assert_eq!(RootAnalysisError::NoJson.details(), vec!["No valid JSON structure found in response"]);
    assert_eq!(RootAnalysisError::Logical("bad".into()).details(), vec!["bad"]);
    assert_eq!(
        RootAnalysisError::Unavailable(quota_error()).to_string(),
        "AI analysis service is temporarily unavailable"
    );
}

#[tokio::test]
async fn run_sends_prompt_and_parses_reply() {
    let model = Arc::new(MockModel::text(UNDERSTAND));
    let (analysis, warnings) = run(model.as_ref(), "understand", "I want to understand.").await.unwrap();
    assert_eq!(analysis.vi_meaning, "hiểu, nắm được");
    assert!(warnings.is_empty());
    assert!(model.prompts()[0].starts_with("Analyze the word root for: \"understand\""));
}

#[tokio::test]
async fn run_maps_exhausted_keys_to_unavailable() {
    let model = MockModel::new(2, vec![Reply::Fail(quota_error()), Reply::Fail(quota_error())]);
    let err = run(&model, "understand", "ctx").await.unwrap_err();
    assert!(matches!(err, RootAnalysisError::Unavailable(LlmError::AllKeysFailed(_))));
}
