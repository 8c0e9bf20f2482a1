use serde_json::json;

use super::*;

// =============================================================================
// is_valid_span
// =============================================================================

#[test]
fn span_with_strings_and_numbers_is_valid() {
    let span = json!({ "startElement": "e1", "startOffset": 0, "endElement": "e2", "endOffset": 4.0 });
    assert!(is_valid_span(&span));
}

#[test]
fn span_rejects_missing_or_mistyped_fields() {
    assert!(!is_valid_span(&json!({ "startElement": "e1", "startOffset": 0, "endElement": "e1" })));
    assert!(!is_valid_span(&json!({ "startElement": "", "startOffset": 0, "endElement": "e1", "endOffset": 1 })));
    assert!(!is_valid_span(&json!({ "startElement": "e1", "startOffset": "0", "endElement": "e1", "endOffset": 1 })));
    assert!(!is_valid_span(&json!({ "startElement": 1, "startOffset": 0, "endElement": "e1", "endOffset": 1 })));
    assert!(!is_valid_span(&json!("e1:0-4")));
}

// =============================================================================
// merge_marker
// =============================================================================

const SENTENCE: &str = "The plane will take off soon.";
const MARKER: &str = "[take off|cất cánh]";

#[test]
fn merge_without_prior_annotation_uses_sentence() {
    assert_eq!(
        merge_marker(SENTENCE, None, "take off", MARKER),
        "The plane will [take off|cất cánh] soon."
    );
}

#[test]
fn merge_replaces_every_existing_marker_for_text() {
    let annotated = "[take off|bỏ ra] then [take off|tháo] and [plane|máy bay]";
    assert_eq!(
        merge_marker(SENTENCE, Some(annotated), "take off", MARKER),
        "[take off|cất cánh] then [take off|cất cánh] and [plane|máy bay]"
    );
}

#[test]
fn merge_replaces_first_plain_occurrence_in_annotated_text() {
    let annotated = "The [plane|máy bay] will take off soon, take off!";
    assert_eq!(
        merge_marker(SENTENCE, Some(annotated), "take off", MARKER),
        "The [plane|máy bay] will [take off|cất cánh] soon, take off!"
    );
}

#[test]
fn merge_falls_back_to_sentence_when_text_absent_from_annotation() {
    let annotated = "Something unrelated.";
    assert_eq!(
        merge_marker(SENTENCE, Some(annotated), "take off", MARKER),
        "The plane will [take off|cất cánh] soon."
    );
}

#[test]
fn merge_escapes_regex_metacharacters_in_text() {
    let annotated = "Is it [a+b?|a cộng b] or a+b?";
    assert_eq!(
        merge_marker("Is it a+b?", Some(annotated), "a+b?", "[a+b?|tổng]"),
        "Is it [a+b?|tổng] or a+b?"
    );
}

#[test]
fn merge_does_not_expand_dollar_groups_in_marker() {
    let annotated = "[cost|giá] is high";
    assert_eq!(merge_marker("cost is high", Some(annotated), "cost", "[cost|$1]"), "[cost|$1] is high");
}

#[test]
fn merge_leaves_text_alone_when_missing_everywhere() {
    assert_eq!(merge_marker(SENTENCE, None, "land", "[land|hạ cánh]"), SENTENCE);
}

// =============================================================================
// plan_passthrough
// =============================================================================

fn sentence(content: &str, annotated: Option<&str>) -> Sentence {
    Sentence {
        id: Uuid::new_v4(),
        paragraph_id: Uuid::nil(),
        content: content.into(),
        position: 0,
        annotations: annotated.map(|a| json!({ "annotatedText": a, "lastUpdated": "2025-01-01T00:00:00Z" })),
    }
}

#[test]
fn passthrough_targets_named_sentence() {
    let sentences = vec![sentence("One.", None), sentence("Two.", None)];
    let (id, text) = plan_passthrough(&sentences, Some(sentences[1].id), None, "RESULT").unwrap();
    assert_eq!(id, sentences[1].id);
    assert_eq!(text, "RESULT");
}

#[test]
fn passthrough_ignores_foreign_sentence_id() {
    let sentences = vec![sentence("One.", None)];
    assert!(plan_passthrough(&sentences, Some(Uuid::new_v4()), Some("One"), "R").is_none());
}

#[test]
fn passthrough_replaces_selection_in_containing_sentence() {
    let sentences = vec![sentence("Cats sleep.", None), sentence("Dogs bark loudly.", None)];
    let (id, text) = plan_passthrough(&sentences, None, Some("bark"), "[bark|sủa]").unwrap();
    assert_eq!(id, sentences[1].id);
    assert_eq!(text, "Dogs [bark|sủa] loudly.");
}

#[test]
fn passthrough_prefers_existing_annotated_text() {
    let sentences = vec![sentence("Dogs bark loudly.", Some("[Dogs|chó] bark loudly."))];
    let (_, text) = plan_passthrough(&sentences, None, Some("bark"), "[bark|sủa]").unwrap();
    assert_eq!(text, "[Dogs|chó] [bark|sủa] loudly.");
}

#[test]
fn passthrough_appends_to_first_sentence_when_selection_not_found() {
    let sentences = vec![sentence("Cats sleep.", Some("[Cats|mèo] sleep.")), sentence("Dogs bark.", None)];
    let (id, text) = plan_passthrough(&sentences, None, Some("fish"), "[fish|cá]").unwrap();
    assert_eq!(id, sentences[0].id);
    assert_eq!(text, "[Cats|mèo] sleep. [fish|cá]");
}

#[test]
fn passthrough_first_sentence_without_annotation_keeps_content() {
    let sentences = vec![sentence("Cats sleep.", None)];
    let (_, text) = plan_passthrough(&sentences, None, Some("fish"), "[fish|cá]").unwrap();
    assert_eq!(text, "Cats sleep.");
}

#[test]
fn passthrough_without_selection_writes_whole_result_to_first() {
    let sentences = vec![sentence("A.", None), sentence("B.", None)];
    let (id, text) = plan_passthrough(&sentences, None, None, "whole paragraph").unwrap();
    assert_eq!(id, sentences[0].id);
    assert_eq!(text, "whole paragraph");
}

#[test]
fn passthrough_on_empty_paragraph_does_nothing() {
    assert!(plan_passthrough(&[], None, Some("x"), "r").is_none());
    assert!(plan_passthrough(&[], None, None, "r").is_none());
}

// =============================================================================
// Wire shape
// =============================================================================

#[test]
fn annotation_serializes_kind_as_type() {
    let annotation = Annotation {
        id: Uuid::nil(),
        article_id: Uuid::nil(),
        block_id: "b1".into(),
        kind: "translation".into(),
        selected_text: "hi".into(),
        result: "xin chào".into(),
        span: json!({}),
        root_result: None,
        metadata: json!({}),
        timestamp: OffsetDateTime::UNIX_EPOCH,
    };
    let json = serde_json::to_value(annotation).unwrap();
    assert_eq!(json["type"], "translation");
    assert_eq!(json["blockId"], "b1");
    assert!(json["rootResult"].is_null());
    assert_eq!(json["timestamp"], "1970-01-01T00:00:00Z");
    assert!(json.get("kind").is_none());
}

#[test]
fn paragraph_errors_map_to_annotation_errors() {
    assert!(matches!(AnnotationError::from(ParagraphError::SentenceNotFound), AnnotationError::SentenceNotFound));
    assert!(matches!(AnnotationError::from(ParagraphError::ArticleNotFound), AnnotationError::ArticleNotFound));
}
