//! Root analysis: prefix/root decomposition of an English word.
//!
//! ARCHITECTURE
//! ============
//! The model is asked for a JSON object, but its output is free text. The
//! pipeline is:
//!
//! 1. [`extract_json`] cuts the first JSON object out of the reply, dropping
//!    code fences, comments and trailing commas.
//! 2. The object is parsed and checked by [`validate`].
//! 3. If validation fails, [`attempt_fix`] tries to recover from common
//!    deviations (snake_case keys, wrapper objects, `"null"` prefixes).
//! 4. [`validate_complete`] cross-checks the decomposition against the
//!    analysed word. Hard mismatches are errors; softer issues are warnings
//!    that are logged and otherwise ignored.
//!
//! TRADE-OFFS
//! ==========
//! Text scanning works on bytes. Every delimiter it looks for is ASCII and
//! UTF-8 continuation bytes never collide with ASCII, so multi-byte
//! Vietnamese text passes through untouched.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::prompts;
use crate::llm::{self, LlmError, TextModel};

/// Upper bound accepted by [`validate`].
pub const MAX_RELATED_WORDS: usize = 10;
/// Number of related words the prompt asks for; [`attempt_fix`] truncates to it.
pub const EXPECTED_RELATED_WORDS: usize = 5;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedWord {
    pub word: String,
    pub vi_meaning: String,
    pub prefix_text: Option<String>,
    pub root_text: String,
    pub connection: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootAnalysis {
    pub vi_meaning: String,
    pub prefix_text: Option<String>,
    pub root_text: String,
    pub connection: String,
    pub same_root: Vec<RelatedWord>,
}

/// Why a parsed object does not match the [`RootAnalysis`] schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaFailure {
    pub error: String,
    /// One entry per problem, prefixed with the field path.
    pub details: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RootAnalysisError {
    #[error("AI analysis service is temporarily unavailable")]
    Unavailable(#[source] LlmError),
    #[error("AI service returned invalid response format")]
    NoJson,
    #[error("AI service returned malformed JSON")]
    MalformedJson(#[source] serde_json::Error),
    #[error("AI service returned invalid data structure")]
    InvalidStructure(Vec<String>),
    #[error("AI analysis contains logical errors")]
    Logical(String),
}

impl RootAnalysisError {
    /// Client-facing detail lines.
    #[must_use]
    pub fn details(&self) -> Vec<String> {
        match self {
            Self::Unavailable(_) => vec!["Please try again in a few moments".into()],
            Self::NoJson => vec!["No valid JSON structure found in response".into()],
            Self::MalformedJson(_) => vec!["JSON parsing failed after cleaning".into()],
            Self::InvalidStructure(details) => details.clone(),
            Self::Logical(error) => vec![error.clone()],
        }
    }
}

// =============================================================================
// EXTRACTION
// =============================================================================

/// Pull the first JSON object out of free-form model output.
///
/// Returns `None` when the text contains no `{ ... }` at all.
#[must_use]
pub fn extract_json(raw: &str) -> Option<String> {
    let text = strip_fences(raw);
    let start = text.find('{')?;
    let end = match balanced_end(&text[start..]) {
        Some(offset) => start + offset,
        None => text.rfind('}').filter(|&end| end > start)?,
    };
    let candidate = strip_comments(&text[start..=end]);
    Some(strip_trailing_commas(&candidate))
}

fn strip_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```JSON", "").replace("```", "")
}

/// Byte offset of the brace closing the object that starts at `s[0]`.
fn balanced_end(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                i = skip_line_comment(bytes, i);
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = skip_block_comment(bytes, i);
                continue;
            }
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn skip_line_comment(bytes: &[u8], from: usize) -> usize {
    bytes[from..].iter().position(|&b| b == b'\n').map_or(bytes.len(), |p| from + p)
}

fn skip_block_comment(bytes: &[u8], from: usize) -> usize {
    bytes[from + 2..]
        .windows(2)
        .position(|w| w == b"*/")
        .map_or(bytes.len(), |p| from + 2 + p + 2)
}

/// Remove `//` and `/* */` comments outside string literals.
fn strip_comments(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
        } else if b == b'/' && bytes.get(i + 1) == Some(&b'/') {
            i = skip_line_comment(bytes, i);
            continue;
        } else if b == b'/' && bytes.get(i + 1) == Some(&b'*') {
            i = skip_block_comment(bytes, i);
            continue;
        } else if b == b'"' {
            in_string = true;
        }
        out.push(b);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Drop commas directly followed (modulo whitespace) by `}` or `]`.
fn strip_trailing_commas(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
        } else if b == b'"' {
            in_string = true;
        } else if b == b',' {
            let next = bytes[i + 1..].iter().find(|c| !c.is_ascii_whitespace());
            if matches!(next, Some(b'}' | b']')) {
                continue;
            }
        }
        out.push(b);
    }
    String::from_utf8_lossy(&out).into_owned()
}

// =============================================================================
// VALIDATION
// =============================================================================

fn required_str(obj: &Map<String, Value>, key: &str, path: &str, issues: &mut Vec<String>) -> String {
    match obj.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(Value::String(_)) => {
            issues.push(format!("{path}{key}: must not be empty"));
            String::new()
        }
        Some(_) => {
            issues.push(format!("{path}{key}: expected string"));
            String::new()
        }
        None => {
            issues.push(format!("{path}{key}: required"));
            String::new()
        }
    }
}

fn optional_prefix(obj: &Map<String, Value>, path: &str, issues: &mut Vec<String>) -> Option<String> {
    match obj.get("prefixText") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::String(_)) => {
            issues.push(format!("{path}prefixText: must be null or a non-empty string"));
            None
        }
        Some(_) => {
            issues.push(format!("{path}prefixText: expected string or null"));
            None
        }
    }
}

/// Check a parsed object against the [`RootAnalysis`] schema.
///
/// # Errors
///
/// Returns a [`SchemaFailure`] listing every problem found.
pub fn validate(value: &Value) -> Result<RootAnalysis, SchemaFailure> {
    let Some(obj) = value.as_object() else {
        return Err(SchemaFailure {
            error: "Root analysis must be a JSON object".into(),
            details: vec!["root: expected object".into()],
        });
    };
    let mut issues = Vec::new();
    let vi_meaning = required_str(obj, "viMeaning", "", &mut issues);
    let prefix_text = optional_prefix(obj, "", &mut issues);
    let root_text = required_str(obj, "rootText", "", &mut issues);
    let connection = required_str(obj, "connection", "", &mut issues);

    let mut same_root = Vec::new();
    match obj.get("sameRoot") {
        Some(Value::Array(entries)) => {
            if entries.is_empty() {
                issues.push("sameRoot: must contain at least one word".into());
            }
            if entries.len() > MAX_RELATED_WORDS {
                issues.push(format!("sameRoot: must contain at most {MAX_RELATED_WORDS} words"));
            }
            for (i, entry) in entries.iter().enumerate() {
                let path = format!("sameRoot.{i}.");
                let Some(entry) = entry.as_object() else {
                    issues.push(format!("sameRoot.{i}: expected object"));
                    continue;
                };
                same_root.push(RelatedWord {
                    word: required_str(entry, "word", &path, &mut issues),
                    vi_meaning: required_str(entry, "viMeaning", &path, &mut issues),
                    prefix_text: optional_prefix(entry, &path, &mut issues),
                    root_text: required_str(entry, "rootText", &path, &mut issues),
                    connection: required_str(entry, "connection", &path, &mut issues),
                });
            }
        }
        Some(_) => issues.push("sameRoot: expected array".into()),
        None => issues.push("sameRoot: required".into()),
    }

    if issues.is_empty() {
        Ok(RootAnalysis { vi_meaning, prefix_text, root_text, connection, same_root })
    } else {
        Err(SchemaFailure { error: "Root analysis validation failed".into(), details: issues })
    }
}

// =============================================================================
// REPAIR
// =============================================================================

const MEANING_KEYS: &[&str] = &["viMeaning", "vi_meaning", "meaning", "vietnameseMeaning", "vietnamese_meaning"];
const PREFIX_KEYS: &[&str] = &["prefixText", "prefix_text", "prefix"];
const ROOT_KEYS: &[&str] = &["rootText", "root_text", "root"];
const CONNECTION_KEYS: &[&str] = &["connection", "explanation"];
const SAME_ROOT_KEYS: &[&str] = &["sameRoot", "same_root", "relatedWords", "related_words", "related"];
const WRAPPER_KEYS: &[&str] = &["analysis", "data", "result"];

fn pick<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k).filter(|v| !v.is_null()))
}

fn pick_str(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    pick(obj, keys)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

fn normalize_prefix(raw: Option<String>) -> Option<String> {
    raw.filter(|p| !matches!(p.to_ascii_lowercase().as_str(), "" | "null" | "none" | "-"))
}

fn derived_connection(prefix: Option<&str>, root: &str, meaning: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix} + {root} -> {meaning}"),
        None => format!("{root} -> {meaning}"),
    }
}

fn fix_related(value: &Value) -> Option<RelatedWord> {
    let obj = value.as_object()?;
    let word = pick_str(obj, &["word"])?;
    let vi_meaning = pick_str(obj, MEANING_KEYS)?;
    let root_text = pick_str(obj, ROOT_KEYS)?;
    let prefix_text = normalize_prefix(pick_str(obj, PREFIX_KEYS));
    let connection = pick_str(obj, CONNECTION_KEYS)
        .unwrap_or_else(|| derived_connection(prefix_text.as_deref(), &root_text, &vi_meaning));
    Some(RelatedWord { word, vi_meaning, prefix_text, root_text, connection })
}

/// Recover a [`RootAnalysis`] from common deviations in model output.
///
/// Returns `None` when the meaning or root is missing or no related word
/// survives.
#[must_use]
pub fn attempt_fix(value: &Value) -> Option<RootAnalysis> {
    let mut obj = value.as_object()?;
    if pick(obj, ROOT_KEYS).is_none() {
        if let Some(inner) = WRAPPER_KEYS.iter().find_map(|k| obj.get(*k).and_then(Value::as_object)) {
            obj = inner;
        }
    }

    let vi_meaning = pick_str(obj, MEANING_KEYS)?;
    let root_text = pick_str(obj, ROOT_KEYS)?;
    let prefix_text = normalize_prefix(pick_str(obj, PREFIX_KEYS));
    let connection = pick_str(obj, CONNECTION_KEYS)
        .unwrap_or_else(|| derived_connection(prefix_text.as_deref(), &root_text, &vi_meaning));

    let same_root: Vec<RelatedWord> = match pick(obj, SAME_ROOT_KEYS)? {
        Value::Array(entries) => entries.iter().filter_map(fix_related).take(EXPECTED_RELATED_WORDS).collect(),
        single @ Value::Object(_) => fix_related(single).into_iter().collect(),
        _ => Vec::new(),
    };
    if same_root.is_empty() {
        return None;
    }
    Some(RootAnalysis { vi_meaning, prefix_text, root_text, connection, same_root })
}

// =============================================================================
// CROSS-CHECK
// =============================================================================

/// Check the decomposition against `selected_text`.
///
/// # Errors
///
/// Returns a message when the root or prefix does not occur in the word, or
/// the prefix does not come before the root. Otherwise returns warnings.
pub fn validate_complete(analysis: &RootAnalysis, selected_text: &str) -> Result<Vec<String>, String> {
    let word = selected_text.trim().to_lowercase();
    let root = analysis.root_text.trim().to_lowercase();

    if !word.contains(&root) {
        return Err(format!("Root \"{}\" does not appear in \"{}\"", analysis.root_text, selected_text.trim()));
    }

    let mut warnings = Vec::new();
    if let Some(prefix) = analysis.prefix_text.as_deref() {
        let prefix_lower = prefix.trim().to_lowercase();
        let Some(at) = word.find(&prefix_lower) else {
            return Err(format!("Prefix \"{prefix}\" does not appear in \"{}\"", selected_text.trim()));
        };
        if !word[at + prefix_lower.len()..].contains(&root) {
            return Err(format!("Prefix \"{prefix}\" must come before root \"{}\"", analysis.root_text));
        }
        if at != 0 {
            warnings.push(format!("Prefix \"{prefix}\" is not at the start of \"{}\"", selected_text.trim()));
        }
    }

    if analysis.same_root.len() != EXPECTED_RELATED_WORDS {
        warnings.push(format!(
            "Expected {EXPECTED_RELATED_WORDS} related words, got {}",
            analysis.same_root.len()
        ));
    }
    let mut seen = HashSet::new();
    for related in &analysis.same_root {
        let lower = related.word.trim().to_lowercase();
        if !seen.insert(lower.clone()) {
            warnings.push(format!("Related word \"{}\" is repeated", related.word));
        }
        if lower == word {
            warnings.push(format!("Related words include the analyzed word \"{}\"", related.word));
        }
        if !lower.contains(&related.root_text.trim().to_lowercase()) {
            warnings.push(format!("Related word \"{}\" does not contain its root \"{}\"", related.word, related.root_text));
        }
    }
    Ok(warnings)
}

// =============================================================================
// PIPELINE
// =============================================================================

/// Turn a raw model reply into a checked analysis.
///
/// # Errors
///
/// Returns every [`RootAnalysisError`] variant except `Unavailable`.
pub fn interpret(raw: &str, selected_text: &str) -> Result<(RootAnalysis, Vec<String>), RootAnalysisError> {
    let cleaned = extract_json(raw).ok_or(RootAnalysisError::NoJson)?;
    let value: Value = serde_json::from_str(&cleaned).map_err(RootAnalysisError::MalformedJson)?;

    let analysis = match validate(&value) {
        Ok(analysis) => analysis,
        Err(failure) => {
            warn!(error = %failure.error, details = ?failure.details, "root analysis failed validation; attempting fix");
            attempt_fix(&value).ok_or(RootAnalysisError::InvalidStructure(failure.details))?
        }
    };

    let warnings = validate_complete(&analysis, selected_text).map_err(RootAnalysisError::Logical)?;
    if !warnings.is_empty() {
        warn!(?warnings, selected_text, "root analysis warnings");
    }
    Ok((analysis, warnings))
}

/// Ask the model for a root analysis of `selected_text` and check it.
///
/// # Errors
///
/// Returns [`RootAnalysisError::Unavailable`] when every key fails, or an
/// interpretation error from [`interpret`].
pub async fn run(
    llm: &dyn TextModel,
    selected_text: &str,
    paragraph_content: &str,
) -> Result<(RootAnalysis, Vec<String>), RootAnalysisError> {
    let prompt = prompts::root_analysis(selected_text, paragraph_content);
    let raw = llm::generate_with_rotation(llm, llm.default_model(), &prompt)
        .await
        .map_err(RootAnalysisError::Unavailable)?;
    interpret(&raw, selected_text)
}

#[cfg(test)]
#[path = "root_analysis_test.rs"]
mod tests;
