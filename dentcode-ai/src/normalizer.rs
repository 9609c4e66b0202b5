//! Result normalization and section parsing of LLM replies
//!
//! Every activation result, whatever its shape, is converted here into one
//! [`NormalizedRecord`]. Free-text replies follow a small section grammar:
//!
//! ```text
//! CODE: D0150
//! EXPLANATION: periodic evaluation of an established patient
//! DOUBT: none
//! ```
//!
//! - Markers are matched case-insensitively and may be wrapped in markdown
//!   emphasis (`**CODE:**`) or heading marks (`### CODE:`).
//! - A value runs to the next recognised marker or the end of the text.
//! - The first occurrence of a marker wins.
//! - `none` (any case, optional trailing period) means "absent".
//!
//! [`SectionParser`] is shared with the classifier and the inspector, which
//! use the same grammar with their own markers.

use crate::types::{
    json_type_name, ActivationOutcome, CodeEntry, NormalizationError, NormalizedRecord,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

pub const CODE: &str = "CODE";
pub const EXPLANATION: &str = "EXPLANATION";
pub const DOUBT: &str = "DOUBT";

static CODE_SECTIONS: Lazy<SectionParser> = Lazy::new(|| {
    SectionParser::new(&[CODE, EXPLANATION, DOUBT]).expect("static section markers are valid")
});

// ============================================================================
// Section Parser
// ============================================================================

/// Parser for `MARKER: value` sections in free text
#[derive(Debug, Clone)]
pub struct SectionParser {
    pattern: Regex,
}

impl SectionParser {
    /// Build a parser recognising the given markers
    pub fn new(markers: &[&str]) -> Result<Self, regex::Error> {
        let alternation = markers
            .iter()
            .map(|m| regex::escape(m))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = Regex::new(&format!(r"(?i)\b({alternation})\b[ \t*]*:[ \t*]*"))?;
        Ok(Self { pattern })
    }

    /// Split text into sections
    pub fn parse(&self, text: &str) -> Sections {
        let found: Vec<(String, usize, usize)> = self
            .pattern
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let marker = caps.get(1)?.as_str().to_ascii_uppercase();
                Some((marker, whole.start(), whole.end()))
            })
            .collect();

        let mut entries: Vec<(String, String)> = Vec::new();
        for (idx, (marker, _, value_start)) in found.iter().enumerate() {
            if entries.iter().any(|(m, _)| m == marker) {
                continue;
            }
            let value_end = found
                .get(idx + 1)
                .map(|(_, next_start, _)| *next_start)
                .unwrap_or(text.len());
            let value = trim_section_value(&text[*value_start..value_end]);
            entries.push((marker.clone(), value.to_string()));
        }

        Sections { entries }
    }
}

/// Parsed sections, keyed by upper-cased marker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sections {
    entries: Vec<(String, String)>,
}

impl Sections {
    /// No recognised marker was present
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the marker appeared at all
    pub fn contains(&self, marker: &str) -> bool {
        self.get(marker).is_some()
    }

    /// Raw trimmed value, including empty and `none` values
    pub fn get(&self, marker: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(m, _)| m.eq_ignore_ascii_case(marker))
            .map(|(_, v)| v.as_str())
    }

    /// Value, treating empty and `none` as absent
    pub fn value(&self, marker: &str) -> Option<&str> {
        self.get(marker)
            .filter(|v| !v.is_empty() && !is_none_sentinel(v))
    }
}

/// Parse `CODE` / `EXPLANATION` / `DOUBT` sections
pub fn parse_sections(text: &str) -> Sections {
    CODE_SECTIONS.parse(text)
}

fn trim_section_value(value: &str) -> &str {
    value.trim_matches(|c: char| c.is_whitespace() || matches!(c, '*' | '#' | '`'))
}

/// `none`, case-insensitive, optionally followed by a period
pub fn is_none_sentinel(value: &str) -> bool {
    value
        .trim()
        .trim_end_matches('.')
        .eq_ignore_ascii_case("none")
}

/// Non-empty and not the `none` sentinel
pub fn is_usable_code(code: &str) -> bool {
    !code.trim().is_empty() && !is_none_sentinel(code)
}

/// Comma, semicolon or newline separated code ranges, deduplicated in order
///
/// List bullets and trailing labels are dropped and ranges upper-cased:
/// `- d0100-d0999 (Diagnostic)` -> `D0100-D0999`.
pub fn range_list(value: &str) -> Vec<String> {
    let mut ranges: Vec<String> = Vec::new();
    for item in value.split(|c| matches!(c, ',' | ';' | '\n')) {
        let item = item.trim().trim_start_matches(['-', '*']).trim();
        if item.is_empty() || is_none_sentinel(item) {
            continue;
        }
        let Some(range) = item.split_whitespace().next() else {
            continue;
        };
        let range = range.trim_end_matches(['.', ':']).to_ascii_uppercase();
        if !range.is_empty() && !ranges.contains(&range) {
            ranges.push(range);
        }
    }
    ranges
}

// ============================================================================
// Normalization
// ============================================================================

/// Normalize one activation outcome
///
/// Returns `None` when the outcome carries nothing worth reporting. Shape
/// problems never escape: they come back as a record with `error` set and
/// the original payload preserved.
pub fn normalize(
    outcome: ActivationOutcome,
    topic: &str,
    discriminator: &str,
) -> Option<NormalizedRecord> {
    let record = match outcome {
        ActivationOutcome::Empty => return None,
        ActivationOutcome::Text(text) => {
            if text.trim().is_empty() {
                return None;
            }
            normalize_text(&text, topic, discriminator)
        }
        ActivationOutcome::Structured(value) => {
            match normalize_structured(&value, topic, discriminator) {
                Ok(record) => record,
                Err(e) => {
                    warn!(topic = topic, error = %e, "Could not normalize structured result");
                    let mut record = NormalizedRecord::error(topic, discriminator, e.to_string());
                    record.raw_result_dict = Some(value);
                    record
                }
            }
        }
    };

    if record.is_meaningful() {
        Some(record)
    } else {
        debug!(topic = topic, "Result carries nothing to report");
        None
    }
}

fn normalize_text(text: &str, topic: &str, discriminator: &str) -> NormalizedRecord {
    let sections = CODE_SECTIONS.parse(text);
    let mut record = NormalizedRecord::new(topic, Some(discriminator.to_string()));

    if sections.is_empty() {
        record.raw_topic_data = Some(text.trim().to_string());
        return record;
    }

    if let Some(code) = sections.get(CODE) {
        if is_none_sentinel(code) {
            // Evaluated and found nothing, as opposed to never evaluated
            record.code_range = None;
        } else if !code.is_empty() {
            record.code = Some(code.to_string());
            record.codes.push(CodeEntry {
                code: Some(code.to_string()),
                raw_data: Some(text.to_string()),
                ..CodeEntry::default()
            });
        }
    }

    record.explanation = sections.value(EXPLANATION).map(str::to_string);
    record.doubt = sections.value(DOUBT).map(str::to_string);
    record
}

fn normalize_structured(
    value: &Value,
    topic: &str,
    discriminator: &str,
) -> Result<NormalizedRecord, NormalizationError> {
    let map = value
        .as_object()
        .ok_or_else(|| NormalizationError::UnexpectedType(json_type_name(value).to_string()))?;

    let mut record = NormalizedRecord::new(topic, Some(discriminator.to_string()));
    record.explanation = text_field(map, "explanation");
    record.doubt = text_field(map, "doubt");
    record.error = text_field(map, "error");

    let mut explicit_none = false;
    match map.get("code") {
        Some(Value::String(code)) if is_usable_code(code) => {
            record.codes.push(CodeEntry::with_code(code.trim()));
        }
        Some(Value::String(_)) | Some(Value::Null) => explicit_none = true,
        Some(other) => {
            return Err(NormalizationError::MalformedField {
                field: "code".to_string(),
                reason: format!("expected string, found {}", json_type_name(other)),
            });
        }
        None => {}
    }

    if record.codes.is_empty() {
        match map.get("codes") {
            Some(Value::Array(items)) => {
                record.codes = items.iter().filter_map(code_entry).collect();
            }
            Some(Value::Null) | None => {}
            Some(other) => {
                return Err(NormalizationError::MalformedField {
                    field: "codes".to_string(),
                    reason: format!("expected array, found {}", json_type_name(other)),
                });
            }
        }
    }

    record.code = record
        .codes
        .iter()
        .filter_map(|entry| entry.code.as_deref())
        .find(|code| is_usable_code(code))
        .map(str::to_string);

    if record.code.is_none() && explicit_none {
        record.code_range = None;
    }

    if record.codes.is_empty() && record.error.is_none() {
        record.raw_topic_data = text_field(map, "raw_data");
    }

    Ok(record)
}

fn code_entry(item: &Value) -> Option<CodeEntry> {
    let entry = match item {
        Value::Object(fields) => CodeEntry {
            code: text_field(fields, "code"),
            explanation: text_field(fields, "explanation"),
            doubt: text_field(fields, "doubt"),
            raw_data: text_field(fields, "raw_data"),
        },
        Value::String(code) if !code.trim().is_empty() => CodeEntry::with_code(code.trim()),
        other => {
            debug!(kind = json_type_name(other), "Skipping unusable codes element");
            return None;
        }
    };
    (!entry.is_empty()).then_some(entry)
}

/// Non-empty field rendered as text, surrounding whitespace trimmed
fn text_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::Null => None,
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(s: &str) -> ActivationOutcome {
        ActivationOutcome::Text(s.to_string())
    }

    #[test]
    fn test_sections_case_insensitive_and_markdown() {
        let sections = CODE_SECTIONS.parse("**Code:** D0150\n### explanation: routine exam\ndoubt : None.");

        assert_eq!(sections.get(CODE), Some("D0150"));
        assert_eq!(sections.value(EXPLANATION), Some("routine exam"));
        assert_eq!(sections.get(DOUBT), Some("None."));
        assert_eq!(sections.value(DOUBT), None);
    }

    #[test]
    fn test_range_list_shapes() {
        assert_eq!(
            range_list("D0120-D0180, d0210-d0391; D0120-D0180"),
            vec!["D0120-D0180", "D0210-D0391"]
        );
        assert_eq!(
            range_list("\n- D0120-D0180: Clinical Oral Evaluations\n* K02 (Dental Caries)\n"),
            vec!["D0120-D0180", "K02"]
        );
        assert!(range_list("none").is_empty());
        assert!(range_list(" - , ;").is_empty());
    }

    #[test]
    fn test_structured_text_fields_are_trimmed() {
        let record = normalize(
            ActivationOutcome::Structured(json!({
                "explanation": "  routine exam \n",
                "doubt": "   ",
                "error": 42
            })),
            "Exam",
            "A",
        )
        .unwrap();

        assert_eq!(record.explanation.as_deref(), Some("routine exam"));
        assert_eq!(record.doubt, None);
        assert_eq!(record.error.as_deref(), Some("42"));
    }

    #[test]
    fn test_sections_first_occurrence_wins() {
        let sections = CODE_SECTIONS.parse("CODE: D1110\nEXPLANATION: adult prophy\nCODE: D1120");
        assert_eq!(sections.get(CODE), Some("D1110"));
        assert_eq!(sections.value(EXPLANATION), Some("adult prophy"));
    }

    #[test]
    fn test_sections_value_spans_lines() {
        let sections = CODE_SECTIONS.parse("EXPLANATION: first line\nsecond line\nDOUBT: x");
        assert_eq!(sections.get(EXPLANATION), Some("first line\nsecond line"));
    }

    #[test]
    fn test_marker_needs_word_boundary() {
        let sections = CODE_SECTIONS.parse("ZIPCODE: 12345");
        assert!(sections.is_empty());
    }

    #[test]
    fn test_empty_outcomes_are_dropped() {
        assert_eq!(normalize(ActivationOutcome::Empty, "Exams", "D0120-D0180"), None);
        assert_eq!(normalize(text("   \n"), "Exams", "D0120-D0180"), None);
    }

    #[test]
    fn test_text_with_code_is_elevated() {
        let raw = "CODE: D0150\nEXPLANATION: routine exam\nDOUBT: none";
        let record = normalize(text(raw), "Exams", "D0120-D0180").unwrap();

        assert_eq!(record.code.as_deref(), Some("D0150"));
        assert_eq!(record.code_range.as_deref(), Some("D0120-D0180"));
        assert_eq!(record.codes.len(), 1);
        assert_eq!(record.codes[0].raw_data.as_deref(), Some(raw));
        assert_eq!(record.explanation.as_deref(), Some("routine exam"));
        assert_eq!(record.doubt, None);
    }

    #[test]
    fn test_text_code_none_clears_code_range() {
        let record = normalize(
            text("CODE: none\nEXPLANATION: no evaluation was performed"),
            "Exams",
            "D0120-D0180",
        )
        .unwrap();

        assert_eq!(record.code_range, None);
        assert_eq!(record.code, None);
        assert!(record.codes.is_empty());
        assert!(record.explanation.is_some());
    }

    #[test]
    fn test_text_code_none_alone_is_not_meaningful() {
        assert_eq!(normalize(text("CODE: NONE"), "Exams", "D0120-D0180"), None);
    }

    #[test]
    fn test_text_without_markers_is_raw_topic_data() {
        let record = normalize(text("  The model rambled.  "), "Exams", "D0120-D0180").unwrap();
        assert_eq!(record.raw_topic_data.as_deref(), Some("The model rambled."));
        assert_eq!(record.code, None);
    }

    #[test]
    fn test_structured_top_level_code() {
        let outcome = json!({"code": "D1110", "explanation": "cleaning"}).into();
        let record = normalize(outcome, "Prophylaxis", "D1110-D1120").unwrap();

        assert_eq!(record.code.as_deref(), Some("D1110"));
        assert_eq!(record.codes, vec![CodeEntry::with_code("D1110")]);
        assert_eq!(record.explanation.as_deref(), Some("cleaning"));
    }

    #[test]
    fn test_structured_codes_list_elevates_first_valid() {
        let outcome = json!({"codes": [
            {"code": "none", "explanation": "not applicable"},
            "D0220",
            {"code": "D0230", "doubt": null},
            42,
            {}
        ]})
        .into();
        let record = normalize(outcome, "Imaging", "D0210-D0391").unwrap();

        assert_eq!(record.code.as_deref(), Some("D0220"));
        assert_eq!(record.codes.len(), 3);
        assert_eq!(record.codes[2], CodeEntry::with_code("D0230"));
    }

    #[test]
    fn test_structured_null_code_is_explicit_none() {
        let outcome = json!({"code": null, "doubt": "films not described"}).into();
        let record = normalize(outcome, "Imaging", "D0210-D0391").unwrap();

        assert_eq!(record.code_range, None);
        assert_eq!(record.doubt.as_deref(), Some("films not described"));
    }

    #[test]
    fn test_structured_raw_data_kept_without_codes() {
        let outcome = json!({"raw_data": "model said something"}).into();
        let record = normalize(outcome, "Imaging", "D0210-D0391").unwrap();
        assert_eq!(record.raw_topic_data.as_deref(), Some("model said something"));

        let with_error = json!({"raw_data": "partial", "error": "quota"}).into();
        let record = normalize(with_error, "Imaging", "D0210-D0391").unwrap();
        assert_eq!(record.raw_topic_data, None);
        assert_eq!(record.error.as_deref(), Some("quota"));
    }

    #[test]
    fn test_structured_empty_object_dropped() {
        assert_eq!(normalize(json!({}).into(), "Imaging", "D0210-D0391"), None);
    }

    #[test]
    fn test_unexpected_type_becomes_error_record() {
        let record = normalize(json!([1, 2]).into(), "Imaging", "D0210-D0391").unwrap();

        assert_eq!(record.error.as_deref(), Some("Unexpected result type: array"));
        assert_eq!(record.raw_result_dict, Some(json!([1, 2])));
    }

    #[test]
    fn test_malformed_codes_field_preserves_payload() {
        let payload = json!({"codes": "D0220"});
        let record = normalize(payload.clone().into(), "Imaging", "D0210-D0391").unwrap();

        assert!(record.error.unwrap().contains("'codes'"));
        assert_eq!(record.raw_result_dict, Some(payload));
    }
}
