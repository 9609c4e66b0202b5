//! Final inspection pass
//!
//! The inspector sees the scenario, every candidate code the categories
//! produced, and any earlier clarifying Q&A. It answers with the codes it
//! keeps and may ask one clarifying question:
//!
//! ```text
//! CODES: D0150, D7140, K02.52
//! EXPLANATION: ...
//! QUESTION: Was the extraction surgical?
//! ```

use crate::llm::{CompletionModel, LlmError};
use crate::normalizer::{is_none_sentinel, SectionParser};
use crate::prompts::GenerationSettings;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info};

const CODES: &str = "CODES";
const EXPLANATION: &str = "EXPLANATION";
const QUESTION: &str = "QUESTION";

static INSPECTOR_SECTIONS: Lazy<SectionParser> = Lazy::new(|| {
    SectionParser::new(&[CODES, EXPLANATION, QUESTION]).expect("static section markers are valid")
});

/// A code proposed by one subtopic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateCode {
    pub code: String,
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// One answered clarifying question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clarification {
    pub question: String,
    pub answer: String,
}

/// Inspector decision
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InspectorVerdict {
    pub codes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarifying_question: Option<String>,
}

/// Reconciles candidate codes into a final answer
pub struct Inspector {
    model: Arc<dyn CompletionModel>,
    settings: GenerationSettings,
}

impl Inspector {
    pub fn new(model: Arc<dyn CompletionModel>, settings: GenerationSettings) -> Self {
        Self { model, settings }
    }

    pub fn prompt(
        &self,
        scenario: &str,
        candidates: &[CandidateCode],
        clarifications: &[Clarification],
    ) -> String {
        let mut prompt = format!("Scenario:\n{}\n\nCandidate codes:\n", scenario.trim());
        for candidate in candidates {
            let _ = write!(prompt, "- {} ({})", candidate.code, candidate.topic);
            if let Some(explanation) = &candidate.explanation {
                let _ = write!(prompt, ": {}", explanation);
            }
            prompt.push('\n');
        }

        if !clarifications.is_empty() {
            prompt.push_str("\nClarifications from the provider:\n");
            for c in clarifications {
                let _ = writeln!(prompt, "Q: {}\nA: {}", c.question, c.answer);
            }
        }

        prompt.push_str(
            "\nKeep only the codes the documentation supports, remove duplicates and \
             conflicting alternatives, and add nothing that was not proposed.\n\
             Answer using exactly these sections:\n\
             CODES: <comma-separated final codes, or none>\n\
             EXPLANATION: <why each code was kept or removed>\n\
             QUESTION: <one question for the provider if an answer would change the codes, or none>",
        );
        prompt
    }

    /// Inspect candidates; without candidates the model is not called
    pub async fn inspect(
        &self,
        scenario: &str,
        candidates: &[CandidateCode],
        clarifications: &[Clarification],
    ) -> Result<InspectorVerdict, LlmError> {
        if candidates.is_empty() {
            debug!("No candidate codes to inspect");
            return Ok(InspectorVerdict::default());
        }

        let request = self
            .settings
            .request(self.prompt(scenario, candidates, clarifications));
        let reply = self.model.complete(&request).await?;
        let verdict = parse_verdict(&reply);

        info!(
            model = self.model.model_name(),
            candidates = candidates.len(),
            kept = verdict.codes.len(),
            question = verdict.clarifying_question.is_some(),
            "Inspection complete"
        );
        Ok(verdict)
    }
}

/// Parse an inspector reply
pub fn parse_verdict(reply: &str) -> InspectorVerdict {
    let sections = INSPECTOR_SECTIONS.parse(reply);

    InspectorVerdict {
        codes: sections.value(CODES).map(split_codes).unwrap_or_default(),
        explanation: sections.value(EXPLANATION).map(str::to_string),
        clarifying_question: sections.value(QUESTION).map(str::to_string),
    }
}

/// Split on commas and whitespace, upper-case, dedup preserving order
pub fn split_codes(value: &str) -> Vec<String> {
    let mut codes: Vec<String> = Vec::new();
    for raw in value.split(|c: char| c == ',' || c == ';' || c.is_whitespace()) {
        let code = raw.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '.');
        let code = code.trim_end_matches('.');
        if code.is_empty() || is_none_sentinel(code) {
            continue;
        }
        let code = code.to_ascii_uppercase();
        if !codes.contains(&code) {
            codes.push(code);
        }
    }
    codes
}
