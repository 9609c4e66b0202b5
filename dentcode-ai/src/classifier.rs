//! Scenario classification
//!
//! First model pass: decide which CDT and ICD-10 categories a scenario
//! touches. The reply uses the shared section grammar:
//!
//! ```text
//! CDT: D0100-D0999, D7000-D7999
//! ICD: K00-K08
//! EXPLANATION: exam followed by an extraction of a carious molar
//! ```

use crate::catalog::{category_listing, CodeSystem};
use crate::llm::{CompletionModel, LlmError};
use crate::normalizer::{range_list, SectionParser};
use crate::prompts::GenerationSettings;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

const CDT: &str = "CDT";
const ICD: &str = "ICD";
const EXPLANATION: &str = "EXPLANATION";

static CLASSIFIER_SECTIONS: Lazy<SectionParser> = Lazy::new(|| {
    SectionParser::new(&[CDT, ICD, EXPLANATION]).expect("static section markers are valid")
});

/// Category ranges a scenario belongs to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub cdt_ranges: Vec<String>,
    pub icd_ranges: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl Classification {
    pub fn is_empty(&self) -> bool {
        self.cdt_ranges.is_empty() && self.icd_ranges.is_empty()
    }
}

/// Maps a scenario to CDT and ICD-10 category ranges
pub struct ScenarioClassifier {
    model: Arc<dyn CompletionModel>,
    settings: GenerationSettings,
}

impl ScenarioClassifier {
    pub fn new(model: Arc<dyn CompletionModel>, settings: GenerationSettings) -> Self {
        Self { model, settings }
    }

    pub fn prompt(&self, scenario: &str) -> String {
        format!(
            "Scenario:\n{}\n\n\
             CDT procedure categories:\n{}\n\n\
             ICD-10-CM diagnosis categories:\n{}\n\n\
             List every category range above that may contain a code for this scenario.\n\
             Answer using exactly these sections:\n\
             CDT: <comma-separated CDT ranges, or none>\n\
             ICD: <comma-separated ICD-10 ranges, or none>\n\
             EXPLANATION: <short reasoning>",
            scenario.trim(),
            category_listing(CodeSystem::Cdt),
            category_listing(CodeSystem::Icd10),
        )
    }

    pub async fn classify(&self, scenario: &str) -> Result<Classification, LlmError> {
        if scenario.trim().is_empty() {
            return Ok(Classification::default());
        }

        let request = self.settings.request(self.prompt(scenario));
        let reply = self.model.complete(&request).await?;
        let classification = parse_classification(&reply);

        info!(
            model = self.model.model_name(),
            cdt = ?classification.cdt_ranges,
            icd = ?classification.icd_ranges,
            "Scenario classified"
        );
        Ok(classification)
    }
}

/// Parse a classifier reply
pub fn parse_classification(reply: &str) -> Classification {
    let sections = CLASSIFIER_SECTIONS.parse(reply);
    if sections.is_empty() {
        debug!("Classifier reply had no recognised sections");
    }

    Classification {
        cdt_ranges: sections.value(CDT).map(range_list).unwrap_or_default(),
        icd_ranges: sections.value(ICD).map(range_list).unwrap_or_default(),
        explanation: sections.value(EXPLANATION).map(str::to_string),
    }
}
