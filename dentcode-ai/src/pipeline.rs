//! End-to-end coding pipeline
//!
//! **Flow:**
//! 1. Classify the scenario into CDT and ICD-10 category ranges
//! 2. Run every classified category concurrently (overview, then subtopics)
//! 3. Collect candidate codes from all category records
//! 4. Inspect the candidates; the verdict may carry a clarifying question
//!
//! [`CodingPipeline::clarify`] answers that question and repeats step 4 only.

use crate::catalog::{build_cdt_categories, build_icd_categories, CodeSystem};
use crate::classifier::{Classification, ScenarioClassifier};
use crate::error::{CoderError, CoderResult};
use crate::inspector::{CandidateCode, Clarification, Inspector, InspectorVerdict};
use crate::llm::{ChatCompletionsClient, CompletionModel, LlmSettings};
use crate::normalizer::is_usable_code;
use crate::prompts::GenerationSettings;
use crate::subtopics::RegistryOptions;
use crate::topics::{CategoryResponse, TopicCategory};
use chrono::{DateTime, Utc};
use dentcode_common::config::TomlConfig;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Everything one analysis produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodingReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub scenario: String,
    pub classification: Classification,
    pub cdt: Vec<CategoryResponse>,
    pub icd: Vec<CategoryResponse>,
    pub candidate_codes: Vec<String>,
    pub verdict: InspectorVerdict,
    #[serde(default)]
    pub clarifications: Vec<Clarification>,
}

impl CodingReport {
    /// Question the inspector is waiting on, if any
    pub fn pending_question(&self) -> Option<&str> {
        self.verdict.clarifying_question.as_deref()
    }

    /// Candidates with the topic and explanation that proposed them
    pub fn candidates(&self) -> Vec<CandidateCode> {
        collect_candidates(self.cdt.iter().chain(&self.icd))
    }
}

/// Classifier, categories and inspector wired together
pub struct CodingPipeline {
    classifier: ScenarioClassifier,
    cdt: Vec<TopicCategory>,
    icd: Vec<TopicCategory>,
    inspector: Inspector,
}

impl CodingPipeline {
    pub fn new(
        classifier: ScenarioClassifier,
        cdt: Vec<TopicCategory>,
        icd: Vec<TopicCategory>,
        inspector: Inspector,
    ) -> Self {
        Self {
            classifier,
            cdt,
            icd,
            inspector,
        }
    }

    /// Pipeline over the built-in catalog
    pub fn from_models(
        model: Arc<dyn CompletionModel>,
        inspector_model: Arc<dyn CompletionModel>,
        options: RegistryOptions,
        settings: GenerationSettings,
    ) -> CoderResult<Self> {
        let cdt = build_cdt_categories(Arc::clone(&model), options, &settings)?;
        let icd = build_icd_categories(Arc::clone(&model), options, &settings)?;
        let classifier = ScenarioClassifier::new(model, settings.clone());
        let inspector = Inspector::new(inspector_model, settings);
        Ok(Self::new(classifier, cdt, icd, inspector))
    }

    /// Pipeline backed by the configured chat completions endpoint
    pub fn from_config(config: &TomlConfig, api_key: Option<String>) -> CoderResult<Self> {
        let settings = LlmSettings::from_config(&config.llm, api_key);
        let inspector_settings = settings.for_model(config.llm.inspector_model());

        let model: Arc<dyn CompletionModel> = Arc::new(ChatCompletionsClient::new(settings)?);
        let inspector_model: Arc<dyn CompletionModel> = if config.llm.inspector_model() == config.llm.model {
            Arc::clone(&model)
        } else {
            Arc::new(ChatCompletionsClient::new(inspector_settings)?)
        };

        Self::from_models(
            model,
            inspector_model,
            RegistryOptions::from(&config.activation),
            GenerationSettings::from(&config.llm),
        )
    }

    pub fn cdt_categories(&self) -> &[TopicCategory] {
        &self.cdt
    }

    pub fn icd_categories(&self) -> &[TopicCategory] {
        &self.icd
    }

    /// Analyze a scenario from scratch
    pub async fn analyze(&self, scenario: &str) -> CoderResult<CodingReport> {
        let scenario = scenario.trim();
        if scenario.is_empty() {
            return Err(CoderError::EmptyScenario);
        }

        let run_id = Uuid::new_v4();
        info!(%run_id, "Starting analysis");

        let classification = self.classifier.classify(scenario).await?;

        let cdt_selected = select_categories(&self.cdt, &classification.cdt_ranges, CodeSystem::Cdt);
        let icd_selected = select_categories(&self.icd, &classification.icd_ranges, CodeSystem::Icd10);

        let (cdt, icd) = futures::join!(
            join_all(cdt_selected.iter().map(|c| c.run(scenario))),
            join_all(icd_selected.iter().map(|c| c.run(scenario))),
        );

        let candidates = collect_candidates(cdt.iter().chain(&icd));
        let verdict = self.inspector.inspect(scenario, &candidates, &[]).await?;

        info!(
            %run_id,
            categories = cdt.len() + icd.len(),
            candidates = candidates.len(),
            final_codes = verdict.codes.len(),
            "Analysis complete"
        );

        Ok(CodingReport {
            run_id,
            generated_at: Utc::now(),
            scenario: scenario.to_string(),
            classification,
            cdt,
            icd,
            candidate_codes: candidates.into_iter().map(|c| c.code).collect(),
            verdict,
            clarifications: Vec::new(),
        })
    }

    /// Answer the pending clarifying question and re-inspect
    pub async fn clarify(&self, report: &CodingReport, answer: &str) -> CoderResult<CodingReport> {
        let question = report
            .pending_question()
            .ok_or(CoderError::NoPendingQuestion)?
            .to_string();

        let mut revised = report.clone();
        revised.clarifications.push(Clarification {
            question,
            answer: answer.trim().to_string(),
        });

        let candidates = revised.candidates();
        revised.verdict = self
            .inspector
            .inspect(&revised.scenario, &candidates, &revised.clarifications)
            .await?;
        revised.generated_at = Utc::now();

        info!(
            run_id = %revised.run_id,
            round = revised.clarifications.len(),
            final_codes = revised.verdict.codes.len(),
            "Clarification applied"
        );
        Ok(revised)
    }
}

/// Categories whose range was classified, in catalog order
fn select_categories<'a>(
    categories: &'a [TopicCategory],
    ranges: &[String],
    system: CodeSystem,
) -> Vec<&'a TopicCategory> {
    for range in ranges {
        if system.find(range).is_none() {
            warn!(range = %range, system = ?system, "Classifier returned an unknown category range");
        }
    }

    categories
        .iter()
        .filter(|c| ranges.iter().any(|r| r.trim().eq_ignore_ascii_case(c.code_range())))
        .collect()
}

/// Every usable code in the responses, first occurrence wins
fn collect_candidates<'a>(
    responses: impl IntoIterator<Item = &'a CategoryResponse>,
) -> Vec<CandidateCode> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for response in responses {
        for record in &response.topic_result {
            let entries = record
                .code
                .iter()
                .map(|code| (code.as_str(), record.explanation.as_deref()))
                .chain(record.codes.iter().filter_map(|entry| {
                    let code = entry.code.as_deref()?;
                    Some((code, entry.explanation.as_deref().or(record.explanation.as_deref())))
                }));

            for (code, explanation) in entries {
                let code = code.trim();
                if !is_usable_code(code) || !seen.insert(code.to_ascii_uppercase()) {
                    continue;
                }
                candidates.push(CandidateCode {
                    code: code.to_string(),
                    topic: record.topic.clone(),
                    explanation: explanation.map(str::to_string),
                });
            }
        }
    }
    candidates
}
