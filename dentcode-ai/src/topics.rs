//! Parent code categories
//!
//! A [`TopicCategory`] owns one [`SubtopicRegistry`]. Running it is a two step
//! affair: an overview prompt names the subtopic ranges worth examining in its
//! `CODE` section, then those subtopics are activated concurrently and merged
//! into a [`CategoryResponse`].
//!
//! The `CODE` value may be comma, semicolon or newline separated, bulleted,
//! labelled or lower-cased; each range is matched case-insensitively against
//! the registered discriminators.

use crate::normalizer::{is_none_sentinel, parse_sections, range_list, CODE, DOUBT, EXPLANATION};
use crate::prompts::PromptActivation;
use crate::subtopics::SubtopicRegistry;
use crate::types::{AggregateResult, NormalizedRecord};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Merged result of one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryResponse {
    pub category: String,
    /// `None` when the overview decided nothing in the category applies
    pub code_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doubt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub topic_result: Vec<NormalizedRecord>,
    #[serde(default)]
    pub activated_subtopics: Vec<String>,
}

impl CategoryResponse {
    fn new(category: &str, code_range: Option<String>) -> Self {
        Self {
            category: category.to_string(),
            code_range,
            explanation: None,
            doubt: None,
            error: None,
            topic_result: Vec::new(),
            activated_subtopics: Vec::new(),
        }
    }

    fn merge(&mut self, aggregate: AggregateResult) {
        self.topic_result = aggregate.topic_result;
        self.activated_subtopics = aggregate.activated_subtopics;
    }
}

/// A CDT or ICD-10 category with its subtopics
pub struct TopicCategory {
    name: String,
    code_range: String,
    overview: PromptActivation,
    registry: SubtopicRegistry,
}

impl TopicCategory {
    pub fn new(
        name: impl Into<String>,
        code_range: impl Into<String>,
        overview: PromptActivation,
        registry: SubtopicRegistry,
    ) -> Self {
        Self {
            name: name.into(),
            code_range: code_range.into(),
            overview,
            registry,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code_range(&self) -> &str {
        &self.code_range
    }

    pub fn registry(&self) -> &SubtopicRegistry {
        &self.registry
    }

    /// Run the overview, then the subtopics it selected
    ///
    /// Never fails; an overview failure is reported in the response `error`.
    pub async fn run(&self, scenario: &str) -> CategoryResponse {
        let timeout = self.registry.options().activation_timeout;
        let reply = match tokio::time::timeout(timeout, self.overview.complete(scenario)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return self.failed(format!("Overview failed: {e}")),
            Err(_) => {
                return self.failed(format!(
                    "Overview timed out after {}s",
                    timeout.as_secs_f64()
                ))
            }
        };

        let sections = parse_sections(&reply);
        let mut response = CategoryResponse::new(&self.name, Some(self.code_range.clone()));
        response.explanation = sections.value(EXPLANATION).map(str::to_string);
        response.doubt = sections.value(DOUBT).map(str::to_string);

        let selected = match sections.get(CODE) {
            Some(value) if is_none_sentinel(value) => {
                info!(category = %self.name, "Overview found nothing in this category");
                response.code_range = None;
                return response;
            }
            Some(value) if !value.is_empty() => value,
            _ => {
                warn!(category = %self.name, "Overview reply had no CODE section");
                if response.explanation.is_none() {
                    response.explanation = Some(reply.trim().to_string());
                }
                return response;
            }
        };

        let ranges = range_list(selected);
        let (known, unknown) = self.resolve_ranges(&ranges);
        if !unknown.is_empty() {
            warn!(
                category = %self.name,
                unknown = ?unknown,
                "Overview named unregistered subtopic ranges"
            );
        }
        if known.is_empty() {
            response.error = Some(format!("Overview selected no known subtopic: {selected}"));
            return response;
        }

        let discriminators = known.join(",");
        debug!(category = %self.name, subtopics = %discriminators, "Overview selected subtopics");
        let aggregate = self.registry.activate_all(scenario, &discriminators).await;
        response.merge(aggregate);
        response
    }

    /// Map overview ranges onto registered discriminators
    fn resolve_ranges<'a>(&'a self, ranges: &'a [String]) -> (Vec<&'a str>, Vec<&'a str>) {
        let mut known = Vec::new();
        let mut unknown = Vec::new();
        for range in ranges {
            let registered = self
                .registry
                .entries()
                .iter()
                .map(|entry| entry.discriminator())
                .find(|d| d.eq_ignore_ascii_case(range));
            match registered {
                Some(d) if !known.contains(&d) => known.push(d),
                Some(_) => {}
                None => unknown.push(range.as_str()),
            }
        }
        (known, unknown)
    }

    fn failed(&self, error: String) -> CategoryResponse {
        warn!(category = %self.name, error = %error, "Category overview failed");
        let mut response = CategoryResponse::new(&self.name, Some(self.code_range.clone()));
        response.error = Some(error);
        response
    }
}

impl std::fmt::Debug for TopicCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicCategory")
            .field("name", &self.name)
            .field("code_range", &self.code_range)
            .field("subtopics", &self.registry.len())
            .finish()
    }
}
