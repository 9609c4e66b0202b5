//! Subtopic Registry
//!
//! Holds the subtopic activation functions of one parent category and fans a
//! scenario out to every entry whose discriminator was requested.
//!
//! # Parallel Execution
//! - Async entries run as individual tokio tasks.
//! - Blocking entries run on a worker pool built for the call and sized
//!   `min(selected, available parallelism, max_workers)`.
//! - Every invocation has its own timeout.
//!
//! Failures are isolated per entry: a timeout, error or panic becomes an
//! error record for that entry and never affects its siblings or escapes
//! [`SubtopicRegistry::activate_all`].

mod worker_pool;

pub use worker_pool::pool_size;

use crate::normalizer::normalize;
use crate::types::{
    Activation, ActivationError, ActivationOutcome, AggregateResult, AsyncActivation,
    BlockingActivation, NormalizedRecord, RegistrationError,
};
use dentcode_common::config::ActivationConfig;
use futures::future::join_all;
use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use worker_pool::{panic_message, WorkerPool};

/// Default per-activation timeout
pub const DEFAULT_ACTIVATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default ceiling on worker threads per fan-out
pub const DEFAULT_MAX_WORKERS: usize = 8;

/// Fan-out limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryOptions {
    /// Time budget for each individual activation
    pub activation_timeout: Duration,
    /// Ceiling on worker threads for blocking activations
    pub max_workers: usize,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            activation_timeout: DEFAULT_ACTIVATION_TIMEOUT,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }
}

impl From<&ActivationConfig> for RegistryOptions {
    fn from(config: &ActivationConfig) -> Self {
        Self {
            activation_timeout: Duration::from_secs(config.timeout_secs.max(1)),
            max_workers: config.max_workers.max(1),
        }
    }
}

/// One registered subtopic
#[derive(Debug, Clone)]
pub struct RegisteredEntry {
    discriminator: String,
    activation: Activation,
    display_name: String,
    is_async: bool,
}

impl RegisteredEntry {
    pub fn discriminator(&self) -> &str {
        &self.discriminator
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }
}

/// Registry of subtopic activations for one parent category
///
/// # Example
/// ```rust,ignore
/// use dentcode_ai::subtopics::SubtopicRegistry;
/// use dentcode_ai::types::ActivationOutcome;
///
/// let mut registry = SubtopicRegistry::new("Diagnostic");
/// registry.register_blocking("D0120-D0180", "Clinical Oral Evaluations", |scenario| {
///     Ok(ActivationOutcome::from(ask_model(scenario)?))
/// })?;
///
/// let aggregate = registry.activate_all("patient visit", "D0120-D0180").await;
/// for record in &aggregate.topic_result {
///     println!("{}: {:?}", record.topic, record.code);
/// }
/// ```
pub struct SubtopicRegistry {
    name: String,
    entries: Vec<RegisteredEntry>,
    options: RegistryOptions,
}

impl SubtopicRegistry {
    /// Create an empty registry with default options
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_options(name, RegistryOptions::default())
    }

    pub fn with_options(name: impl Into<String>, options: RegistryOptions) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
            options,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> RegistryOptions {
        self.options
    }

    pub fn entries(&self) -> &[RegisteredEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register an activation under a discriminator
    ///
    /// Entries may share a discriminator; all of them run when it is selected.
    pub fn register(
        &mut self,
        discriminator: &str,
        activation: Activation,
        display_name: &str,
    ) -> Result<(), RegistrationError> {
        let discriminator = discriminator.trim();
        let display_name = display_name.trim();

        if discriminator.is_empty() {
            return Err(RegistrationError::EmptyDiscriminator(display_name.to_string()));
        }
        if display_name.is_empty() {
            return Err(RegistrationError::EmptyDisplayName(discriminator.to_string()));
        }

        let is_async = activation.is_async();
        self.entries.push(RegisteredEntry {
            discriminator: discriminator.to_string(),
            activation,
            display_name: display_name.to_string(),
            is_async,
        });
        Ok(())
    }

    /// Register a synchronous closure
    pub fn register_blocking<F>(
        &mut self,
        discriminator: &str,
        display_name: &str,
        f: F,
    ) -> Result<(), RegistrationError>
    where
        F: Fn(&str) -> anyhow::Result<ActivationOutcome> + Send + Sync + 'static,
    {
        self.register(discriminator, Activation::blocking(f), display_name)
    }

    /// Register an async closure
    pub fn register_async<F, Fut>(
        &mut self,
        discriminator: &str,
        display_name: &str,
        f: F,
    ) -> Result<(), RegistrationError>
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<ActivationOutcome>> + Send + 'static,
    {
        self.register(discriminator, Activation::from_async(f), display_name)
    }

    /// Entries whose discriminator is in the requested set, in registration order
    pub fn select(&self, discriminators_csv: &str) -> Vec<&RegisteredEntry> {
        let requested = parse_discriminators(discriminators_csv);
        self.entries
            .iter()
            .filter(|entry| requested.contains(entry.discriminator.as_str()))
            .collect()
    }

    /// Run every selected entry concurrently and aggregate the results
    ///
    /// Never fails: each failing entry contributes an error record instead.
    pub async fn activate_all(&self, scenario: &str, discriminators_csv: &str) -> AggregateResult {
        let selected = self.select(discriminators_csv);
        if selected.is_empty() {
            debug!(
                registry = %self.name,
                discriminators = discriminators_csv,
                "No subtopics selected"
            );
            return AggregateResult::default();
        }

        let blocking_count = selected.iter().filter(|e| !e.is_async).count();
        let pool = if blocking_count > 0 {
            let size = pool_size(selected.len(), self.options.max_workers);
            match WorkerPool::new(size) {
                Ok(pool) => Some(pool),
                Err(e) => {
                    warn!(registry = %self.name, error = %e, "Could not build worker pool");
                    None
                }
            }
        } else {
            None
        };

        info!(
            registry = %self.name,
            selected = selected.len(),
            blocking = blocking_count,
            workers = pool.as_ref().map_or(0, WorkerPool::size),
            "Activating subtopics"
        );

        let timeout = self.options.activation_timeout;
        let invocations = selected.iter().map(|entry| {
            let scenario = scenario.to_string();
            let pool = pool.as_ref();
            async move {
                let result = match &entry.activation {
                    Activation::Async(activation) => {
                        run_async(Arc::clone(activation), scenario, timeout).await
                    }
                    Activation::Blocking(activation) => match pool {
                        Some(pool) => {
                            run_blocking(pool, Arc::clone(activation), scenario, timeout).await
                        }
                        None => Err(ActivationError::WorkerPool(
                            "pool could not be created".to_string(),
                        )),
                    },
                };
                (*entry, result)
            }
        });

        let completed = join_all(invocations).await;
        // Non-blocking teardown; abandoned jobs finish on their own threads
        drop(pool);

        let aggregate = aggregate(completed);
        info!(
            registry = %self.name,
            records = aggregate.topic_result.len(),
            activated = aggregate.activated_subtopics.len(),
            "Subtopic activation complete"
        );
        aggregate
    }
}

/// Split a comma-separated discriminator list into trimmed, non-empty keys
pub fn parse_discriminators(csv: &str) -> HashSet<&str> {
    csv.split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .collect()
}

async fn run_async(
    activation: Arc<dyn AsyncActivation>,
    scenario: String,
    timeout: Duration,
) -> Result<ActivationOutcome, ActivationError> {
    let mut handle = tokio::spawn(async move { activation.activate(&scenario).await });

    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(Ok(outcome))) => Ok(outcome),
        Ok(Ok(Err(e))) => Err(ActivationError::Failed(format!("{e:#}"))),
        Ok(Err(join_err)) => {
            if join_err.is_panic() {
                Err(ActivationError::Panicked(panic_message(
                    join_err.into_panic().as_ref(),
                )))
            } else {
                Err(ActivationError::Failed(join_err.to_string()))
            }
        }
        Err(_) => {
            handle.abort();
            Err(ActivationError::Timeout { after: timeout })
        }
    }
}

async fn run_blocking(
    pool: &WorkerPool,
    activation: Arc<dyn BlockingActivation>,
    scenario: String,
    timeout: Duration,
) -> Result<ActivationOutcome, ActivationError> {
    let receiver = pool.submit(activation, scenario);

    match tokio::time::timeout(timeout, receiver).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(ActivationError::WorkerPool(
            "worker dropped the job without a result".to_string(),
        )),
        Err(_) => Err(ActivationError::Timeout { after: timeout }),
    }
}

fn aggregate(
    completed: Vec<(&RegisteredEntry, Result<ActivationOutcome, ActivationError>)>,
) -> AggregateResult {
    let mut topic_result = Vec::new();
    let mut activated = BTreeSet::new();

    for (entry, result) in completed {
        match result {
            Err(e) => {
                warn!(
                    subtopic = %entry.display_name,
                    discriminator = %entry.discriminator,
                    error = %e,
                    "Subtopic activation failed (per-entry error isolation)"
                );
                topic_result.push(NormalizedRecord::error(
                    &entry.display_name,
                    &entry.discriminator,
                    e.to_string(),
                ));
            }
            Ok(outcome) => {
                match normalize(outcome, &entry.display_name, &entry.discriminator) {
                    Some(record) => {
                        activated.insert(entry.display_name.clone());
                        topic_result.push(record);
                    }
                    None => debug!(
                        subtopic = %entry.display_name,
                        "Subtopic produced nothing to report"
                    ),
                }
            }
        }
    }

    AggregateResult {
        topic_result,
        activated_subtopics: activated.into_iter().collect(),
    }
}

// ============================================================================
// Tests
// ============================================================================
