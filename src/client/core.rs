use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{OrchestratorConfig, ParallelConfig, Strategy};
use crate::drivers::ProviderPool;
use crate::pipeline::fan_out::{self, Collect, FanOutOutcome};
use crate::pipeline::select::{select_fastest, select_first_primary};
use crate::pipeline::{BlacklistSnapshot, Blacklists, FallbackChain, FastestModelCache, RetryPolicy};
use crate::registry::{ModelDescriptor, ModelPerformance, ModelRegistry};
use crate::structured::ResponseFormat;
use crate::types::{CallResult, FailureKind, GenerateOptions};
use crate::{Error, ErrorContext, Result};

use super::execution::CallExecutor;
use super::validation;

/// Prompt used by [`Orchestrator::health_check`].
const HEALTH_PROBE_PROMPT: &str = "Reply with the single word: ok";

/// Model orchestration engine.
///
/// Owns the registry, the provider clients and all adaptive state (fastest-model
/// cache, blacklists). Independent instances share nothing.
pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: Arc<ModelRegistry>,
    pool: Arc<ProviderPool>,
    executor: CallExecutor,
    fastest: Arc<FastestModelCache>,
    blacklists: Arc<Blacklists>,
    closed: AtomicBool,
}

/// Request-scoped values shared by the single and parallel paths.
struct Request<'a> {
    prompt: &'a str,
    format: Option<ResponseFormat>,
}

impl Request<'_> {
    fn json_mode(&self) -> bool {
        self.format.as_ref().is_some_and(ResponseFormat::is_json)
    }

    fn format(&self) -> Option<&ResponseFormat> {
        self.format.as_ref()
    }
}

impl Orchestrator {
    pub fn builder() -> super::OrchestratorBuilder {
        super::OrchestratorBuilder::new()
    }

    pub(crate) fn new(
        config: OrchestratorConfig,
        registry: ModelRegistry,
        pool: ProviderPool,
    ) -> Self {
        let llm = &config.llm;
        let fastest = Arc::new(FastestModelCache::new(Duration::from_secs(
            llm.fastest_cache_ttl_secs,
        )));
        let blacklists = Arc::new(Blacklists::new(llm.blacklist.ttl_secs.map(Duration::from_secs)));
        let pool = Arc::new(pool);
        let executor = CallExecutor::new(
            Arc::clone(&pool),
            RetryPolicy::from_settings(&llm.retry),
            Arc::clone(&fastest),
            Arc::clone(&blacklists),
        );

        info!(
            models = registry.len(),
            providers = pool.len(),
            strategy = ?llm.strategy,
            "orchestrator ready"
        );

        Self {
            config,
            registry: Arc::new(registry),
            pool,
            executor,
            fastest,
            blacklists,
            closed: AtomicBool::new(false),
        }
    }

    /// Generate a response for `prompt`.
    ///
    /// Never returns an intermediate failure: the result is either a success or one
    /// final failure after every applicable recovery (retry, fallback, JSON guard)
    /// has run.
    pub async fn generate_response(&self, prompt: &str, options: GenerateOptions) -> CallResult {
        let requested = options.model_name.clone().unwrap_or_default();
        if self.is_closed() {
            return CallResult::failure(requested, FailureKind::Closed, "orchestrator is closed", 0.0);
        }

        let request = match self.screen(prompt, &options) {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, "request rejected");
                return CallResult::from_error(requested, &err, 0.0);
            }
        };

        if let Some(name) = options.model_name.as_deref() {
            let model = self.registry.get_model_by_name(name);
            return self.run_single(&request, model).await;
        }

        if let Some(parallel) = self.parallel_config(&options, request.json_mode()) {
            return self.run_parallel(&request, parallel).await;
        }

        let initial = if options.use_fastest {
            select_fastest(&self.registry, &self.fastest, &self.blacklists, request.json_mode())
        } else {
            select_first_primary(&self.registry, &self.blacklists, request.json_mode())
        };
        self.run_single(&request, initial).await
    }

    fn screen<'a>(&self, prompt: &'a str, options: &GenerateOptions) -> Result<Request<'a>> {
        validation::validate_prompt(prompt, self.config.llm.security.max_prompt_bytes)?;
        if let Some(name) = options.model_name.as_deref() {
            validation::validate_model_name(name, &self.registry)?;
        }
        let format = options
            .response_format
            .as_ref()
            .map(validation::validate_response_format)
            .transpose()?;
        Ok(Request { prompt, format })
    }

    /// Parallel mode applies when requested, configured as the strategy, or implied by
    /// JSON mode, and only if parallel candidates are configured.
    fn parallel_config(&self, options: &GenerateOptions, json_mode: bool) -> Option<&ParallelConfig> {
        let wanted = options.use_parallel
            || json_mode
            || self.config.llm.strategy == Strategy::BestOfTwo;
        if !wanted {
            return None;
        }
        self.config
            .llm
            .parallel
            .as_ref()
            .filter(|p| !p.models.is_empty())
    }

    /// Try `initial` (if any), then walk the fallback chain.
    async fn run_single(&self, request: &Request<'_>, initial: Option<Arc<ModelDescriptor>>) -> CallResult {
        let mut chain = FallbackChain::new(&self.registry);
        let mut last_error: Option<String> = None;

        if let Some(model) = initial {
            chain.mark_attempted(&model.name);
            debug!(model = model.name.as_str(), role = %model.role, "initial model");
            let result = self
                .executor
                .call(request.prompt, &model, request.format())
                .await;
            if result.success {
                return result;
            }
            last_error = result.error;
        }

        self.continue_fallback(request, chain, last_error).await
    }

    async fn continue_fallback(
        &self,
        request: &Request<'_>,
        mut chain: FallbackChain,
        mut last_error: Option<String>,
    ) -> CallResult {
        while let Some(model) = chain.next(&self.blacklists, request.json_mode()) {
            warn!(
                model = model.name.as_str(),
                role = %model.role,
                previous_error = last_error.as_deref().unwrap_or(""),
                "falling back"
            );
            let result = self
                .executor
                .call(request.prompt, &model, request.format())
                .await;
            if result.success {
                return result;
            }
            last_error = result.error;
        }

        let last = last_error.unwrap_or_else(|| "no eligible model".to_string());
        warn!(attempted = chain.attempted_count(), last_error = last.as_str(), "all models failed");
        CallResult::failure(
            "",
            FailureKind::Exhausted,
            format!("All models failed. Last error: {}", last),
            0.0,
        )
    }

    async fn run_parallel(&self, request: &Request<'_>, parallel: &ParallelConfig) -> CallResult {
        let json_mode = request.json_mode();
        let candidates: Vec<Arc<ModelDescriptor>> = parallel
            .models
            .iter()
            .filter_map(|name| self.registry.get_model_by_name(name))
            .filter(|m| m.is_enabled() && !self.blacklists.excludes(&m.name, json_mode))
            .collect();

        if candidates.is_empty() {
            debug!("no eligible parallel candidates; using single-model path");
            let initial = select_fastest(&self.registry, &self.fastest, &self.blacklists, json_mode);
            return self.run_single(request, initial).await;
        }

        let evaluator = parallel
            .evaluator_model
            .as_deref()
            .and_then(|name| self.registry.get_model_by_name(name))
            .filter(|m| m.is_enabled() && !self.blacklists.excludes(&m.name, false));
        let collect = if evaluator.is_some() {
            Collect::AllSuccesses
        } else {
            Collect::FirstSuccess
        };

        let budget = parallel.timeout();
        let deadline = tokio::time::Instant::now() + budget;
        debug!(
            candidates = candidates.len(),
            evaluator = evaluator.as_ref().map(|m| m.name.as_str()).unwrap_or(""),
            timeout_secs = parallel.timeout_secs,
            "parallel evaluation"
        );

        let outcome = fan_out::fan_out(&candidates, deadline, collect, |model| async move {
            self.executor
                .call(request.prompt, &model, request.format())
                .await
        })
        .await;
        let last_error = outcome.last_error().map(str::to_string);
        let FanOutOutcome {
            successes,
            timed_out,
            ..
        } = outcome;

        let winner = match evaluator {
            Some(judge) if successes.len() > 1 => {
                let first = successes.first().cloned();
                let scoring = self.score(request.prompt, &judge, successes);
                match tokio::time::timeout_at(deadline, scoring).await {
                    Ok(best) => best,
                    Err(_) => {
                        warn!(
                            evaluator = judge.name.as_str(),
                            timeout_secs = parallel.timeout_secs,
                            "scoring exceeded the parallel budget; keeping first success"
                        );
                        first
                    }
                }
            }
            _ => successes.into_iter().next(),
        };
        if let Some(winner) = winner {
            info!(
                model = winner.model_name.as_str(),
                score = winner.score.unwrap_or(-1.0),
                "parallel winner"
            );
            return winner;
        }

        if timed_out {
            warn!(timeout_secs = parallel.timeout_secs, "parallel evaluation timed out");
            let err = Error::Timeout {
                message: format!(
                    "parallel evaluation exceeded {:.1}s with no successful candidate",
                    parallel.timeout_secs
                ),
            };
            return CallResult::failure("", FailureKind::Timeout, err.to_string(), parallel.timeout_secs);
        }

        let mut chain = FallbackChain::new(&self.registry);
        for model in &candidates {
            chain.mark_attempted(&model.name);
        }
        self.continue_fallback(request, chain, last_error).await
    }

    /// Score every successful response with the evaluator and keep the best one.
    async fn score(
        &self,
        prompt: &str,
        judge: &ModelDescriptor,
        successes: Vec<CallResult>,
    ) -> Option<CallResult> {
        let scores = futures::future::join_all(successes.iter().map(|candidate| async move {
            let scoring = fan_out::scoring_prompt(prompt, &candidate.content);
            let verdict = self.executor.call(&scoring, judge, None).await;
            if verdict.success {
                fan_out::parse_score(&verdict.content)
            } else {
                debug!(
                    model = candidate.model_name.as_str(),
                    error = verdict.error_message(),
                    "scoring call failed; scoring 0"
                );
                0.0
            }
        }))
        .await;

        let scored = successes
            .into_iter()
            .zip(scores)
            .map(|(result, score)| result.with_score(score))
            .collect();
        fan_out::pick_best(scored)
    }

    /// Release every provider client. Later calls fail with [`FailureKind::Closed`].
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.pool.close();
            info!("orchestrator closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn performance_stats(&self) -> Vec<ModelPerformance> {
        self.registry.performance_stats()
    }

    /// Probe every enabled model once, concurrently, without retry or fallback.
    pub async fn health_check(&self) -> BTreeMap<String, bool> {
        let models: Vec<Arc<ModelDescriptor>> = self
            .registry
            .models()
            .iter()
            .filter(|m| m.is_enabled())
            .cloned()
            .collect();
        if self.is_closed() {
            return models.iter().map(|m| (m.name.clone(), false)).collect();
        }

        let probe = RetryPolicy::single_attempt();
        let probes = models.iter().map(|model| {
            let probe = &probe;
            async move {
                let result = self
                    .executor
                    .call_with_policy(HEALTH_PROBE_PROMPT, model, None, probe)
                    .await;
                (model.name.clone(), result.success)
            }
        });
        let report: BTreeMap<String, bool> = futures::future::join_all(probes).await.into_iter().collect();
        info!(
            healthy = report.values().filter(|ok| **ok).count(),
            total = report.len(),
            "health check finished"
        );
        report
    }

    /// Operator switch for disabling or re-enabling a model at runtime.
    pub fn set_model_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let model = self.registry.get_model_by_name(name).ok_or_else(|| {
            Error::validation_with_context(
                format!("unknown model '{}'", name),
                ErrorContext::new()
                    .with_field_path("model_name")
                    .with_source("orchestrator"),
            )
        })?;
        model.set_enabled(enabled);
        self.fastest.invalidate();
        info!(model = name, enabled, "model availability changed");
        Ok(())
    }

    /// Remove `name` from both blacklists. Returns whether it was listed.
    pub fn clear_blacklists(&self, name: &str) -> bool {
        let removed = self.blacklists.remove(name);
        if removed {
            info!(model = name, "blacklist entries cleared");
        }
        removed
    }

    pub fn blacklisted_models(&self) -> BlacklistSnapshot {
        self.blacklists.snapshot()
    }

    /// Current fastest eligible primary model for non-JSON requests.
    pub fn fastest_model(&self) -> Option<Arc<ModelDescriptor>> {
        select_fastest(&self.registry, &self.fastest, &self.blacklists, false)
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("models", &self.registry.len())
            .field("providers", &self.pool.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
