//! Call execution: one model invocation with retry, statistics and the JSON guard.

use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::drivers::ProviderPool;
use crate::pipeline::retry::Decision;
use crate::pipeline::{BlacklistKind, Blacklists, FastestModelCache, RetryPolicy};
use crate::registry::ModelDescriptor;
use crate::structured::{validate_json_output, ResponseFormat};
use crate::types::{CallResult, FailureKind};
use crate::{Error, ErrorContext};

/// Runs calls against a single model and feeds outcomes back into shared state.
pub(crate) struct CallExecutor {
    pool: Arc<ProviderPool>,
    retry: RetryPolicy,
    fastest: Arc<FastestModelCache>,
    blacklists: Arc<Blacklists>,
}

impl CallExecutor {
    pub fn new(
        pool: Arc<ProviderPool>,
        retry: RetryPolicy,
        fastest: Arc<FastestModelCache>,
        blacklists: Arc<Blacklists>,
    ) -> Self {
        Self {
            pool,
            retry,
            fastest,
            blacklists,
        }
    }

    /// Invoke `model` under the configured retry policy.
    pub async fn call(
        &self,
        prompt: &str,
        model: &ModelDescriptor,
        format: Option<&ResponseFormat>,
    ) -> CallResult {
        self.call_with_policy(prompt, model, format, &self.retry).await
    }

    /// Check a response under JSON mode. A violation blacklists the model for JSON
    /// requests; the returned content is the extracted JSON, re-serialized.
    fn guard_json(
        &self,
        model: &ModelDescriptor,
        content: String,
        format: Option<&ResponseFormat>,
    ) -> std::result::Result<String, Error> {
        let Some(format) = format.filter(|f| f.is_json()) else {
            return Ok(content);
        };
        match validate_json_output(&content, format) {
            Ok(value) => Ok(value.to_string()),
            Err(violation) => {
                warn!(
                    model = model.name.as_str(),
                    reason = %violation,
                    "model violated JSON mode; blacklisting for JSON requests"
                );
                self.blacklists.add(BlacklistKind::Json, &model.name);
                Err(Error::StructuredOutput {
                    model: model.name.clone(),
                    message: violation.to_string(),
                })
            }
        }
    }

    /// Invoke `model` under `policy`.
    ///
    /// In JSON mode a response that is not valid JSON output fails the call without
    /// retry and counts as an error for the model.
    pub async fn call_with_policy(
        &self,
        prompt: &str,
        model: &ModelDescriptor,
        format: Option<&ResponseFormat>,
        policy: &RetryPolicy,
    ) -> CallResult {
        let Some(client) = self.pool.get(&model.provider) else {
            let err = Error::runtime_with_context(
                format!("no client for provider '{}'", model.provider),
                ErrorContext::new()
                    .with_field_path(format!("providers.{}", model.provider))
                    .with_source("call_executor"),
            );
            model.record_failure();
            return CallResult::from_error(model.name.as_str(), &err, 0.0);
        };

        let mut attempt: u32 = 0;
        loop {
            let start = Instant::now();
            let outcome = client.complete(prompt, model, format).await;
            let elapsed = start.elapsed().as_secs_f64();

            let err = match outcome {
                Ok(content) => match self.guard_json(model, content, format) {
                    Ok(content) => {
                        model.record_success(elapsed);
                        self.fastest.invalidate();
                        info!(
                            model = model.name.as_str(),
                            provider = model.provider.as_str(),
                            attempt = attempt + 1,
                            duration_ms = (elapsed * 1000.0) as u64,
                            "model call succeeded"
                        );
                        return CallResult::success(model.name.as_str(), content, elapsed);
                    }
                    Err(violation) => {
                        model.record_failure();
                        self.fastest.invalidate();
                        return CallResult::from_error(model.name.as_str(), &violation, elapsed);
                    }
                },
                Err(err) => err,
            };

            match policy.decide(&err, attempt) {
                Decision::Retry { delay } => {
                    warn!(
                        model = model.name.as_str(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "model call failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Decision::Fail => {
                    let attempts = attempt + 1;
                    model.record_failure();
                    self.fastest.invalidate();
                    if err.is_quota_exhausted() {
                        warn!(model = model.name.as_str(), "quota exhausted; blacklisting model");
                        self.blacklists.add(BlacklistKind::Quota, &model.name);
                    }
                    info!(
                        model = model.name.as_str(),
                        attempts,
                        error = %err,
                        "model call failed"
                    );

                    let message = if err.is_validation() {
                        err.to_string()
                    } else {
                        format!("Failed after {} attempts: {}", attempts, err)
                    };
                    return CallResult::failure(
                        model.name.as_str(),
                        FailureKind::from_error(&err),
                        message,
                        elapsed,
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigLoader;
    use crate::registry::ModelRegistry;
    use crate::transport::{ModelTransport, ProviderRequest};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Clone, Copy)]
    enum Step {
        Text(&'static str),
        Unavailable,
        Quota,
    }

    impl Step {
        fn outcome(self) -> crate::Result<Value> {
            match self {
                Step::Text(content) => Ok(json!({"choices": [{"message": {"content": content}}]})),
                Step::Unavailable => Err(Error::Remote {
                    status: 503,
                    class: "server_error".into(),
                    message: "overloaded".into(),
                    retryable: true,
                }),
                Step::Quota => Err(Error::Remote {
                    status: 402,
                    class: "quota_exhausted".into(),
                    message: "insufficient_quota".into(),
                    retryable: false,
                }),
            }
        }
    }

    /// Replays steps in order, then repeats the last one.
    struct Replay {
        script: Mutex<VecDeque<Step>>,
        calls: Mutex<u32>,
    }

    impl Replay {
        fn new(script: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ModelTransport for Replay {
        async fn send(&self, _request: &ProviderRequest) -> crate::Result<Value> {
            *self.calls.lock().unwrap() += 1;
            let mut script = self.script.lock().unwrap();
            let step = if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().copied()
            };
            step.map(Step::outcome)
                .unwrap_or_else(|| Err(Error::runtime("script exhausted")))
        }
    }

    fn setup(transport: Arc<Replay>) -> (CallExecutor, ModelRegistry, Arc<Blacklists>, Arc<FastestModelCache>) {
        let doc = r#"
llm:
  default_provider: openai
  model_roles: { primary: [m1] }
providers:
  openai:
    base_url: https://api.openai.test/v1
    models: { chat: [ { name: m1 } ] }
"#;
        let config = ConfigLoader::new().with_env(|_| None).load_str(doc).unwrap();
        let registry = ModelRegistry::from_config(&config).unwrap();
        let pool = Arc::new(ProviderPool::from_config(&config, Some(transport as Arc<dyn ModelTransport>)).unwrap());
        let blacklists = Arc::new(Blacklists::default());
        let fastest = Arc::new(FastestModelCache::new(Duration::from_secs(60)));
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: 0.25,
        };
        let exec = CallExecutor::new(pool, policy, Arc::clone(&fastest), Arc::clone(&blacklists));
        (exec, registry, blacklists, fastest)
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let transport = Replay::new(vec![Step::Unavailable, Step::Text("hello")]);
        let (exec, reg, _, _) = setup(Arc::clone(&transport));
        let m1 = reg.get_model_by_name("m1").unwrap();

        let r = exec.call("hi", &m1, None).await;
        assert!(r.success, "{:?}", r);
        assert_eq!(r.content, "hello");
        assert_eq!(transport.calls(), 2);
        assert_eq!(m1.stats().success_count, 1);
        assert_eq!(m1.stats().error_count, 0);
    }

    #[tokio::test]
    async fn test_failure_reports_attempt_count() {
        let transport = Replay::new(vec![Step::Unavailable]);
        let (exec, reg, _, fastest) = setup(Arc::clone(&transport));
        let m1 = reg.get_model_by_name("m1").unwrap();
        fastest.put(Arc::clone(&m1));

        let r = exec.call("hi", &m1, None).await;
        assert!(!r.success);
        assert!(r.error_message().starts_with("Failed after 3 attempts"));
        assert_eq!(transport.calls(), 3);
        assert_eq!(m1.stats().error_count, 1);
        assert!(fastest.get().is_none());
    }

    #[tokio::test]
    async fn test_quota_error_blacklists_without_retry() {
        let transport = Replay::new(vec![Step::Quota]);
        let (exec, reg, blacklists, _) = setup(Arc::clone(&transport));
        let m1 = reg.get_model_by_name("m1").unwrap();

        let r = exec.call("hi", &m1, None).await;
        assert_eq!(r.failure, Some(FailureKind::QuotaExhausted));
        assert_eq!(transport.calls(), 1);
        assert!(blacklists.contains(BlacklistKind::Quota, "m1"));
    }

    #[tokio::test]
    async fn test_json_guard_extracts_and_blacklists() {
        let format = ResponseFormat::JsonObject;

        let transport = Replay::new(vec![Step::Text("Sure! ```json\n{\"ok\": true}\n```")]);
        let (exec, reg, blacklists, _) = setup(transport);
        let m1 = reg.get_model_by_name("m1").unwrap();
        let r = exec.call("hi", &m1, Some(&format)).await;
        assert!(r.success);
        assert_eq!(r.content, r#"{"ok":true}"#);
        assert!(!blacklists.contains(BlacklistKind::Json, "m1"));
        assert_eq!(m1.stats().success_count, 1);

        let transport = Replay::new(vec![Step::Text("I would rather talk than return JSON.")]);
        let (exec, reg, blacklists, _) = setup(transport);
        let m1 = reg.get_model_by_name("m1").unwrap();
        let r = exec.call("hi", &m1, Some(&format)).await;
        assert_eq!(r.failure, Some(FailureKind::StructuredOutput));
        assert!(r.content.is_empty());
        assert!(blacklists.contains(BlacklistKind::Json, "m1"));
    }

    #[tokio::test]
    async fn test_json_violation_counts_as_error_not_success() {
        let transport = Replay::new(vec![Step::Text("no json here")]);
        let (exec, reg, _, fastest) = setup(Arc::clone(&transport));
        let m1 = reg.get_model_by_name("m1").unwrap();
        fastest.put(Arc::clone(&m1));

        let r = exec.call("hi", &m1, Some(&ResponseFormat::JsonObject)).await;
        assert!(!r.success);
        assert_eq!(transport.calls(), 1);
        let stats = m1.stats();
        assert_eq!(stats.success_count, 0);
        assert_eq!(stats.error_count, 1);
        assert!(fastest.get().is_none());
    }
}
