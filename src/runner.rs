//! Batch driver: one provider type, every enabled record, one at a time.

use anyhow::{Context, Result};
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::consts::DEFAULT_HANDLER_TIMEOUT;
use crate::http::HttpConfig;
use crate::provider::{Provider, ProviderRegistry};
use crate::result::HandlerResult;
use crate::store::{ConfigStore, ProviderData};

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Handed to each provider when it is constructed.
    pub http: HttpConfig,
    /// Deadline for one record's handler. `None` waits forever.
    pub handler_timeout: Option<Duration>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            handler_timeout: Some(DEFAULT_HANDLER_TIMEOUT),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordOutcome {
    pub name: String,
    pub result: HandlerResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub provider_type: String,
    pub outcomes: Vec<RecordOutcome>,
}

impl RunSummary {
    fn empty(provider_type: &str) -> Self {
        Self {
            provider_type: provider_type.to_string(),
            outcomes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.success).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn get(&self, name: &str) -> Option<&HandlerResult> {
        self.outcomes
            .iter()
            .find(|o| o.name == name)
            .map(|o| &o.result)
    }
}

pub struct TaskRunner {
    store: Arc<dyn ConfigStore>,
    registry: ProviderRegistry,
    config: RunnerConfig,
}

impl TaskRunner {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        registry: ProviderRegistry,
        config: RunnerConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Run every enabled record of `provider_type` (or just `name`).
    ///
    /// Record failures end up in the summary; only setup problems (unknown
    /// provider, store unreachable) come back as `Err`. The provider's HTTP
    /// session and the store connection are released on every path.
    pub async fn run(&self, provider_type: &str, name: Option<&str>) -> Result<RunSummary> {
        let provider = self.registry.create(provider_type, &self.config.http)?;

        let outcome = match self.store.connect().await {
            Ok(()) => {
                let outcome = self.process(provider.as_ref(), provider_type, name).await;
                if let Err(e) = self.store.close().await {
                    warn!("failed to close configuration store: {e}");
                }
                outcome
            }
            Err(e) => Err(e).context("failed to connect to configuration store"),
        };

        provider.close().await;
        outcome
    }

    async fn process(
        &self,
        provider: &dyn Provider,
        provider_type: &str,
        name: Option<&str>,
    ) -> Result<RunSummary> {
        let records = self
            .store
            .get(provider_type, name)
            .await
            .with_context(|| format!("failed to load {provider_type} records"))?;

        if records.is_empty() {
            warn!("no providers found for type: {provider_type}");
            return Ok(RunSummary::empty(provider_type));
        }

        let mut summary = RunSummary::empty(provider_type);
        for (record_name, data) in records {
            info!("Processing provider: {record_name}");
            let result = self.invoke(provider, &record_name, &data).await;

            if result.success {
                info!("✓ {record_name}: {}", result.message);
            } else {
                error!("✗ {record_name}: {}", result.message);
                if let Some(detail) = &result.error {
                    error!("  Error details: {detail}");
                }
            }

            summary.outcomes.push(RecordOutcome {
                name: record_name,
                result,
            });
        }
        Ok(summary)
    }

    /// One handler call, with errors, panics and the deadline folded into a result.
    async fn invoke(
        &self,
        provider: &dyn Provider,
        name: &str,
        data: &ProviderData,
    ) -> HandlerResult {
        let call = AssertUnwindSafe(provider.handler(data, name)).catch_unwind();
        let outcome = match self.config.handler_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return HandlerResult::fail(
                        "Handler timed out",
                        Some(format!("no result after {}s", limit.as_secs_f64())),
                    );
                }
            },
            None => call.await,
        };

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => HandlerResult::fail("Handler exception", Some(format!("{e:#}"))),
            Err(panic) => HandlerResult::fail("Handler panicked", Some(panic_message(&*panic))),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
