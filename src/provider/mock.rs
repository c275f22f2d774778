use anyhow::{Result, bail};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::Provider;
use crate::result::HandlerResult;
use crate::store::ProviderData;

/// What a [`MockProvider`] does for a given record name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Succeed,
    Fail,
    Error,
    Panic,
    Hang,
}

/// Shared view into a mock's activity; outlives the provider the runner drops.
#[derive(Debug, Default)]
pub struct CallLog {
    calls: Mutex<Vec<String>>,
    closes: AtomicUsize,
}

impl CallLog {
    /// Record names handled, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// A scripted provider for tests. Records default to [`Script::Succeed`].
pub struct MockProvider {
    scripts: HashMap<String, Script>,
    log: Arc<CallLog>,
}

impl MockProvider {
    pub fn new(log: Arc<CallLog>) -> Self {
        Self {
            scripts: HashMap::new(),
            log,
        }
    }

    pub fn with(mut self, name: &str, script: Script) -> Self {
        self.scripts.insert(name.to_string(), script);
        self
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn handler(&self, data: &ProviderData, name: &str) -> Result<HandlerResult> {
        if let Ok(mut calls) = self.log.calls.lock() {
            calls.push(name.to_string());
        }
        match self.scripts.get(name).copied().unwrap_or(Script::Succeed) {
            Script::Succeed => Ok(HandlerResult::ok(
                format!("handled {name}"),
                Some(serde_json::Value::Object(data.clone())),
            )),
            Script::Fail => Ok(HandlerResult::fail(
                format!("scripted failure for {name}"),
                Some("mock".to_string()),
            )),
            Script::Error => bail!("scripted error for {name}"),
            Script::Panic => panic!("scripted panic for {name}"),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(HandlerResult::ok("woke up", None))
            }
        }
    }

    async fn close(&self) {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
    }
}
