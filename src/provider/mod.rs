pub mod afraid;
pub mod jkforum;
pub mod mock;

use anyhow::{Result, bail};
use async_trait::async_trait;
use std::collections::HashMap;

use crate::http::HttpConfig;
use crate::result::HandlerResult;
use crate::store::ProviderData;

/// Site-specific work for one configuration record.
///
/// The runner calls `handler` once per enabled record, one record at a
/// time. `data` is read-only. Returning `Err` (or panicking) fails that
/// record only.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn handler(&self, data: &ProviderData, name: &str) -> Result<HandlerResult>;

    /// Release whatever the provider holds open (its HTTP session).
    async fn close(&self) {}
}

pub type ProviderFactory = Box<dyn Fn(&HttpConfig) -> Box<dyn Provider> + Send + Sync>;

/// Provider type name -> constructor. Filled once at startup.
pub struct ProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with every provider shipped in this crate.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(jkforum::Jkforum::TYPE, |config| {
            Box::new(jkforum::Jkforum::new(config.clone()))
        });
        registry.register(afraid::Afraid::TYPE, |config| {
            Box::new(afraid::Afraid::new(config.clone()))
        });
        registry
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn(&HttpConfig) -> Box<dyn Provider> + Send + Sync + 'static,
    ) {
        self.factories.insert(name.into(), Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn create(&self, name: &str, config: &HttpConfig) -> Result<Box<dyn Provider>> {
        match self.factories.get(name) {
            Some(factory) => Ok(factory(config)),
            None => bail!("unknown provider: {name}"),
        }
    }

    /// Registered type names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
