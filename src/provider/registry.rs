//! Name-keyed provider ownership.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{CliProvider, Provider};

/// How a second or later provider with an already-registered name is keyed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateNaming {
    /// `ollama`, `ollama_fallback`, `ollama_3`, ...
    #[default]
    FallbackSuffix,
    /// `ollama`, `ollama_2`, `ollama_3`, ...
    Numeric,
}

impl DuplicateNaming {
    fn candidate(self, base: &str, n: usize) -> String {
        match (self, n) {
            (DuplicateNaming::FallbackSuffix, 2) => format!("{}_fallback", base),
            _ => format!("{}_{}", base, n),
        }
    }
}

/// Providers keyed by unique name, in registration order.
#[derive(Default)]
pub struct ProviderRegistry {
    naming: DuplicateNaming,
    providers: Vec<(String, Arc<dyn Provider>)>,
}

impl ProviderRegistry {
    pub fn new(naming: DuplicateNaming) -> Self {
        Self {
            naming,
            providers: Vec::new(),
        }
    }

    /// The key the next provider named `base` would receive.
    pub fn next_name(&self, base: &str) -> String {
        if !self.contains(base) {
            return base.to_string();
        }
        let mut n = 2;
        loop {
            let candidate = self.naming.candidate(base, n);
            if !self.contains(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Register a CLI provider, renaming it if its name is taken.
    /// Returns the key it was stored under.
    pub fn register(&mut self, provider: CliProvider) -> String {
        let key = self.next_name(provider.name());
        let provider = provider.with_name(key.clone());
        self.providers.push((key.clone(), Arc::new(provider)));
        key
    }

    /// Insert an already-named provider. A provider with the same name is
    /// replaced.
    pub fn insert(&mut self, provider: Arc<dyn Provider>) {
        let key = provider.name().to_string();
        if let Some(slot) = self.providers.iter_mut().find(|(k, _)| *k == key) {
            tracing::warn!(provider = %key, "replacing provider with the same name");
            slot.1 = provider;
        } else {
            self.providers.push((key, provider));
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Provider>> {
        self.providers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, p)| p)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.providers.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Whether `name` is registered and its tool can be invoked.
    pub fn is_usable(&self, name: &str) -> bool {
        self.get(name).is_some_and(|p| p.is_available())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Provider>)> {
        self.providers.iter().map(|(k, p)| (k.as_str(), p))
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn naming(&self) -> DuplicateNaming {
        self.naming
    }
}
