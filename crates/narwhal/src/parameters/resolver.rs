//! Reference resolution over the typed configuration tree.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use tracing::{debug, error};

use narwhal_core::emit;

use crate::config::{ConfigValue, ENV_PLACEHOLDER, ResolvedValue, is_reference};
use crate::error::LookupError;
use crate::metrics::events::ParameterLookupFailed;

use super::ParameterStore;

/// Resolves parameter-store references for one deployment environment.
///
/// Lookup failures never abort resolution. They are logged with their
/// category and the value resolves to null.
#[derive(Clone)]
pub struct ParameterResolver {
    store: Arc<dyn ParameterStore>,
    environment: String,
}

impl ParameterResolver {
    pub fn new(store: Arc<dyn ParameterStore>, environment: impl Into<String>) -> Self {
        Self {
            store,
            environment: environment.into(),
        }
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Substitute the environment placeholder inside a reference key.
    pub fn expand_key(&self, reference: &str) -> String {
        reference.replace(ENV_PLACEHOLDER, &self.environment)
    }

    /// Resolve a single value.
    ///
    /// Literals (no leading `/`) are returned unchanged without touching the
    /// store. References return the stored value, or `None` if the lookup
    /// failed.
    pub async fn resolve(&self, value: &str) -> Option<String> {
        if !is_reference(value) {
            return Some(value.to_string());
        }

        let key = self.expand_key(value);
        match self.store.get_parameter(&key).await {
            Ok(resolved) => {
                debug!(key = %key, "Resolved parameter");
                Some(resolved)
            }
            Err(e) => {
                log_lookup_failure(&e);
                emit!(ParameterLookupFailed {
                    category: e.category(),
                });
                None
            }
        }
    }

    /// Resolve every reference in a mapping.
    ///
    /// Shape and key set are preserved. Reference strings are replaced,
    /// nested mappings are walked recursively, and sequences have their
    /// reference elements resolved one by one. Anything else inside a
    /// sequence is carried over untouched.
    pub async fn resolve_deep(
        &self,
        mapping: &IndexMap<String, ConfigValue>,
    ) -> IndexMap<String, ResolvedValue> {
        self.resolve_mapping(mapping).await
    }

    fn resolve_mapping<'a>(
        &'a self,
        mapping: &'a IndexMap<String, ConfigValue>,
    ) -> BoxFuture<'a, IndexMap<String, ResolvedValue>> {
        async move {
            let mut resolved = IndexMap::with_capacity(mapping.len());
            for (key, value) in mapping {
                let value = match value {
                    ConfigValue::Mapping(inner) => {
                        ResolvedValue::Mapping(self.resolve_mapping(inner).await)
                    }
                    ConfigValue::Sequence(items) => {
                        ResolvedValue::Sequence(self.resolve_sequence(items).await)
                    }
                    leaf => self.resolve_leaf(leaf).await,
                };
                resolved.insert(key.clone(), value);
            }
            resolved
        }
        .boxed()
    }

    async fn resolve_sequence(&self, items: &[ConfigValue]) -> Vec<ResolvedValue> {
        let mut resolved = Vec::with_capacity(items.len());
        for item in items {
            let value = match item {
                ConfigValue::Mapping(_) | ConfigValue::Sequence(_) => ResolvedValue::verbatim(item),
                leaf => self.resolve_leaf(leaf).await,
            };
            resolved.push(value);
        }
        resolved
    }

    async fn resolve_leaf(&self, value: &ConfigValue) -> ResolvedValue {
        match value {
            ConfigValue::Reference(reference) => self.resolve(reference).await.into(),
            other => ResolvedValue::verbatim(other),
        }
    }
}

fn log_lookup_failure(err: &LookupError) {
    match err {
        LookupError::NotFound { key } => {
            error!(key = %key, category = err.category(), "Parameter not found");
        }
        LookupError::InvalidKey { key, message } => {
            error!(
                key = %key,
                category = err.category(),
                error = %message,
                "Parameter has invalid KMS key"
            );
        }
        LookupError::Backend { key, message } => {
            error!(
                key = %key,
                category = err.category(),
                error = %message,
                "Unexpected error retrieving parameter"
            );
        }
    }
}
