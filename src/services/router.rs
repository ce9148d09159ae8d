//! Model routing.
//!
//! Maps a requested model identifier to the provider that serves it and the
//! model id to send upstream. Resolution is total: unknown identifiers go to
//! the default provider.

use crate::core::GatewayConfig;
use crate::provider::ProviderKind;
use std::collections::HashMap;

/// Identifiers known without a catalog.
const STATIC_MODELS: &[(&str, ProviderKind)] = &[
    ("glm-4", ProviderKind::Glm),
    ("glm-4-plus", ProviderKind::Glm),
    ("glm-4-air", ProviderKind::Glm),
    ("glm-4-flash", ProviderKind::Glm),
    ("glm-4.5", ProviderKind::Glm),
    ("glm-4.5-air", ProviderKind::Glm),
    ("glm-4.6", ProviderKind::Glm),
    ("kimi-k2-turbo-preview", ProviderKind::Kimi),
    ("kimi-k2-thinking", ProviderKind::Kimi),
    ("kimi-k2-thinking-turbo", ProviderKind::Kimi),
    ("kimi-latest", ProviderKind::Kimi),
    ("moonshot-v1-8k", ProviderKind::Kimi),
    ("moonshot-v1-32k", ProviderKind::Kimi),
    ("moonshot-v1-128k", ProviderKind::Kimi),
];

/// Naming conventions used when there is no exact match.
const PREFIXES: &[(&str, ProviderKind)] = &[
    ("glm-", ProviderKind::Glm),
    ("chatglm", ProviderKind::Glm),
    ("kimi-", ProviderKind::Kimi),
    ("moonshot-", ProviderKind::Kimi),
];

/// How a route was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMatch {
    Exact,
    Prefix,
    Default,
}

/// Result of resolving a model identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub provider: ProviderKind,
    /// Identifier to send to the provider API
    pub model_id: String,
    pub matched: RouteMatch,
}

/// Immutable routing table built from configuration.
#[derive(Debug, Clone)]
pub struct ModelRouter {
    /// lowercase id -> (canonical id, provider)
    table: HashMap<String, (String, ProviderKind)>,
    default_provider: ProviderKind,
}

impl ModelRouter {
    pub fn new(config: &GatewayConfig) -> Self {
        let mut table: HashMap<String, (String, ProviderKind)> = STATIC_MODELS
            .iter()
            .map(|(id, kind)| (id.to_lowercase(), (id.to_string(), *kind)))
            .collect();

        for model in &config.catalog.models {
            match ProviderKind::from_tag(&model.model_type) {
                Some(kind) => {
                    table.insert(model.id.to_lowercase(), (model.id.clone(), kind));
                }
                None => {
                    tracing::warn!(
                        model = %model.id,
                        provider_type = %model.model_type,
                        "Catalog model has no adapter, requests will use the default provider"
                    );
                }
            }
        }

        let mut router = Self {
            table,
            default_provider: ProviderKind::Glm,
        };
        router.default_provider = router
            .lookup(&config.default_model)
            .map(|(kind, _, _)| kind)
            .unwrap_or(ProviderKind::Glm);
        router
    }

    pub fn default_provider(&self) -> ProviderKind {
        self.default_provider
    }

    /// Resolve a model identifier. Never fails.
    pub fn resolve(&self, model: &str) -> Route {
        match self.lookup(model) {
            Some((provider, model_id, matched)) => Route {
                provider,
                model_id,
                matched,
            },
            None => {
                tracing::warn!(
                    model = %model,
                    provider = %self.default_provider,
                    "Unknown model identifier, routing to default provider"
                );
                Route {
                    provider: self.default_provider,
                    model_id: model.to_string(),
                    matched: RouteMatch::Default,
                }
            }
        }
    }

    fn lookup(&self, model: &str) -> Option<(ProviderKind, String, RouteMatch)> {
        let key = model.trim().to_lowercase();

        if let Some((canonical, kind)) = self.table.get(&key) {
            return Some((*kind, canonical.clone(), RouteMatch::Exact));
        }

        PREFIXES
            .iter()
            .find(|(prefix, _)| key.starts_with(prefix))
            .map(|(_, kind)| (*kind, model.to_string(), RouteMatch::Prefix))
    }
}
