//! Model-to-provider resolution.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::chat::ChatSession;
use crate::config::Config;
use crate::error::{ColloquyError, Result};
use crate::provider::{create_adapter, ProviderAdapter};
use crate::transport::{HttpBackend, Transport};

use super::catalog::builtin_models;
use super::{Model, ProviderKey};

/// A model together with the adapter that speaks its provider's protocol.
#[derive(Clone)]
pub struct Resolved {
    pub model: Model,
    pub adapter: Arc<dyn ProviderAdapter>,
}

impl std::fmt::Debug for Resolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolved")
            .field("model", &self.model.id)
            .field("adapter", &self.adapter.slug())
            .finish()
    }
}

/// Catalog of known models plus lazily created provider adapters.
///
/// Sessions hold the registry through an `Arc`; register extra models before
/// wrapping it.
///
/// Adapters are cached per provider, so every session on the same provider
/// shares one adapter and, through the registry, one [`Transport`].
pub struct ModelRegistry {
    config: Config,
    transport: Transport,
    models: Vec<Model>,
    adapters: Mutex<HashMap<ProviderKey, Arc<dyn ProviderAdapter>>>,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("models", &self.models.len())
            .field("transport", &self.transport)
            .finish()
    }
}

impl ModelRegistry {
    /// Registry over the built-in catalog with a reqwest transport.
    ///
    /// Fails with `Configuration` if the config does not validate.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let transport = Transport::from_config(&config)?;
        Ok(Self::build(config, transport))
    }

    /// Registry whose transport uses a custom HTTP backend.
    pub fn with_backend(config: Config, backend: Arc<dyn HttpBackend>) -> Result<Self> {
        config.validate()?;
        let transport = Transport::with_backend(&config, backend);
        Ok(Self::build(config, transport))
    }

    fn build(config: Config, transport: Transport) -> Self {
        Self {
            config,
            transport,
            models: builtin_models(),
            adapters: Mutex::new(HashMap::new()),
        }
    }

    /// Add or replace a model definition.
    pub fn register(&mut self, model: Model) -> &mut Self {
        self.models.retain(|m| m.id != model.id);
        self.models.push(model);
        self
    }

    /// Install an adapter for a provider, replacing any cached one.
    pub fn register_adapter(&self, key: ProviderKey, adapter: Arc<dyn ProviderAdapter>) {
        self.lock_adapters().insert(key, adapter);
    }

    fn lock_adapters(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<ProviderKey, Arc<dyn ProviderAdapter>>> {
        // The map holds no invariant a panic could break.
        self.adapters.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn find(&self, id: &str) -> Option<&Model> {
        self.models.iter().find(|m| m.id == id)
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn by_provider(&self, key: ProviderKey) -> impl Iterator<Item = &Model> {
        self.models.iter().filter(move |m| m.provider == key)
    }

    /// Look up a model and the adapter for its provider.
    pub fn resolve(&self, id: &str) -> Result<Resolved> {
        let model = self
            .find(id)
            .cloned()
            .ok_or_else(|| ColloquyError::UnknownModel(id.to_string()))?;
        let adapter = self.adapter_for(model.provider)?;
        debug!(model = %model.id, provider = adapter.slug(), "Resolved model");
        Ok(Resolved { model, adapter })
    }

    fn adapter_for(&self, key: ProviderKey) -> Result<Arc<dyn ProviderAdapter>> {
        let mut adapters = self.lock_adapters();
        if let Some(adapter) = adapters.get(&key) {
            return Ok(adapter.clone());
        }
        let adapter = create_adapter(key, &self.config)?;
        adapters.insert(key, adapter.clone());
        Ok(adapter)
    }

    pub fn default_model(&self) -> &str {
        &self.config.default_model
    }

    pub fn default_embedding_model(&self) -> &str {
        &self.config.default_embedding_model
    }

    pub fn default_image_model(&self) -> &str {
        &self.config.default_image_model
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Open a session on the default chat model.
    pub fn chat(self: &Arc<Self>) -> Result<ChatSession> {
        ChatSession::new(self.clone(), self.default_model())
    }

    /// Open a session on a specific model.
    pub fn chat_with(self: &Arc<Self>, model_id: &str) -> Result<ChatSession> {
        ChatSession::new(self.clone(), model_id)
    }
}
