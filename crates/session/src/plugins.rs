use crate::collaborators::BatchInfo;
use crate::errors::SessionError;
use crate::messages::MessageBus;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

/// An add-on told about session milestones.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// A batch was closed. Runs on a notification thread; the session does
    /// not wait for it.
    fn batch_finished(&self, batch: &BatchInfo);

    fn shutdown(&self) {}
}

/// Configuration for one plugin instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSettings {
    /// Registration-table key naming the factory to use.
    pub kind: String,
    pub options: BTreeMap<String, String>,
}

impl PluginSettings {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            options: BTreeMap::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}

/// What a plugin may use from the running station.
#[derive(Clone)]
pub struct PluginContext {
    pub messages: MessageBus,
    pub playback_fps: u32,
}

pub type PluginFactory =
    fn(&PluginSettings, &PluginContext) -> Result<Box<dyn Plugin>, SessionError>;

/// Plugins created once at startup and passed to whoever notifies them.
#[derive(Default, Clone)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiate each requested plugin through `table`.
    ///
    /// An unknown kind or a failing factory is a configuration error.
    pub fn build(
        requested: &[PluginSettings],
        table: &[(&str, PluginFactory)],
        context: &PluginContext,
    ) -> Result<Self, SessionError> {
        let mut registry = Self::new();
        for settings in requested {
            let factory = table
                .iter()
                .find(|(kind, _)| *kind == settings.kind)
                .map(|(_, factory)| *factory)
                .ok_or_else(|| {
                    SessionError::Configuration(format!(
                        "no plugin factory registered for '{}'",
                        settings.kind
                    ))
                })?;
            let plugin = factory(settings, context)?;
            tracing::info!(plugin = plugin.name(), kind = %settings.kind, "Plugin created");
            registry.register(plugin);
        }
        Ok(registry)
    }

    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(Arc::from(plugin));
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Fire-and-forget notification on a dedicated thread.
    pub fn batch_finished(&self, batch: BatchInfo) {
        if self.plugins.is_empty() {
            return;
        }
        let plugins = self.plugins.clone();
        let spawned = thread::Builder::new()
            .name("plugin-notify".into())
            .spawn(move || {
                for plugin in &plugins {
                    tracing::debug!(plugin = plugin.name(), batch = %batch.label, "Batch finished");
                    plugin.batch_finished(&batch);
                }
            });
        if let Err(e) = spawned {
            tracing::error!(error = %e, "Failed to spawn plugin notification thread");
        }
    }

    pub fn shutdown(&self) {
        for plugin in &self.plugins {
            plugin.shutdown();
        }
    }
}
