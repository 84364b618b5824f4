use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    notifier::NoopNotifier, ActionHandler, ActionStore, Engine, InMemoryActionStore,
    InMemoryMetricsStore, MetricsStore, Notifier,
};

/// Evaluation settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Deliver at most one image message per run. Game parameters of every fired trigger are
    /// delivered either way.
    pub multiple_actions_for_event_trigger_enabled: bool,
}

/// Configuration for [`Engine`].
pub struct EngineConfig {
    pub(crate) settings: Settings,
    pub(crate) default_game_parameters_handler: Option<ActionHandler>,
    pub(crate) default_image_message_handler: Option<ActionHandler>,
    pub(crate) action_store: Arc<dyn ActionStore + Send + Sync>,
    pub(crate) metrics_store: Arc<dyn MetricsStore + Send + Sync>,
    pub(crate) notifier: Arc<dyn Notifier + Send + Sync>,
}

impl EngineConfig {
    /// Create a default configuration: in-memory stores, no notifier, no default handlers and
    /// no cap on image messages per run.
    ///
    /// ```
    /// # use ddna::EngineConfig;
    /// EngineConfig::new();
    /// ```
    pub fn new() -> Self {
        EngineConfig {
            settings: Settings::default(),
            default_game_parameters_handler: None,
            default_image_message_handler: None,
            action_store: Arc::new(InMemoryActionStore::new()),
            metrics_store: Arc::new(InMemoryMetricsStore::new()),
            notifier: Arc::new(NoopNotifier),
        }
    }

    /// Replace all settings.
    pub fn settings(&mut self, settings: Settings) -> &mut Self {
        self.settings = settings;
        self
    }

    /// Set [`Settings::multiple_actions_for_event_trigger_enabled`].
    pub fn multiple_actions(&mut self, enabled: bool) -> &mut Self {
        self.settings.multiple_actions_for_event_trigger_enabled = enabled;
        self
    }

    /// Game parameters callback appended to the handlers of every run.
    ///
    /// ```
    /// # use ddna::EngineConfig;
    /// let mut config = EngineConfig::new();
    /// config.default_game_parameters_handler(|parameters| {
    ///     println!("{:?}", parameters);
    /// });
    /// ```
    pub fn default_game_parameters_handler(
        &mut self,
        callback: impl Fn(serde_json::Map<String, serde_json::Value>) + Send + Sync + 'static,
    ) -> &mut Self {
        self.default_game_parameters_handler = Some(ActionHandler::game_parameters(callback));
        self
    }

    /// Image message callback appended to the handlers of every run.
    pub fn default_image_message_handler(
        &mut self,
        callback: impl Fn(crate::ImageMessage) + Send + Sync + 'static,
    ) -> &mut Self {
        self.default_image_message_handler = Some(ActionHandler::image_message(callback));
        self
    }

    /// Set the store for persistent actions. Use a
    /// [`FileActionStore`](crate::FileActionStore) for actions to survive restarts.
    pub fn action_store(&mut self, store: impl ActionStore + Send + Sync + 'static) -> &mut Self {
        self.action_store = Arc::new(store);
        self
    }

    /// Set the store for campaign execution counters.
    pub fn metrics_store(
        &mut self,
        store: impl MetricsStore + Send + Sync + 'static,
    ) -> &mut Self {
        self.metrics_store = Arc::new(store);
        self
    }

    /// Set the notifier receiving recorded events and conversion events.
    pub fn notifier(&mut self, notifier: impl Notifier + Send + Sync + 'static) -> &mut Self {
        self.notifier = Arc::new(notifier);
        self
    }

    /// Create a new [`Engine`] using this configuration.
    ///
    /// ```
    /// # use ddna::{Engine, EngineConfig};
    /// let engine: Engine = EngineConfig::new().to_engine();
    /// ```
    pub fn to_engine(self) -> Engine {
        Engine::new(self)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig::new()
    }
}

#[cfg(test)]
mod tests {
    use super::Settings;

    #[test]
    fn settings_deserialize_from_wire_names() {
        let settings: Settings =
            serde_json::from_str(r#"{"multipleActionsForEventTriggerEnabled": true}"#).unwrap();
        assert!(settings.multiple_actions_for_event_trigger_enabled);

        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, Settings::default());
    }
}
