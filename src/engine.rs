use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;

use crate::{action::RunContext, EngineConfig, Event, EventAction, Result, TriggerSet};

/// Event-trigger engine.
///
/// In order to create an engine instance, first create [`EngineConfig`].
///
/// The engine is `Sync`: sessions can be configured from one thread while events are recorded on
/// others. Runs already handed out keep evaluating the triggers they were created with.
///
/// # Examples
/// ```
/// # use ddna::{Engine, EngineConfig};
/// Engine::new(EngineConfig::new());
/// ```
pub struct Engine {
    triggers: RwLock<Arc<TriggerSet>>,
    context: Arc<RunContext>,
}

impl Engine {
    /// Create a new `Engine` using the specified configuration.
    pub fn new(config: EngineConfig) -> Self {
        let default_handlers = [
            config.default_game_parameters_handler,
            config.default_image_message_handler,
        ]
        .into_iter()
        .flatten()
        .collect();

        Engine {
            triggers: RwLock::new(Arc::new(TriggerSet::default())),
            context: Arc::new(RunContext {
                action_store: config.action_store,
                metrics_store: config.metrics_store,
                notifier: config.notifier,
                settings: config.settings,
                default_handlers,
            }),
        }
    }

    /// Apply a session configuration response, replacing the current triggers. A configuration
    /// without triggers keeps the current ones.
    ///
    /// Actions of triggers flagged with `ddnaIsPersistent` are saved to the action store so that
    /// they are delivered even if the host application restarts before the trigger fires.
    pub fn configure_session(&self, configuration: &Value) -> Result<()> {
        let set = TriggerSet::from_session_configuration(configuration).inspect_err(|err| {
            log::warn!(target: "ddna", "failed to parse session configuration: {err}");
        })?;
        let Some(set) = set else {
            log::debug!(target: "ddna", "session configuration has no triggers, keeping current ones");
            return Ok(());
        };

        for trigger in set.iter() {
            let Some(parameters) = trigger.persistent_parameters() else {
                continue;
            };
            if let Err(err) = self.context.action_store.put(trigger, parameters.clone()) {
                log::warn!(target: "ddna",
                           campaign_id = trigger.campaign_id();
                           "failed to persist action: {err}");
            }
        }

        self.replace_triggers(set);
        Ok(())
    }

    fn current_triggers(&self) -> Arc<TriggerSet> {
        // Writers only swap the pointer, so a poisoned lock still holds a complete set.
        self.triggers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace_triggers(&self, set: TriggerSet) {
        let set = Arc::new(set);
        let previous = std::mem::replace(
            &mut *self.triggers.write().unwrap_or_else(PoisonError::into_inner),
            set.clone(),
        );
        log::debug!(target: "ddna",
                    previous = previous.len(),
                    triggers = set.len();
                    "replaced triggers");
    }

    /// Record an event and return the actions it triggers.
    ///
    /// The event is passed to the notifier right away. Triggers are evaluated when the returned
    /// [`EventAction`] is run.
    pub fn record_event(&self, event: Event) -> EventAction {
        log::trace!(target: "ddna", event:serde; "recording event");
        self.context.notifier.record_event(event.clone());

        let triggers = self.current_triggers().for_event(&event.name).to_vec();

        for trigger in &triggers {
            if !trigger.condition().evaluate(&event.params) {
                continue;
            }
            if let Err(err) = self
                .context
                .metrics_store
                .record_execution(trigger.campaign_id())
            {
                log::warn!(target: "ddna",
                           campaign_id = trigger.campaign_id();
                           "failed to record campaign execution: {err}");
            }
        }

        EventAction::new(event, triggers, self.context.clone())
    }

    /// Remove persisted actions and campaign execution counters.
    pub fn clear_persistent_data(&self) -> Result<()> {
        self.context.action_store.clear()?;
        self.context.metrics_store.clear()?;
        Ok(())
    }

    /// Forget the user: clear persistent data and drop the current triggers, so that no further
    /// actions are delivered until a new session is configured.
    pub fn forget_me(&self) -> Result<()> {
        self.replace_triggers(TriggerSet::default());
        self.clear_persistent_data()
    }
}
