//! Trigger-evaluation run for a recorded event.
use std::sync::Arc;

use crate::{
    notifier::NoopNotifier, ActionHandler, ActionStore, ActionType, Event, InMemoryActionStore,
    InMemoryMetricsStore, MetricsStore, Notifier, Settings, Trigger,
};

/// Collaborators shared by every run created by an engine.
#[derive(Clone)]
pub(crate) struct RunContext {
    pub(crate) action_store: Arc<dyn ActionStore + Send + Sync>,
    pub(crate) metrics_store: Arc<dyn MetricsStore + Send + Sync>,
    pub(crate) notifier: Arc<dyn Notifier + Send + Sync>,
    pub(crate) settings: Settings,
    pub(crate) default_handlers: Vec<ActionHandler>,
}

impl Default for RunContext {
    fn default() -> Self {
        RunContext {
            action_store: Arc::new(InMemoryActionStore::new()),
            metrics_store: Arc::new(InMemoryMetricsStore::new()),
            notifier: Arc::new(NoopNotifier),
            settings: Settings::default(),
            default_handlers: Vec::new(),
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    /// Number of triggers that fired.
    pub matched: usize,
    /// Action types delivered to a handler, in trigger order.
    pub handled: Vec<ActionType>,
}

/// Actions triggered by a recorded event.
///
/// Handlers are registered through [`EventAction::add`] and evaluated by [`EventAction::run`].
/// Evaluation happens locally and synchronously on the calling thread.
///
/// ```
/// # use ddna::{ActionHandler, EngineConfig, Event};
/// let engine = EngineConfig::new().to_engine();
/// engine
///     .record_event(Event::new("missionStarted").put_param("level", 3))
///     .add(ActionHandler::game_parameters(|parameters| {
///         println!("received {:?}", parameters);
///     }))
///     .add_evaluate_complete_handler(|event| println!("evaluated {}", event.name))
///     .run();
/// ```
pub struct EventAction {
    event: Event,
    triggers: Vec<Arc<Trigger>>,
    context: Arc<RunContext>,
    handlers: Vec<ActionHandler>,
    complete_handlers: Vec<Box<dyn FnOnce(&Event) + Send>>,
}

impl EventAction {
    pub(crate) fn new(event: Event, triggers: Vec<Arc<Trigger>>, context: Arc<RunContext>) -> Self {
        EventAction {
            event,
            triggers,
            context,
            handlers: Vec::new(),
            complete_handlers: Vec::new(),
        }
    }

    /// A run without triggers. Running it only invokes the completion handlers.
    pub fn empty(event: Event) -> Self {
        EventAction::new(event, Vec::new(), Arc::new(RunContext::default()))
    }

    /// The event this run evaluates.
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Register a handler. Handlers are tried in registration order; registering the same
    /// handler twice has no effect.
    pub fn add(mut self, handler: ActionHandler) -> Self {
        if !self.handlers.iter().any(|h| h.same_as(&handler)) {
            self.handlers.push(handler);
        }
        self
    }

    /// Register a callback invoked with the event once all triggers have been evaluated.
    pub fn add_evaluate_complete_handler(
        mut self,
        handler: impl FnOnce(&Event) + Send + 'static,
    ) -> Self {
        self.complete_handlers.push(Box::new(handler));
        self
    }

    /// Evaluate the triggers against the event and dispatch fired triggers to the handlers.
    pub fn run(self) -> RunOutcome {
        let EventAction {
            event,
            triggers,
            context,
            mut handlers,
            complete_handlers,
        } = self;

        handlers.extend(context.default_handlers.iter().cloned());

        let multiple_actions = context.settings.multiple_actions_for_event_trigger_enabled;
        let mut image_message_delivered = false;
        let mut outcome = RunOutcome::default();

        for trigger in &triggers {
            if !trigger.evaluate(&event, &*context.metrics_store, &*context.notifier) {
                continue;
            }
            outcome.matched += 1;

            let action_type = trigger.action_type();
            if multiple_actions && image_message_delivered && action_type == ActionType::ImageMessage
            {
                log::debug!(target: "ddna",
                            campaign_id = trigger.campaign_id();
                            "image message already delivered in this run");
                continue;
            }

            let handled = handlers
                .iter()
                .any(|handler| handler.handle(trigger, &*context.action_store));
            if handled {
                outcome.handled.push(action_type);
                if action_type == ActionType::ImageMessage {
                    image_message_delivered = true;
                }
            } else {
                log::debug!(target: "ddna",
                            campaign_id = trigger.campaign_id(),
                            action_type:display = action_type;
                            "no handler handled the triggered action");
            }
        }

        for handler in complete_handlers {
            handler(&event);
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::{json, Map, Value};

    use super::{EventAction, RunContext, RunOutcome};
    use crate::{
        ActionHandler, ActionStore, ActionType, Event, InMemoryActionStore, Settings, Trigger,
        TriggerSet,
    };

    type Delivered = Arc<Mutex<Vec<String>>>;

    fn context(multiple_actions: bool) -> Arc<RunContext> {
        Arc::new(RunContext {
            settings: Settings {
                multiple_actions_for_event_trigger_enabled: multiple_actions,
            },
            ..RunContext::default()
        })
    }

    fn triggers(definitions: Value) -> Vec<Arc<Trigger>> {
        let set = TriggerSet::from_session_configuration(
            &json!({"parameters": {"triggers": definitions}}),
        )
        .unwrap()
        .unwrap();
        set.for_event("a").to_vec()
    }

    fn recorder(label: &'static str, delivered: &Delivered) -> ActionHandler {
        let delivered = delivered.clone();
        ActionHandler::game_parameters(move |parameters| {
            delivered
                .lock()
                .unwrap()
                .push(format!("{label}:{}", Value::Object(parameters)));
        })
    }

    fn image_recorder(delivered: &Delivered) -> ActionHandler {
        let delivered = delivered.clone();
        ActionHandler::image_message(move |message| {
            delivered
                .lock()
                .unwrap()
                .push(format!("image:{}", Value::Object(message.parameters)));
        })
    }

    fn image(id: i64) -> Value {
        json!({
            "eventName": "a",
            "campaignID": id,
            "response": {"image": {"url": "https://img"}, "prepared": true, "parameters": {"id": id}},
        })
    }

    #[test]
    fn only_matching_trigger_is_handled() {
        let set = TriggerSet::from_session_configuration(&json!({
            "parameters": {"triggers": [
                {"eventName": "b", "priority": 5,
                 "condition": [{"p": "c"}, {"i": 1}, {"o": "equal to"}]},
                {"eventName": "a", "priority": 3,
                 "condition": [{"p": "d"}, {"i": 1}, {"o": "equal to"}]},
                {"eventName": "a", "priority": 3,
                 "condition": [{"p": "c"}, {"i": 2}, {"o": "equal to"}],
                 "response": {"parameters": {"e": 5}}},
            ]}
        }))
        .unwrap()
        .unwrap();
        let event = Event::new("a").put_param("c", 2);
        let delivered = Delivered::default();

        let outcome = EventAction::new(event, set.for_event("a").to_vec(), context(false))
            .add(recorder("gp", &delivered))
            .run();

        assert_eq!(
            outcome,
            RunOutcome {
                matched: 1,
                handled: vec![ActionType::GameParameters]
            }
        );
        assert_eq!(*delivered.lock().unwrap(), vec![r#"gp:{"e":5}"#]);
    }

    #[test]
    fn triggers_are_evaluated_in_priority_order() {
        let triggers = triggers(json!([
            {"eventName": "a", "priority": 1, "response": {"parameters": {"n": 1}}},
            {"eventName": "a", "priority": 3, "response": {"parameters": {"n": 3}}},
            {"eventName": "a", "priority": 2, "response": {"parameters": {"n": 2}}},
        ]));
        let delivered = Delivered::default();

        EventAction::new(Event::new("a"), triggers, context(false))
            .add(recorder("gp", &delivered))
            .run();

        assert_eq!(
            *delivered.lock().unwrap(),
            vec![r#"gp:{"n":3}"#, r#"gp:{"n":2}"#, r#"gp:{"n":1}"#]
        );
    }

    #[test]
    fn first_handler_to_handle_wins() {
        let triggers = triggers(json!([
            {"eventName": "a", "response": {"parameters": {"n": 1}}},
        ]));
        let delivered = Delivered::default();

        EventAction::new(Event::new("a"), triggers, context(false))
            .add(image_recorder(&delivered))
            .add(recorder("first", &delivered))
            .add(recorder("second", &delivered))
            .run();

        assert_eq!(*delivered.lock().unwrap(), vec![r#"first:{"n":1}"#]);
    }

    #[test]
    fn same_handler_is_registered_once() {
        let delivered = Delivered::default();
        let handler = recorder("gp", &delivered);

        let action = EventAction::new(Event::new("a"), triggers(json!([])), context(false))
            .add(handler.clone())
            .add(recorder("other", &delivered))
            .add(handler);

        assert_eq!(action.handlers.len(), 2);
    }

    #[test]
    fn default_handlers_run_after_registered_handlers() {
        let triggers = triggers(json!([
            {"eventName": "a", "priority": 2, "response": {"parameters": {"n": 1}}},
            image(2),
        ]));
        let delivered = Delivered::default();
        let context = Arc::new(RunContext {
            default_handlers: vec![recorder("default", &delivered), image_recorder(&delivered)],
            ..RunContext::default()
        });

        EventAction::new(Event::new("a"), triggers, context)
            .add(recorder("registered", &delivered))
            .run();

        assert_eq!(
            *delivered.lock().unwrap(),
            vec![r#"registered:{"n":1}"#, r#"image:{"id":2}"#]
        );
    }

    #[test]
    fn single_action_policy_delivers_every_image_message() {
        let delivered = Delivered::default();

        let outcome = EventAction::new(
            Event::new("a"),
            triggers(json!([image(1), image(2)])),
            context(false),
        )
        .add(image_recorder(&delivered))
        .run();

        assert_eq!(outcome.matched, 2);
        assert_eq!(delivered.lock().unwrap().len(), 2);
    }

    #[test]
    fn multiple_actions_deliver_image_message_once_per_run() {
        let triggers = triggers(json!([
            image(1),
            {"eventName": "a", "response": {"parameters": {"n": 1}}},
            image(2),
            {"eventName": "a", "response": {"parameters": {"n": 2}}},
        ]));
        let delivered = Delivered::default();

        let outcome = EventAction::new(Event::new("a"), triggers.clone(), context(true))
            .add(image_recorder(&delivered))
            .add(recorder("gp", &delivered))
            .run();

        assert_eq!(outcome.matched, 4);
        assert_eq!(
            outcome.handled,
            vec![
                ActionType::ImageMessage,
                ActionType::GameParameters,
                ActionType::GameParameters
            ]
        );
        assert_eq!(
            *delivered.lock().unwrap(),
            vec![r#"image:{"id":1}"#, r#"gp:{"n":1}"#, r#"gp:{"n":2}"#]
        );

        // a new run gets its own image message
        delivered.lock().unwrap().clear();
        EventAction::new(Event::new("a"), triggers, context(true))
            .add(image_recorder(&delivered))
            .run();
        assert_eq!(*delivered.lock().unwrap(), vec![r#"image:{"id":1}"#]);
    }

    #[test]
    fn unprepared_image_message_does_not_block_the_next_one() {
        let mut unprepared = image(1);
        unprepared["response"]["prepared"] = json!(false);
        let triggers = triggers(json!([unprepared, image(2)]));
        let delivered = Delivered::default();

        EventAction::new(Event::new("a"), triggers, context(true))
            .add(image_recorder(&delivered))
            .run();

        assert_eq!(*delivered.lock().unwrap(), vec![r#"image:{"id":2}"#]);
    }

    #[test]
    fn run_consumes_persisted_action() {
        let triggers = triggers(json!([
            {"eventName": "a", "campaignID": 7, "response": {"parameters": {"live": true}}},
        ]));
        let store = Arc::new(InMemoryActionStore::new());
        let mut persisted = Map::new();
        persisted.insert("stored".to_owned(), json!(true));
        store.put(&triggers[0], persisted).unwrap();
        let context = Arc::new(RunContext {
            action_store: store.clone(),
            ..RunContext::default()
        });
        let delivered = Delivered::default();

        for _ in 0..2 {
            EventAction::new(Event::new("a"), triggers.clone(), context.clone())
                .add(recorder("gp", &delivered))
                .run();
        }

        assert_eq!(
            *delivered.lock().unwrap(),
            vec![r#"gp:{"stored":true}"#, r#"gp:{"live":true}"#]
        );
        assert!(store.get(&triggers[0]).unwrap().is_none());
    }

    #[test]
    fn completion_handlers_are_called_once_with_the_event() {
        let completed = Arc::new(Mutex::new(Vec::new()));
        let record = |label: &'static str| {
            let completed = completed.clone();
            move |event: &Event| completed.lock().unwrap().push((label, event.name.clone()))
        };

        let outcome = EventAction::new(
            Event::new("a"),
            triggers(json!([{"eventName": "a", "condition": [{"b": false}]}])),
            context(false),
        )
        .add_evaluate_complete_handler(record("first"))
        .add_evaluate_complete_handler(record("second"))
        .run();

        assert_eq!(outcome, RunOutcome::default());
        assert_eq!(
            *completed.lock().unwrap(),
            vec![("first", "a".to_owned()), ("second", "a".to_owned())]
        );
    }

    #[test]
    fn empty_action_only_completes() {
        let completed = Arc::new(Mutex::new(0));
        let delivered = Delivered::default();

        let outcome = {
            let completed = completed.clone();
            EventAction::empty(Event::new("a"))
                .add(recorder("gp", &delivered))
                .add_evaluate_complete_handler(move |_| *completed.lock().unwrap() += 1)
                .run()
        };

        assert_eq!(outcome, RunOutcome::default());
        assert_eq!(*completed.lock().unwrap(), 1);
        assert!(delivered.lock().unwrap().is_empty());
    }
}
