use std::{fmt, sync::Arc};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::{ActionStore, ActionType, PersistedAction, Trigger};

/// An image message delivered by a trigger.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMessage {
    /// Location of the sprite map, if the descriptor carries one.
    pub url: Option<String>,
    /// The image descriptor (layout, sprite map, shim).
    pub image: Map<String, Value>,
    /// Parameters delivered along with the message.
    pub parameters: Map<String, Value>,
    /// Parameters to attach to events recorded for interactions with the message.
    pub event_params: Map<String, Value>,
    /// Whether the image assets have been downloaded and the message can be shown.
    pub prepared: bool,
}

impl ImageMessage {
    /// Build an image message from a trigger response. Returns `None` if the response has no
    /// `image` object.
    pub fn from_response(response: &Map<String, Value>) -> Option<Self> {
        let image = response.get("image")?.as_object()?.clone();
        let object = |key: &str| {
            response
                .get(key)
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default()
        };

        Some(ImageMessage {
            url: image.get("url").and_then(Value::as_str).map(str::to_owned),
            parameters: object("parameters"),
            event_params: object("eventParams"),
            prepared: response.get("prepared").and_then(Value::as_bool) == Some(true),
            image,
        })
    }
}

type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Handler converting a fired trigger into a concrete action.
///
/// Each variant only handles triggers of its own [`ActionType`]. Handlers are registered on an
/// [`EventAction`](crate::EventAction) and run in registration order until one handles the
/// trigger.
#[derive(Clone)]
pub enum ActionHandler {
    /// Delivers game parameters.
    GameParameters(Callback<Map<String, Value>>),
    /// Delivers prepared image messages.
    ImageMessage(Callback<ImageMessage>),
}

impl ActionHandler {
    /// Create a handler delivering game parameters to `callback`.
    ///
    /// ```
    /// # use ddna::ActionHandler;
    /// let handler = ActionHandler::game_parameters(|parameters| {
    ///     println!("{:?}", parameters);
    /// });
    /// ```
    pub fn game_parameters(
        callback: impl Fn(Map<String, Value>) + Send + Sync + 'static,
    ) -> Self {
        Self::GameParameters(Arc::new(callback))
    }

    /// Create a handler delivering image messages to `callback`.
    pub fn image_message(callback: impl Fn(ImageMessage) + Send + Sync + 'static) -> Self {
        Self::ImageMessage(Arc::new(callback))
    }

    /// The action type this handler recognizes.
    pub fn action_type(&self) -> ActionType {
        match self {
            Self::GameParameters(_) => ActionType::GameParameters,
            Self::ImageMessage(_) => ActionType::ImageMessage,
        }
    }

    /// Returns `true` if both handlers deliver to the same callback.
    pub fn same_as(&self, other: &ActionHandler) -> bool {
        match (self, other) {
            (Self::GameParameters(a), Self::GameParameters(b)) => Arc::ptr_eq(a, b),
            (Self::ImageMessage(a), Self::ImageMessage(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Handle a fired trigger. Returns `true` if the action was delivered to the callback.
    ///
    /// A stored action for the trigger's campaign replaces the parameters of the live response
    /// and is removed from `store`. Image messages that are not prepared are not handled and do
    /// not touch the store.
    pub fn handle(&self, trigger: &Trigger, store: &dyn ActionStore) -> bool {
        if trigger.action_type() != self.action_type() {
            return false;
        }

        match self {
            Self::GameParameters(callback) => {
                let parameters = match take_persisted(trigger, store) {
                    Some(action) => action.parameters,
                    None => trigger
                        .response()
                        .get("parameters")
                        .and_then(Value::as_object)
                        .cloned()
                        .unwrap_or_default(),
                };
                callback(parameters);
                true
            }
            Self::ImageMessage(callback) => {
                let Some(mut message) = ImageMessage::from_response(trigger.response()) else {
                    return false;
                };
                if !message.prepared {
                    log::debug!(target: "ddna",
                                campaign_id = trigger.campaign_id();
                                "image message is not prepared");
                    return false;
                }
                if let Some(action) = take_persisted(trigger, store) {
                    message.parameters = action.parameters;
                }
                callback(message);
                true
            }
        }
    }
}

/// Store failures fall back to the live response.
fn take_persisted(trigger: &Trigger, store: &dyn ActionStore) -> Option<PersistedAction> {
    store
        .take(trigger)
        .inspect_err(|err| {
            log::warn!(target: "ddna",
                       campaign_id = trigger.campaign_id();
                       "failed to read persisted action: {err}");
        })
        .ok()
        .flatten()
}

impl fmt::Debug for ActionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ActionHandler")
            .field(&self.action_type())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::{json, Map, Value};

    use super::{ActionHandler, ImageMessage};
    use crate::{ActionStore, Error, InMemoryActionStore, PersistedAction, Result, Trigger};

    fn trigger(response: Value) -> Trigger {
        Trigger::from_json(
            0,
            &json!({"eventName": "a", "campaignID": 1, "response": response}),
        )
    }

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    fn game_parameters() -> (ActionHandler, Arc<Mutex<Vec<Map<String, Value>>>>) {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let handler = {
            let delivered = delivered.clone();
            ActionHandler::game_parameters(move |p| delivered.lock().unwrap().push(p))
        };
        (handler, delivered)
    }

    fn image_messages() -> (ActionHandler, Arc<Mutex<Vec<ImageMessage>>>) {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let handler = {
            let delivered = delivered.clone();
            ActionHandler::image_message(move |m| delivered.lock().unwrap().push(m))
        };
        (handler, delivered)
    }

    struct FailingStore;
    impl ActionStore for FailingStore {
        fn get(&self, _trigger: &Trigger) -> Result<Option<PersistedAction>> {
            Err(Error::StorePoisoned)
        }
        fn put(&self, _trigger: &Trigger, _parameters: Map<String, Value>) -> Result<()> {
            Err(Error::StorePoisoned)
        }
        fn remove(&self, _trigger: &Trigger) -> Result<()> {
            Err(Error::StorePoisoned)
        }
        fn clear(&self) -> Result<()> {
            Err(Error::StorePoisoned)
        }
    }

    #[test]
    fn game_parameters_handler_only_handles_game_parameters() {
        let store = InMemoryActionStore::new();
        let (handler, delivered) = game_parameters();

        assert!(!handler.handle(&trigger(json!({"image": {"a": 1}})), &store));
        assert!(delivered.lock().unwrap().is_empty());

        assert!(handler.handle(&trigger(json!({"parameters": {"a": 1}})), &store));
        assert!(handler.handle(&trigger(json!({})), &store));

        assert_eq!(
            *delivered.lock().unwrap(),
            vec![object(json!({"a": 1})), Map::new()]
        );
    }

    #[test]
    fn game_parameters_handler_uses_persisted_action_and_removes_it() {
        let store = InMemoryActionStore::new();
        let trigger = trigger(json!({"parameters": {"a": 1}}));
        store.put(&trigger, object(json!({"b": 2}))).unwrap();
        let (handler, delivered) = game_parameters();

        assert!(handler.handle(&trigger, &store));
        assert!(store.get(&trigger).unwrap().is_none());
        assert!(handler.handle(&trigger, &store));

        assert_eq!(
            *delivered.lock().unwrap(),
            vec![object(json!({"b": 2})), object(json!({"a": 1}))]
        );
    }

    #[test]
    fn store_failure_falls_back_to_live_response() {
        let (handler, delivered) = game_parameters();

        assert!(handler.handle(&trigger(json!({"parameters": {"a": 1}})), &FailingStore));
        assert_eq!(*delivered.lock().unwrap(), vec![object(json!({"a": 1}))]);
    }

    #[test]
    fn image_message_handler_only_handles_prepared_image_messages() {
        let store = InMemoryActionStore::new();
        let (handler, delivered) = image_messages();

        assert!(!handler.handle(&trigger(json!({"parameters": {"a": 1}})), &store));

        assert!(handler.handle(
            &trigger(json!({"image": {"url": "https://img"}, "prepared": true})),
            &store
        ));

        let unprepared = trigger(json!({"image": {"url": "https://img"}, "prepared": false}));
        store.put(&unprepared, object(json!({"b": 2}))).unwrap();
        assert!(!handler.handle(&unprepared, &store));
        assert!(store.get(&unprepared).unwrap().is_some());

        let delivered = delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].url.as_deref(), Some("https://img"));
        assert!(delivered[0].prepared);
    }

    #[test]
    fn image_message_handler_uses_persisted_action_and_removes_it() {
        let store = InMemoryActionStore::new();
        let trigger = trigger(json!({
            "image": {"url": "https://img"},
            "prepared": true,
            "parameters": {"a": 1},
            "eventParams": {"c": 3},
        }));
        store.put(&trigger, object(json!({"b": 2}))).unwrap();
        let (handler, delivered) = image_messages();

        assert!(handler.handle(&trigger, &store));
        assert!(store.get(&trigger).unwrap().is_none());

        let delivered = delivered.lock().unwrap();
        assert_eq!(delivered[0].parameters, object(json!({"b": 2})));
        assert_eq!(delivered[0].event_params, object(json!({"c": 3})));
        // the live response is left untouched
        assert_eq!(trigger.response()["parameters"], json!({"a": 1}));
    }

    #[test]
    fn handlers_compare_by_callback() {
        let (handler, _) = game_parameters();
        let (other, _) = game_parameters();

        assert!(handler.same_as(&handler.clone()));
        assert!(!handler.same_as(&other));
    }
}
