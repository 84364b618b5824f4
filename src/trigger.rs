use std::{
    cmp::Ordering,
    collections::HashMap,
    fmt,
    sync::{
        atomic::{self, AtomicU32},
        Arc,
    },
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    condition::Condition,
    try_parse::{parsed, TryParse},
    Error, Event, MetricsStore, Notifier, Result,
};

/// Name of the conversion event recorded whenever a trigger fires.
pub const TRIGGERED_ACTION_EVENT: &str = "ddnaEventTriggeredAction";

/// Kind of action a trigger resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionType {
    /// Parameters injected into the game.
    GameParameters,
    /// An image message to present to the player.
    ImageMessage,
}

impl ActionType {
    /// Name of the action type as reported in conversion events.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GameParameters => "gameParameters",
            Self::ImageMessage => "imageMessage",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A server-configured rule binding an event name and a condition to an action.
///
/// Triggers are immutable after construction apart from their evaluation counter, which allows
/// a trigger set to be shared between threads.
#[derive(Debug)]
pub struct Trigger {
    index: usize,
    event_name: String,
    condition: Condition,
    response: Map<String, Value>,
    campaign_id: i64,
    variant_id: i64,
    priority: i32,
    limit: Option<u32>,
    conditions: Vec<TriggerCondition>,
    evaluation_count: AtomicU32,
}

/// Trigger as sent by the server. Every field is allowed to be missing or malformed.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TriggerDefinition {
    #[serde(default)]
    event_name: Option<TryParse<String>>,
    #[serde(default)]
    condition: Option<TryParse<Condition>>,
    #[serde(default)]
    response: Option<TryParse<Map<String, Value>>>,
    #[serde(default, rename = "campaignID")]
    campaign_id: Option<TryParse<i64>>,
    #[serde(default, rename = "variantID")]
    variant_id: Option<TryParse<i64>>,
    #[serde(default)]
    priority: Option<TryParse<i32>>,
    #[serde(default)]
    limit: Option<TryParse<i64>>,
    #[serde(default)]
    campaign_execution_config: Option<TryParse<CampaignExecutionConfig>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CampaignExecutionConfig {
    #[serde(default)]
    show_conditions: Vec<TryParse<ShowCondition>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShowCondition {
    #[serde(default)]
    executions_required_count: Option<TryParse<Count>>,
    #[serde(default)]
    executions_repeat: Option<TryParse<Count>>,
    #[serde(default)]
    executions_repeat_limit: Option<TryParse<Count>>,
}

/// Counts are sent either as numbers or as numeric strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Count {
    Number(u64),
    String(String),
}

impl Count {
    fn value(field: Option<TryParse<Count>>) -> Option<u64> {
        match parsed(field)? {
            Count::Number(n) => Some(n),
            Count::String(s) => s.trim().parse().ok(),
        }
    }
}

impl ShowCondition {
    fn into_trigger_condition(self) -> Option<TriggerCondition> {
        if let Some(executions_required) = Count::value(self.executions_required_count) {
            return Some(TriggerCondition::ExecutionCount {
                executions_required,
            });
        }
        let interval = Count::value(self.executions_repeat)?;
        Some(TriggerCondition::ExecutionRepeat {
            interval,
            repeat_limit: Count::value(self.executions_repeat_limit).unwrap_or(0),
        })
    }
}

impl Trigger {
    /// Build a trigger from its server definition. `index` is the position of the trigger in the
    /// session configuration and breaks ties between triggers of equal priority.
    ///
    /// Missing or malformed attributes are replaced with defaults: an empty event name, an empty
    /// (always true) condition, an empty response, `-1` for ids, `0` for priority and no limit.
    pub fn from_json(index: usize, json: &Value) -> Self {
        let definition = TriggerDefinition::deserialize(json).unwrap_or_else(|err| {
            log::warn!(target: "ddna", index; "failed deserialising event trigger: {err}");
            TriggerDefinition::default()
        });

        let conditions = parsed(definition.campaign_execution_config)
            .map(|config| {
                config
                    .show_conditions
                    .into_iter()
                    .filter_map(|condition| {
                        let condition = Option::<ShowCondition>::from(condition)
                            .and_then(ShowCondition::into_trigger_condition);
                        if condition.is_none() {
                            log::warn!(target: "ddna", index; "ignoring unrecognized show condition");
                        }
                        condition
                    })
                    .collect()
            })
            .unwrap_or_default();

        Trigger {
            index,
            event_name: parsed(definition.event_name).unwrap_or_default(),
            condition: parsed(definition.condition).unwrap_or_default(),
            response: parsed(definition.response).unwrap_or_default(),
            campaign_id: parsed(definition.campaign_id).unwrap_or(-1),
            variant_id: parsed(definition.variant_id).unwrap_or(-1),
            priority: parsed(definition.priority).unwrap_or(0),
            limit: parsed(definition.limit).and_then(|limit| u32::try_from(limit).ok()),
            conditions,
            evaluation_count: AtomicU32::new(0),
        }
    }

    /// Position of the trigger within its session configuration.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Name of the event this trigger matches.
    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    /// The condition evaluated against event parameters.
    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    /// Raw response delivered when the trigger fires.
    pub fn response(&self) -> &Map<String, Value> {
        &self.response
    }

    /// Campaign the trigger originates from; `-1` if unknown.
    pub fn campaign_id(&self) -> i64 {
        self.campaign_id
    }

    /// Campaign variant; `-1` if unknown.
    pub fn variant_id(&self) -> i64 {
        self.variant_id
    }

    /// Higher priorities are evaluated first.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Maximum number of times the trigger may fire, if limited.
    pub fn limit(&self) -> Option<u32> {
        self.limit
    }

    /// Extra preconditions that all have to pass for the trigger to fire.
    pub fn conditions(&self) -> &[TriggerCondition] {
        &self.conditions
    }

    /// Number of times the trigger has fired.
    pub fn evaluation_count(&self) -> u32 {
        self.evaluation_count.load(atomic::Ordering::SeqCst)
    }

    /// Resolved action type: an image message if the response carries a non-empty `image`
    /// object, game parameters otherwise.
    pub fn action_type(&self) -> ActionType {
        match self.response.get("image") {
            Some(Value::Object(image)) if !image.is_empty() => ActionType::ImageMessage,
            _ => ActionType::GameParameters,
        }
    }

    /// Parameters of the response that have to survive restarts, if the response is flagged
    /// with `ddnaIsPersistent`.
    pub fn persistent_parameters(&self) -> Option<&Map<String, Value>> {
        let parameters = self.response.get("parameters")?.as_object()?;
        match parameters.get("ddnaIsPersistent") {
            Some(Value::Bool(true)) => Some(parameters),
            _ => None,
        }
    }

    /// Ordering used for evaluation: descending priority, then position in the configuration.
    pub fn priority_order(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then(self.index.cmp(&other.index))
    }

    /// Evaluate the trigger against `event`.
    ///
    /// On success the evaluation counter is incremented and a conversion event is passed to
    /// `notifier`. A failed evaluation has no side effects.
    pub fn evaluate(
        &self,
        event: &Event,
        metrics: &dyn MetricsStore,
        notifier: &dyn Notifier,
    ) -> bool {
        if event.name != self.event_name {
            return false;
        }

        if matches!(self.limit, Some(limit) if self.evaluation_count() >= limit) {
            log::trace!(target: "ddna",
                        campaign_id = self.campaign_id,
                        event_name:display = self.event_name;
                        "trigger reached its limit");
            return false;
        }

        if !self
            .conditions
            .iter()
            .all(|condition| condition.can_execute(self.campaign_id, metrics))
        {
            log::trace!(target: "ddna",
                        campaign_id = self.campaign_id,
                        event_name:display = self.event_name;
                        "trigger conditions not satisfied");
            return false;
        }

        if !self.condition.evaluate(&event.params) {
            return false;
        }

        // Concurrent runs may race past the limit check above; only count up to the limit.
        let limit = self.limit;
        let Ok(previous) = self.evaluation_count.fetch_update(
            atomic::Ordering::SeqCst,
            atomic::Ordering::SeqCst,
            |count| match limit {
                Some(limit) if count >= limit => None,
                _ => Some(count + 1),
            },
        ) else {
            return false;
        };
        let count = previous + 1;

        let action_type = self.action_type();
        log::debug!(target: "ddna",
                    campaign_id = self.campaign_id,
                    variant_id = self.variant_id,
                    event_name:display = self.event_name,
                    action_type:display = action_type;
                    "trigger fired");

        notifier.record_event(
            Event::new(TRIGGERED_ACTION_EVENT)
                .put_param("ddnaEventTriggeredCampaignID", self.campaign_id)
                .put_param("ddnaEventTriggeredCampaignPriority", self.priority)
                .put_param("ddnaEventTriggeredVariantID", self.variant_id)
                .put_param("ddnaEventTriggeredActionType", action_type.as_str())
                .put_param(
                    "ddnaEventTriggeredSessionCount",
                    i32::try_from(count).unwrap_or(i32::MAX),
                ),
        );

        true
    }
}

/// Additional precondition attached to a trigger, evaluated against campaign execution counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerCondition {
    /// Passes when the campaign has been executed exactly `executions_required` times.
    ExecutionCount {
        /// Required number of executions.
        executions_required: u64,
    },
    /// Passes on every `interval`-th execution, at most `repeat_limit` times (`0` for no limit).
    ExecutionRepeat {
        /// Number of executions between two passes.
        interval: u64,
        /// Maximum number of passes, `0` meaning unlimited.
        repeat_limit: u64,
    },
}

impl TriggerCondition {
    /// Check the condition against the current execution count of `campaign_id`.
    pub fn can_execute(&self, campaign_id: i64, metrics: &dyn MetricsStore) -> bool {
        let executions = metrics.execution_count(campaign_id);
        match *self {
            Self::ExecutionCount {
                executions_required,
            } => executions == executions_required,
            Self::ExecutionRepeat {
                interval,
                repeat_limit,
            } => {
                if interval == 0 {
                    return false;
                }
                executions % interval == 0
                    && (repeat_limit == 0
                        || repeat_limit.saturating_mul(interval) >= executions)
            }
        }
    }
}

/// The live set of triggers from one session configuration, bucketed by event name.
///
/// Each bucket is sorted once at construction by [`Trigger::priority_order`]; the set is never
/// modified afterwards and gets replaced as a whole on the next session configuration.
#[derive(Debug, Default)]
pub struct TriggerSet {
    by_event: HashMap<String, Vec<Arc<Trigger>>>,
}

impl TriggerSet {
    /// Create a set from triggers.
    pub fn new(triggers: impl IntoIterator<Item = Trigger>) -> Self {
        let mut by_event: HashMap<String, Vec<Arc<Trigger>>> = HashMap::new();
        for trigger in triggers {
            by_event
                .entry(trigger.event_name.clone())
                .or_default()
                .push(Arc::new(trigger));
        }
        for bucket in by_event.values_mut() {
            bucket.sort_by(|a, b| a.priority_order(b));
        }
        TriggerSet { by_event }
    }

    /// Parse the triggers out of a session configuration response (`parameters.triggers`).
    ///
    /// Returns `None` if the configuration carries no triggers, in which case the current set
    /// stays in effect. A configuration that is not an object, or whose `triggers` is not an
    /// array, is an error. Entries that are not objects are skipped.
    pub fn from_session_configuration(json: &Value) -> Result<Option<Self>> {
        let root = json.as_object().ok_or(Error::ConfigurationParseError)?;
        let Some(triggers) = root
            .get("parameters")
            .and_then(|parameters| parameters.get("triggers"))
        else {
            return Ok(None);
        };
        let triggers = triggers.as_array().ok_or(Error::ConfigurationParseError)?;

        Ok(Some(TriggerSet::new(
            triggers
                .iter()
                .enumerate()
                .filter_map(|(index, json)| {
                    if !json.is_object() {
                        log::warn!(target: "ddna", index; "failed deserialising event trigger: not an object");
                        return None;
                    }
                    Some(Trigger::from_json(index, json))
                }),
        )))
    }

    /// Triggers for `event_name`, in evaluation order.
    pub fn for_event(&self, event_name: &str) -> &[Arc<Trigger>] {
        self.by_event
            .get(event_name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// All triggers, grouped by event name.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Trigger>> {
        self.by_event.values().flatten()
    }

    /// Total number of triggers.
    pub fn len(&self) -> usize {
        self.by_event.values().map(Vec::len).sum()
    }

    /// Returns `true` if the set holds no triggers.
    pub fn is_empty(&self) -> bool {
        self.by_event.is_empty()
    }
}
