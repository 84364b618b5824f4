//! Client-side event triggers for deltaDNA: local evaluation of server-configured rules against
//! recorded events, producing game parameters and image messages.
//!
//! # Overview
//!
//! The crate revolves around an [`Engine`] holding the triggers of the current session. A session
//! configuration response is applied with [`Engine::configure_session`]; every [`Event`] recorded
//! with [`Engine::record_event`] then yields an [`EventAction`]. Registering [`ActionHandler`]s on
//! the action and calling [`EventAction::run`] evaluates the triggers bucketed under the event's
//! name, in descending priority, and delivers the actions of the triggers that fire.
//!
//! A trigger fires when its event name matches, its limit has not been reached, its execution
//! conditions pass, and its postfix [`Condition`] evaluates to `true` against the event
//! parameters. Every fired trigger produces a conversion event (named
//! [`TRIGGERED_ACTION_EVENT`]) that is passed to the configured [`Notifier`].
//!
//! Actions flagged as persistent by the server are saved to an [`ActionStore`] and delivered
//! exactly once, even across restarts when a [`FileActionStore`] is used.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum.
//!
//! Trigger evaluation never fails: malformed triggers and conditions simply do not fire, and
//! store failures fall back to the live trigger response. Errors are returned only when applying
//! a session configuration or managing persistent data.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging
//! messages under the `ddna` target. Consider integrating a `log`-compatible logger
//! implementation for better visibility into trigger evaluation.
//!
//! # Examples
//!
//! ```
//! # use ddna::{ActionHandler, EngineConfig, Event};
//! # use serde_json::json;
//! let engine = EngineConfig::new().to_engine();
//! engine.configure_session(&json!({"parameters": {"triggers": [{
//!     "eventName": "missionCompleted",
//!     "campaignID": 1,
//!     "condition": [{"p": "level"}, {"i": 5}, {"o": "greater than eq"}],
//!     "response": {"parameters": {"reward": 100}},
//! }]}}))?;
//!
//! engine
//!     .record_event(Event::new("missionCompleted").put_param("level", 7))
//!     .add(ActionHandler::game_parameters(|parameters| {
//!         assert_eq!(parameters["reward"], 100);
//!     }))
//!     .run();
//! # Ok::<(), ddna::Error>(())
//! ```
//!
//! A runnable demo lives in `demos/simple`.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

mod action;
mod action_store;
mod condition;
mod config;
mod engine;
mod error;
mod event;
mod handler;
mod metrics_store;
mod notifier;
mod trigger;
mod try_parse;

pub use action::{EventAction, RunOutcome};
pub use action_store::{ActionStore, FileActionStore, InMemoryActionStore, PersistedAction};
pub use condition::{Condition, Operator, Token, UnknownOperator};
pub use config::{EngineConfig, Settings};
pub use engine::Engine;
pub use error::{Error, Result};
pub use event::{format_timestamp, parse_timestamp, Event, ParamValue, Params};
pub use handler::{ActionHandler, ImageMessage};
pub use metrics_store::{InMemoryMetricsStore, MetricsStore};
pub use notifier::Notifier;
pub use trigger::{ActionType, Trigger, TriggerCondition, TriggerSet, TRIGGERED_ACTION_EVENT};
