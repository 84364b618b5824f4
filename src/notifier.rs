use crate::Event;

/// Sink for events produced by the SDK, such as the conversion events emitted when a trigger
/// fires.
///
/// Implemented for any `Fn(Event)`, so a closure can be passed directly:
///
/// ```
/// # use ddna::{EngineConfig, Event};
/// let mut config = EngineConfig::new();
/// config.notifier(|event: Event| println!("{}", event.name));
/// ```
pub trait Notifier {
    /// Record `event` into the event pipeline.
    fn record_event(&self, event: Event);
}

pub(crate) struct NoopNotifier;
impl Notifier for NoopNotifier {
    fn record_event(&self, _event: Event) {}
}

impl<T: Fn(Event)> Notifier for T {
    fn record_event(&self, event: Event) {
        self(event);
    }
}
