//! Persistence for actions that have to survive process restarts.
//!
//! When a session configuration delivers a trigger whose parameters are flagged with
//! `ddnaIsPersistent`, the parameters are stored keyed by campaign. The next time the trigger
//! fires its handler consumes the stored parameters instead of the live response, exactly once.
use std::{
    collections::HashMap,
    fs,
    io::ErrorKind,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result, Trigger};

/// A stored action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedAction {
    /// Campaign the action belongs to.
    pub campaign_id: i64,
    /// Event name of the trigger that stored the action.
    pub event_name: String,
    /// Parameters to deliver instead of the live trigger response.
    pub parameters: Map<String, Value>,
    /// When the action was stored.
    pub inserted_at: DateTime<Utc>,
}

impl PersistedAction {
    fn new(trigger: &Trigger, parameters: Map<String, Value>) -> Self {
        PersistedAction {
            campaign_id: trigger.campaign_id(),
            event_name: trigger.event_name().to_owned(),
            parameters,
            inserted_at: Utc::now(),
        }
    }
}

/// Key-value persistence from campaign id to a stored action.
///
/// Implementations must make [`ActionStore::take`] atomic per campaign so that a stored action
/// is delivered at most once even when several evaluations run concurrently.
pub trait ActionStore {
    /// Stored action for the trigger's campaign, if any.
    fn get(&self, trigger: &Trigger) -> Result<Option<PersistedAction>>;

    /// Store `parameters` for the trigger's campaign, replacing any previous action.
    fn put(&self, trigger: &Trigger, parameters: Map<String, Value>) -> Result<()>;

    /// Remove the stored action for the trigger's campaign.
    fn remove(&self, trigger: &Trigger) -> Result<()>;

    /// Remove all stored actions.
    fn clear(&self) -> Result<()>;

    /// Get and remove the stored action for the trigger's campaign.
    fn take(&self, trigger: &Trigger) -> Result<Option<PersistedAction>> {
        let action = self.get(trigger)?;
        if action.is_some() {
            self.remove(trigger)?;
        }
        Ok(action)
    }
}

impl<T: ActionStore + ?Sized> ActionStore for Arc<T> {
    fn get(&self, trigger: &Trigger) -> Result<Option<PersistedAction>> {
        (**self).get(trigger)
    }

    fn put(&self, trigger: &Trigger, parameters: Map<String, Value>) -> Result<()> {
        (**self).put(trigger, parameters)
    }

    fn remove(&self, trigger: &Trigger) -> Result<()> {
        (**self).remove(trigger)
    }

    fn clear(&self) -> Result<()> {
        (**self).clear()
    }

    fn take(&self, trigger: &Trigger) -> Result<Option<PersistedAction>> {
        (**self).take(trigger)
    }
}

/// [`ActionStore`] that keeps actions in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct InMemoryActionStore {
    actions: Mutex<HashMap<i64, PersistedAction>>,
}

impl InMemoryActionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        InMemoryActionStore::default()
    }
}

impl ActionStore for InMemoryActionStore {
    fn get(&self, trigger: &Trigger) -> Result<Option<PersistedAction>> {
        let actions = self.actions.lock().map_err(|_| Error::StorePoisoned)?;
        Ok(actions.get(&trigger.campaign_id()).cloned())
    }

    fn put(&self, trigger: &Trigger, parameters: Map<String, Value>) -> Result<()> {
        log::trace!(target: "ddna", campaign_id = trigger.campaign_id(); "adding persisted action");
        let action = PersistedAction::new(trigger, parameters);
        let mut actions = self.actions.lock().map_err(|_| Error::StorePoisoned)?;
        actions.insert(action.campaign_id, action);
        Ok(())
    }

    fn remove(&self, trigger: &Trigger) -> Result<()> {
        log::trace!(target: "ddna", campaign_id = trigger.campaign_id(); "removing persisted action");
        let mut actions = self.actions.lock().map_err(|_| Error::StorePoisoned)?;
        actions.remove(&trigger.campaign_id());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        log::trace!(target: "ddna", "clearing persisted actions");
        self.actions
            .lock()
            .map_err(|_| Error::StorePoisoned)?
            .clear();
        Ok(())
    }

    fn take(&self, trigger: &Trigger) -> Result<Option<PersistedAction>> {
        let mut actions = self.actions.lock().map_err(|_| Error::StorePoisoned)?;
        Ok(actions.remove(&trigger.campaign_id()))
    }
}

/// [`ActionStore`] backed by a JSON file, so actions survive restarts of the host application.
///
/// The whole file is rewritten on every change; the number of persistent campaigns is small.
#[derive(Debug)]
pub struct FileActionStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileActionStore {
    /// Create a store persisting to `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileActionStore {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn read(&self) -> Result<Vec<PersistedAction>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, actions: &[PersistedAction]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Write to a sibling file first so a crash never leaves a truncated store behind.
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec(actions)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update<T>(&self, f: impl FnOnce(&mut Vec<PersistedAction>) -> T) -> Result<T> {
        let _guard = self.lock.lock().map_err(|_| Error::StorePoisoned)?;
        let mut actions = self.read()?;
        let result = f(&mut actions);
        self.write(&actions)?;
        Ok(result)
    }
}

impl ActionStore for FileActionStore {
    fn get(&self, trigger: &Trigger) -> Result<Option<PersistedAction>> {
        let _guard = self.lock.lock().map_err(|_| Error::StorePoisoned)?;
        Ok(self
            .read()?
            .into_iter()
            .find(|action| action.campaign_id == trigger.campaign_id()))
    }

    fn put(&self, trigger: &Trigger, parameters: Map<String, Value>) -> Result<()> {
        log::trace!(target: "ddna", campaign_id = trigger.campaign_id(); "adding persisted action");
        let action = PersistedAction::new(trigger, parameters);
        self.update(|actions| {
            actions.retain(|a| a.campaign_id != action.campaign_id);
            actions.push(action);
        })
    }

    fn remove(&self, trigger: &Trigger) -> Result<()> {
        log::trace!(target: "ddna", campaign_id = trigger.campaign_id(); "removing persisted action");
        self.update(|actions| actions.retain(|a| a.campaign_id != trigger.campaign_id()))
    }

    fn clear(&self) -> Result<()> {
        log::trace!(target: "ddna", "clearing persisted actions");
        self.update(Vec::clear)
    }

    fn take(&self, trigger: &Trigger) -> Result<Option<PersistedAction>> {
        let _guard = self.lock.lock().map_err(|_| Error::StorePoisoned)?;
        let mut actions = self.read()?;
        let Some(position) = actions
            .iter()
            .position(|a| a.campaign_id == trigger.campaign_id())
        else {
            return Ok(None);
        };
        let action = actions.remove(position);
        self.write(&actions)?;
        Ok(Some(action))
    }
}
