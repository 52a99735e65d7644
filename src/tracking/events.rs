use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
};

use anyhow::Result;
use serde::Serialize;
use tracing::{trace, warn};

use super::session::{SessionSnapshot, StoppedSession};

/// Lifecycle events delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum TrackingEvent {
    Start(SessionSnapshot),
    Stop(StoppedSession),
    UpdateTaskList,
    #[serde(rename_all = "camelCase")]
    UpdateTaskListRealTime { elapsed_seconds: u64 },
    #[serde(rename_all = "camelCase")]
    TaskDatabaseUpdated { elapsed_seconds: u64 },
    #[serde(rename_all = "camelCase")]
    UpdateTodayTime { delta_seconds: u64 },
    #[serde(rename_all = "camelCase")]
    UpdateWeeklyTime { delta_seconds: u64 },
    #[serde(rename_all = "camelCase")]
    UpdateProjectTime { project_id: u64, delta_seconds: u64 },
}

impl TrackingEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TrackingEvent::Start(_) => "start",
            TrackingEvent::Stop(_) => "stop",
            TrackingEvent::UpdateTaskList => "updateTaskList",
            TrackingEvent::UpdateTaskListRealTime { .. } => "updateTaskListRealTime",
            TrackingEvent::TaskDatabaseUpdated { .. } => "taskDatabaseUpdated",
            TrackingEvent::UpdateTodayTime { .. } => "updateTodayTime",
            TrackingEvent::UpdateWeeklyTime { .. } => "updateWeeklyTime",
            TrackingEvent::UpdateProjectTime { .. } => "updateProjectTime",
        }
    }
}

type Callback = Rc<dyn Fn(&TrackingEvent) -> Result<()>>;

/// List of generic event subscribers.
#[derive(Default)]
pub struct Subscribers {
    next_id: Cell<u64>,
    entries: RefCell<Vec<(u64, Callback)>>,
}

impl Subscribers {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn subscribe(
        self: &Rc<Self>,
        callback: impl Fn(&TrackingEvent) -> Result<()> + 'static,
    ) -> Subscription {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.entries.borrow_mut().push((id, Rc::new(callback)));
        Subscription {
            id,
            subscribers: Rc::downgrade(self),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    fn remove(&self, id: u64) -> bool {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// Delivers the event to every subscriber registered at the time of the
    /// call. Failing subscribers are logged and skipped.
    pub fn emit(&self, event: &TrackingEvent) {
        let callbacks: Vec<Callback> = self
            .entries
            .borrow()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        trace!(event = event.name(), subscribers = callbacks.len(), "Emitting");
        for callback in callbacks {
            if let Err(e) = callback(event) {
                warn!("Subscriber failed to handle {}: {e:?}", event.name());
            }
        }
    }
}

/// Handle returned by [Subscribers::subscribe]. Dropping it keeps the
/// subscription alive; call [Subscription::unsubscribe] to remove it.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    id: u64,
    subscribers: Weak<Subscribers>,
}

impl Subscription {
    /// Removes the subscriber. Returns false if it was already gone.
    pub fn unsubscribe(self) -> bool {
        self.subscribers
            .upgrade()
            .is_some_and(|subscribers| subscribers.remove(self.id))
    }
}
