//! Handles and stores used by the engine tests.

use std::{
    cell::{Cell, RefCell},
    future::Future,
    rc::Rc,
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::storage::{
    entities::{NewTaskRow, TaskId, TaskRowEntity},
    task_storage::TaskStore,
};

use super::{
    events::{Subscription, TrackingEvent},
    observers::{TextDisplay, Toggleable, Visible},
    TrackingManager,
};

pub fn test_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2018, 7, 4, 0, 0, 0).unwrap()
}

/// The engine spawns local tasks, so tests run inside a `LocalSet`.
pub async fn run_local<F: Future>(future: F) -> F::Output {
    tokio::task::LocalSet::new().run_until(future).await
}

#[derive(Default)]
pub struct RecordingLabel {
    text: RefCell<String>,
    visible: Cell<Option<bool>>,
    writes: Cell<usize>,
    disposed: bool,
}

impl RecordingLabel {
    pub fn with_text(text: &str) -> Rc<Self> {
        Rc::new(Self {
            text: RefCell::new(text.into()),
            ..Self::default()
        })
    }

    /// A label whose widget is gone, every call fails.
    pub fn disposed() -> Rc<Self> {
        Rc::new(Self {
            disposed: true,
            ..Self::default()
        })
    }

    pub fn current(&self) -> String {
        self.text.borrow().clone()
    }

    pub fn visible(&self) -> Option<bool> {
        self.visible.get()
    }

    pub fn writes(&self) -> usize {
        self.writes.get()
    }

    /// Simulates the user editing an input.
    pub fn type_text(&self, text: &str) {
        *self.text.borrow_mut() = text.into();
    }

    fn check(&self) -> Result<()> {
        if self.disposed {
            Err(anyhow!("label was disposed"))
        } else {
            Ok(())
        }
    }
}

impl TextDisplay for RecordingLabel {
    fn text(&self) -> Result<String> {
        self.check()?;
        Ok(self.current())
    }

    fn set_text(&self, text: &str) -> Result<()> {
        self.check()?;
        *self.text.borrow_mut() = text.into();
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }
}

impl Visible for RecordingLabel {
    fn set_visible(&self, visible: bool) -> Result<()> {
        self.check()?;
        self.visible.set(Some(visible));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingToggle {
    active: Cell<Option<bool>>,
}

impl RecordingToggle {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn active(&self) -> Option<bool> {
        self.active.get()
    }
}

impl Toggleable for RecordingToggle {
    fn set_active(&self, active: bool) -> Result<()> {
        self.active.set(Some(active));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Create { id: TaskId, name: String },
    Update { id: TaskId, ended: bool, seconds: u64 },
}

/// In-memory store that records completed calls in completion order. Writes
/// can be given a latency to leave them in flight for a while.
#[derive(Default)]
pub struct RecordingStore {
    rows: RefCell<Vec<TaskRowEntity>>,
    calls: RefCell<Vec<StoreCall>>,
    latency: Duration,
}

impl RecordingStore {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn with_latency(latency: Duration) -> Rc<Self> {
        Rc::new(Self {
            latency,
            ..Self::default()
        })
    }

    pub fn with_rows(rows: Vec<TaskRowEntity>) -> Rc<Self> {
        Rc::new(Self {
            rows: RefCell::new(rows),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.borrow().clone()
    }

    pub fn updates(&self) -> Vec<StoreCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, StoreCall::Update { .. }))
            .collect()
    }

    pub fn creates(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, StoreCall::Create { .. }))
            .count()
    }

    async fn wait(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait(?Send)]
impl TaskStore for RecordingStore {
    async fn create_task_row(&self, row: &NewTaskRow) -> Result<TaskId> {
        self.wait().await;
        let id = TaskId(self.rows.borrow().len() as u64 + 1);
        self.rows.borrow_mut().push(TaskRowEntity {
            id,
            name: row.name.clone(),
            project_id: row.context.project_id,
            project_name: row.context.project_name.clone(),
            client_id: row.context.client_id,
            client_name: row.context.client_name.clone(),
            accumulated_seconds: 0,
            start: row.start,
            end: None,
            created: row.start,
        });
        self.calls.borrow_mut().push(StoreCall::Create {
            id,
            name: row.name.clone(),
        });
        Ok(id)
    }

    async fn update_task_row(
        &self,
        id: TaskId,
        end: Option<DateTime<Utc>>,
        accumulated_seconds: u64,
    ) -> Result<()> {
        self.wait().await;
        let mut rows = self.rows.borrow_mut();
        let row = rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or_else(|| anyhow!("task row {id} doesn't exist"))?;
        row.accumulated_seconds = accumulated_seconds;
        if end.is_some() {
            row.end = end;
        }
        self.calls.borrow_mut().push(StoreCall::Update {
            id,
            ended: end.is_some(),
            seconds: accumulated_seconds,
        });
        Ok(())
    }

    async fn total_accumulated_seconds(&self, task_name: &str) -> Result<u64> {
        Ok(self
            .rows
            .borrow()
            .iter()
            .filter(|row| row.name == task_name)
            .map(|row| row.accumulated_seconds)
            .sum())
    }

    async fn list_task_rows(&self) -> Result<Vec<TaskRowEntity>> {
        Ok(self.rows.borrow().clone())
    }
}

pub fn history_row(id: u64, name: &str, project: &str, client: &str, seconds: u64) -> TaskRowEntity {
    TaskRowEntity {
        id: TaskId(id),
        name: name.into(),
        project_id: None,
        project_name: project.into(),
        client_id: None,
        client_name: client.into(),
        accumulated_seconds: seconds,
        start: test_start(),
        end: Some(test_start()),
        created: test_start(),
    }
}

pub type EventLog = Rc<RefCell<Vec<TrackingEvent>>>;

pub fn record_events(manager: &TrackingManager) -> (EventLog, Subscription) {
    let log = EventLog::default();
    let sink = log.clone();
    let subscription = manager.subscribe(move |event| {
        sink.borrow_mut().push(event.clone());
        Ok(())
    });
    (log, subscription)
}

pub fn event_names(log: &EventLog) -> Vec<&'static str> {
    log.borrow().iter().map(TrackingEvent::name).collect()
}
