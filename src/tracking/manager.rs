use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use tokio::{sync::Mutex, task::JoinHandle, time::Instant};
use tracing::{debug, error, info, warn};

use crate::{
    storage::{
        entities::{NewTaskRow, TaskId},
        task_storage::TaskStore,
    },
    utils::clock::Clock,
};

use super::{
    events::{Subscribers, Subscription, TrackingEvent},
    grouping::{GroupKey, TaskIdentity},
    observers::{ActiveView, ObserverRegistry, RefreshScope},
    session::{SessionRecord, SessionSnapshot, StoppedSession, TrackingIntent},
    TrackingConfig,
};

/// Owner of the single active tracking session.
///
/// All state lives on one thread. Background work (the ticker and the periodic
/// flushes) is spawned with [tokio::task::spawn_local], so every method must be
/// called from within a [tokio::task::LocalSet]. Start and stop transitions
/// are serialized, a start issued while another transition is running waits
/// for it to finish.
#[derive(Clone)]
pub struct TrackingManager {
    inner: Rc<ManagerInner>,
}

struct ManagerInner {
    store: Rc<dyn TaskStore>,
    clock: Rc<dyn Clock>,
    config: TrackingConfig,
    observers: ObserverRegistry,
    subscribers: Rc<Subscribers>,
    session: RefCell<Option<ActiveSession>>,
    ticker: RefCell<Option<JoinHandle<()>>>,
    pending_flush: RefCell<Option<JoinHandle<()>>>,
    transition: Mutex<()>,
}

struct ActiveSession {
    record: SessionRecord,
    /// None when the row couldn't be created on start.
    row: Option<TaskId>,
    task_total_seconds: u64,
    stack_total_seconds: u64,
    /// Flush periods that have elapsed so far, flushed or skipped.
    flush_periods: u128,
    reported_seconds: u64,
}

/// What a single tick produced, taken out of the session before anything is
/// notified.
struct TickOutcome {
    view: ActiveView,
    delta_seconds: u64,
    project_id: Option<u64>,
    flush: Option<TaskId>,
    flush_due: bool,
}

impl ActiveSession {
    fn view(&self) -> ActiveView {
        ActiveView {
            group_key: self.record.group_key(),
            task_name: self.record.task_name().to_string(),
            elapsed_seconds: self.record.elapsed_seconds(),
            task_total_seconds: self.task_total_seconds,
            stack_total_seconds: self.stack_total_seconds,
        }
    }

    /// A flush is due whenever the elapsed time crosses a multiple of
    /// `flush_every_ticks` intervals, so ticks dropped while the thread was
    /// busy don't delay it.
    fn advance(&mut self, now: Instant, config: &TrackingConfig) -> TickOutcome {
        let elapsed = self.record.update_elapsed(now);
        let delta_seconds = elapsed.saturating_sub(self.reported_seconds);
        self.reported_seconds = elapsed;

        let period = config.tick_interval.as_millis() * u128::from(config.flush_every_ticks.max(1));
        let periods = now
            .saturating_duration_since(self.record.started_instant())
            .as_millis()
            / period.max(1);
        let flush_due = periods > self.flush_periods;
        self.flush_periods = periods;

        TickOutcome {
            view: self.view(),
            delta_seconds,
            project_id: self.record.context().project_id,
            flush: self.row,
            flush_due,
        }
    }
}

fn new_row(record: &SessionRecord) -> NewTaskRow {
    NewTaskRow {
        name: record.task_name().to_string(),
        context: record.context().clone(),
        start: record.started_at(),
    }
}

impl TrackingManager {
    pub fn new(store: Rc<dyn TaskStore>, clock: Rc<dyn Clock>, config: TrackingConfig) -> Self {
        Self {
            inner: Rc::new(ManagerInner {
                store,
                clock,
                config,
                observers: ObserverRegistry::new(),
                subscribers: Subscribers::new(),
                session: RefCell::new(None),
                ticker: RefCell::new(None),
                pending_flush: RefCell::new(None),
                transition: Mutex::new(()),
            }),
        }
    }

    /// Starts tracking `intent`, stopping (and persisting) the current session first.
    pub async fn start_tracking(&self, intent: TrackingIntent) -> Result<SessionSnapshot> {
        if intent.task_name.trim().is_empty() {
            bail!("Task name can't be empty");
        }

        let _transition = self.inner.transition.lock().await;
        if let Some(previous) = self.inner.stop_locked().await {
            debug!("Switching away from {}", previous.task_name);
        }
        self.inner.start_locked(intent).await
    }

    /// Stops the current session. Returns None when nothing was tracked.
    pub async fn stop_tracking(&self) -> Option<StoppedSession> {
        let _transition = self.inner.transition.lock().await;
        self.inner.stop_locked().await
    }

    pub fn current_tracking(&self) -> Option<SessionSnapshot> {
        let now = self.inner.clock.instant();
        self.inner.session.borrow().as_ref().map(|active| SessionSnapshot {
            elapsed_seconds: active.record.elapsed_at(now),
            ..active.record.snapshot()
        })
    }

    pub fn is_tracking(&self) -> bool {
        self.inner.session.borrow().is_some()
    }

    /// Whether exactly this task name is tracked.
    pub fn is_task_tracking(&self, task_name: &str) -> bool {
        self.inner
            .session
            .borrow()
            .as_ref()
            .is_some_and(|active| active.record.task_name() == task_name.trim())
    }

    /// Whether any session of the stack is tracked.
    pub fn is_stack_tracking(&self, key: &GroupKey) -> bool {
        self.inner
            .session
            .borrow()
            .as_ref()
            .is_some_and(|active| &active.record.group_key() == key)
    }

    pub fn observers(&self) -> &ObserverRegistry {
        &self.inner.observers
    }

    pub fn subscribe(&self, callback: impl Fn(&TrackingEvent) -> Result<()> + 'static) -> Subscription {
        self.inner.subscribers.subscribe(callback)
    }

    /// Drops the registrations tied to a task list that is being rebuilt.
    pub fn clear_task_scoped_registrations(&self) {
        self.inner.observers.clear_task_scoped();
    }
}

impl ManagerInner {
    async fn start_locked(self: &Rc<Self>, intent: TrackingIntent) -> Result<SessionSnapshot> {
        let record = SessionRecord::new(intent, self.clock.time(), self.clock.instant());
        let (task_total_seconds, stack_total_seconds) = self.persisted_totals(&record).await;

        let row = match self.store.create_task_row(&new_row(&record)).await {
            Ok(id) => Some(id),
            Err(e) => {
                error!(
                    "Failed to create a row for {}, will retry on stop: {e:?}",
                    record.task_name()
                );
                None
            }
        };

        let anchor = record.started_instant();
        let snapshot = record.snapshot();
        *self.session.borrow_mut() = Some(ActiveSession {
            record,
            row,
            task_total_seconds,
            stack_total_seconds,
            flush_periods: 0,
            reported_seconds: 0,
        });
        self.spawn_ticker(anchor);

        self.refresh(RefreshScope::Full);
        self.subscribers.emit(&TrackingEvent::Start(snapshot.clone()));
        self.subscribers.emit(&TrackingEvent::UpdateTaskList);
        info!("Started tracking {} ({})", snapshot.task_name, snapshot.group_key);

        Ok(snapshot)
    }

    async fn stop_locked(self: &Rc<Self>) -> Option<StoppedSession> {
        let (record, row) = {
            let session = self.session.borrow();
            let active = session.as_ref()?;
            (active.record.clone(), active.row)
        };

        self.cancel_ticker();
        let stopped_at = self.clock.time();
        let elapsed = record.elapsed_at(self.clock.instant());

        let pending = self.pending_flush.borrow_mut().take();
        if let Some(pending) = pending {
            if let Err(e) = pending.await {
                warn!("Periodic flush didn't finish: {e:?}");
            }
        }

        if elapsed > 0 {
            self.persist_final(&record, row, stopped_at, elapsed).await;
        } else {
            debug!("Nothing to persist for {}", record.task_name());
        }

        self.session.borrow_mut().take();
        self.refresh(RefreshScope::Full);

        let stopped = StoppedSession {
            task_name: record.task_name().to_string(),
            base_name: record.base_name().to_string(),
            context: record.context().clone(),
            started_at: record.started_at(),
            stopped_at,
            duration_seconds: elapsed,
        };
        self.subscribers.emit(&TrackingEvent::Stop(stopped.clone()));
        self.subscribers.emit(&TrackingEvent::UpdateTaskList);
        info!("Stopped tracking {} after {elapsed}s", stopped.task_name);

        Some(stopped)
    }

    /// Seconds stored for the task and for its stack. Read failures count as zero.
    async fn persisted_totals(&self, record: &SessionRecord) -> (u64, u64) {
        let task_total = self
            .store
            .total_accumulated_seconds(record.task_name())
            .await
            .unwrap_or_else(|e| {
                warn!("Failed to read the total of {}: {e:?}", record.task_name());
                0
            });

        let key = record.group_key();
        let stack_total = match self.store.list_task_rows().await {
            Ok(rows) => rows
                .iter()
                .filter(|row| row.group_key() == key)
                .fold(0u64, |total, row| total.saturating_add(row.accumulated_seconds)),
            Err(e) => {
                warn!("Failed to read the total of stack {key}: {e:?}");
                0
            }
        };

        (task_total, stack_total)
    }

    async fn persist_final(
        &self,
        record: &SessionRecord,
        row: Option<TaskId>,
        stopped_at: DateTime<Utc>,
        elapsed: u64,
    ) {
        let row = match row {
            Some(id) => Ok(id),
            None => self.store.create_task_row(&new_row(record)).await,
        };
        let result = match row {
            Ok(id) => self.store.update_task_row(id, Some(stopped_at), elapsed).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!("Failed to persist {}s of {}: {e:?}", elapsed, record.task_name());
        }
    }

    fn refresh(&self, scope: RefreshScope) {
        let view = self.session.borrow().as_ref().map(ActiveSession::view);
        self.observers.refresh(view.as_ref(), scope);
    }

    fn spawn_ticker(self: &Rc<Self>, anchor: Instant) {
        self.cancel_ticker();

        let manager = Rc::downgrade(self);
        let clock = self.clock.clone();
        let interval = self.config.tick_interval;
        let handle = tokio::task::spawn_local(async move {
            let mut next_tick = anchor;
            loop {
                next_tick += interval;
                clock.sleep_until(next_tick).await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                manager.tick();

                // Ticks missed while the thread was busy are dropped.
                let now = clock.instant();
                while next_tick + interval <= now {
                    next_tick += interval;
                }
            }
        });
        *self.ticker.borrow_mut() = Some(handle);
    }

    fn cancel_ticker(&self) {
        if let Some(ticker) = self.ticker.borrow_mut().take() {
            ticker.abort();
        }
    }

    fn tick(self: &Rc<Self>) {
        let now = self.clock.instant();
        let outcome = {
            let mut session = self.session.borrow_mut();
            match session.as_mut() {
                Some(active) => active.advance(now, &self.config),
                None => return,
            }
        };

        self.observers.refresh(Some(&outcome.view), RefreshScope::Live);

        let elapsed_seconds = outcome.view.elapsed_seconds;
        let delta_seconds = outcome.delta_seconds;
        self.subscribers
            .emit(&TrackingEvent::UpdateTaskListRealTime { elapsed_seconds });
        self.subscribers.emit(&TrackingEvent::UpdateTodayTime { delta_seconds });
        self.subscribers.emit(&TrackingEvent::UpdateWeeklyTime { delta_seconds });
        if let Some(project_id) = outcome.project_id {
            self.subscribers.emit(&TrackingEvent::UpdateProjectTime {
                project_id,
                delta_seconds,
            });
        }

        if outcome.flush_due {
            match outcome.flush {
                Some(row) => self.schedule_flush(row, elapsed_seconds),
                None => debug!("No stored row to flush into yet"),
            }
        }
    }

    fn schedule_flush(self: &Rc<Self>, row: TaskId, elapsed_seconds: u64) {
        let in_flight = self
            .pending_flush
            .borrow()
            .as_ref()
            .is_some_and(|flush| !flush.is_finished());
        if in_flight {
            debug!("Previous flush of row {row} is still running, skipping");
            return;
        }

        let store = self.store.clone();
        let manager: Weak<ManagerInner> = Rc::downgrade(self);
        let handle = tokio::task::spawn_local(async move {
            match store.update_task_row(row, None, elapsed_seconds).await {
                Ok(()) => {
                    debug!("Flushed {elapsed_seconds}s into row {row}");
                    if let Some(manager) = manager.upgrade() {
                        manager
                            .subscribers
                            .emit(&TrackingEvent::TaskDatabaseUpdated { elapsed_seconds });
                    }
                }
                Err(e) => error!("Failed to flush row {row}, will retry: {e:?}"),
            }
        });
        *self.pending_flush.borrow_mut() = Some(handle);
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.get_mut().take() {
            ticker.abort();
        }
    }
}
