use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use super::grouping::{derive_base_name, GroupKey, TaskIdentity};

/// Project and client a session is tracked against. Names are what stacks
/// group by, identifiers are what the store references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskContext {
    pub project_id: Option<u64>,
    pub project_name: String,
    pub client_id: Option<u64>,
    pub client_name: String,
}

impl TaskContext {
    pub fn new(project_name: impl Into<String>, client_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            client_name: client_name.into(),
            ..Self::default()
        }
    }

    pub fn with_ids(self, project_id: Option<u64>, client_id: Option<u64>) -> Self {
        Self {
            project_id,
            client_id,
            ..self
        }
    }
}

/// Request to start tracking a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingIntent {
    pub task_name: String,
    pub context: TaskContext,
}

impl TrackingIntent {
    pub fn new(task_name: impl Into<String>, context: TaskContext) -> Self {
        Self {
            task_name: task_name.into(),
            context,
        }
    }
}

/// The session currently being tracked.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    task_name: String,
    base_name: String,
    context: TaskContext,
    started_at: DateTime<Utc>,
    started_instant: Instant,
    elapsed_seconds: u64,
}

impl SessionRecord {
    pub fn new(intent: TrackingIntent, started_at: DateTime<Utc>, started_instant: Instant) -> Self {
        let task_name = intent.task_name.trim().to_string();
        Self {
            base_name: derive_base_name(&task_name),
            task_name,
            context: intent.context,
            started_at,
            started_instant,
            elapsed_seconds: 0,
        }
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn context(&self) -> &TaskContext {
        &self.context
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn started_instant(&self) -> Instant {
        self.started_instant
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    /// Whole seconds between the start and `now`.
    pub fn elapsed_at(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.started_instant).as_secs()
    }

    /// Recomputes the cached elapsed time and returns it.
    pub fn update_elapsed(&mut self, now: Instant) -> u64 {
        self.elapsed_seconds = self.elapsed_at(now);
        self.elapsed_seconds
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            task_name: self.task_name.clone(),
            base_name: self.base_name.clone(),
            group_key: self.group_key(),
            context: self.context.clone(),
            started_at: self.started_at,
            elapsed_seconds: self.elapsed_seconds,
        }
    }
}

impl TaskIdentity for SessionRecord {
    fn task_name(&self) -> &str {
        &self.task_name
    }

    fn project_name(&self) -> &str {
        &self.context.project_name
    }

    fn client_name(&self) -> &str {
        &self.context.client_name
    }

    fn group_key(&self) -> GroupKey {
        GroupKey::new(
            self.base_name.clone(),
            self.context.project_name.clone(),
            self.context.client_name.clone(),
        )
    }
}

/// Copy of the active session handed out to callers and subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub task_name: String,
    pub base_name: String,
    #[serde(skip)]
    pub group_key: GroupKey,
    pub context: TaskContext,
    pub started_at: DateTime<Utc>,
    pub elapsed_seconds: u64,
}

/// Summary of a session that has just been stopped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedSession {
    pub task_name: String,
    pub base_name: String,
    pub context: TaskContext,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub duration_seconds: u64,
}
