use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tracking::{grouping::TaskIdentity, session::TaskContext};

#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize, Clone, Copy)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One tracked session as stored on disk. A row is written when the session
/// starts and rewritten as time accrues.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct TaskRowEntity {
    pub id: TaskId,
    pub name: String,
    #[serde(default)]
    pub project_id: Option<u64>,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub client_id: Option<u64>,
    #[serde(default)]
    pub client_name: String,
    pub accumulated_seconds: u64,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub start: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub end: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created: DateTime<Utc>,
}

impl TaskRowEntity {
    pub fn context(&self) -> TaskContext {
        TaskContext {
            project_id: self.project_id,
            project_name: self.project_name.clone(),
            client_id: self.client_id,
            client_name: self.client_name.clone(),
        }
    }
}

impl TaskIdentity for TaskRowEntity {
    fn task_name(&self) -> &str {
        &self.name
    }

    fn project_name(&self) -> &str {
        &self.project_name
    }

    fn client_name(&self) -> &str {
        &self.client_name
    }
}

/// Values the engine knows when a session starts.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTaskRow {
    pub name: String,
    pub context: TaskContext,
    pub start: DateTime<Utc>,
}
