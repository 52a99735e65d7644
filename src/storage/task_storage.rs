use std::{
    collections::BTreeMap,
    io::{ErrorKind, SeekFrom},
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader},
};
use tracing::{debug, warn};

use crate::fs::operations::{ends_with_newline, last_line_start};

use super::entities::{NewTaskRow, TaskId, TaskRowEntity};

/// Persistence contract of the tracking engine.
#[cfg_attr(test, mockall::automock)]
#[async_trait(?Send)]
pub trait TaskStore {
    /// Creates the row of a session that has just started.
    async fn create_task_row(&self, row: &NewTaskRow) -> Result<TaskId>;

    /// Rewrites the accumulated time of a row. `end` is only set when the
    /// session stops.
    async fn update_task_row(
        &self,
        id: TaskId,
        end: Option<DateTime<Utc>>,
        accumulated_seconds: u64,
    ) -> Result<()>;

    /// Sum of the accumulated time over all rows with exactly this name.
    async fn total_accumulated_seconds(&self, task_name: &str) -> Result<u64>;

    /// Latest version of every row, ordered by id.
    async fn list_task_rows(&self) -> Result<Vec<TaskRowEntity>>;
}

const TASK_FILE: &str = "tasks.jsonl";

/// The main realization of [TaskStore].
///
/// Rows are appended as JSON lines. Rewriting the row on the last line
/// overwrites that line in place, which is the common case since the running
/// session is usually the newest row. Any other rewrite appends a new version
/// and readers keep the last version of every id.
pub struct JsonTaskStore {
    path: PathBuf,
}

impl JsonTaskStore {
    pub fn new(dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&dir)?;

        Ok(Self {
            path: dir.join(TASK_FILE),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open_for_write(&self) -> Result<File> {
        File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .await
            .with_context(|| format!("failed to open {}", self.path.display()))
    }

    async fn read_rows(&self) -> Result<Vec<TaskRowEntity>> {
        let mut file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e).context("failed to open task rows"),
        };
        file.lock_shared()?;
        let versions = read_versions(&mut file, &self.path).await;
        file.unlock_async().await?;
        Ok(collapse_versions(versions?))
    }

    async fn create_inner(file: &mut File, path: &Path, row: &NewTaskRow) -> Result<TaskId> {
        let versions = read_versions(file, path).await?;
        let id = versions
            .iter()
            .map(|version| version.id)
            .max()
            .map_or(TaskId(1), |TaskId(last)| TaskId(last + 1));

        let entity = TaskRowEntity {
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
        };
        append_line(file, &entity).await?;
        Ok(id)
    }

    async fn update_inner(
        file: &mut File,
        path: &Path,
        id: TaskId,
        end: Option<DateTime<Utc>>,
        accumulated_seconds: u64,
    ) -> Result<()> {
        let versions = read_versions(file, path).await?;
        let mut row = versions
            .into_iter()
            .rev()
            .find(|version| version.id == id)
            .ok_or_else(|| anyhow!("task row {id} doesn't exist"))?;
        row.accumulated_seconds = accumulated_seconds;
        if end.is_some() {
            row.end = end;
        }

        let start = last_line_start(file).await?;
        let mut last_line = String::new();
        file.read_to_string(&mut last_line).await?;
        let last_is_same_row = serde_json::from_str::<TaskRowEntity>(last_line.trim())
            .is_ok_and(|last| last.id == id);

        if last_is_same_row {
            file.seek(SeekFrom::Start(start)).await?;
            file.write_all(&encode_line(&row)?).await?;
            let end_of_row = file.stream_position().await?;
            file.set_len(end_of_row).await?;
            file.flush().await?;
            Ok(())
        } else {
            append_line(file, &row).await
        }
    }
}

fn encode_line(row: &TaskRowEntity) -> Result<Vec<u8>> {
    let mut buffer = serde_json::to_vec(row)?;
    buffer.push(b'\n');
    Ok(buffer)
}

async fn append_line(file: &mut File, row: &TaskRowEntity) -> Result<()> {
    let mut buffer = Vec::new();
    if !ends_with_newline(file).await? {
        // The previous write was cut short, keep its remains on their own line.
        buffer.push(b'\n');
    }
    buffer.extend(encode_line(row)?);
    file.seek(SeekFrom::End(0)).await?;
    file.write_all(&buffer).await?;
    file.flush().await?;
    Ok(())
}

/// Reads every row version in file order, skipping lines that don't parse.
async fn read_versions(file: &mut File, path: &Path) -> Result<Vec<TaskRowEntity>> {
    file.rewind().await?;
    let mut lines = BufReader::new(&mut *file).lines();
    let mut versions = vec![];
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<TaskRowEntity>(&line) {
            Ok(row) => versions.push(row),
            Err(e) => {
                // Might happen after a shutdown in the middle of a write.
                warn!("Skipping illegal task row in {path:?} {line}: {e}")
            }
        }
    }
    Ok(versions)
}

fn collapse_versions(versions: Vec<TaskRowEntity>) -> Vec<TaskRowEntity> {
    let mut rows = BTreeMap::new();
    for version in versions {
        rows.insert(version.id, version);
    }
    rows.into_values().collect()
}

#[async_trait(?Send)]
impl TaskStore for JsonTaskStore {
    async fn create_task_row(&self, row: &NewTaskRow) -> Result<TaskId> {
        let mut file = self.open_for_write().await?;
        file.lock_exclusive()?;
        let result = Self::create_inner(&mut file, &self.path, row).await;
        file.unlock_async().await?;
        debug!("Created task row {:?} for {}", result.as_ref().ok(), row.name);
        result
    }

    async fn update_task_row(
        &self,
        id: TaskId,
        end: Option<DateTime<Utc>>,
        accumulated_seconds: u64,
    ) -> Result<()> {
        let mut file = self.open_for_write().await?;
        file.lock_exclusive()?;
        let result = Self::update_inner(&mut file, &self.path, id, end, accumulated_seconds).await;
        file.unlock_async().await?;
        result
    }

    async fn total_accumulated_seconds(&self, task_name: &str) -> Result<u64> {
        Ok(self
            .read_rows()
            .await?
            .iter()
            .filter(|row| row.name == task_name)
            .fold(0u64, |total, row| total.saturating_add(row.accumulated_seconds)))
    }

    async fn list_task_rows(&self) -> Result<Vec<TaskRowEntity>> {
        self.read_rows().await
    }
}
