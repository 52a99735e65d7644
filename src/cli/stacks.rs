use std::{collections::BTreeMap, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use crate::{
    storage::{
        entities::TaskRowEntity,
        task_storage::{JsonTaskStore, TaskStore},
    },
    tracking::{
        continuation::next_session_name,
        grouping::{GroupKey, TaskIdentity},
    },
    utils::time::format_seconds,
};

#[derive(Debug, Parser)]
pub struct NextCommand {
    #[arg(help = "Base name of the stack")]
    base_name: String,
    #[arg(long, default_value = "")]
    project: String,
    #[arg(long, default_value = "")]
    client: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackSummary {
    pub key: GroupKey,
    pub sessions: usize,
    pub total_seconds: u64,
}

/// Groups stored rows into stacks, ordered by key.
pub fn summarize_stacks(rows: &[TaskRowEntity]) -> Vec<StackSummary> {
    let mut stacks: BTreeMap<GroupKey, (usize, u64)> = BTreeMap::new();
    for row in rows {
        let entry = stacks.entry(row.group_key()).or_default();
        entry.0 += 1;
        entry.1 = entry.1.saturating_add(row.accumulated_seconds);
    }
    stacks
        .into_iter()
        .map(|(key, (sessions, total_seconds))| StackSummary {
            key,
            sessions,
            total_seconds,
        })
        .collect()
}

async fn read_history(dir: PathBuf) -> Result<Vec<TaskRowEntity>> {
    let store = JsonTaskStore::new(dir.clone())
        .with_context(|| format!("Failed to open the task store in {}", dir.display()))?;
    store.list_task_rows().await
}

pub async fn process_next_command(dir: PathBuf, command: NextCommand) -> Result<()> {
    let history = read_history(dir).await?;
    println!(
        "{}",
        next_session_name(&command.base_name, &command.project, &command.client, &history)
    );
    Ok(())
}

pub async fn process_stacks_command(dir: PathBuf) -> Result<()> {
    let history = read_history(dir).await?;
    let stacks = summarize_stacks(&history);
    if stacks.is_empty() {
        println!("Nothing was tracked yet");
        return Ok(());
    }

    let width = stacks
        .iter()
        .map(|stack| stack.key.to_string().len())
        .max()
        .unwrap_or_default();
    for stack in stacks {
        println!(
            "{:<width$}  {:>3} sessions  {}",
            stack.key.to_string(),
            stack.sessions,
            format_seconds(stack.total_seconds),
        );
    }
    Ok(())
}
