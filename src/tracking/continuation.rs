//! Continuing a stack of sessions.
//!
//! Sessions with the same base name, project and client form a stack
//! ("Review (1)", "Review (2)", ...). Continuing a stack starts a new session
//! named after the highest counter found in the history.

use anyhow::Result;
use tracing::debug;

use super::{
    grouping::{session_number, GroupKey, TaskIdentity},
    session::{SessionSnapshot, StoppedSession, TaskContext, TrackingIntent},
    TrackingManager,
};

/// Name of the next session of the `base_name` stack, "Base (n+1)" where n is
/// the highest counter among `existing` tasks of that stack. The counter
/// saturates at `u64::MAX`.
pub fn next_session_name<'a, T>(
    base_name: &str,
    project_name: &str,
    client_name: &str,
    existing: impl IntoIterator<Item = &'a T>,
) -> String
where
    T: TaskIdentity + 'a,
{
    let key = GroupKey::new(base_name.trim(), project_name, client_name);
    let highest = existing
        .into_iter()
        .filter(|task| task.group_key() == key)
        .map(|task| session_number(task.task_name()))
        .max()
        .unwrap_or(0);
    format!("{} ({})", key.base_name(), highest.saturating_add(1))
}

#[derive(Debug, Clone, PartialEq)]
pub enum StackToggle {
    Started(SessionSnapshot),
    Stopped(StoppedSession),
}

/// Stops the stack if one of its sessions is tracked, otherwise starts its
/// next session.
pub async fn toggle_stack<'a, T>(
    manager: &TrackingManager,
    base_name: &str,
    context: TaskContext,
    history: impl IntoIterator<Item = &'a T>,
) -> Result<StackToggle>
where
    T: TaskIdentity + 'a,
{
    let key = GroupKey::new(base_name.trim(), &context.project_name, &context.client_name);
    if manager.is_stack_tracking(&key) {
        if let Some(stopped) = manager.stop_tracking().await {
            return Ok(StackToggle::Stopped(stopped));
        }
    }

    let name = next_session_name(
        key.base_name(),
        key.project_name(),
        key.client_name(),
        history,
    );
    debug!("Continuing stack {key} with {name}");
    let started = manager
        .start_tracking(TrackingIntent::new(name, context))
        .await?;
    Ok(StackToggle::Started(started))
}

#[cfg(test)]
mod tests {
    use std::{rc::Rc, time::Duration};

    use anyhow::Result;
    use tokio::time::sleep;

    use crate::{
        storage::{entities::TaskRowEntity, task_storage::TaskStore},
        tracking::{
            session::TaskContext,
            testing::{history_row, run_local, test_start, RecordingStore},
            TrackingConfig, TrackingManager,
        },
        utils::clock::TestClock,
    };

    use super::{next_session_name, toggle_stack, StackToggle};

    #[test]
    fn test_next_name_follows_highest_counter() {
        let history = [
            history_row(1, "Design review", "Core", "Acme", 10),
            history_row(2, "Design review (1)", "Core", "Acme", 10),
            history_row(3, "Design review (7)", "Other", "Acme", 10),
        ];
        assert_eq!(
            next_session_name("Design review", "Core", "Acme", &history),
            "Design review (2)"
        );
    }

    #[test]
    fn test_next_name_of_new_stack() {
        let history = [history_row(1, "Standup (4)", "Core", "Acme", 10)];
        assert_eq!(next_session_name("Review", "Core", "Acme", &history), "Review (1)");
        let empty: [TaskRowEntity; 0] = [];
        assert_eq!(next_session_name("Review", "", "", &empty), "Review (1)");
    }

    #[test]
    fn test_next_name_at_largest_counter() {
        let history = [history_row(1, "Review (18446744073709551615)", "Core", "Acme", 1)];
        assert_eq!(
            next_session_name("Review", "Core", "Acme", &history),
            "Review (18446744073709551615)"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_continues_then_stops_the_stack() -> Result<()> {
        run_local(async {
            let store = RecordingStore::with_rows(vec![
                history_row(1, "Review (1)", "Core", "Acme", 60),
                history_row(2, "Review (2)", "Core", "Acme", 60),
            ]);
            let manager = TrackingManager::new(
                store.clone() as Rc<dyn TaskStore>,
                Rc::new(TestClock::starting_at(test_start())),
                TrackingConfig::default(),
            );

            let history = store.list_task_rows().await?;
            let context = TaskContext::new("Core", "Acme");
            match toggle_stack(&manager, "Review", context.clone(), &history).await? {
                StackToggle::Started(started) => assert_eq!(started.task_name, "Review (3)"),
                other => panic!("expected a start, got {other:?}"),
            }

            sleep(Duration::from_secs(3)).await;
            match toggle_stack(&manager, "Review", context, &history).await? {
                StackToggle::Stopped(stopped) => {
                    assert_eq!(stopped.task_name, "Review (3)");
                    assert_eq!(stopped.duration_seconds, 3);
                }
                other => panic!("expected a stop, got {other:?}"),
            }
            assert!(!manager.is_tracking());
            Ok(())
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_switches_from_another_stack() -> Result<()> {
        run_local(async {
            let store = RecordingStore::new();
            let manager = TrackingManager::new(
                store.clone() as Rc<dyn TaskStore>,
                Rc::new(TestClock::starting_at(test_start())),
                TrackingConfig::default(),
            );
            let context = TaskContext::new("Core", "Acme");

            toggle_stack(&manager, "Standup", context.clone(), &Vec::<TaskRowEntity>::new()).await?;
            let history = store.list_task_rows().await?;
            let toggled = toggle_stack(&manager, "Review", context, &history).await?;

            assert!(matches!(toggled, StackToggle::Started(ref s) if s.task_name == "Review (1)"));
            assert!(manager.is_task_tracking("Review (1)"));
            Ok(())
        })
        .await
    }
}
