use std::{path::PathBuf, rc::Rc};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tokio::{
    select,
    sync::mpsc::{self, UnboundedReceiver},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    storage::task_storage::{JsonTaskStore, TaskStore},
    tracking::{
        continuation::next_session_name,
        events::TrackingEvent,
        grouping::GroupKey,
        observers::{MoneyRate, TextDisplay},
        session::{StoppedSession, TaskContext, TrackingIntent},
        TrackingManager,
    },
    utils::{
        clock::DefaultClock,
        settings::Settings,
        shutdown::detect_interrupt,
        time::{format_hms, format_seconds},
    },
};

use super::console::StatusLine;

const TASK_SLOT: &str = "task";

#[derive(Debug, Parser)]
pub struct TrackCommand {
    #[arg(help = "Task name. With --continue the base name of the stack to continue")]
    name: String,
    #[arg(long, default_value = "", help = "Project the task belongs to")]
    project: String,
    #[arg(long)]
    project_id: Option<u64>,
    #[arg(long, default_value = "", help = "Client the task is done for")]
    client: String,
    #[arg(long)]
    client_id: Option<u64>,
    #[arg(
        long = "continue",
        help = "Start the next session of the stack, e.g. \"Review (3)\" after \"Review (2)\""
    )]
    continue_stack: bool,
    #[arg(long, help = "Hourly rate, overrides the one from settings")]
    rate: Option<f64>,
    #[arg(long, help = "Currency symbol, overrides the one from settings")]
    currency: Option<String>,
    #[arg(long, help = "Print every tracking event as a JSON line")]
    events: bool,
}

/// Tracks a task until the user interrupts the process. Must run inside a
/// [tokio::task::LocalSet].
pub async fn process_track_command(dir: PathBuf, command: TrackCommand) -> Result<()> {
    let settings = Settings::load(&dir)?;
    let store = Rc::new(
        JsonTaskStore::new(dir.clone())
            .with_context(|| format!("Failed to open the task store in {}", dir.display()))?,
    );
    let manager = TrackingManager::new(
        store.clone(),
        Rc::new(DefaultClock),
        settings.tracking_config(),
    );

    let context = TaskContext::new(command.project, command.client)
        .with_ids(command.project_id, command.client_id);
    let task_name = if command.continue_stack {
        let history = store.list_task_rows().await?;
        next_session_name(
            &command.name,
            &context.project_name,
            &context.client_name,
            &history,
        )
    } else {
        command.name
    };
    let key = GroupKey::for_task(&task_name, &context.project_name, &context.client_name);
    let rate = MoneyRate::new(
        command.rate.or(settings.hourly_rate),
        command.currency.unwrap_or(settings.currency),
    );

    let status = StatusLine::stderr();
    register_status(&manager, &status, &key, rate, context.project_id);

    let (sender, mut events) = mpsc::unbounded_channel();
    let subscription = manager.subscribe(move |event| {
        sender
            .send(event.clone())
            .map_err(|_| anyhow!("Event receiver is closed"))
    });

    let cancellation = CancellationToken::new();
    let interrupt = tokio::spawn(detect_interrupt(cancellation.clone()));

    let mut display = EventDisplay::new(&manager, command.events);
    let stopped = track_until_cancelled(
        &manager,
        TrackingIntent::new(task_name, context),
        &mut display,
        &mut events,
        &cancellation,
    )
    .await?;
    subscription.unsubscribe();
    cancellation.cancel();
    interrupt.await?;
    if let Err(e) = status.finish() {
        warn!("Failed to close the status line: {e:?}");
    }

    match stopped {
        Some(stopped) => println!(
            "Tracked {} for {}",
            stopped.task_name,
            format_seconds(stopped.duration_seconds)
        ),
        None => info!("Nothing was tracked"),
    }
    Ok(())
}

/// Runs a session until `cancellation` fires. The session is stopped, and its
/// time written, whatever happens to the displays in between.
async fn track_until_cancelled(
    manager: &TrackingManager,
    intent: TrackingIntent,
    display: &mut EventDisplay,
    events: &mut UnboundedReceiver<TrackingEvent>,
    cancellation: &CancellationToken,
) -> Result<Option<StoppedSession>> {
    manager.start_tracking(intent).await?;

    loop {
        select! {
            _ = cancellation.cancelled() => break,
            Some(event) = events.recv() => display.handle(&event),
        }
    }

    let stopped = manager.stop_tracking().await;
    while let Ok(event) = events.try_recv() {
        display.handle(&event);
    }
    Ok(stopped)
}

fn register_status(
    manager: &TrackingManager,
    status: &Rc<StatusLine>,
    key: &GroupKey,
    rate: MoneyRate,
    project_id: Option<u64>,
) {
    let observers = manager.observers();
    observers.register_tracking_toggle(status.indicator("state"), None, None);
    observers.register_sidebar_slot(TASK_SLOT, status.field(TASK_SLOT));
    observers.register_time_display(status.field("session"), None);
    observers.register_time_display(status.field("task total"), Some(key.clone()));
    observers.register_stack_time_display(status.field("stack"), key.clone(), "--");
    observers.register_money_display(status.field("earned"), None, rate);
    if let Some(project_id) = project_id {
        let project = status.field("project");
        observers.register_project_time_display(project_id, project);
    }
}

/// Consumer of the events delivered over the channel. Keeps the widgets that
/// the host updates itself in sync and optionally prints the events.
struct EventDisplay {
    manager: TrackingManager,
    print: bool,
    project_seconds: u64,
}

impl EventDisplay {
    fn new(manager: &TrackingManager, print: bool) -> Self {
        Self {
            manager: manager.clone(),
            print,
            project_seconds: 0,
        }
    }

    fn handle(&mut self, event: &TrackingEvent) {
        if let Err(e) = self.apply(event) {
            warn!("Failed to display {}: {e:?}", event.name());
        }
    }

    fn apply(&mut self, event: &TrackingEvent) -> Result<()> {
        if self.print {
            println!("{}", serde_json::to_string(event)?);
        }

        let observers = self.manager.observers();
        match event {
            TrackingEvent::Start(started) => {
                if let Some(slot) = observers.sidebar_slot(TASK_SLOT) {
                    slot.set_text(&started.task_name)?;
                }
            }
            TrackingEvent::UpdateProjectTime {
                project_id,
                delta_seconds,
            } => {
                self.project_seconds = self.project_seconds.saturating_add(*delta_seconds);
                for label in observers.project_time_displays(*project_id) {
                    label.set_text(&format_hms(self.project_seconds))?;
                }
            }
            TrackingEvent::TaskDatabaseUpdated { elapsed_seconds } => {
                debug!("Saved {elapsed_seconds}s");
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{rc::Rc, time::Duration};

    use anyhow::{anyhow, Result};
    use tokio::{sync::mpsc, time::sleep};
    use tokio_util::sync::CancellationToken;

    use crate::{
        storage::entities::TaskId,
        tracking::{
            events::TrackingEvent,
            session::{TaskContext, TrackingIntent},
            testing::{run_local, test_start, RecordingLabel, RecordingStore, StoreCall},
            TrackingConfig, TrackingManager,
        },
        utils::clock::TestClock,
    };

    use super::{track_until_cancelled, EventDisplay, TASK_SLOT};

    #[tokio::test(start_paused = true)]
    async fn test_display_failures_still_stop_the_session() -> Result<()> {
        run_local(async {
            let store = RecordingStore::new();
            let manager = TrackingManager::new(
                store.clone(),
                Rc::new(TestClock::starting_at(test_start())),
                TrackingConfig::default(),
            );
            let project = RecordingLabel::with_text("");
            manager
                .observers()
                .register_sidebar_slot(TASK_SLOT, RecordingLabel::disposed());
            manager
                .observers()
                .register_project_time_display(4, project.clone());

            let (sender, mut events) = mpsc::unbounded_channel::<TrackingEvent>();
            let _subscription = manager.subscribe(move |event| {
                sender
                    .send(event.clone())
                    .map_err(|_| anyhow!("Event receiver is closed"))
            });
            let cancellation = CancellationToken::new();
            let cancel = cancellation.clone();
            tokio::task::spawn_local(async move {
                sleep(Duration::from_millis(6500)).await;
                cancel.cancel();
            });

            let mut display = EventDisplay::new(&manager, false);
            let context = TaskContext::new("Core", "Acme").with_ids(Some(4), None);
            let stopped = track_until_cancelled(
                &manager,
                TrackingIntent::new("Write docs", context),
                &mut display,
                &mut events,
                &cancellation,
            )
            .await?;

            assert_eq!(stopped.map(|s| s.duration_seconds), Some(6));
            assert_eq!(
                store.updates().last(),
                Some(&StoreCall::Update {
                    id: TaskId(1),
                    ended: true,
                    seconds: 6
                })
            );
            assert_eq!(project.current(), "00:00:06");
            Ok(())
        })
        .await
    }
}
