//! Registry of UI handles that mirror the tracking state.
//!
//! Handles are only known through the capability traits [Toggleable],
//! [TextDisplay] and [Visible]. Registrations stay until the owner clears them,
//! a handle that fails is logged and skipped on every pass.

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    fmt::Display,
    rc::Rc,
};

use anyhow::Result;
use tracing::warn;

use crate::utils::time::format_hms;

use super::grouping::GroupKey;

/// A control with an active and an inactive look, like a play/stop button.
pub trait Toggleable {
    fn set_active(&self, active: bool) -> Result<()>;
}

/// A label or a text input.
pub trait TextDisplay {
    fn text(&self) -> Result<String>;

    fn set_text(&self, text: &str) -> Result<()>;
}

pub trait Visible {
    fn set_visible(&self, visible: bool) -> Result<()>;
}

/// Money labels are hidden when there is nothing to show.
pub trait MoneyLabel: TextDisplay + Visible {}

impl<T: TextDisplay + Visible + ?Sized> MoneyLabel for T {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(u64);

impl Display for RegistrationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Rate used to turn tracked time into earnings. Only used for display.
#[derive(Debug, Clone, PartialEq)]
pub struct MoneyRate {
    pub hourly_rate: Option<f64>,
    pub currency: String,
}

impl MoneyRate {
    pub fn new(hourly_rate: Option<f64>, currency: impl Into<String>) -> Self {
        Self {
            hourly_rate,
            currency: currency.into(),
        }
    }

    /// Earnings for the given amount of seconds, `None` when there is nothing
    /// worth showing.
    pub fn earnings(&self, seconds: u64) -> Option<f64> {
        let rate = self.hourly_rate?;
        let earnings = seconds as f64 / 3600. * rate;
        (earnings.is_finite() && earnings > 0.).then_some(earnings)
    }

    pub fn format(&self, amount: f64) -> String {
        format!("{}{:.2}", self.currency, amount)
    }
}

/// What the registry needs to know about the active session.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveView {
    pub group_key: GroupKey,
    pub task_name: String,
    pub elapsed_seconds: u64,
    /// Seconds already persisted for the task before this session.
    pub task_total_seconds: u64,
    /// Seconds already persisted for the whole stack before this session.
    pub stack_total_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshScope {
    /// Every registration, used on start and stop.
    Full,
    /// Only the displays of the running time, used on every tick.
    Live,
}

struct TrackingToggle {
    id: RegistrationId,
    control: Rc<dyn Toggleable>,
    filter: Option<GroupKey>,
    input: Option<Rc<dyn TextDisplay>>,
    /// Text this registry put into `input`, if any.
    synced_text: RefCell<Option<String>>,
}

struct StackToggle {
    id: RegistrationId,
    control: Rc<dyn Toggleable>,
    key: GroupKey,
}

struct TimeDisplay {
    id: RegistrationId,
    label: Rc<dyn TextDisplay>,
    filter: Option<GroupKey>,
    original_text: String,
}

struct StackTimeDisplay {
    id: RegistrationId,
    label: Rc<dyn TextDisplay>,
    key: GroupKey,
    idle_text: String,
}

struct MoneyDisplay {
    id: RegistrationId,
    label: Rc<dyn MoneyLabel>,
    filter: Option<GroupKey>,
    rate: MoneyRate,
    original_text: String,
}

type NamedDisplay = (RegistrationId, Rc<dyn TextDisplay>);

#[derive(Default)]
pub struct ObserverRegistry {
    next_id: Cell<u64>,
    tracking_toggles: RefCell<Vec<Rc<TrackingToggle>>>,
    stack_toggles: RefCell<Vec<Rc<StackToggle>>>,
    time_displays: RefCell<Vec<Rc<TimeDisplay>>>,
    stack_time_displays: RefCell<Vec<Rc<StackTimeDisplay>>>,
    money_displays: RefCell<Vec<Rc<MoneyDisplay>>>,
    project_time_displays: RefCell<HashMap<u64, Vec<NamedDisplay>>>,
    sidebar_slots: RefCell<HashMap<String, NamedDisplay>>,
}

fn matches(filter: Option<&GroupKey>, active: Option<&ActiveView>) -> bool {
    match (filter, active) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some(filter), Some(active)) => *filter == active.group_key,
    }
}

fn report(id: RegistrationId, role: &str, result: Result<()>) {
    if let Err(e) = result {
        warn!("Failed to refresh {role} {id}: {e:?}");
    }
}

fn current_text<L: TextDisplay + ?Sized>(label: &L) -> String {
    label.text().unwrap_or_else(|e| {
        warn!("Failed to read the text of a display during registration: {e:?}");
        format_hms(0)
    })
}

fn snapshot<T>(entries: &RefCell<Vec<Rc<T>>>) -> Vec<Rc<T>> {
    entries.borrow().clone()
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> RegistrationId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        RegistrationId(id)
    }

    /// Registers a start/stop control. Without a filter the control reflects
    /// any active session. The optional input mirrors the active task name.
    pub fn register_tracking_toggle(
        &self,
        control: Rc<dyn Toggleable>,
        filter: Option<GroupKey>,
        input: Option<Rc<dyn TextDisplay>>,
    ) -> RegistrationId {
        let id = self.next_id();
        self.tracking_toggles
            .borrow_mut()
            .push(Rc::new(TrackingToggle {
                id,
                control,
                filter,
                input,
                synced_text: RefCell::new(None),
            }));
        id
    }

    pub fn register_stack_toggle(&self, control: Rc<dyn Toggleable>, key: GroupKey) -> RegistrationId {
        let id = self.next_id();
        self.stack_toggles
            .borrow_mut()
            .push(Rc::new(StackToggle { id, control, key }));
        id
    }

    /// Registers a time label. The text it holds now is restored whenever a
    /// filtered label stops matching the active session.
    pub fn register_time_display(
        &self,
        label: Rc<dyn TextDisplay>,
        filter: Option<GroupKey>,
    ) -> RegistrationId {
        let id = self.next_id();
        let original_text = current_text(label.as_ref());
        self.time_displays.borrow_mut().push(Rc::new(TimeDisplay {
            id,
            label,
            filter,
            original_text,
        }));
        id
    }

    pub fn register_stack_time_display(
        &self,
        label: Rc<dyn TextDisplay>,
        key: GroupKey,
        idle_text: impl Into<String>,
    ) -> RegistrationId {
        let id = self.next_id();
        self.stack_time_displays
            .borrow_mut()
            .push(Rc::new(StackTimeDisplay {
                id,
                label,
                key,
                idle_text: idle_text.into(),
            }));
        id
    }

    pub fn register_money_display(
        &self,
        label: Rc<dyn MoneyLabel>,
        filter: Option<GroupKey>,
        rate: MoneyRate,
    ) -> RegistrationId {
        let id = self.next_id();
        let original_text = current_text(label.as_ref());
        self.money_displays.borrow_mut().push(Rc::new(MoneyDisplay {
            id,
            label,
            filter,
            rate,
            original_text,
        }));
        id
    }

    pub fn register_project_time_display(
        &self,
        project_id: u64,
        label: Rc<dyn TextDisplay>,
    ) -> RegistrationId {
        let id = self.next_id();
        self.project_time_displays
            .borrow_mut()
            .entry(project_id)
            .or_default()
            .push((id, label));
        id
    }

    /// Registers a sidebar widget under an open name like `"today"`. A later
    /// registration under the same name replaces the previous one.
    pub fn register_sidebar_slot(
        &self,
        slot: impl Into<String>,
        label: Rc<dyn TextDisplay>,
    ) -> RegistrationId {
        let id = self.next_id();
        self.sidebar_slots
            .borrow_mut()
            .insert(slot.into(), (id, label));
        id
    }

    pub fn sidebar_slot(&self, slot: &str) -> Option<Rc<dyn TextDisplay>> {
        self.sidebar_slots
            .borrow()
            .get(slot)
            .map(|(_, label)| label.clone())
    }

    pub fn project_time_displays(&self, project_id: u64) -> Vec<Rc<dyn TextDisplay>> {
        self.project_time_displays
            .borrow()
            .get(&project_id)
            .map(|labels| labels.iter().map(|(_, label)| label.clone()).collect())
            .unwrap_or_default()
    }

    pub fn unregister(&self, id: RegistrationId) -> bool {
        let mut removed = false;
        removed |= retain(&self.tracking_toggles, |entry| entry.id != id);
        removed |= retain(&self.stack_toggles, |entry| entry.id != id);
        removed |= retain(&self.time_displays, |entry| entry.id != id);
        removed |= retain(&self.stack_time_displays, |entry| entry.id != id);
        removed |= retain(&self.money_displays, |entry| entry.id != id);

        let mut projects = self.project_time_displays.borrow_mut();
        for labels in projects.values_mut() {
            let before = labels.len();
            labels.retain(|(entry, _)| *entry != id);
            removed |= labels.len() != before;
        }
        projects.retain(|_, labels| !labels.is_empty());
        drop(projects);

        let mut slots = self.sidebar_slots.borrow_mut();
        let before = slots.len();
        slots.retain(|_, (entry, _)| *entry != id);
        removed |= slots.len() != before;

        removed
    }

    /// Drops every registration tied to a particular task, stack or project,
    /// keeping the global ones and the sidebar slots. Used when a task list is
    /// rebuilt.
    pub fn clear_task_scoped(&self) {
        retain(&self.tracking_toggles, |entry| entry.filter.is_none());
        self.stack_toggles.borrow_mut().clear();
        retain(&self.time_displays, |entry| entry.filter.is_none());
        self.stack_time_displays.borrow_mut().clear();
        retain(&self.money_displays, |entry| entry.filter.is_none());
        self.project_time_displays.borrow_mut().clear();
    }

    pub fn clear_all(&self) {
        self.clear_task_scoped();
        self.tracking_toggles.borrow_mut().clear();
        self.time_displays.borrow_mut().clear();
        self.money_displays.borrow_mut().clear();
        self.sidebar_slots.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.tracking_toggles.borrow().len()
            + self.stack_toggles.borrow().len()
            + self.time_displays.borrow().len()
            + self.stack_time_displays.borrow().len()
            + self.money_displays.borrow().len()
            + self
                .project_time_displays
                .borrow()
                .values()
                .map(Vec::len)
                .sum::<usize>()
            + self.sidebar_slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Brings registered handles in line with `active` (`None` when idle).
    ///
    /// Registrations are copied out before any handle is touched, so handles
    /// may register or unregister from inside their callbacks.
    pub fn refresh(&self, active: Option<&ActiveView>, scope: RefreshScope) {
        if scope == RefreshScope::Full {
            for toggle in snapshot(&self.tracking_toggles) {
                refresh_tracking_toggle(&toggle, active);
            }
            for toggle in snapshot(&self.stack_toggles) {
                let is_active = matches(Some(&toggle.key), active);
                report(toggle.id, "stack toggle", toggle.control.set_active(is_active));
            }
        }

        let live = scope == RefreshScope::Live;

        for display in snapshot(&self.time_displays) {
            let matching = matches(display.filter.as_ref(), active);
            if live && !matching {
                continue;
            }
            let text = match (active, &display.filter) {
                (Some(active), None) => format_hms(active.elapsed_seconds),
                (None, None) => format_hms(0),
                (Some(active), Some(_)) if matching => {
                    format_hms(active.task_total_seconds.saturating_add(active.elapsed_seconds))
                }
                _ => display.original_text.clone(),
            };
            report(display.id, "time display", display.label.set_text(&text));
        }

        for display in snapshot(&self.stack_time_displays) {
            let text = match active {
                Some(active) if matches(Some(&display.key), Some(active)) => {
                    format_hms(active.stack_total_seconds.saturating_add(active.elapsed_seconds))
                }
                _ if live => continue,
                _ => display.idle_text.clone(),
            };
            report(display.id, "stack time display", display.label.set_text(&text));
        }

        for display in snapshot(&self.money_displays) {
            let matching = matches(display.filter.as_ref(), active);
            if live && !matching {
                continue;
            }
            report(display.id, "money display", refresh_money(&display, active, matching));
        }
    }
}

fn retain<T>(entries: &RefCell<Vec<Rc<T>>>, keep: impl Fn(&T) -> bool) -> bool {
    let mut entries = entries.borrow_mut();
    let before = entries.len();
    entries.retain(|entry| keep(entry));
    entries.len() != before
}

fn refresh_tracking_toggle(toggle: &TrackingToggle, active: Option<&ActiveView>) {
    let matching = matches(toggle.filter.as_ref(), active);
    report(toggle.id, "tracking toggle", toggle.control.set_active(matching));

    let Some(input) = &toggle.input else {
        return;
    };

    let result = match active {
        Some(active) if matching => input.set_text(&active.task_name).map(|_| {
            *toggle.synced_text.borrow_mut() = Some(active.task_name.clone());
        }),
        _ => {
            let synced = toggle.synced_text.borrow_mut().take();
            match synced {
                // Only clear what was put there by the session, never what the
                // user typed since.
                Some(synced) => match input.text() {
                    Ok(current) if current == synced => input.set_text(""),
                    Ok(_) => Ok(()),
                    Err(e) => Err(e),
                },
                None => Ok(()),
            }
        }
    };
    report(toggle.id, "tracking toggle input", result);
}

fn refresh_money(display: &MoneyDisplay, active: Option<&ActiveView>, matching: bool) -> Result<()> {
    match active {
        Some(active) if matching => {
            let seconds = active.task_total_seconds.saturating_add(active.elapsed_seconds);
            match display.rate.earnings(seconds) {
                Some(earnings) => {
                    display.label.set_text(&display.rate.format(earnings))?;
                    display.label.set_visible(true)
                }
                None => display.label.set_visible(false),
            }
        }
        _ if display.filter.is_none() => display.label.set_visible(false),
        _ => display.label.set_text(&display.original_text),
    }
}
