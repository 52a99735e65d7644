//! Stack identity of tasks.
//!
//! Sessions of the same task are named `Task`, `Task (2)`, `Task (3)`... The
//! trailing counter is stripped to obtain the base name, and the base name
//! together with the project and client names forms a [GroupKey]. Tasks with
//! equal keys belong to the same stack.

use std::{fmt::Display, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Grammar of a session counter: optional whitespace, `(`, ASCII digits, `)`
/// at the very end of the name (trailing whitespace is tolerated).
static SESSION_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^(?P<base>.*?)\s*\((?P<number>[0-9]+)\)\s*$")
        .expect("session suffix pattern should compile")
});

/// Splits a name into the text before the last session counter and the
/// counter digits.
fn split_session_suffix(name: &str) -> Option<(&str, &str)> {
    let captures = SESSION_SUFFIX.captures(name)?;
    let base = captures.name("base")?.as_str().trim();
    let number = captures.name("number")?.as_str();
    Some((base, number))
}

/// Returns the task name without its session counters.
///
/// Counters are stripped repeatedly, so `"Review (2) (3)"` becomes `"Review"`
/// and the function is idempotent. A name that consists only of a counter,
/// like `"(3)"`, is kept as is since stripping it would leave nothing to group
/// by.
pub fn derive_base_name(task_name: &str) -> String {
    let mut base = task_name.trim();
    while let Some((stripped, _)) = split_session_suffix(base) {
        if stripped.is_empty() {
            break;
        }
        base = stripped;
    }
    base.to_string()
}

/// Session number carried by the name. Names without a counter are the first
/// session of their stack.
pub fn session_number(task_name: &str) -> u64 {
    split_session_suffix(task_name.trim())
        .and_then(|(_, number)| number.parse().ok())
        .unwrap_or(1)
}

/// Identity of a stack.
///
/// The key is kept structured instead of being joined into a single string,
/// so names that contain the `::` separator of the display form never make
/// two different stacks compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKey {
    base_name: String,
    project_name: String,
    client_name: String,
}

impl GroupKey {
    pub fn new(
        base_name: impl Into<String>,
        project_name: impl Into<String>,
        client_name: impl Into<String>,
    ) -> Self {
        Self {
            base_name: base_name.into(),
            project_name: project_name.into(),
            client_name: client_name.into(),
        }
    }

    /// Builds the key of a raw task name, deriving its base name first.
    pub fn for_task(task_name: &str, project_name: &str, client_name: &str) -> Self {
        Self::new(derive_base_name(task_name), project_name, client_name)
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }
}

impl Display for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}::{}::{}",
            self.base_name, self.project_name, self.client_name
        )
    }
}

/// Anything that names a task inside a project and client.
pub trait TaskIdentity {
    fn task_name(&self) -> &str;

    fn project_name(&self) -> &str;

    fn client_name(&self) -> &str;

    fn group_key(&self) -> GroupKey {
        GroupKey::for_task(self.task_name(), self.project_name(), self.client_name())
    }
}
