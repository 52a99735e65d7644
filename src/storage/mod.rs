//! Storage of tracked sessions is organized through [task_storage::TaskStore].
//! The basic idea is:
//!  - Every session owns one task row, created when tracking starts.
//!  - The row is rewritten while the session runs and once more when it stops.
//!  - [task_storage::JsonTaskStore] keeps rows as JSON lines in a single file.

pub mod entities;
pub mod task_storage;
