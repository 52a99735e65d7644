//! Time tracking engine with stacked task sessions.
//!
//! A single session is tracked at a time. Sessions named "Review (1)",
//! "Review (2)", ... for the same project and client form a stack that can be
//! continued from the command line. Elapsed time is mirrored to UI handles
//! every second and written to a JSON lines store every few seconds.

pub mod cli;
pub mod fs;
pub mod storage;
pub mod tracking;
pub mod utils;
