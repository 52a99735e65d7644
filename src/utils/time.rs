use chrono::Duration;

/// Formats seconds as a zero padded `HH:MM:SS` clock. Hours are not wrapped,
/// so 100 hours read `100:00:00`.
pub fn format_hms(seconds: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        seconds / 60 % 60,
        seconds % 60
    )
}

/// Compact human form used in reports, e.g. `1h2m3s`.
pub fn format_duration(v: Duration) -> String {
    if v.num_hours() > 0 {
        format!(
            "{}h{}m{}s",
            v.num_hours(),
            v.num_minutes() % 60,
            v.num_seconds() % 60
        )
    } else if v.num_minutes() > 0 {
        format!("{}m{}s", v.num_minutes() % 60, v.num_seconds() % 60)
    } else {
        format!("{}s", v.num_seconds() % 60)
    }
}

/// [format_duration] of stored seconds. Counts beyond what [Duration] holds
/// are printed as raw seconds.
pub fn format_seconds(seconds: u64) -> String {
    i64::try_from(seconds)
        .ok()
        .and_then(Duration::try_seconds)
        .map(format_duration)
        .unwrap_or_else(|| format!("{seconds}s"))
}
