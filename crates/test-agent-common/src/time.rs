//! ---
//! ta_section: "01-core-functionality"
//! ta_subsection: "module"
//! ta_type: "source"
//! ta_scope: "code"
//! ta_description: "Shared primitives and utilities for the agent runtime."
//! ta_version: "v0.1.0"
//! ta_owner: "tbd"
//! ---
use chrono::{DateTime, SecondsFormat, Utc};

/// Wall-clock nanoseconds since the Unix epoch, saturating at zero before 1970.
pub fn unix_nanos_now() -> u64 {
    Utc::now()
        .timestamp_nanos_opt()
        .map(|nanos| u64::try_from(nanos).unwrap_or(0))
        .unwrap_or(u64::MAX)
}

/// Render an epoch-nanosecond timestamp as RFC 3339 for display.
pub fn nanos_to_rfc3339(nanos: u64) -> String {
    let secs = (nanos / 1_000_000_000) as i64;
    let subsec = (nanos % 1_000_000_000) as u32;
    match DateTime::<Utc>::from_timestamp(secs, subsec) {
        Some(ts) => ts.to_rfc3339_opts(SecondsFormat::Nanos, true),
        None => format!("{nanos}ns"),
    }
}
