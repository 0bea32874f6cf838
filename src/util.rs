use chrono::{DateTime, FixedOffset, Offset, Utc};

const TICKS_PER_SECOND: u32 = 100;

const SECONDS_PER_DAY: u64 = 86_400;

/// Formats an SNMP tick counter (hundredths of a second) as `<d>d HH:MM`.
pub fn format_ticks(ticks: u32) -> String {
    let seconds = ticks / TICKS_PER_SECOND;
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    format!("{days}d {hours:02}:{minutes:02}")
}

/// Formats a node uptime in seconds as `<d>d HHh`.
pub fn format_node_uptime(seconds: u64) -> String {
    let days = seconds / SECONDS_PER_DAY;
    let hours = (seconds % SECONDS_PER_DAY) / 3_600;
    format!("{days}d {hours:02}h")
}

/// Rounds half-up to `places` decimals. Intended for non-negative rates.
pub fn round_half_up(value: f64, places: i32) -> f64 {
    let ratio = 10f64.powi(places);
    (value * ratio + 0.5).floor() / ratio
}

/// Fixed UTC offset, falling back to UTC for out-of-range values.
pub fn fixed_offset(hours: i32) -> FixedOffset {
    hours
        .checked_mul(3_600)
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| Utc.fix())
}

pub fn now_at(offset: FixedOffset) -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&offset)
}

pub fn format_clock(at: &DateTime<FixedOffset>) -> String {
    at.format("%H:%M:%S").to_string()
}
