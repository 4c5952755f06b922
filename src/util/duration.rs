use chrono::TimeDelta;

/// Formats an elapsed time as a compact string such as `"2h 30m 15s 200ms"`.
///
/// Lower units are always shown once a higher unit is present (`"1h 0m 5s"`),
/// zero milliseconds are dropped unless nothing else would be printed, and a
/// zero duration is rendered as `"0 ms"`.
///
/// # Examples
///
/// ```
/// use chrono::TimeDelta;
/// use rss_migrate::util::format_duration;
///
/// assert_eq!(format_duration(TimeDelta::milliseconds(500)), "500ms");
/// assert_eq!(format_duration(TimeDelta::seconds(3725)), "1h 2m 5s");
/// ```
pub fn format_duration(duration: TimeDelta) -> String {
    if duration.is_zero() {
        return "0 ms".to_string();
    }

    let negative = duration < TimeDelta::zero();
    let total_ms = duration.abs().num_milliseconds();

    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let seconds = (total_ms / 1_000) % 60;
    let millis = total_ms % 1_000;

    let mut parts: Vec<String> = Vec::with_capacity(4);
    if hours != 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes != 0 || hours != 0 {
        parts.push(format!("{minutes}m"));
    }
    if seconds != 0 || minutes != 0 || hours != 0 {
        parts.push(format!("{seconds}s"));
    }
    if millis != 0 || parts.is_empty() {
        parts.push(format!("{millis}ms"));
    }

    let formatted = parts.join(" ");
    if negative {
        format!("-{formatted}")
    } else {
        formatted
    }
}
