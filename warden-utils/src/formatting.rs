/// Format seconds as the largest whole duration unit (e.g. 90 -> "1m",
/// 7200 -> "2h", 2592000 -> "1M"). The inverse register of
/// `parse::parse_duration_seconds`.
pub fn format_duration(total_seconds: u64) -> String {
    const UNITS: &[(u64, char)] = &[
        (31_536_000, 'y'),
        (2_592_000, 'M'),
        (604_800, 'w'),
        (86_400, 'd'),
        (3_600, 'h'),
        (60, 'm'),
    ];

    for (size, suffix) in UNITS {
        if total_seconds >= *size {
            return format!("{}{}", total_seconds / size, suffix);
        }
    }

    format!("{}s", total_seconds)
}

/// User-facing verb for a recorded action, past tense.
pub fn action_past_tense(action: &str) -> &'static str {
    match action {
        "warn" => "warned",
        "kick" => "kicked",
        "ban" => "banned",
        "mute" => "muted",
        "unban" => "unbanned",
        "unmute" => "unmuted",
        _ => "sanctioned",
    }
}
