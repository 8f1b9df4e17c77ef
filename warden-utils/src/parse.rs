/// Parse a compact duration token like `30s`, `45m`, `2h`, `7d`, `2w`, `3M`, `1y`.
///
/// The grammar is a single integer followed by exactly one unit character.
/// Units are case-sensitive: `m` is minutes while `M` is months. Months and
/// years are 30-day and 365-day approximations. Zero durations and anything
/// that fails the grammar return `None`.
pub fn parse_duration_seconds(raw: &str) -> Option<u64> {
    let value = raw.trim();
    let unit = value.chars().last()?;
    let digits = &value[..value.len() - unit.len_utf8()];

    if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }

    let amount = digits.parse::<u64>().ok()?;
    if amount == 0 {
        return None;
    }

    let multiplier = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3_600,
        'd' => 86_400,
        'w' => 604_800,
        'M' => 2_592_000,
        'y' => 31_536_000,
        _ => return None,
    };

    amount.checked_mul(multiplier)
}
