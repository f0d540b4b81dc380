//! Lag thresholds
//!
//! `lag=` accepts a plain byte count or a size with a binary unit suffix:
//! `10485760`, `10MB` and `10M` all mean ten mebibytes.

/// Parse a lag threshold in bytes. `None` means "no bound".
pub fn parse_lag(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let digits_end = raw
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(raw.len());
    if digits_end == 0 {
        return None;
    }
    let amount: u64 = raw[..digits_end].parse().ok()?;
    let unit = raw[digits_end..].trim().to_ascii_uppercase();
    let unit = unit.strip_suffix('B').unwrap_or(&unit);
    let multiplier: u64 = match unit {
        "" => 1,
        "K" => 1 << 10,
        "M" => 1 << 20,
        "G" => 1 << 30,
        "T" => 1 << 40,
        _ => return None,
    };
    amount.checked_mul(multiplier)
}
