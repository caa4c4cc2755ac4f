// src/config/duration.rs

use std::time::Duration;

/// Parse a duration string like `"250ms"`, `"3s"`, `"10m"`, `"2h"`.
///
/// `"none"` / `"0"` mean "no deadline" and yield `Ok(None)`.
pub fn parse_duration(s: &str) -> Result<Option<Duration>, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }
    if s.eq_ignore_ascii_case("none") || s == "0" {
        return Ok(None);
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let overflow = || format!("duration '{s}' is too large");
    let dur = match unit.as_str() {
        "ms" => Duration::from_millis(value),
        "s" => Duration::from_secs(value),
        "m" => Duration::from_secs(value.checked_mul(60).ok_or_else(overflow)?),
        "h" => Duration::from_secs(value.checked_mul(60 * 60).ok_or_else(overflow)?),
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };

    if dur.is_zero() { Ok(None) } else { Ok(Some(dur)) }
}
