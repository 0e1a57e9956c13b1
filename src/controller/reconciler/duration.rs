//! # Durations
//!
//! Parsing and formatting of Kubernetes duration strings such as `5m`,
//! `1h30m` or `1.5s`, the format used by `spec.interval`, `spec.timeout`
//! and `status.lastReconcileDuration`.

use crate::controller::reconciler::ReconcilerError;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

static DURATION_FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\d+(?:\.\d+)?(?:ns|us|µs|ms|s|m|h))+$").expect("duration format regex is valid")
});

static DURATION_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<number>\d+(?:\.\d+)?)(?P<unit>ns|us|µs|ms|s|m|h)")
        .expect("duration part regex is valid")
});

fn out_of_range(value: &str) -> ReconcilerError {
    ReconcilerError::InvalidDuration(format!("{value:?}: duration out of range"))
}

/// Parse a duration string. `0` is accepted as zero.
pub fn parse_duration(value: &str) -> Result<Duration, ReconcilerError> {
    let trimmed = value.trim();
    if trimmed == "0" {
        return Ok(Duration::ZERO);
    }
    if !DURATION_FORMAT.is_match(trimmed) {
        return Err(ReconcilerError::InvalidDuration(format!(
            "{value:?}: expected a sequence of <number><unit> with units ns, us, ms, s, m, h"
        )));
    }

    let mut total_nanos: u128 = 0;
    for part in DURATION_PART.captures_iter(trimmed) {
        let unit_nanos: u128 = match &part["unit"] {
            "ns" => 1,
            "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60_000_000_000,
            _ => 3_600_000_000_000,
        };
        let (whole, fraction) = part["number"]
            .split_once('.')
            .unwrap_or((&part["number"], ""));
        let invalid = |e: std::num::ParseIntError| {
            ReconcilerError::InvalidDuration(format!("{value:?}: {e}"))
        };
        let whole_nanos = whole
            .parse::<u128>()
            .map_err(invalid)?
            .checked_mul(unit_nanos)
            .ok_or_else(|| out_of_range(value))?;
        total_nanos = total_nanos
            .checked_add(whole_nanos)
            .ok_or_else(|| out_of_range(value))?;
        if !fraction.is_empty() {
            let scale = u32::try_from(fraction.len())
                .ok()
                .and_then(|digits| 10u128.checked_pow(digits))
                .ok_or_else(|| out_of_range(value))?;
            let fraction_nanos = fraction
                .parse::<u128>()
                .map_err(invalid)?
                .checked_mul(unit_nanos)
                .ok_or_else(|| out_of_range(value))?
                / scale;
            total_nanos = total_nanos
                .checked_add(fraction_nanos)
                .ok_or_else(|| out_of_range(value))?;
        }
    }

    let secs =
        u64::try_from(total_nanos / 1_000_000_000).map_err(|_overflow| out_of_range(value))?;
    let subsec = u32::try_from(total_nanos % 1_000_000_000).unwrap_or_default();
    Ok(Duration::new(secs, subsec))
}

/// Format a duration the way Kubernetes tooling prints it: `150ms`, `1.5s`,
/// `2m0s`, `1h2m3s`
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < 1_000 {
        return format!("{nanos}ns");
    }
    if nanos < 1_000_000 {
        return format!("{}µs", decimal(nanos, 1_000, 3));
    }
    if nanos < 1_000_000_000 {
        return format!("{}ms", decimal(nanos, 1_000_000, 6));
    }

    let secs = duration.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    out.push_str(&decimal(nanos % 60_000_000_000, 1_000_000_000, 9));
    out.push('s');
    out
}

fn decimal(value: u128, unit: u128, digits: usize) -> String {
    let whole = value / unit;
    let fraction = value % unit;
    if fraction == 0 {
        return whole.to_string();
    }
    let fraction = format!("{fraction:0digits$}");
    format!("{whole}.{}", fraction.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_and_compound() {
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for value in ["", "5", "m5", "5 m", "1d", "-1s"] {
            assert!(
                matches!(parse_duration(value), Err(ReconcilerError::InvalidDuration(_))),
                "{value:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_rejects_out_of_range_values() {
        for value in [
            "0.999999999999999999999999999999h",
            "99999999999999999999999999999999999999h",
            "340282366920938463463374607431768211455ns1ns",
            "9999999999999999999999s",
        ] {
            assert!(
                matches!(parse_duration(value), Err(ReconcilerError::InvalidDuration(_))),
                "{value:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_fractions_below_a_nanosecond_are_dropped() {
        assert_eq!(parse_duration("1.0000000001s").unwrap(), Duration::from_secs(1));
        assert_eq!(parse_duration("0.5h").unwrap(), Duration::from_secs(1800));
    }

    #[test]
    fn test_format() {
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_duration(Duration::from_millis(150)), "150ms");
        assert_eq!(format_duration(Duration::from_micros(1500)), "1.5ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(120)), "2m0s");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1h2m3s");
    }
}
