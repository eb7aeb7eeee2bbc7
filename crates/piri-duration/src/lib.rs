//! Canonical duration parsing and formatting.
//!
//! The config schema (spec §3, §6) needs a duration representation that
//! round-trips through a human-editable TOML document the way Go's
//! `time.Duration` does: parse `"5m"`, `"90s"`, `"1h30m"`; format back as
//! the canonical `5m0s` form. [`humantime`] parses the permissive input
//! forms; [`format_canonical`] renders the Go-style canonical string the
//! persister writes back to disk.
//!
//! # Example
//!
//! ```
//! use piri_duration::{parse, format_canonical};
//! use std::time::Duration;
//!
//! let d = parse("5m").unwrap();
//! assert_eq!(d, Duration::from_secs(300));
//! assert_eq!(format_canonical(d), "5m0s");
//! ```

use std::time::Duration;

/// Parses a human-readable duration string (`"30s"`, `"5m"`, `"1h30m"`,
/// `"90"` meaning 90 seconds for bare-integer compatibility with the
/// original Go config).
pub fn parse(raw: &str) -> anyhow::Result<Duration> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(raw).map_err(|e| anyhow::anyhow!("invalid duration {:?}: {}", raw, e))
}

/// Formats a [`Duration`] as Go's canonical `time.Duration` string:
/// hours, minutes, and seconds (with fractional seconds when present),
/// omitting leading zero units but always keeping the seconds field, e.g.
/// `5m0s`, `1h0m0s`, `0s`, `1.5s`.
pub fn format_canonical(d: Duration) -> String {
    if d.is_zero() {
        return "0s".to_string();
    }

    let total_nanos = d.as_nanos();
    let hours = total_nanos / 3_600_000_000_000;
    let rem = total_nanos % 3_600_000_000_000;
    let minutes = rem / 60_000_000_000;
    let rem = rem % 60_000_000_000;
    let seconds = rem / 1_000_000_000;
    let nanos = rem % 1_000_000_000;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    if nanos == 0 {
        out.push_str(&format!("{}s", seconds));
    } else {
        // Trim trailing zeros from the fractional part, Go-style.
        let frac = format!("{:09}", nanos);
        let frac = frac.trim_end_matches('0');
        out.push_str(&format!("{}.{}s", seconds, frac));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_seconds() {
        assert_eq!(parse("90").unwrap(), Duration::from_secs(90));
    }

    #[test]
    fn parses_humantime_forms() {
        assert_eq!(parse("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse("30s").unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("not-a-duration").is_err());
    }

    #[test]
    fn formats_canonical_go_style() {
        assert_eq!(format_canonical(Duration::from_secs(0)), "0s");
        assert_eq!(format_canonical(Duration::from_secs(5)), "5s");
        assert_eq!(format_canonical(Duration::from_secs(300)), "5m0s");
        assert_eq!(format_canonical(Duration::from_secs(3600)), "1h0m0s");
        assert_eq!(format_canonical(Duration::from_secs(5400)), "1h30m0s");
    }

    #[test]
    fn formats_fractional_seconds() {
        assert_eq!(format_canonical(Duration::from_millis(1500)), "1.5s");
    }

    #[test]
    fn round_trips_common_values() {
        for s in ["5m0s", "1h0m0s", "30s", "0s"] {
            let parsed = parse(s).unwrap();
            assert_eq!(format_canonical(parsed), s);
        }
    }

    #[cfg(test)]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn canonical_format_round_trips_through_parse(secs in 0u64..1_000_000) {
                let d = Duration::from_secs(secs);
                let formatted = format_canonical(d);
                let reparsed = parse(&formatted).unwrap();
                prop_assert_eq!(reparsed, d);
            }
        }
    }
}
