//! Local time conversion for imported schedules.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

const FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Interpret a local date-time string in the given IANA timezone and convert
/// it to UTC. Blank input, an unparseable value or an unknown zone all yield
/// `None`; the importer keeps such times absent rather than failing the row.
pub fn local_time_to_utc(value: &str, tz_name: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let tz: Tz = tz_name.parse().ok()?;
    let naive = FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(trimmed, f).ok())?;
    // DST gaps yield None, ambiguous times take the earlier instant.
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_summer_time_to_utc() {
        let utc = local_time_to_utc("2024-07-20 23:30", "Europe/Amsterdam").unwrap();
        assert_eq!(utc.naive_utc().to_string(), "2024-07-20 21:30:00");
    }

    #[test]
    fn converts_winter_time_to_utc() {
        let utc = local_time_to_utc("2024-01-20T23:30", "Europe/Amsterdam").unwrap();
        assert_eq!(utc.naive_utc().to_string(), "2024-01-20 22:30:00");
    }

    #[test]
    fn accepts_seconds() {
        let utc = local_time_to_utc("2024-07-20 23:30:15", "UTC").unwrap();
        assert_eq!(utc.naive_utc().to_string(), "2024-07-20 23:30:15");
    }

    #[test]
    fn blank_stays_absent() {
        assert!(local_time_to_utc("", "Europe/Amsterdam").is_none());
        assert!(local_time_to_utc("   ", "Europe/Amsterdam").is_none());
    }

    #[test]
    fn unknown_zone_yields_none() {
        assert!(local_time_to_utc("2024-07-20 23:30", "Mars/Olympus").is_none());
    }

    #[test]
    fn garbage_yields_none() {
        assert!(local_time_to_utc("around midnight", "Europe/Amsterdam").is_none());
    }
}
