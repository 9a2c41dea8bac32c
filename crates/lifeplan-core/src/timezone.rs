//! Date/time normalization into the configured source zone.
//!
//! Model output and user input express times in one fixed zone (the
//! deployment's zone, not the host's). Every normalized value carries the
//! local rendering, the UTC rendering and the zone name.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::clock::Clock;

/// A date/time expression resolved to a single instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedDateTime {
    /// RFC 3339 in the source zone, e.g. `2026-10-17T17:00:00+05:30`.
    pub local: String,
    /// RFC 3339 in UTC with a `Z` suffix.
    pub utc: String,
    /// IANA name of the source zone.
    pub timezone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot parse date/time {input:?} in {timezone}")]
pub struct DateParseError {
    pub input: String,
    pub timezone: String,
}

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse `expr` as a local time in `tz`.
///
/// Accepted forms: RFC 3339 with an explicit offset (converted into `tz`),
/// a naive date-time with or without seconds, or a bare date (midnight).
/// Local times that do not exist in `tz` (DST gaps) are rejected;
/// ambiguous ones resolve to the earlier instant.
pub fn normalize(expr: &str, tz: Tz) -> Result<NormalizedDateTime, DateParseError> {
    let local = parse_local(expr.trim(), tz).ok_or_else(|| DateParseError {
        input: expr.to_owned(),
        timezone: tz.name().to_owned(),
    })?;
    Ok(from_local(local))
}

/// Render an instant already in the source zone.
pub fn from_local(local: DateTime<Tz>) -> NormalizedDateTime {
    NormalizedDateTime {
        local: local.to_rfc3339_opts(SecondsFormat::Secs, false),
        utc: local
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        timezone: local.timezone().name().to_owned(),
    }
}

/// "Now" in the source zone.
pub fn now_in(tz: Tz, clock: &dyn Clock) -> DateTime<Tz> {
    clock.now().with_timezone(&tz)
}

fn parse_local(expr: &str, tz: Tz) -> Option<DateTime<Tz>> {
    if expr.is_empty() {
        return None;
    }
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(expr) {
        return Some(with_offset.with_timezone(&tz));
    }
    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(expr, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(expr, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })?;
    tz.from_local_datetime(&naive).earliest()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Asia::Kolkata;
    use chrono_tz::America::New_York;

    #[test]
    fn naive_local_time_shifts_by_zone_offset() {
        let n = normalize("2026-10-17T17:00:00", Kolkata).unwrap();
        assert_eq!(n.local, "2026-10-17T17:00:00+05:30");
        assert_eq!(n.utc, "2026-10-17T11:30:00Z");
        assert_eq!(n.timezone, "Asia/Kolkata");
    }

    #[test]
    fn local_and_utc_reparse_to_same_instant() {
        let n = normalize("2026-12-31 23:59", Kolkata).unwrap();
        let local = DateTime::parse_from_rfc3339(&n.local).unwrap();
        let utc = DateTime::parse_from_rfc3339(&n.utc).unwrap();
        assert_eq!(local, utc);
        assert_eq!(
            local.with_timezone(&Utc) - Utc.with_ymd_and_hms(2026, 12, 31, 18, 29, 0).unwrap(),
            chrono::Duration::zero()
        );
    }

    #[test]
    fn bare_date_is_local_midnight() {
        let n = normalize("2026-10-20", Kolkata).unwrap();
        assert_eq!(n.local, "2026-10-20T00:00:00+05:30");
        assert_eq!(n.utc, "2026-10-19T18:30:00Z");
    }

    #[test]
    fn explicit_offset_is_respected() {
        let n = normalize("2026-10-17T09:00:00Z", Kolkata).unwrap();
        assert_eq!(n.utc, "2026-10-17T09:00:00Z");
        assert_eq!(n.local, "2026-10-17T14:30:00+05:30");
    }

    #[test]
    fn unparseable_input_is_an_error() {
        let err = normalize("next tuesday-ish", Kolkata).unwrap_err();
        assert_eq!(err.input, "next tuesday-ish");
        assert!(normalize("", Kolkata).is_err());
    }

    #[test]
    fn dst_gap_is_rejected() {
        // 02:30 on the spring-forward day does not exist in New York.
        assert!(normalize("2026-03-08T02:30:00", New_York).is_err());
    }

    #[test]
    fn now_uses_source_zone_not_host() {
        let clock = crate::clock::FixedClock(Utc.with_ymd_and_hms(2026, 10, 16, 20, 0, 0).unwrap());
        let now = now_in(Kolkata, &clock);
        // 20:00 UTC is already the next day in Kolkata.
        assert_eq!(now.date_naive(), NaiveDate::from_ymd_opt(2026, 10, 17).unwrap());
    }
}
