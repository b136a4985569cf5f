use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Markers that read as a missing cell. The empty field is null already.
pub const NULL_MARKERS: [&str; 5] = ["NA", "N/A", "NaN", "nan", "null"];

/// Parse a date-like cell. Accepts full timestamps, plain dates and a bare
/// four-digit year, which maps to 1 January of that year.
pub fn parse_date(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }

    if s.len() == 4 && s.chars().all(|c| c.is_ascii_digit()) {
        return year_start(s.parse().ok()?);
    }

    None
}

/// Midnight on 1 January of `year`.
pub fn year_start(year: i32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, 1, 1)?.and_hms_opt(0, 0, 0)
}

/// Naive timestamp of a `Datetime(us)` physical value.
pub fn from_micros(us: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_micros(us).map(|dt| dt.naive_utc())
}

/// Day number in the proleptic Gregorian calendar, 0001-01-01 being day 1.
pub fn date_ordinal(dt: &NaiveDateTime) -> i64 {
    dt.date().num_days_from_ce() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_date_variants() {
        let d = parse_date("2024-03-05").unwrap();
        assert_eq!(d.date(), NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());

        let dt = parse_date("2024-03-05 14:30:00").unwrap();
        assert_eq!(dt.hour(), 14);

        let iso = parse_date("2024-03-05T06:00:00.250").unwrap();
        assert_eq!(iso.hour(), 6);

        let year = parse_date("2021").unwrap();
        assert_eq!(year.date(), NaiveDate::from_ymd_opt(2021, 1, 1).unwrap());

        assert!(parse_date("not a date").is_none());
        assert!(parse_date("").is_none());
    }

    #[test]
    fn test_date_ordinal_matches_proleptic_day_count() {
        let first = parse_date("0001-01-01").unwrap();
        assert_eq!(date_ordinal(&first), 1);

        let a = parse_date("2024-01-01").unwrap();
        let b = parse_date("2024-01-31 23:00:00").unwrap();
        assert_eq!(date_ordinal(&b) - date_ordinal(&a), 30);
    }

    #[test]
    fn test_from_micros() {
        let dt = parse_date("2024-06-01 08:15:00").unwrap();
        assert_eq!(from_micros(dt.and_utc().timestamp_micros()), Some(dt));
        assert_eq!(from_micros(0), parse_date("1970-01-01"));
    }
}
