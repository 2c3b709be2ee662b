use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// seed for every deterministic sampling/shuffling operation, so repeated
/// runs over the same inputs produce the same partial results.
pub const DEFAULT_SAMPLE_SEED: u64 = 42;

const DATE_FORMATS: [&str; 8] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d.%m.%Y",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d, %Y",
];

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y%m%dT%H%M%S",
];

/// parses a single date value in any of the recognized formats, truncating
/// time-of-day where present. returns None for unrecognizable input.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.date());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date);
        }
    }

    // compact and partial ISO forms need length checks to avoid ambiguity
    if value.len() == 8 && value.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(date) = NaiveDate::parse_from_str(value, "%Y%m%d") {
            return Some(date);
        }
    }
    if value.len() == 7 {
        if let Ok(date) = NaiveDate::parse_from_str(&format!("{}-01", value), "%Y-%m-%d") {
            return Some(date);
        }
    }
    if value.len() == 4 && value.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(date) = NaiveDate::parse_from_str(&format!("{}-01-01", value), "%Y-%m-%d") {
            return Some(date);
        }
    }

    None
}

/// parses a column of date values, optionally sampling `num_sample` rows
/// first (seeded shuffle, so results are reproducible). unparseable cells
/// are skipped; None when nothing parses.
pub fn parse_dates(values: &[String], num_sample: Option<usize>, seed: u64) -> Option<Vec<NaiveDate>> {
    let sampled: Vec<&String> = match num_sample {
        Some(n) if n < values.len() => {
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            let mut refs: Vec<&String> = values.iter().collect();
            refs.shuffle(&mut rng);
            refs.truncate(n);
            refs
        }
        _ => values.iter().collect(),
    };

    let parsed: Vec<NaiveDate> = sampled.iter().filter_map(|v| parse_date(v)).collect();
    if parsed.is_empty() {
        None
    } else {
        Some(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_common_formats() {
        let expected = NaiveDate::from_ymd_opt(2017, 8, 1).unwrap();
        for raw in [
            "2017-08-01",
            "2017/08/01",
            "01.08.2017",
            "2017-08-01T12:30:00",
            "2017-08-01 12:30:00",
            "2017-08-01T12:30:00+02:00",
            "20170801",
        ] {
            assert_eq!(parse_date(raw), Some(expected), "failed for {}", raw);
        }
    }

    #[test]
    fn partial_dates_snap_to_period_start() {
        assert_eq!(
            parse_date("2017-08"),
            Some(NaiveDate::from_ymd_opt(2017, 8, 1).unwrap())
        );
        assert_eq!(
            parse_date("2017"),
            Some(NaiveDate::from_ymd_opt(2017, 1, 1).unwrap())
        );
    }

    #[test]
    fn garbage_yields_none() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("not a date"), None);
        assert_eq!(parse_date("123"), None);
    }

    #[test]
    fn sampling_is_deterministic() {
        let values: Vec<String> = (1..=28).map(|d| format!("2019-03-{:02}", d)).collect();
        let a = parse_dates(&values, Some(5), DEFAULT_SAMPLE_SEED).unwrap();
        let b = parse_dates(&values, Some(5), DEFAULT_SAMPLE_SEED).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
    }

    #[test]
    fn unparseable_cells_are_skipped() {
        let values = vec![
            String::from("2019-01-01"),
            String::from("n/a"),
            String::from("2019-12-31"),
        ];
        let parsed = parse_dates(&values, None, DEFAULT_SAMPLE_SEED).unwrap();
        assert_eq!(parsed.len(), 2);
        let all_garbage = vec![String::from("x"), String::from("y")];
        assert!(parse_dates(&all_garbage, None, DEFAULT_SAMPLE_SEED).is_none());
    }
}
