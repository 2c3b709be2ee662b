use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// temporal interval, always with start <= end. dates are calendar dates;
/// sub-day precision from source files is truncated at parse time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tbox {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Tbox {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Tbox {
        if start <= end {
            Tbox { start, end }
        } else {
            Tbox {
                start: end,
                end: start,
            }
        }
    }

    pub fn instant(date: NaiveDate) -> Tbox {
        Tbox {
            start: date,
            end: date,
        }
    }

    /// min/max of the endpoints of two intervals.
    pub fn union(&self, other: &Tbox) -> Tbox {
        Tbox {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// ISO `YYYY-MM-DD` pair for output.
    pub fn to_pair(&self) -> [String; 2] {
        [
            self.start.format("%Y-%m-%d").to_string(),
            self.end.format("%Y-%m-%d").to_string(),
        ]
    }
}

impl Display for Tbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [start, end] = self.to_pair();
        write!(f, "[{}, {}]", start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn new_normalizes_order() {
        let t = Tbox::new(d("2019-09-30"), d("2017-08-01"));
        assert_eq!(t.to_pair(), ["2017-08-01", "2019-09-30"]);
    }

    #[test]
    fn union_takes_extremes() {
        let a = Tbox::new(d("2018-11-14"), d("2018-11-14"));
        let b = Tbox::new(d("2019-09-11"), d("2019-09-11"));
        assert_eq!(a.union(&b).to_pair(), ["2018-11-14", "2019-09-11"]);
    }
}
