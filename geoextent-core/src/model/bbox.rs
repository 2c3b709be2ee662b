use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// axis-aligned bounding box in geographic coordinates. the internal field
/// layout is fixed; array order is only decided at the output boundary
/// (native lat/lon order, or legacy lon/lat order via [`Bbox::to_array`]).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bbox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl Bbox {
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Bbox {
        Bbox {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }

    /// builds a box from any two opposing corners given as (lon, lat) pairs,
    /// normalizing min/max per axis.
    pub fn from_corners(a: (f64, f64), b: (f64, f64)) -> Bbox {
        Bbox {
            min_lat: a.1.min(b.1),
            min_lon: a.0.min(b.0),
            max_lat: a.1.max(b.1),
            max_lon: a.0.max(b.0),
        }
    }

    /// envelope of a set of (lon, lat) points. None for an empty set.
    pub fn from_points<I>(points: I) -> Option<Bbox>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut result: Option<Bbox> = None;
        for (lon, lat) in points {
            result = Some(match result {
                None => Bbox::new(lat, lon, lat, lon),
                Some(b) => b.union(&Bbox::new(lat, lon, lat, lon)),
            });
        }
        result
    }

    /// a degenerate box covering a single point.
    pub fn point(lat: f64, lon: f64) -> Bbox {
        Bbox::new(lat, lon, lat, lon)
    }

    /// component-wise envelope of two boxes.
    pub fn union(&self, other: &Bbox) -> Bbox {
        Bbox {
            min_lat: self.min_lat.min(other.min_lat),
            min_lon: self.min_lon.min(other.min_lon),
            max_lat: self.max_lat.max(other.max_lat),
            max_lon: self.max_lon.max(other.max_lon),
        }
    }

    pub fn contains(&self, other: &Bbox) -> bool {
        self.min_lat <= other.min_lat
            && self.min_lon <= other.min_lon
            && self.max_lat >= other.max_lat
            && self.max_lon >= other.max_lon
    }

    /// checks latitude within [-90, 90], longitude within [-180, 180] and
    /// min <= max on both axes. every emitted bbox must pass this.
    pub fn is_valid_wgs84(&self) -> bool {
        self.min_lat >= -90.0
            && self.max_lat <= 90.0
            && self.min_lon >= -180.0
            && self.max_lon <= 180.0
            && self.min_lat <= self.max_lat
            && self.min_lon <= self.max_lon
            && [self.min_lat, self.min_lon, self.max_lat, self.max_lon]
                .iter()
                .all(|v| v.is_finite())
    }

    /// swaps the latitude and longitude components. covers datasets written
    /// with the axis-order convention reversed; callers re-validate the
    /// result and drop the box if it still fails.
    pub fn flipped(&self) -> Bbox {
        Bbox {
            min_lat: self.min_lon,
            min_lon: self.min_lat,
            max_lat: self.max_lon,
            max_lon: self.max_lat,
        }
    }

    /// corner ring as (lon, lat) pairs, closed, counter-clockwise from the
    /// south-west corner.
    pub fn ring(&self) -> Vec<(f64, f64)> {
        vec![
            (self.min_lon, self.min_lat),
            (self.max_lon, self.min_lat),
            (self.max_lon, self.max_lat),
            (self.min_lon, self.max_lat),
            (self.min_lon, self.min_lat),
        ]
    }

    /// output array order: native `[minLat, minLon, maxLat, maxLon]`, or
    /// `[minLon, minLat, maxLon, maxLat]` when `legacy` is set.
    pub fn to_array(&self, legacy: bool) -> [f64; 4] {
        if legacy {
            [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
        } else {
            [self.min_lat, self.min_lon, self.max_lat, self.max_lon]
        }
    }
}

impl Display for Bbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.min_lat, self.min_lon, self.max_lat, self.max_lon
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_is_componentwise_envelope() {
        let muenster = Bbox::new(51.949, 7.602, 51.975, 7.647);
        let barcelona = Bbox::new(41.317, 2.052, 41.468, 2.228);
        let agg = muenster.union(&barcelona);
        assert_eq!(agg, Bbox::new(41.317, 2.052, 51.975, 7.647));
        assert_eq!(agg, barcelona.union(&muenster));
    }

    #[test]
    fn validation_rejects_out_of_range() {
        assert!(Bbox::new(51.0, 7.0, 52.0, 8.0).is_valid_wgs84());
        assert!(!Bbox::new(7.0, 251.0, 8.0, 252.0).is_valid_wgs84());
        assert!(!Bbox::new(52.0, 7.0, 51.0, 8.0).is_valid_wgs84());
        assert!(!Bbox::new(f64::NAN, 7.0, 52.0, 8.0).is_valid_wgs84());
    }

    #[test]
    fn flip_recovers_swapped_axis_order() {
        // latitude 95 is impossible; the flipped box is a valid German extent
        let swapped = Bbox::new(7.0, 51.0, 9.0, 53.0);
        assert!(swapped.is_valid_wgs84());
        let impossible = Bbox::new(95.0, 51.0, 97.0, 53.0);
        assert!(!impossible.is_valid_wgs84());
        assert!(impossible.flipped().is_valid_wgs84());
    }

    #[test]
    fn array_order_native_vs_legacy() {
        let b = Bbox::new(51.0, 7.0, 52.0, 8.0);
        assert_eq!(b.to_array(false), [51.0, 7.0, 52.0, 8.0]);
        assert_eq!(b.to_array(true), [7.0, 51.0, 8.0, 52.0]);
    }

    #[test]
    fn from_points_envelope() {
        let b = Bbox::from_points(vec![(7.6, 51.9), (7.65, 51.97), (7.62, 51.95)]).unwrap();
        assert_eq!(b, Bbox::new(51.9, 7.6, 51.97, 7.65));
        assert!(Bbox::from_points(std::iter::empty()).is_none());
    }
}
