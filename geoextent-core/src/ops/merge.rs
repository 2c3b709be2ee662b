use crate::model::{Bbox, Extent, Tbox};
use geo::{ConvexHull, MultiPoint, Point};
use std::collections::BTreeMap;

/// component-wise envelope over a set of boxes. boxes failing the WGS84
/// range check are dropped silently; the merge is commutative and
/// associative so iteration order does not matter.
pub fn bbox_union<'a, I>(boxes: I) -> Option<Bbox>
where
    I: IntoIterator<Item = &'a Bbox>,
{
    boxes
        .into_iter()
        .filter(|b| b.is_valid_wgs84())
        .fold(None, |acc, b| match acc {
            None => Some(*b),
            Some(prev) => Some(prev.union(b)),
        })
}

/// min/max over a set of temporal intervals.
pub fn tbox_union<'a, I>(intervals: I) -> Option<Tbox>
where
    I: IntoIterator<Item = &'a Tbox>,
{
    intervals.into_iter().fold(None, |acc, t| match acc {
        None => Some(*t),
        Some(prev) => Some(prev.union(t)),
    })
}

/// envelope over every bbox found in a detail map, descending into nested
/// directory entries. entries without a bbox contribute nothing.
pub fn details_bbox_union(details: &BTreeMap<String, Option<Extent>>) -> Option<Bbox> {
    let boxes: Vec<Bbox> = collect_bboxes(details);
    bbox_union(boxes.iter())
}

/// min/max over every tbox found in a detail map, descending into nested
/// directory entries.
pub fn details_tbox_union(details: &BTreeMap<String, Option<Extent>>) -> Option<Tbox> {
    let intervals: Vec<Tbox> = collect_tboxes(details);
    tbox_union(intervals.iter())
}

fn collect_bboxes(details: &BTreeMap<String, Option<Extent>>) -> Vec<Bbox> {
    let mut result = vec![];
    for extent in details.values().flatten() {
        if let Some(bbox) = &extent.bbox {
            result.push(*bbox);
        } else if let Some(nested) = &extent.details {
            result.extend(collect_bboxes(nested));
        }
    }
    result
}

fn collect_tboxes(details: &BTreeMap<String, Option<Extent>>) -> Vec<Tbox> {
    let mut result = vec![];
    for extent in details.values().flatten() {
        if let Some(tbox) = &extent.tbox {
            result.push(*tbox);
        } else if let Some(nested) = &extent.details {
            result.extend(collect_tboxes(nested));
        }
    }
    result
}

/// convex hull over a set of (lon, lat) points, returned as a closed
/// exterior ring. None for degenerate input (fewer than three distinct
/// points, or all collinear); callers fall back to the bbox union.
pub fn hull_of_points(points: &[(f64, f64)]) -> Option<Vec<(f64, f64)>> {
    if points.len() < 3 {
        return None;
    }
    let multi: MultiPoint<f64> = points
        .iter()
        .map(|(x, y)| Point::new(*x, *y))
        .collect::<Vec<_>>()
        .into();
    let hull = multi.convex_hull();
    let ring: Vec<(f64, f64)> = hull.exterior().coords().map(|c| (c.x, c.y)).collect();
    // a closed triangle has four coordinates; anything shorter is collinear
    if ring.len() < 4 {
        return None;
    }
    Some(ring)
}

/// hull contribution of one detail map: per-file hull coordinates where
/// present, envelope corners otherwise. used to seed [`hull_of_points`]
/// for the directory-level merge.
pub fn collect_hull_points(details: &BTreeMap<String, Option<Extent>>) -> Vec<(f64, f64)> {
    let mut points = vec![];
    for extent in details.values().flatten() {
        if let Some(coords) = &extent.hull_coords {
            points.extend(coords.iter().copied());
        } else if let Some(bbox) = &extent.bbox {
            if bbox.is_valid_wgs84() {
                points.extend(bbox.ring());
            }
        } else if let Some(nested) = &extent.details {
            points.extend(collect_hull_points(nested));
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn extent_with_bbox(format: &str, bbox: Bbox) -> Extent {
        let mut e = Extent::new(format);
        e.bbox = Some(bbox);
        e
    }

    #[test]
    fn union_drops_invalid_boxes() {
        let good = Bbox::new(41.3, 2.0, 52.0, 7.6);
        let bad = Bbox::new(500.0, 2.0, 501.0, 7.6);
        assert_eq!(bbox_union([&good, &bad]), Some(good));
        assert_eq!(bbox_union([&bad]), None);
    }

    #[test]
    fn details_union_descends_into_subdirectories() {
        let inner_bbox = Bbox::new(41.317, 2.052, 41.468, 2.228);
        let mut inner_details = BTreeMap::new();
        inner_details.insert(
            String::from("barcelona.geojson"),
            Some(extent_with_bbox("geojson", inner_bbox)),
        );
        let mut subdir = Extent::new("folder");
        subdir.details = Some(inner_details);

        let mut details = BTreeMap::new();
        details.insert(
            String::from("muenster.geojson"),
            Some(extent_with_bbox(
                "geojson",
                Bbox::new(51.949, 7.602, 51.975, 7.647),
            )),
        );
        details.insert(String::from("spain"), Some(subdir));
        details.insert(String::from("readme.md"), None);

        let merged = details_bbox_union(&details).unwrap();
        assert_eq!(merged, Bbox::new(41.317, 2.052, 51.975, 7.647));
    }

    #[test]
    fn tbox_merge_over_details() {
        let mut a = Extent::new("geojson");
        a.tbox = Some(Tbox::instant(
            NaiveDate::from_ymd_opt(2018, 11, 14).unwrap(),
        ));
        let mut b = Extent::new("geojson");
        b.tbox = Some(Tbox::instant(NaiveDate::from_ymd_opt(2019, 9, 11).unwrap()));
        let mut details = BTreeMap::new();
        details.insert(String::from("a.geojson"), Some(a));
        details.insert(String::from("b.geojson"), Some(b));
        let merged = details_tbox_union(&details).unwrap();
        assert_eq!(merged.to_pair(), ["2018-11-14", "2019-09-11"]);
    }

    #[test]
    fn hull_needs_non_collinear_points() {
        assert!(hull_of_points(&[(0.0, 0.0), (1.0, 1.0)]).is_none());
        assert!(hull_of_points(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]).is_none());
        let hull = hull_of_points(&[(0.0, 0.0), (4.0, 0.0), (4.0, 3.0), (0.0, 3.0), (2.0, 1.0)])
            .unwrap();
        // interior point must not survive on the hull
        assert!(!hull.contains(&(2.0, 1.0)));
        assert_eq!(hull.first(), hull.last());
    }
}
