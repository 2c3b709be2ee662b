use geoextent_core::model::{ExtractOptions, WalkOptions};
use geoextent_handlers::{from_directory, from_file};
use std::path::Path;

fn quiet() -> ExtractOptions {
    ExtractOptions {
        show_progress: false,
        ..Default::default()
    }
}

fn write_cities_csv(path: &Path) {
    std::fs::write(
        path,
        "place,Longitude,Latitude,TIME_DATE\n\
         vlissingen,4.318,51.434,2017-08-01\n\
         groningen,6.575,53.217,2018-05-10\n\
         nijmegen,5.868,51.842,2019-09-30\n",
    )
    .unwrap();
}

fn write_polygon_geojson(path: &Path, ring: &[[f64; 2]], timestamp: &str) {
    let feature = serde_json::json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": { "timestamp": timestamp },
            "geometry": {
                "type": "Polygon",
                "coordinates": [ring],
            },
        }],
    });
    std::fs::write(path, serde_json::to_string(&feature).unwrap()).unwrap();
}

fn muenster_ring() -> Vec<[f64; 2]> {
    vec![
        [7.602, 51.949],
        [7.647, 51.949],
        [7.647, 51.975],
        [7.602, 51.975],
        [7.602, 51.949],
    ]
}

fn barcelona_ring() -> Vec<[f64; 2]> {
    vec![
        [2.052, 41.317],
        [2.228, 41.317],
        [2.228, 41.468],
        [2.052, 41.468],
        [2.052, 41.317],
    ]
}

#[test]
fn csv_with_coordinate_columns() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cities.csv");
    write_cities_csv(&path);

    let extent = from_file(&path, &quiet()).unwrap().expect("csv supported");
    assert_eq!(extent.format, "csv");
    assert_eq!(extent.crs.as_deref(), Some("4326"));

    let bbox = extent.bbox.expect("bbox extracted");
    assert!((bbox.min_lat - 51.434).abs() < 1e-6);
    assert!((bbox.min_lon - 4.318).abs() < 1e-6);
    assert!((bbox.max_lat - 53.217).abs() < 1e-6);
    assert!((bbox.max_lon - 6.575).abs() < 1e-6);

    let tbox = extent.tbox.expect("tbox extracted");
    assert_eq!(tbox.to_pair(), ["2017-08-01", "2019-09-30"]);
}

#[test]
fn geojson_polygon_with_timestamps() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("muenster_ring.geojson");
    write_polygon_geojson(&path, &muenster_ring(), "2018-11-14");

    let extent = from_file(&path, &quiet()).unwrap().expect("geojson supported");
    assert_eq!(extent.format, "geojson");
    assert_eq!(extent.crs.as_deref(), Some("4326"));

    let bbox = extent.bbox.expect("bbox extracted");
    assert!((bbox.min_lat - 51.949).abs() < 1e-3);
    assert!((bbox.min_lon - 7.602).abs() < 1e-3);
    assert!((bbox.max_lat - 51.975).abs() < 1e-3);
    assert!((bbox.max_lon - 7.647).abs() < 1e-3);

    let tbox = extent.tbox.expect("tbox extracted");
    assert_eq!(tbox.to_pair(), ["2018-11-14", "2018-11-14"]);
}

#[test]
fn directory_merges_two_countries() {
    let dir = tempfile::tempdir().unwrap();
    write_polygon_geojson(
        &dir.path().join("muenster.geojson"),
        &muenster_ring(),
        "2018-11-14",
    );
    write_polygon_geojson(
        &dir.path().join("barcelona.geojson"),
        &barcelona_ring(),
        "2019-09-11",
    );

    let opts = WalkOptions {
        extract: quiet(),
        details: true,
        timeout: None,
        recursive: true,
    };
    let extent = from_directory(dir.path(), &opts).unwrap();
    assert_eq!(extent.format, "folder");

    let bbox = extent.bbox.expect("merged bbox");
    assert!((bbox.min_lat - 41.317).abs() < 1e-3);
    assert!((bbox.min_lon - 2.052).abs() < 1e-3);
    assert!((bbox.max_lat - 51.975).abs() < 1e-3);
    assert!((bbox.max_lon - 7.647).abs() < 1e-3);

    let tbox = extent.tbox.expect("merged tbox");
    assert_eq!(tbox.to_pair(), ["2018-11-14", "2019-09-11"]);

    let details = extent.details.expect("details requested");
    assert_eq!(details.len(), 2);
    assert!(details["muenster.geojson"].is_some());
    assert!(details["barcelona.geojson"].is_some());
}

#[test]
fn zip_archive_reports_archive_format() {
    use std::io::Write;

    let dir = tempfile::tempdir().unwrap();
    let archive_path = dir.path().join("data.zip");
    let file = std::fs::File::create(&archive_path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    writer
        .start_file("cities.csv", zip::write::SimpleFileOptions::default())
        .unwrap();
    writer
        .write_all(
            b"place,Longitude,Latitude,TIME_DATE\n\
              vlissingen,4.318,51.434,2017-08-01\n\
              groningen,6.575,53.217,2019-09-30\n",
        )
        .unwrap();
    writer.finish().unwrap();

    let opts = WalkOptions {
        extract: quiet(),
        details: false,
        timeout: None,
        recursive: true,
    };
    let extent = from_directory(&archive_path, &opts).unwrap();
    assert_eq!(extent.format, "archive");
    assert!(extent.bbox.is_some());
    assert!(extent.details.is_none());
}
