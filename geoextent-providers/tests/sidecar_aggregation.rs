use geoextent_core::model::{ExtractOptions, WalkOptions};
use geoextent_providers::provider::sidecar::{write_sidecar, SidecarContent};

fn quiet_walk() -> WalkOptions {
    WalkOptions {
        extract: ExtractOptions {
            show_progress: false,
            ..Default::default()
        },
        details: true,
        timeout: None,
        recursive: true,
    }
}

/// a metadata sidecar written by a provider must be readable by the
/// directory aggregator like any other vector file.
#[test]
fn sidecar_flows_through_the_aggregator() {
    let dir = tempfile::tempdir().unwrap();

    let mut content = SidecarContent::new("Wikidata", "Q64");
    content.title = Some(String::from("Berlin"));
    content.geometries = vec![SidecarContent::bbox_geometry(52.33, 13.08, 52.68, 13.77)];
    content.temporal = Some((String::from("2014-08-21"), String::from("2020-09-30")));
    let path = write_sidecar(dir.path(), "wikidata", &content)
        .unwrap()
        .expect("sidecar written");
    assert!(path.exists());

    let extent = geoextent_handlers::from_directory(dir.path(), &quiet_walk()).unwrap();
    assert_eq!(extent.format, "folder");

    let bbox = extent.bbox.expect("bbox aggregated from sidecar");
    assert!((bbox.min_lat - 52.33).abs() < 1e-6);
    assert!((bbox.min_lon - 13.08).abs() < 1e-6);
    assert!((bbox.max_lat - 52.68).abs() < 1e-6);
    assert!((bbox.max_lon - 13.77).abs() < 1e-6);

    let tbox = extent.tbox.expect("tbox from sidecar properties");
    assert_eq!(tbox.to_pair(), ["2014-08-21", "2020-09-30"]);
}

/// a temporal-only sidecar (null geometry) contributes no bbox but keeps
/// its interval.
#[test]
fn temporal_only_sidecar_contributes_only_a_tbox() {
    let dir = tempfile::tempdir().unwrap();

    let mut content = SidecarContent::new("DEIMS-SDR", "site-1");
    content.temporal = Some((String::from("2015-01-01"), String::from("2016-12-31")));
    write_sidecar(dir.path(), "deims", &content)
        .unwrap()
        .expect("sidecar written");

    let extent = geoextent_handlers::from_directory(dir.path(), &quiet_walk()).unwrap();
    assert!(extent.bbox.is_none());
    let tbox = extent.tbox.expect("tbox extracted");
    assert_eq!(tbox.to_pair(), ["2015-01-01", "2016-12-31"]);
}
