use crate::ops::{archive, extract};
use geoextent_core::error::Result;
use geoextent_core::model::{Extent, WalkOptions, WGS84_EPSG};
use geoextent_core::ops::merge;
use kdam::BarExt;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

/// seed for the pre-walk shuffle under a timeout; fixed so partial results
/// are reproducible.
const TIMEOUT_SHUFFLE_SEED: u64 = 0;

/// walks a directory or archive, extracts every supported file, and merges
/// the per-file extents into one aggregate. per-file failures become null
/// entries in the detail map and never abort the walk.
pub fn from_directory(path: &Path, opts: &WalkOptions) -> Result<Extent> {
    opts.extract.validate()?;
    log::info!(
        "extracting bbox={} tbox={} convex_hull={} from directory {}",
        opts.extract.bbox,
        opts.extract.tbox,
        opts.extract.convex_hull,
        path.display()
    );

    let deadline = opts.timeout.map(|t| Instant::now() + t);
    let mut extent = walk(path, opts, deadline, 0)?;
    if !opts.details {
        extent.details = None;
    }
    Ok(extent)
}

fn walk(path: &Path, opts: &WalkOptions, deadline: Option<Instant>, level: usize) -> Result<Extent> {
    // an archive at the entry point is unpacked to scratch and walked as a
    // folder, but reported with format "archive"
    let mut scratch_guard = None;
    let (walk_path, format) = if archive::is_archive(path) {
        log::info!("inspecting archive {}", path.display());
        let scratch = tempfile::tempdir()?;
        let extracted = archive::extract_archive(path, scratch.path())?;
        scratch_guard = Some(scratch);
        (extracted, "archive")
    } else {
        (path.to_path_buf(), "folder")
    };

    let mut entries: Vec<std::path::PathBuf> = std::fs::read_dir(&walk_path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();
    if deadline.is_some() {
        // shuffled iteration keeps partial results representative instead of
        // alphabetically biased
        let mut rng = rand::rngs::StdRng::seed_from_u64(TIMEOUT_SHUFFLE_SEED);
        entries.shuffle(&mut rng);
    }

    let mut progress = if opts.extract.show_progress && level == 0 {
        let name = walk_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("root");
        kdam::BarBuilder::default()
            .total(entries.len())
            .desc(format!("processing directory {}", name))
            .build()
            .ok()
    } else {
        None
    };

    let mut details: BTreeMap<String, Option<Extent>> = BTreeMap::new();
    let mut timed_out = false;

    for entry_path in entries {
        if let Some(deadline) = deadline {
            if Instant::now() > deadline {
                if level == 0 {
                    log::warn!(
                        "timeout reached in {}, returning partial results",
                        path.display()
                    );
                }
                timed_out = true;
                break;
            }
        }

        let name = entry_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        log::debug!("inspecting {}", entry_path.display());

        let entry_result = if entry_path.is_dir() || archive::is_archive(&entry_path) {
            if opts.recursive {
                match walk(&entry_path, opts, deadline, level + 1) {
                    Ok(sub) => Some(sub),
                    Err(e) => {
                        log::warn!("failed to process {}: {}", entry_path.display(), e);
                        None
                    }
                }
            } else {
                log::debug!(
                    "skipping {} (recursive=false)",
                    entry_path.display()
                );
                if let Some(bar) = progress.as_mut() {
                    let _ = bar.update(1);
                }
                continue;
            }
        } else {
            match extract::from_file(&entry_path, &file_opts(opts)) {
                Ok(result) => result,
                Err(e) => {
                    log::warn!("failed to process {}: {}", entry_path.display(), e);
                    None
                }
            }
        };
        details.insert(name, entry_result);

        if let Some(bar) = progress.as_mut() {
            let _ = bar.update(1);
        }
    }
    if progress.is_some() {
        eprintln!(); // terminate progress bar
    }
    drop(scratch_guard);

    let mut extent = Extent::new(format);

    if opts.extract.bbox {
        merge_spatial(&mut extent, &details, opts, path);
    }
    if opts.extract.tbox {
        match merge::details_tbox_union(&details) {
            Some(tbox) => extent.tbox = Some(tbox),
            None => log::warn!(
                "the {} {} has no identifiable time extent",
                format,
                path.display()
            ),
        }
    }

    extent.details = Some(details);
    if timed_out && level == 0 {
        extent.timeout = opts.timeout.map(|t| t.as_secs());
    }
    Ok(extent)
}

/// bbox union, or convex-hull merge with bbox-union fallback when the hull
/// is degenerate.
fn merge_spatial(
    extent: &mut Extent,
    details: &BTreeMap<String, Option<Extent>>,
    opts: &WalkOptions,
    path: &Path,
) {
    if opts.extract.convex_hull {
        let points = merge::collect_hull_points(details);
        if let Some(ring) = merge::hull_of_points(&points) {
            if let Some(bbox) = geoextent_core::model::Bbox::from_points(ring.iter().copied()) {
                extent.bbox = Some(bbox);
                extent.crs = Some(WGS84_EPSG.to_string());
                extent.hull_coords = Some(ring);
                extent.convex_hull = true;
                return;
            }
        }
        log::warn!(
            "convex hull calculation failed for {} (insufficient or collinear points), \
             falling back to bounding box",
            path.display()
        );
    }

    match merge::details_bbox_union(details) {
        Some(bbox) if bbox.is_valid_wgs84() => {
            extent.bbox = Some(bbox);
            extent.crs = Some(WGS84_EPSG.to_string());
        }
        _ => log::warn!(
            "the directory {} has no identifiable bounding box, \
             coordinate reference system may be missing",
            path.display()
        ),
    }
}

fn file_opts(opts: &WalkOptions) -> geoextent_core::model::ExtractOptions {
    geoextent_core::model::ExtractOptions {
        // nested progress bars would garble the top-level one
        show_progress: false,
        ..opts.extract
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoextent_core::model::ExtractOptions;

    fn quiet_opts() -> WalkOptions {
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

    #[test]
    fn empty_directory_yields_folder_without_extents() {
        let dir = tempfile::tempdir().unwrap();
        let extent = from_directory(dir.path(), &quiet_opts()).unwrap();
        assert_eq!(extent.format, "folder");
        assert!(extent.bbox.is_none());
        assert!(extent.tbox.is_none());
        assert!(extent.details.unwrap().is_empty());
    }

    #[test]
    fn unsupported_files_become_null_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "just text, no table\n").unwrap();
        let extent = from_directory(dir.path(), &quiet_opts()).unwrap();
        let details = extent.details.unwrap();
        assert!(details.contains_key("notes.txt"));
        assert!(details.get("notes.txt").unwrap().is_none());
    }

    #[test]
    fn non_recursive_walk_skips_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/notes.txt"), "x\n").unwrap();
        let mut opts = quiet_opts();
        opts.recursive = false;
        let extent = from_directory(dir.path(), &opts).unwrap();
        assert!(extent.details.unwrap().is_empty());
    }
}
