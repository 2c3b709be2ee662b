use crate::handler::{handler_for, FormatHandler};
use crate::ops::transform;
use geoextent_core::error::Result;
use geoextent_core::model::{Extent, ExtractOptions, SpatialExtent, WGS84_EPSG};
use std::path::Path;

/// extracts the extent of one local file, or None when no handler supports
/// it. the bbox and tbox tasks run on two scoped threads with a single
/// rendezvous; the two extractions hold disjoint cursors into the file, so
/// the parallelism shortens latency without any shared state.
pub fn from_file(path: &Path, opts: &ExtractOptions) -> Result<Option<Extent>> {
    opts.validate()?;
    log::info!(
        "extracting bbox={} tbox={} convex_hull={} from file {}",
        opts.bbox,
        opts.tbox,
        opts.convex_hull,
        path.display()
    );

    let handler = match handler_for(path) {
        Some(handler) => handler,
        None => {
            log::info!(
                "no compatible handler for file {}",
                path.display()
            );
            return Ok(None);
        }
    };
    log::info!(
        "{} handler is being used to inspect {}",
        handler.name(),
        path.display()
    );
    if opts.num_sample.is_some() && handler.name() != "csv" {
        log::warn!("num_sample parameter is ignored, it only applies to CSV files");
    }

    let (spatial, temporal) = std::thread::scope(|scope| {
        let spatial_task = scope.spawn(|| {
            if opts.bbox {
                extract_spatial(handler, path, opts)
            } else {
                Ok(None)
            }
        });
        let temporal_task = scope.spawn(|| {
            if opts.tbox {
                handler.temporal_extent(path, opts)
            } else {
                Ok(None)
            }
        });
        (join_task(spatial_task, path), join_task(temporal_task, path))
    });

    let mut extent = Extent::new(file_format(path));

    match spatial {
        Ok(Some(transformed)) => {
            extent.bbox = Some(transformed.bbox);
            extent.crs = Some(WGS84_EPSG.to_string());
            if transformed.convex_hull {
                extent.convex_hull = true;
                extent.hull_coords = transformed.hull_coords;
            }
        }
        Ok(None) => {}
        Err(e) => log::warn!("error extracting bbox from {}: {}", path.display(), e),
    }

    match temporal {
        Ok(Some(tbox)) => extent.tbox = Some(tbox),
        Ok(None) => {}
        Err(e) => log::warn!("error extracting tbox from {}: {}", path.display(), e),
    }

    log::debug!("extraction finished for {}", path.display());
    Ok(Some(extent))
}

/// handler extraction plus WGS84 transformation, range validation and the
/// flip heuristic. a convex-hull request against a handler without hull
/// support degrades to the plain bounding box.
fn extract_spatial(
    handler: &dyn FormatHandler,
    path: &Path,
    opts: &ExtractOptions,
) -> Result<Option<SpatialExtent>> {
    let raw = if opts.convex_hull {
        let hull = handler.convex_hull(path, opts)?;
        if let Some(extent) = &hull {
            if !extent.convex_hull {
                log::warn!(
                    "{} handler does not support convex hull calculation, falling back to bounding box",
                    handler.name()
                );
            }
        }
        hull
    } else {
        handler.bounding_box(path, opts)?
    };

    match raw {
        Some(raw) => transform::to_wgs84(&raw, &path.display().to_string()),
        None => Ok(None),
    }
}

fn join_task<T>(
    task: std::thread::ScopedJoinHandle<'_, Result<Option<T>>>,
    path: &Path,
) -> Result<Option<T>> {
    match task.join() {
        Ok(result) => result,
        Err(_) => {
            log::warn!("extraction thread panicked for {}", path.display());
            Ok(None)
        }
    }
}

/// output `format` value: the lowercase file extension.
pub fn file_format(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_is_lowercase_extension() {
        assert_eq!(file_format(Path::new("a/b/cities.CSV")), "csv");
        assert_eq!(file_format(Path::new("muenster.geojson")), "geojson");
        assert_eq!(file_format(Path::new("no_extension")), "");
    }

    #[test]
    fn disabled_extractions_are_a_config_error() {
        let opts = ExtractOptions {
            bbox: false,
            tbox: false,
            ..Default::default()
        };
        assert!(from_file(Path::new("anything.csv"), &opts).is_err());
    }
}
