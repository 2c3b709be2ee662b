use crate::model::{DownloadOptions, FileDescriptor, SelectionMethod, GEO_EXTENSIONS};
use geoextent_core::ops::size::format_bytes;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// outcome of the size filter: the files to download plus reporting data.
#[derive(Clone, Debug, Default)]
pub struct Selection {
    pub selected: Vec<FileDescriptor>,
    pub total_bytes: u64,
    pub skipped: usize,
}

/// selects the subset of files to download.
///
/// with `skip_nogeo`, descriptors are partitioned by extension and only the
/// geospatial partition (smallest first) goes forward. the survivors are
/// then ordered by the configured strategy and taken until the next file
/// would exceed the byte budget. the selected set always fits the budget
/// and is maximal with respect to the strategy's ordering.
pub fn select_files(files: &[FileDescriptor], opts: &DownloadOptions) -> Selection {
    let candidates: Vec<FileDescriptor> = if opts.skip_nogeo {
        let (mut geo, non_geo): (Vec<FileDescriptor>, Vec<FileDescriptor>) = files
            .iter()
            .cloned()
            .partition(|f| is_geospatial(f, &opts.skip_nogeo_exts));
        if !non_geo.is_empty() {
            log::info!(
                "skipped {} non-geospatial files (download_skip_nogeo)",
                non_geo.len()
            );
        }
        geo.sort_by_key(|f| f.size);
        geo
    } else {
        files.to_vec()
    };

    let ordered = order_by(candidates, opts);

    let mut selection = Selection::default();
    for file in ordered {
        let fits = match opts.max_size_bytes {
            None => true,
            Some(budget) => selection.total_bytes + file.size <= budget,
        };
        if fits {
            selection.total_bytes += file.size;
            selection.selected.push(file);
        } else {
            log::warn!("skipping {} due to size limit", file.name);
            // selection stops at the first file over budget, so the result
            // is a maximal prefix of the strategy's ordering
            break;
        }
    }
    selection.skipped = files.len() - selection.selected.len();

    log::info!(
        "selected {} of {} files totaling {}",
        selection.selected.len(),
        files.len(),
        format_bytes(selection.total_bytes)
    );
    selection
}

fn order_by(mut files: Vec<FileDescriptor>, opts: &DownloadOptions) -> Vec<FileDescriptor> {
    match opts.method {
        SelectionMethod::Ordered => {}
        SelectionMethod::Smallest => files.sort_by_key(|f| f.size),
        SelectionMethod::Random => {
            let mut rng = rand::rngs::StdRng::seed_from_u64(opts.method_seed);
            files.shuffle(&mut rng);
        }
    }
    files
}

pub fn is_geospatial(file: &FileDescriptor, additional: &[String]) -> bool {
    let ext = file.extension();
    if ext.is_empty() {
        return false;
    }
    GEO_EXTENSIONS.contains(&ext.as_str())
        || additional.iter().any(|a| {
            let a = a.to_lowercase();
            let a = if a.starts_with('.') { a } else { format!(".{}", a) };
            a == ext
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(name: &str, size: u64) -> FileDescriptor {
        FileDescriptor::new(name, format!("https://example.org/{}", name), size)
    }

    /// the budgeted multi-format dataset: a small non-geo zip next to two
    /// larger geo zips (sizes as reported by the provider, binary units)
    fn mendeley_like() -> Vec<FileDescriptor> {
        vec![
            f("supplement.zip", 262_144),
            f("galicia_1.zip", 1_887_437),
            f("galicia_2.zip", 3_460_300),
        ]
    }

    #[test]
    fn smallest_under_two_mb_takes_only_the_small_zip() {
        let opts = DownloadOptions {
            max_size_bytes: Some(2 * 1024 * 1024),
            method: SelectionMethod::Smallest,
            ..Default::default()
        };
        let selection = select_files(&mendeley_like(), &opts);
        let names: Vec<&str> = selection.selected.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["supplement.zip"]);
        assert_eq!(selection.skipped, 2);
    }

    #[test]
    fn smallest_under_three_mb_takes_two() {
        let opts = DownloadOptions {
            max_size_bytes: Some(3 * 1024 * 1024),
            method: SelectionMethod::Smallest,
            ..Default::default()
        };
        let selection = select_files(&mendeley_like(), &opts);
        let names: Vec<&str> = selection.selected.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["supplement.zip", "galicia_1.zip"]);
        assert!(selection.total_bytes <= 3 * 1024 * 1024);
    }

    #[test]
    fn ordered_selection_is_a_prefix() {
        let files = vec![f("a.tif", 100), f("b.tif", 100), f("c.tif", 100)];
        let opts = DownloadOptions {
            max_size_bytes: Some(250),
            ..Default::default()
        };
        let selection = select_files(&files, &opts);
        let names: Vec<&str> = selection.selected.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["a.tif", "b.tif"]);
    }

    #[test]
    fn no_budget_takes_everything() {
        let files = vec![f("a.tif", 10), f("b.txt", 20)];
        let selection = select_files(&files, &DownloadOptions::default());
        assert_eq!(selection.selected.len(), 2);
        assert_eq!(selection.total_bytes, 30);
        assert_eq!(selection.skipped, 0);
    }

    #[test]
    fn skip_nogeo_drops_non_geospatial_and_prefers_small_geo() {
        let files = vec![f("b.txt", 5), f("big.tif", 100), f("small.tif", 10)];
        let opts = DownloadOptions {
            skip_nogeo: true,
            ..Default::default()
        };
        let selection = select_files(&files, &opts);
        let names: Vec<&str> = selection.selected.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["small.tif", "big.tif"]);
        assert_eq!(selection.skipped, 1);
    }

    #[test]
    fn additional_extensions_extend_the_geo_set() {
        let file = f("points.xyz", 5);
        assert!(!is_geospatial(&file, &[]));
        assert!(is_geospatial(&file, &[String::from("xyz")]));
        assert!(is_geospatial(&file, &[String::from(".XYZ")]));
    }

    #[test]
    fn random_strategy_is_reproducible() {
        let files: Vec<FileDescriptor> = (0..10).map(|i| f(&format!("{}.tif", i), 10)).collect();
        let opts = DownloadOptions {
            max_size_bytes: Some(35),
            method: SelectionMethod::Random,
            method_seed: 7,
            ..Default::default()
        };
        let a = select_files(&files, &opts);
        let b = select_files(&files, &opts);
        assert_eq!(a.selected, b.selected);
        assert_eq!(a.selected.len(), 3);
    }
}
