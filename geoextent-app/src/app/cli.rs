use crate::ops::ext_metadata::{self, MetadataMethod};
use crate::ops::features;
use crate::ops::output::{self, OutputFormat};
use clap::Parser;
use geoextent_core::error::{ExtentError, Result};
use geoextent_core::model::{Extent, ExtractOptions, ExtractionStats, WalkOptions};
use geoextent_core::ops::dates::DEFAULT_SAMPLE_SEED;
use geoextent_core::ops::{merge, size};
use geoextent_download::{DownloadOptions, SelectionMethod};
use geoextent_providers::RemoteOptions;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "geoextent", version)]
#[command(about = "Extract geospatial and temporal extents from files, directories, and research data repositories")]
pub struct GeoextentCli {
    /// files, directories, archives, or remote identifiers (mixed is allowed)
    pub inputs: Vec<String>,

    /// extract the spatial bounding box
    #[arg(short = 'b', long = "bounding-box")]
    pub bounding_box: bool,
    /// extract the temporal extent
    #[arg(short = 't', long = "time-box")]
    pub time_box: bool,
    /// compute a convex hull instead of the bounding box
    #[arg(long)]
    pub convex_hull: bool,

    /// download data files from remote repositories (default)
    #[arg(long, overrides_with = "no_download_data")]
    pub download_data: bool,
    /// only use provider metadata, never download data files
    #[arg(long)]
    pub no_download_data: bool,
    /// try provider metadata before downloading any data
    #[arg(long)]
    pub metadata_first: bool,
    /// follow external references found in registry metadata (default)
    #[arg(long, overrides_with = "no_follow")]
    pub follow: bool,
    /// never follow external references
    #[arg(long)]
    pub no_follow: bool,
    /// total download budget, e.g. 500KB, 2MB, 1GB
    #[arg(long, value_name = "SIZE")]
    pub max_download_size: Option<String>,
    /// how to pick files under the download budget
    #[arg(long, value_name = "METHOD")]
    pub max_download_method: Option<SelectionMethodArg>,
    /// seed for the random selection method
    #[arg(long, value_name = "INT")]
    pub max_download_method_seed: Option<u64>,
    /// only download files with geospatial extensions
    #[arg(long)]
    pub download_skip_nogeo: bool,
    /// extra extensions to treat as geospatial (comma separated)
    #[arg(long, value_name = "EXTS", value_delimiter = ',')]
    pub download_skip_nogeo_exts: Vec<String>,
    /// upper bound on concurrent download workers
    #[arg(long, value_name = "INT", default_value_t = 4)]
    pub max_download_workers: usize,
    /// honor rate-limit headers on every response
    #[arg(long)]
    pub throttle: bool,

    /// output encoding
    #[arg(long, value_enum, default_value_t = OutputFormat::Geojson)]
    pub format: OutputFormat,
    /// write the result to this file instead of stdout
    #[arg(long, value_name = "PATH")]
    pub output: Option<std::path::PathBuf>,
    /// include the per-file detail map in the result
    #[arg(long)]
    pub details: bool,
    /// emit bbox arrays in legacy lon-first order
    #[arg(long)]
    pub legacy: bool,
    /// append a geojson.io preview URL to the result
    #[arg(long)]
    pub geojsonio: bool,
    /// open the geojson.io preview in a browser
    #[arg(long)]
    pub browse: bool,

    /// do not descend into subdirectories or archives
    #[arg(long = "no-subdirs")]
    pub no_subdirs: bool,
    /// wall-clock budget in seconds; partial results are returned on expiry
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,
    /// treat ungeoreferenced rasters as WGS84
    #[arg(long)]
    pub assume_wgs84: bool,
    /// sample size for CSV time-format detection
    #[arg(long, value_name = "INT")]
    pub num_sample: Option<usize>,

    /// fetch bibliographic metadata for DOI inputs
    #[arg(long)]
    pub ext_metadata: bool,
    /// registry to query for bibliographic metadata
    #[arg(long, value_enum, default_value_t = MetadataMethod::Auto)]
    pub ext_metadata_method: MetadataMethod,

    /// verbose debug logging on stderr
    #[arg(long)]
    pub debug: bool,
    /// errors only
    #[arg(long)]
    pub quiet: bool,
    /// disable progress bars
    #[arg(long)]
    pub no_progress: bool,
    /// list supported file formats as JSON and exit
    #[arg(long)]
    pub formats: bool,
    /// list supported providers as JSON and exit
    #[arg(long)]
    pub providers: bool,
}

/// clap-facing mirror of the engine's selection method.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum SelectionMethodArg {
    Ordered,
    Smallest,
    Random,
}

impl From<SelectionMethodArg> for SelectionMethod {
    fn from(value: SelectionMethodArg) -> SelectionMethod {
        match value {
            SelectionMethodArg::Ordered => SelectionMethod::Ordered,
            SelectionMethodArg::Smallest => SelectionMethod::Smallest,
            SelectionMethodArg::Random => SelectionMethod::Random,
        }
    }
}

impl GeoextentCli {
    pub async fn run(&self) -> Result<()> {
        if self.formats {
            println!("{}", serde_json::to_string_pretty(&features::supported_formats())?);
            return Ok(());
        }
        if self.providers {
            println!(
                "{}",
                serde_json::to_string_pretty(&features::supported_providers())?
            );
            return Ok(());
        }

        if self.inputs.is_empty() {
            return Err(ExtentError::Config(String::from(
                "no inputs given; pass one or more files, directories, or identifiers",
            )));
        }
        if !self.bounding_box && !self.time_box {
            return Err(ExtentError::Config(String::from(
                "at least one of --bounding-box or --time-box is required",
            )));
        }

        let extent = self.extract().await?;

        let metadata = if self.ext_metadata {
            let mut collected = vec![];
            for input in &self.inputs {
                collected
                    .extend(ext_metadata::get_external_metadata(input, self.ext_metadata_method).await?);
            }
            if collected.is_empty() {
                None
            } else {
                Some(Value::Array(collected))
            }
        } else {
            None
        };

        self.emit(&extent, metadata.as_ref())
    }

    async fn extract(&self) -> Result<Extent> {
        if self.inputs.len() == 1 {
            return self.extract_one(&self.inputs[0]).await;
        }

        // mixed multi-input mode: each input independently, merged result
        let mut details: BTreeMap<String, Option<Extent>> = BTreeMap::new();
        let mut stats = ExtractionStats {
            total_resources: self.inputs.len(),
            ..Default::default()
        };
        for input in &self.inputs {
            match self.extract_one(input).await {
                Ok(extent) => {
                    stats.successful += 1;
                    details.insert(input.clone(), Some(extent));
                }
                Err(e) => {
                    log::warn!("extraction failed for {}: {}", input, e);
                    stats.failed += 1;
                    let mut failure = Extent::new("remote");
                    failure.error = Some(e.to_string());
                    details.insert(input.clone(), Some(failure));
                }
            }
        }

        let mut aggregate = Extent::new("multiple_files");
        if self.bounding_box {
            if let Some(bbox) = merge::details_bbox_union(&details) {
                aggregate.bbox = Some(bbox);
                aggregate.crs = Some(geoextent_core::model::WGS84_EPSG.to_string());
            }
        }
        if self.time_box {
            aggregate.tbox = merge::details_tbox_union(&details);
        }
        aggregate.extraction_metadata = Some(stats);
        if self.details {
            aggregate.details = Some(details);
        }
        Ok(aggregate)
    }

    async fn extract_one(&self, input: &str) -> Result<Extent> {
        let path = Path::new(input);
        if path.is_dir() || geoextent_handlers::ops::archive::is_archive(path) {
            let opts = self.walk_options();
            let path = path.to_path_buf();
            return tokio::task::spawn_blocking(move || {
                geoextent_handlers::from_directory(&path, &opts)
            })
            .await
            .map_err(|e| ExtentError::Extraction {
                path: String::from(input),
                message: format!("extraction task failed: {}", e),
            })?;
        }
        if path.is_file() {
            let opts = self.extract_options();
            let owned = path.to_path_buf();
            let result = tokio::task::spawn_blocking(move || {
                geoextent_handlers::from_file(&owned, &opts)
            })
            .await
            .map_err(|e| ExtentError::Extraction {
                path: String::from(input),
                message: format!("extraction task failed: {}", e),
            })??;
            return result.ok_or_else(|| ExtentError::Extraction {
                path: String::from(input),
                message: String::from("file format is not supported by any handler"),
            });
        }
        geoextent_providers::from_remote(input, &self.remote_options()?).await
    }

    fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            bbox: self.bounding_box,
            tbox: self.time_box,
            convex_hull: self.convex_hull,
            num_sample: self.num_sample,
            assume_wgs84: self.assume_wgs84,
            show_progress: !self.no_progress && !self.quiet,
        }
    }

    fn walk_options(&self) -> WalkOptions {
        WalkOptions {
            extract: self.extract_options(),
            details: self.details,
            timeout: self.timeout.map(Duration::from_secs),
            recursive: !self.no_subdirs,
        }
    }

    fn remote_options(&self) -> Result<RemoteOptions> {
        let max_size_bytes = match &self.max_download_size {
            Some(raw) => match size::parse_download_size(raw) {
                Some(bytes) => Some(bytes),
                None => {
                    return Err(ExtentError::Config(format!(
                        "invalid download size '{}', expected e.g. 500KB, 2MB, 1GB",
                        raw
                    )))
                }
            },
            None => None,
        };

        let download = DownloadOptions {
            max_size_bytes,
            method: self.max_download_method.map(Into::into).unwrap_or_default(),
            method_seed: self.max_download_method_seed.unwrap_or(DEFAULT_SAMPLE_SEED),
            skip_nogeo: self.download_skip_nogeo,
            skip_nogeo_exts: self.download_skip_nogeo_exts.clone(),
            max_workers: self.max_download_workers.max(1),
            show_progress: !self.no_progress && !self.quiet,
            throttle: self.throttle,
        };

        let opts = RemoteOptions {
            walk: self.walk_options(),
            download,
            download_data: !self.no_download_data,
            metadata_first: self.metadata_first,
            follow: !self.no_follow,
        };
        opts.validate()?;
        Ok(opts)
    }

    fn emit(&self, extent: &Extent, metadata: Option<&Value>) -> Result<()> {
        if !extent.has_extent() && extent.details.is_none() {
            log::warn!("no extractable spatial or temporal extent found");
        }

        let preview = output::geojsonio_url(extent, self.legacy);
        if self.browse {
            match &preview {
                Some(url) => output::browse(url)?,
                None => log::warn!("no spatial extent to preview"),
            }
        }

        let rendered = match self.format {
            OutputFormat::Geojson => {
                let mut value = output::to_geojson(extent, self.legacy, metadata);
                if self.geojsonio {
                    if let (Some(url), Some(object)) = (&preview, value.as_object_mut()) {
                        object.insert(String::from("geojsonio_url"), Value::String(url.clone()));
                    }
                }
                serde_json::to_string_pretty(&value)?
            }
            OutputFormat::Wkt => output::to_wkt(extent)?,
            OutputFormat::Wkb => output::to_wkb_hex(extent)?,
            OutputFormat::Geopackage => {
                let target = self.output.as_deref().ok_or_else(|| {
                    ExtentError::Config(String::from(
                        "--format geopackage requires --output <path>",
                    ))
                })?;
                output::to_geopackage(extent, target)?;
                log::info!("wrote GeoPackage to {}", target.display());
                return Ok(());
            }
        };

        match &self.output {
            Some(path) => std::fs::write(path, rendered)?,
            None => println!("{}", rendered),
        }
        if self.geojsonio && self.format != OutputFormat::Geojson {
            if let Some(url) = preview {
                eprintln!("{}", url);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> GeoextentCli {
        GeoextentCli::try_parse_from(
            std::iter::once("geoextent").chain(args.iter().copied()),
        )
        .unwrap()
    }

    #[test]
    fn flags_map_onto_options() {
        let cli = parse(&[
            "-b",
            "-t",
            "--convex-hull",
            "--no-subdirs",
            "--timeout",
            "30",
            "--max-download-size",
            "2MB",
            "--max-download-method",
            "smallest",
            "--no-progress",
            "input.csv",
        ]);
        let walk = cli.walk_options();
        assert!(walk.extract.bbox && walk.extract.tbox && walk.extract.convex_hull);
        assert!(!walk.recursive);
        assert_eq!(walk.timeout, Some(Duration::from_secs(30)));

        let remote = cli.remote_options().unwrap();
        assert_eq!(remote.download.max_size_bytes, Some(2 * 1024 * 1024));
        assert_eq!(remote.download.method, SelectionMethod::Smallest);
        assert!(!remote.download.show_progress);
    }

    #[test]
    fn negated_flags_win() {
        let cli = parse(&["-b", "--no-download-data", "--no-follow", "x"]);
        assert!(cli.no_download_data);
        let remote = cli.remote_options().unwrap();
        assert!(!remote.download_data);
        assert!(!remote.follow);
    }

    #[test]
    fn contradictory_remote_flags_are_rejected() {
        let cli = parse(&["-b", "--metadata-first", "--no-download-data", "x"]);
        assert!(matches!(
            cli.remote_options(),
            Err(ExtentError::Config(_))
        ));
    }

    #[test]
    fn bad_download_size_is_a_config_error() {
        let cli = parse(&["-b", "--max-download-size", "lots", "x"]);
        assert!(matches!(cli.remote_options(), Err(ExtentError::Config(_))));
    }
}
