use crate::ops::dispatch;
use geoextent_core::error::{ExtentError, Result};
use geoextent_core::model::{Extent, ExtractionMethod, ExtractionStats, WalkOptions};
use geoextent_core::ops::merge;
use geoextent_download::DownloadOptions;
use std::collections::BTreeMap;

/// configuration for one remote extraction: what to extract, how to walk
/// the downloaded directory, and how the download engine behaves.
#[derive(Clone, Debug)]
pub struct RemoteOptions {
    pub walk: WalkOptions,
    pub download: DownloadOptions,
    /// false routes every provider through its metadata sidecar path
    pub download_data: bool,
    /// try provider metadata before downloading any data
    pub metadata_first: bool,
    /// follow external references found in registry metadata
    pub follow: bool,
}

impl Default for RemoteOptions {
    fn default() -> Self {
        RemoteOptions {
            walk: WalkOptions::default(),
            download: DownloadOptions::default(),
            download_data: true,
            metadata_first: false,
            follow: true,
        }
    }
}

impl RemoteOptions {
    pub fn validate(&self) -> Result<()> {
        self.walk.extract.validate()?;
        if self.metadata_first && !self.download_data {
            return Err(ExtentError::Config(String::from(
                "metadata_first requires download_data; metadata-only extraction is \
                 what download_data=false already does",
            )));
        }
        Ok(())
    }
}

/// end-to-end remote extraction for one identifier: dispatch, optional
/// metadata-first shortcut, download into a scoped temp directory,
/// aggregate, annotate. the temp directory is removed on every exit path.
pub async fn from_remote(identifier: &str, opts: &RemoteOptions) -> Result<Extent> {
    opts.validate()?;
    log::info!("extracting from remote identifier {}", identifier);

    let mut provider = dispatch::find_provider(identifier).await?;
    log::debug!("using {} to extract {}", provider.name(), identifier);

    // scoped temporary directory; dropped (and deleted) on all exit paths
    let tmp = tempfile::tempdir()?;

    if opts.metadata_first && provider.supports_metadata_extraction() {
        match provider.metadata_extent(opts).await {
            Ok(Some(extent)) if satisfies_request(&extent, &opts.walk) => {
                log::info!(
                    "{}: metadata extraction satisfied the request, skipping download",
                    provider.name()
                );
                let mut extent = extent;
                extent.format = String::from("remote");
                extent.extraction_method = Some(ExtractionMethod::Metadata);
                return Ok(extent);
            }
            Ok(_) => {
                log::debug!(
                    "{}: metadata extraction incomplete, falling back to download",
                    provider.name()
                );
            }
            Err(e) => {
                log::debug!(
                    "{}: metadata extraction failed ({}), falling back to download",
                    provider.name(),
                    e
                );
            }
        }
    }

    provider.download(tmp.path(), opts).await?;

    let walk_opts = opts.walk.clone();
    let tmp_path = tmp.path().to_path_buf();
    let mut extent = tokio::task::spawn_blocking(move || {
        geoextent_handlers::from_directory(&tmp_path, &walk_opts)
    })
    .await
    .map_err(|e| ExtentError::Extraction {
        path: identifier.to_string(),
        message: format!("aggregation task failed: {}", e),
    })??;

    extent.format = String::from("remote");
    extent.extraction_method = Some(ExtractionMethod::Download);
    extent.followed = provider.followed();
    // a followed provider's data wins, but the registry's own temporal
    // coverage fills in when the followee has none
    if extent.tbox.is_none() && opts.walk.extract.tbox {
        if let Some(tbox) = provider.metadata_tbox() {
            extent.tbox = Some(tbox);
        }
    }
    Ok(extent)
}

/// bulk mode: every identifier is processed independently; per-identifier
/// failures are recorded in the detail map and never abort the batch.
pub async fn from_remote_many(identifiers: &[String], opts: &RemoteOptions) -> Result<Extent> {
    opts.validate()?;

    let mut details: BTreeMap<String, Option<Extent>> = BTreeMap::new();
    let mut stats = ExtractionStats {
        total_resources: identifiers.len(),
        ..Default::default()
    };

    for identifier in identifiers {
        match from_remote(identifier, opts).await {
            Ok(extent) => {
                stats.successful += 1;
                details.insert(identifier.clone(), Some(extent));
            }
            Err(e) => {
                log::warn!("extraction failed for {}: {}", identifier, e);
                stats.failed += 1;
                let mut failure = Extent::new("remote");
                failure.error = Some(e.to_string());
                details.insert(identifier.clone(), Some(failure));
            }
        }
    }

    let mut aggregate = Extent::new("remote");
    if opts.walk.extract.bbox {
        if let Some(bbox) = merge::details_bbox_union(&details) {
            aggregate.bbox = Some(bbox);
            aggregate.crs = Some(geoextent_core::model::WGS84_EPSG.to_string());
        }
    }
    if opts.walk.extract.tbox {
        aggregate.tbox = merge::details_tbox_union(&details);
    }
    aggregate.extraction_metadata = Some(stats);
    aggregate.details = Some(details);
    Ok(aggregate)
}

/// metadata-first only short-circuits when it produced everything the
/// caller asked for.
fn satisfies_request(extent: &Extent, walk: &WalkOptions) -> bool {
    let bbox_ok = !walk.extract.bbox || extent.bbox.is_some();
    let tbox_ok = !walk.extract.tbox || extent.tbox.is_some();
    bbox_ok && tbox_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoextent_core::model::Bbox;

    #[test]
    fn contradictory_flags_fail_fast() {
        let opts = RemoteOptions {
            metadata_first: true,
            download_data: false,
            ..Default::default()
        };
        assert!(matches!(opts.validate(), Err(ExtentError::Config(_))));
        assert!(RemoteOptions::default().validate().is_ok());
    }

    #[test]
    fn metadata_result_must_cover_the_request() {
        let mut extent = Extent::new("remote");
        extent.bbox = Some(Bbox::new(1.0, 2.0, 3.0, 4.0));
        let walk = WalkOptions::default(); // bbox and tbox both requested
        assert!(!satisfies_request(&extent, &walk));

        let mut bbox_only = WalkOptions::default();
        bbox_only.extract.tbox = false;
        assert!(satisfies_request(&extent, &bbox_only));
    }
}
