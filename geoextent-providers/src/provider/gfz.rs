use super::client::{extract_doi, ProviderClient};
use super::sidecar::{self, SidecarContent};
use super::{datacite, Provider, ProviderInfo};
use crate::ops::remote::RemoteOptions;
use async_trait::async_trait;
use geoextent_core::error::{ExtentError, Result};
use std::path::Path;

const DOI_PREFIX: &str = "10.5880/gfz";

/// GFZ Data Services registers detailed geoLocations with DataCite; the
/// adapter is sidecar-only.
pub struct Gfz {
    client: ProviderClient,
    doi: Option<String>,
}

impl Gfz {
    pub fn new() -> Result<Gfz> {
        Ok(Gfz {
            client: ProviderClient::new()?,
            doi: None,
        })
    }

    fn doi(&self) -> Result<&str> {
        self.doi
            .as_deref()
            .ok_or_else(|| ExtentError::provider("GFZ", "provider not validated"))
    }
}

#[async_trait]
impl Provider for Gfz {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "GFZ",
            description: "GFZ Data Services is the curated geosciences repository of the \
                          GFZ German Research Centre for Geosciences in Potsdam.",
            website: "https://dataservices.gfz-potsdam.de/",
            supported_identifiers: vec![
                "https://dataservices.gfz-potsdam.de/panmetaworks/showshort.php?id={id}",
                "https://doi.org/10.5880/GFZ.{id}",
                "10.5880/GFZ.{id}",
            ],
            doi_prefixes: vec!["10.5880/GFZ"],
            examples: vec!["10.5880/GFZ.4.8.2023.004"],
            notes: Some("Extents come from the DOI's registered geoLocations."),
        }
    }

    fn supports_metadata_extraction(&self) -> bool {
        true
    }

    async fn validate(&mut self, reference: &str) -> Result<bool> {
        match extract_doi(reference) {
            Some(doi) if doi.to_lowercase().starts_with(DOI_PREFIX) => {
                self.doi = Some(doi);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn metadata_extent(
        &mut self,
        _opts: &RemoteOptions,
    ) -> Result<Option<geoextent_core::model::Extent>> {
        let record = datacite::fetch(&self.client, self.doi()?, "GFZ").await?;
        Ok(datacite_extent(&record))
    }

    async fn download(&mut self, target: &Path, _opts: &RemoteOptions) -> Result<()> {
        let record = datacite::fetch(&self.client, self.doi()?, "GFZ").await?;
        let mut content = SidecarContent::new("GFZ", self.doi()?.to_string());
        content.title = record.title.clone();
        content.geometries = record.geometries.clone();
        content.temporal = record.temporal.clone();
        if sidecar::write_sidecar(target, "gfz", &content)?.is_none() {
            log::warn!("GFZ record {} has no geoLocations in its DOI metadata", self.doi()?);
        }
        Ok(())
    }
}

/// shared DataCite record → Extent conversion for sidecar-only adapters.
pub fn datacite_extent(record: &datacite::DataCiteRecord) -> Option<geoextent_core::model::Extent> {
    use geoextent_core::model::{Bbox, Extent, Tbox, WGS84_EPSG};
    use geoextent_core::ops::dates;

    let mut extent = Extent::new("remote");
    let mut points = vec![];
    for geometry in &record.geometries {
        collect_points(&geometry["coordinates"], &mut points);
    }
    if let Some(bbox) = Bbox::from_points(points) {
        if bbox.is_valid_wgs84() {
            extent.bbox = Some(bbox);
            extent.crs = Some(WGS84_EPSG.to_string());
        }
    }
    extent.tbox = record
        .temporal
        .as_ref()
        .and_then(|(s, e)| Some(Tbox::new(dates::parse_date(s)?, dates::parse_date(e)?)));

    if extent.has_extent() {
        Some(extent)
    } else {
        None
    }
}

fn collect_points(value: &serde_json::Value, points: &mut Vec<(f64, f64)>) {
    if let Some(items) = value.as_array() {
        if items.len() >= 2 && items[0].is_number() && items[1].is_number() {
            if let (Some(lon), Some(lat)) = (items[0].as_f64(), items[1].as_f64()) {
                points.push((lon, lat));
            }
        } else {
            for item in items {
                collect_points(item, points);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_is_prefix_bound() {
        let mut gfz = Gfz::new().unwrap();
        assert!(tokio_test::block_on(gfz.validate("10.5880/GFZ.4.8.2023.004")).unwrap());
        assert_eq!(gfz.doi.as_deref(), Some("10.5880/GFZ.4.8.2023.004"));

        let mut gfz = Gfz::new().unwrap();
        assert!(!tokio_test::block_on(gfz.validate("10.5880/other.1")).unwrap());
    }
}
