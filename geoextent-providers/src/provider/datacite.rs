use super::client::ProviderClient;
use geoextent_core::error::Result;
use serde_json::Value;

/// extent-relevant slice of a DataCite DOI record: geoLocations (point or
/// box), date coverage, and the title. several adapters whose repositories
/// register rich DataCite metadata source their sidecars from here.
#[derive(Clone, Debug, Default)]
pub struct DataCiteRecord {
    pub title: Option<String>,
    /// GeoJSON geometry values in [lon, lat] order
    pub geometries: Vec<Value>,
    pub temporal: Option<(String, String)>,
}

pub async fn fetch(client: &ProviderClient, doi: &str, provider: &str) -> Result<DataCiteRecord> {
    let url = format!("https://api.datacite.org/dois/{}", doi);
    let response = client.get_json(&url, provider).await?;
    Ok(parse(&response["data"]["attributes"]))
}

pub fn parse(attributes: &Value) -> DataCiteRecord {
    let mut record = DataCiteRecord {
        title: attributes["titles"][0]["title"].as_str().map(String::from),
        ..Default::default()
    };

    if let Some(locations) = attributes["geoLocations"].as_array() {
        for location in locations {
            if let Some(geometry) = parse_geolocation(location) {
                record.geometries.push(geometry);
            }
        }
    }

    // "Collected" date ranges take precedence over bare publication years
    if let Some(dates) = attributes["dates"].as_array() {
        for entry in dates {
            let date = entry["date"].as_str().unwrap_or("").trim();
            if date.is_empty() {
                continue;
            }
            let parsed = match date.split_once('/') {
                Some((start, end)) => (String::from(start.trim()), String::from(end.trim())),
                None => (String::from(date), String::from(date)),
            };
            let is_collected = entry["dateType"].as_str() == Some("Collected");
            if is_collected {
                record.temporal = Some(parsed);
                break;
            }
            if record.temporal.is_none() {
                record.temporal = Some(parsed);
            }
        }
    }

    record
}

fn parse_geolocation(location: &Value) -> Option<Value> {
    if let Some(b) = location.get("geoLocationBox") {
        let south = number_of(&b["southBoundLatitude"])?;
        let west = number_of(&b["westBoundLongitude"])?;
        let north = number_of(&b["northBoundLatitude"])?;
        let east = number_of(&b["eastBoundLongitude"])?;
        return Some(super::sidecar::SidecarContent::bbox_geometry(
            south, west, north, east,
        ));
    }
    if let Some(p) = location.get("geoLocationPoint") {
        let lat = number_of(&p["pointLatitude"])?;
        let lon = number_of(&p["pointLongitude"])?;
        return Some(serde_json::json!({
            "type": "Point",
            "coordinates": [lon, lat],
        }));
    }
    None
}

/// DataCite serializes coordinates as numbers or strings depending on the
/// registrant.
fn number_of(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn boxes_and_points_with_mixed_number_encodings() {
        let attributes = json!({
            "titles": [{"title": "survey"}],
            "geoLocations": [
                {"geoLocationBox": {
                    "southBoundLatitude": "47.0", "westBoundLongitude": "19.0",
                    "northBoundLatitude": "52.0", "eastBoundLongitude": "26.0",
                }},
                {"geoLocationPoint": {"pointLatitude": 52.5, "pointLongitude": 13.4}},
                {"geoLocationPlace": "Berlin"},
            ],
            "dates": [
                {"date": "2023", "dateType": "Issued"},
                {"date": "2014-08-21/2020-09-30", "dateType": "Collected"},
            ],
        });
        let record = parse(&attributes);
        assert_eq!(record.title.as_deref(), Some("survey"));
        assert_eq!(record.geometries.len(), 2);
        assert_eq!(record.geometries[0]["type"], "Polygon");
        assert_eq!(record.geometries[1]["type"], "Point");
        assert_eq!(
            record.temporal,
            Some((String::from("2014-08-21"), String::from("2020-09-30")))
        );
    }
}
