use geoextent_handlers::handler::{patterns, registry as handler_registry};
use geoextent_providers::registry as provider_registry;
use serde_json::{json, Value};

/// machine-readable listing of the format handlers: capabilities, typical
/// extensions, and the column patterns the CSV handler matches against.
pub fn supported_formats() -> Value {
    let handlers: Vec<Value> = handler_registry()
        .into_iter()
        .map(|handler| {
            let mut entry = serde_json::Map::new();
            entry.insert(String::from("handler"), json!(handler.name()));
            entry.insert(String::from("display_name"), json!(handler.display_name()));
            entry.insert(
                String::from("capabilities"),
                json!({
                    "bounding_box": true,
                    "temporal_extent": true,
                    "convex_hull": handler.name() == "vector",
                }),
            );
            entry.insert(String::from("file_extensions"), json!(handler.extensions()));
            if handler.name() == "csv" {
                entry.insert(
                    String::from("supported_patterns"),
                    json!({
                        "longitude_columns": patterns::LONGITUDE_PATTERNS,
                        "latitude_columns": patterns::LATITUDE_PATTERNS,
                        "geometry_columns": patterns::GEOMETRY_PATTERNS,
                        "time_columns": patterns::TIME_PATTERNS,
                    }),
                );
            }
            Value::Object(entry)
        })
        .collect();

    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "file_formats": handlers,
    })
}

/// machine-readable listing of every registered provider, in registration
/// order.
pub fn supported_providers() -> Value {
    let providers: Vec<Value> = provider_registry()
        .into_iter()
        .filter_map(|(_, factory)| factory().ok())
        .map(|provider| serde_json::to_value(provider.info()).unwrap_or(Value::Null))
        .collect();

    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "content_providers": providers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_listing_names_three_handlers() {
        let value = supported_formats();
        let formats = value["file_formats"].as_array().unwrap();
        assert_eq!(formats.len(), 3);
        assert_eq!(formats[0]["handler"], "csv");
        assert!(formats[0]["supported_patterns"]["time_columns"]
            .as_array()
            .unwrap()
            .iter()
            .any(|p| p == "timestamp"));
    }

    #[test]
    fn providers_listing_is_complete_and_ordered() {
        let value = supported_providers();
        let providers = value["content_providers"].as_array().unwrap();
        assert_eq!(providers.len(), 21);
        assert_eq!(providers[0]["name"], "Dryad");
        assert!(providers
            .iter()
            .any(|p| p["name"] == "Zenodo" && p["doi_prefixes"][0] == "10.5281/zenodo"));
    }
}
