use crate::ops::dispatch;
use crate::ops::remote::RemoteOptions;
use crate::provider::is_placeholder_reference;
use geoextent_core::model::Followed;
use std::path::Path;

/// tries to hand extraction over to another provider via the external
/// references found in a registry record. the first reference that
/// dispatches to a provider and yields files wins.
///
/// two guards block cycles: a provider never follows into its own class,
/// and the nested download runs with following disabled, so chains stop
/// after one hop.
pub async fn try_follow(
    references: &[String],
    from: &str,
    target: &Path,
    opts: &RemoteOptions,
) -> Option<Followed> {
    let mut nested_opts = opts.clone();
    nested_opts.follow = false;

    for reference in references {
        if is_placeholder_reference(reference) {
            continue;
        }

        let mut provider = match dispatch::find_provider(reference).await {
            Ok(provider) => provider,
            Err(_) => {
                log::info!(
                    "{}: external reference {} not matched by any provider, skipping",
                    from,
                    reference
                );
                continue;
            }
        };

        if provider.info().name == from {
            log::debug!(
                "{}: skipping self-referencing external reference {}",
                from,
                reference
            );
            continue;
        }

        log::info!("{}: following {} to {}", from, reference, provider.name());
        match provider.download(target, &nested_opts).await {
            Ok(()) => {
                let produced_files = std::fs::read_dir(target)
                    .map(|mut entries| entries.next().is_some())
                    .unwrap_or(false);
                if produced_files {
                    log::info!("{} -> {}: follow successful", from, provider.name());
                    return Some(Followed {
                        from: String::from(from),
                        to: provider.name(),
                        via: reference.clone(),
                    });
                }
                log::warn!("{} -> {}: follow produced no files", from, provider.name());
            }
            Err(e) => {
                log::warn!("{} -> {}: follow failed: {}", from, provider.name(), e);
                clean_directory(target);
            }
        }
    }
    None
}

/// removes partial files left behind by a failed follow so the fallback
/// sidecar is aggregated alone.
fn clean_directory(target: &Path) {
    if let Ok(entries) = std::fs::read_dir(target) {
        for entry in entries.flatten() {
            let path = entry.path();
            let removed = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            if let Err(e) = removed {
                log::debug!("could not clean up {}: {}", path.display(), e);
            }
        }
    }
}
