use crate::model::{DownloadOptions, FileDescriptor};
use crate::ops::http;
use futures::StreamExt;
use geoextent_core::error::Result;
use geoextent_core::ops::size::format_bytes;
use kdam::BarExt;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;

/// result of one file download. partial files are deleted on failure and
/// never reported as successful.
#[derive(Clone, Debug)]
pub struct DownloadOutcome {
    pub name: String,
    pub path: PathBuf,
    pub bytes: u64,
    pub error: Option<String>,
}

impl DownloadOutcome {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

/// parallel downloads pay off only for a handful of medium-to-large files;
/// below this profile the coordination overhead wins and the engine runs
/// sequentially.
fn should_parallelize(files: &[FileDescriptor], max_workers: usize) -> bool {
    if max_workers <= 1 || files.len() < 2 || files.len() > 20 {
        return false;
    }
    let total: u64 = files.iter().map(|f| f.size).sum();
    let average = total / files.len() as u64;
    total > 10 * 1024 * 1024 || average > 1024 * 1024
}

/// sanitized names must be distinct within one batch: concurrent workers
/// write to the same directory, so colliding names are indexed instead of
/// overwriting each other.
fn deduplicate_names(files: &[FileDescriptor]) -> Vec<FileDescriptor> {
    let mut seen: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    files
        .iter()
        .map(|file| {
            let name = file.sanitized_name();
            let count = seen.entry(name.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                FileDescriptor::new(name, file.url.clone(), file.size)
            } else {
                let indexed = match name.rsplit_once('.') {
                    Some((stem, ext)) => format!("{}_{}.{}", stem, *count - 1, ext),
                    None => format!("{}_{}", name, *count - 1),
                };
                log::debug!("renaming colliding download {} to {}", name, indexed);
                FileDescriptor::new(indexed, file.url.clone(), file.size)
            }
        })
        .collect()
}

/// downloads the given files into `target`. per-file failures are recorded
/// and the batch continues; the caller decides what a failed batch means.
pub async fn download_batch(
    client: &Client,
    files: &[FileDescriptor],
    target: &Path,
    opts: &DownloadOptions,
) -> Result<Vec<DownloadOutcome>> {
    if files.is_empty() {
        return Ok(vec![]);
    }
    let files = deduplicate_names(files);
    let files = files.as_slice();

    let parallel = should_parallelize(files, opts.max_workers);
    let workers = opts.max_workers.min(files.len());
    if parallel {
        log::info!(
            "using parallel downloads with {} workers for {} files",
            workers,
            files.len()
        );
    } else {
        log::info!("using sequential downloads for {} files", files.len());
    }

    let progress = if opts.show_progress {
        kdam::BarBuilder::default()
            .total(files.len())
            .desc("downloading files")
            .build()
            .ok()
            .map(|bar| Arc::new(Mutex::new(bar)))
    } else {
        None
    };

    let results: Vec<DownloadOutcome> = if parallel {
        futures::stream::iter(files.iter().map(|file| {
            let progress = progress.clone();
            async move {
                let outcome = download_single(client, file, target, opts.throttle).await;
                update_progress(&progress, &outcome);
                outcome
            }
        }))
        .buffer_unordered(workers)
        .collect()
        .await
    } else {
        let mut results = vec![];
        for file in files {
            let outcome = download_single(client, file, target, opts.throttle).await;
            update_progress(&progress, &outcome);
            results.push(outcome);
        }
        results
    };
    if progress.is_some() {
        eprintln!(); // terminate progress bar
    }

    let successful = results.iter().filter(|r| r.success()).count();
    let failed = results.len() - successful;
    log::info!("downloaded {} files successfully, {} failed", successful, failed);
    if failed > 0 {
        let names: Vec<&str> = results
            .iter()
            .filter(|r| !r.success())
            .map(|r| r.name.as_str())
            .collect();
        log::warn!("failed downloads: {}", names.join(", "));
    }

    Ok(results)
}

fn update_progress(progress: &Option<Arc<Mutex<kdam::Bar>>>, outcome: &DownloadOutcome) {
    if let Some(progress) = progress {
        // the lock keeps the completed-files counter monotonic
        if let Ok(mut bar) = progress.lock() {
            let _ = bar.update(1);
            bar.set_description(format!("{} ({})", outcome.name, format_bytes(outcome.bytes)));
        }
    }
}

async fn download_single(
    client: &Client,
    file: &FileDescriptor,
    target: &Path,
    honor_rate_limits: bool,
) -> DownloadOutcome {
    let filepath = target.join(file.sanitized_name());
    log::debug!("downloading {} to {}", file.url, filepath.display());

    match stream_to_file(client, &file.url, &filepath, honor_rate_limits).await {
        Ok(bytes) => DownloadOutcome {
            name: file.sanitized_name(),
            path: filepath,
            bytes,
            error: None,
        },
        Err(message) => {
            log::warn!("failed to download {}: {}", file.url, message);
            if filepath.exists() {
                let _ = std::fs::remove_file(&filepath);
            }
            DownloadOutcome {
                name: file.sanitized_name(),
                path: filepath,
                bytes: 0,
                error: Some(message),
            }
        }
    }
}

/// default download path, covering the provider quirks around presigned
/// URLs:
/// - 302 redirects are followed by the HTTP layer itself
/// - a 200 with a text/plain body holding only a URL triggers a second GET
/// - a 200 carrying a `Location` header is followed like a redirect
/// - anything else streams straight to disk
async fn stream_to_file(
    client: &Client,
    url: &str,
    filepath: &Path,
    honor_rate_limits: bool,
) -> std::result::Result<u64, String> {
    let response = http::get_with_retry(client, url, honor_rate_limits)
        .await
        .map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("HTTP {} for {}", response.status(), url));
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_lowercase();

    if content_type.contains("text/plain") {
        let body = response.text().await.map_err(|e| e.to_string())?;
        let body = body.trim();
        if body.starts_with("http") {
            log::debug!("following presigned URL from response body for {}", url);
            return Box::pin(stream_to_file(client, body, filepath, honor_rate_limits)).await;
        }
        // plain text that is not a URL is the actual payload
        tokio::fs::write(filepath, body.as_bytes())
            .await
            .map_err(|e| e.to_string())?;
        return Ok(body.len() as u64);
    }

    if let Some(location) = response.headers().get(LOCATION) {
        if let Ok(location) = location.to_str() {
            if location.starts_with("http") {
                log::debug!("following Location header on 200 response for {}", url);
                return Box::pin(stream_to_file(client, location, filepath, honor_rate_limits))
                    .await;
            }
        }
    }

    let mut out = tokio::fs::File::create(filepath)
        .await
        .map_err(|e| e.to_string())?;
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| e.to_string())?;
        tokio::io::copy(&mut chunk.as_ref(), &mut out)
            .await
            .map_err(|e| e.to_string())?;
        downloaded += chunk.len() as u64;
    }
    out.flush().await.map_err(|e| e.to_string())?;
    log::debug!("download completed: {} bytes", downloaded);
    Ok(downloaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(name: &str, size: u64) -> FileDescriptor {
        FileDescriptor::new(name, format!("https://example.org/{}", name), size)
    }

    #[test]
    fn parallel_gate_thresholds() {
        // one worker, one file, or too many files: sequential
        assert!(!should_parallelize(&[f("a.tif", 50 << 20)], 4));
        assert!(!should_parallelize(
            &[f("a.tif", 50 << 20), f("b.tif", 50 << 20)],
            1
        ));
        let many: Vec<FileDescriptor> = (0..21).map(|i| f(&format!("{}.tif", i), 50 << 20)).collect();
        assert!(!should_parallelize(&many, 4));

        // small payloads: coordination overhead wins
        assert!(!should_parallelize(&[f("a.tif", 1000), f("b.tif", 1000)], 4));

        // two files over 10 MiB total: parallel
        assert!(should_parallelize(
            &[f("a.tif", 8 << 20), f("b.tif", 8 << 20)],
            4
        ));
        // large average with small total count
        assert!(should_parallelize(
            &[f("a.tif", 2 << 20), f("b.tif", 2 << 20)],
            4
        ));
    }

    #[test]
    fn colliding_names_are_indexed_not_overwritten() {
        let files = vec![
            FileDescriptor::new("sub/data.tif", "https://x/1", 1),
            FileDescriptor::new("sub\\data.tif", "https://x/2", 1),
            FileDescriptor::new("other.tif", "https://x/3", 1),
        ];
        let deduped = deduplicate_names(&files);
        let names: Vec<&str> = deduped.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["sub_data.tif", "sub_data_1.tif", "other.tif"]);
    }
}
