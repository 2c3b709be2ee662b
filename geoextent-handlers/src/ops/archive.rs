use flate2::read::GzDecoder;
use geoextent_core::error::{ExtentError, Result};
use std::fs::File;
use std::path::{Path, PathBuf};

/// archive formats entered by the directory walker. detection is by
/// extension; extraction failures surface as per-entry nulls, never as a
/// walk abort.
const ARCHIVE_EXTENSIONS: [&str; 5] = ["zip", "tar", "gz", "tgz", "rar"];

pub fn is_archive(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => ARCHIVE_EXTENSIONS.contains(&ext.to_lowercase().as_str()),
        None => false,
    }
}

/// extracts the archive into `scratch` and returns the directory to walk.
pub fn extract_archive(path: &Path, scratch: &Path) -> Result<PathBuf> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("archive")
        .to_string();

    match extension.as_str() {
        "zip" => {
            let file = File::open(path)?;
            let mut archive = zip::ZipArchive::new(file)
                .map_err(|e| ExtentError::extraction(path.display(), e))?;
            archive
                .extract(scratch)
                .map_err(|e| ExtentError::extraction(path.display(), e))?;
        }
        "tar" => {
            let file = File::open(path)?;
            tar::Archive::new(file).unpack(scratch)?;
        }
        "tgz" => {
            let file = File::open(path)?;
            tar::Archive::new(GzDecoder::new(file)).unpack(scratch)?;
        }
        "gz" => {
            if stem.to_lowercase().ends_with(".tar") {
                let file = File::open(path)?;
                tar::Archive::new(GzDecoder::new(file)).unpack(scratch)?;
            } else {
                // single gzipped file: decompress under its inner name
                let file = File::open(path)?;
                let mut decoder = GzDecoder::new(file);
                let target = scratch.join(&stem);
                let mut out = File::create(&target)?;
                std::io::copy(&mut decoder, &mut out)?;
            }
        }
        other => {
            return Err(ExtentError::extraction(
                path.display(),
                format!("unsupported archive format '{}'", other),
            ));
        }
    }
    Ok(scratch.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn archive_detection_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.zip", "b.TAR", "c.tar.gz", "d.tgz"] {
            let path = dir.path().join(name);
            std::fs::write(&path, b"x").unwrap();
            assert!(is_archive(&path), "{} should probe as archive", name);
        }
        let plain = dir.path().join("plain.csv");
        std::fs::write(&plain, b"x").unwrap();
        assert!(!is_archive(&plain));
        assert!(!is_archive(dir.path()));
    }

    #[test]
    fn zip_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("data.zip");
        let file = File::create(&archive_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file("inner.csv", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"x,y\n1,2\n").unwrap();
        writer.finish().unwrap();

        let scratch = tempfile::tempdir().unwrap();
        let extracted = extract_archive(&archive_path, scratch.path()).unwrap();
        let content = std::fs::read_to_string(extracted.join("inner.csv")).unwrap();
        assert_eq!(content, "x,y\n1,2\n");
    }

    #[test]
    fn tar_gz_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("data.tar.gz");
        let file = File::create(&archive_path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let payload = b"a;b\n1;2\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(payload.len() as u64);
        header.set_cksum();
        builder.append_data(&mut header, "inner.csv", &payload[..]).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let scratch = tempfile::tempdir().unwrap();
        extract_archive(&archive_path, scratch.path()).unwrap();
        assert!(scratch.path().join("inner.csv").exists());
    }

    #[test]
    fn unsupported_archive_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.rar");
        std::fs::write(&path, b"Rar!").unwrap();
        assert!(is_archive(&path));
        let scratch = tempfile::tempdir().unwrap();
        assert!(extract_archive(&path, scratch.path()).is_err());
    }
}
